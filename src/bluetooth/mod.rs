pub mod decoder;
pub mod radio;
pub mod scanner;

pub use radio::{BluerRadio, Radio};
pub use scanner::scan_with_retry;
