pub mod file;
pub mod http;

use std::fmt;
use thiserror::Error;

pub use file::FileSink;
pub use http::{HttpSink, ReqwestPoster, RetryPolicy};

/// Graded outcome of one sink's delivery pass. Ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Normal,
    #[allow(dead_code)]
    Notification,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Numeric code reported to schedulers and logs
    pub fn code(&self) -> u16 {
        match self {
            Severity::Normal => 100,
            Severity::Notification => 200,
            Severity::Warning => 300,
            Severity::Error => 400,
            Severity::Critical => 500,
        }
    }

    pub fn worst(self, other: Severity) -> Severity {
        self.max(other)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Normal => "NORMAL",
            Severity::Notification => "NOTIFICATION",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        };
        write!(f, "{} ({})", name, self.code())
    }
}

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("HTTP transport failure: {0}")]
    Transport(String),
    #[error("endpoint answered with status {0}")]
    Rejected(u16),
    #[error("file sink I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("no records to deliver")]
    NoData,
}
