/// OMRON environment sensor broadcast payload decoding
use thiserror::Error;

use crate::models::{ModeExtras, Scaled, SensorMode, SensorReading};

// OMRON protocol constants
pub const OMRON_COMPANY_ID: u16 = 0x02D5; // OMRON Corporation company identifier
pub const OMRON_SIGNATURE: [u8; 2] = OMRON_COMPANY_ID.to_le_bytes(); // As it appears on the wire
pub const PAYLOAD_OFFSET: usize = 3; // Company id + sequence number
pub const PAYLOAD_LEN: usize = 19; // 9 x int16 + battery byte

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed payload: expected 19 bytes, got {0}")]
    MalformedPayload(usize),
}

/// Decode an OMRON broadcast payload (company prefix already stripped)
///
/// Layout, all little-endian:
/// - Bytes 0-1: Temperature (signed 16-bit, 0.01 degC)
/// - Bytes 2-3: Relative humidity (signed 16-bit, 0.01 %RH)
/// - Bytes 4-5: Ambient light (signed 16-bit, 1 lx)
/// - Bytes 6-7: UV index (signed 16-bit, 0.01)
/// - Bytes 8-9: Barometric pressure (signed 16-bit, 0.1 hPa)
/// - Bytes 10-11: Sound noise (signed 16-bit, 0.01 dB)
/// - Bytes 12-17: EP: discomfort index, WBGT, reserved; IM: acceleration X/Y/Z
/// - Byte 18: Battery, volts = (raw + 100) / 100
pub fn decode(payload: &[u8], mode: SensorMode) -> Result<SensorReading, DecodeError> {
    if payload.len() != PAYLOAD_LEN {
        return Err(DecodeError::MalformedPayload(payload.len()));
    }

    let word = |index: usize| {
        i32::from(i16::from_le_bytes([
            payload[index * 2],
            payload[index * 2 + 1],
        ]))
    };

    let extras = match mode {
        SensorMode::Ep => ModeExtras::Comfort {
            discomfort_index: Scaled::new(word(6), 2),
            wbgt: Scaled::new(word(7), 2),
        },
        SensorMode::Im => ModeExtras::Motion {
            acceleration_x: Scaled::new(word(6), 1),
            acceleration_y: Scaled::new(word(7), 1),
            acceleration_z: Scaled::new(word(8), 1),
        },
    };

    Ok(SensorReading {
        mode,
        temperature: Scaled::new(word(0), 2),
        humidity: Scaled::new(word(1), 2),
        light: Scaled::new(word(2), 0),
        uv: Scaled::new(word(3), 2),
        pressure: Scaled::new(word(4), 1),
        noise: Scaled::new(word(5), 2),
        battery: Scaled::new(i32::from(payload[18]) + 100, 2),
        extras,
    })
}

/// Split a manufacturer blob into its sensor payload if it carries the OMRON signature
pub fn omron_payload(manufacturer_data: &[u8]) -> Option<&[u8]> {
    if manufacturer_data.starts_with(&OMRON_SIGNATURE) {
        Some(manufacturer_data.get(PAYLOAD_OFFSET..).unwrap_or_default())
    } else {
        None
    }
}
