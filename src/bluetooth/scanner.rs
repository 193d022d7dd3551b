/// Discovery sessions and the bounded scan retry loop
use log::{debug, error, info, warn};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;
use tokio::time::{timeout_at, Duration, Instant};

use crate::bluetooth::decoder::{decode, omron_payload};
use crate::bluetooth::radio::Radio;
use crate::models::{DeviceReadingMap, RawAdvertisement, SensorMode};

/// Why a scan attempt did not satisfy the caller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Shortfall {
    #[error("BTLE advertising data is not found")]
    NoData,
    #[error("device ids do not match the expected list ({0})")]
    PartialMismatch(Mismatch),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Mismatch {
    pub missing: Vec<String>,
    pub unexpected: Vec<String>,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "missing: [{}], unexpected: [{}]",
            self.missing.join(", "),
            self.unexpected.join(", ")
        )
    }
}

/// Check one attempt's readings against the expected device set
///
/// An empty expected set means "any non-empty result". Otherwise the found
/// ids must equal the expected ids exactly; extra devices are a mismatch too.
pub fn assess(readings: &DeviceReadingMap, expected: &BTreeSet<String>) -> Option<Shortfall> {
    if readings.is_empty() {
        return Some(Shortfall::NoData);
    }
    if expected.is_empty() {
        return None;
    }

    let found: BTreeSet<&String> = readings.keys().collect();
    let missing: Vec<String> = expected
        .iter()
        .filter(|id| !found.contains(id))
        .cloned()
        .collect();
    let unexpected: Vec<String> = found
        .into_iter()
        .filter(|id| !expected.contains(*id))
        .cloned()
        .collect();

    if missing.is_empty() && unexpected.is_empty() {
        None
    } else {
        Some(Shortfall::PartialMismatch(Mismatch {
            missing,
            unexpected,
        }))
    }
}

/// Run one discovery session for `window` and collect the latest reading per device
///
/// Radio failures end the session early; whatever was collected up to that
/// point is returned.
pub async fn scan(radio: &dyn Radio, window: Duration) -> DeviceReadingMap {
    let mut readings = DeviceReadingMap::new();

    let mut events = match radio.start_scan().await {
        Ok(events) => events,
        Err(e) => {
            error!("BTLE exception while scanning: {}", e);
            return readings;
        }
    };

    let deadline = Instant::now() + window;
    loop {
        match timeout_at(deadline, events.recv()).await {
            Err(_) => break,
            Ok(None) => {
                debug!("Radio closed the advertisement stream");
                break;
            }
            Ok(Some(Err(e))) => {
                error!("BTLE exception while scanning: {}", e);
                break;
            }
            Ok(Some(Ok(advertisement))) => record_advertisement(&mut readings, advertisement),
        }
    }

    readings
}

fn record_advertisement(readings: &mut DeviceReadingMap, advertisement: RawAdvertisement) {
    let payload = match omron_payload(&advertisement.manufacturer_data) {
        Some(payload) => payload,
        None => return,
    };

    let mode = match advertisement
        .local_name
        .as_deref()
        .map(str::parse::<SensorMode>)
    {
        Some(Ok(mode)) => mode,
        _ => {
            debug!(
                "Ignoring {}: unrecognized sensor mode {:?}",
                advertisement.device_id, advertisement.local_name
            );
            return;
        }
    };

    match decode(payload, mode) {
        Ok(reading) => {
            debug!(
                "Received data from {}: mode={}, temp={}°C, humidity={}%, pressure={} hPa, {}",
                advertisement.device_id,
                reading.mode,
                reading.temperature,
                reading.humidity,
                reading.pressure,
                reading.extras
            );
            readings.insert(advertisement.device_id, reading);
        }
        Err(e) => warn!(
            "Dropping advertisement from {}: {}",
            advertisement.device_id, e
        ),
    }
}

/// Scan until the result is acceptable or the retry budget is spent
///
/// Runs at most `max_retries + 1` sessions back to back, without delay. Each
/// attempt's map replaces the previous one; the last map is returned even
/// when it falls short.
pub async fn scan_with_retry(
    radio: &dyn Radio,
    max_retries: u32,
    window: Duration,
    expected: &BTreeSet<String>,
) -> DeviceReadingMap {
    let mut remaining = max_retries;

    loop {
        info!("Start BTLE scanning ({})", remaining);
        let readings = scan(radio, window).await;

        match assess(&readings, expected) {
            None => {
                info!("End BTLE scanning: {} device(s) found", readings.len());
                return readings;
            }
            Some(shortfall) if remaining == 0 => {
                match shortfall {
                    Shortfall::NoData => error!("BTLE scanning failed. {}", shortfall),
                    Shortfall::PartialMismatch(_) => {
                        error!("BTLE scanning warning. Some data is missing: {}", shortfall)
                    }
                }
                return readings;
            }
            Some(shortfall) => {
                info!("Retry BTLE scanning. {}", shortfall);
                remaining -= 1;
            }
        }
    }
}
