/// Radio capability: a bounded BLE scan yielding raw advertisements
use async_trait::async_trait;
use bluer::{AdapterEvent, Address, DiscoveryFilter, DiscoveryTransport, Session};
use futures_util::{pin_mut, StreamExt};
use log::{debug, warn};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::models::RawAdvertisement;

/// Channel buffer size for advertisement events.
pub const ADVERTISEMENT_CHANNEL_BUFFER_SIZE: usize = 100;

#[derive(Error, Debug)]
pub enum ScanError {
    /// Adapter missing, busy or dropped out mid-scan
    #[error("Bluetooth transport failure: {0}")]
    Transport(String),
}

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Transport(err.to_string())
    }
}

pub type RadioEvent = Result<RawAdvertisement, ScanError>;

/// Exclusive access to a BLE adapter.
///
/// Scanning runs until the returned receiver is dropped; the caller owns the
/// wall-clock bound.
#[async_trait]
pub trait Radio: Send + Sync {
    async fn start_scan(&self) -> Result<mpsc::Receiver<RadioEvent>, ScanError>;
}

/// BlueZ D-Bus radio
#[derive(Debug, Default, Clone, Copy)]
pub struct BluerRadio;

#[async_trait]
impl Radio for BluerRadio {
    async fn start_scan(&self) -> Result<mpsc::Receiver<RadioEvent>, ScanError> {
        let session = Session::new().await?;
        let adapter = session.default_adapter().await?;
        adapter.set_powered(true).await?;

        // Low Energy only, and report every advertisement so readings stay fresh
        let filter = DiscoveryFilter {
            transport: DiscoveryTransport::Le,
            duplicate_data: true,
            ..Default::default()
        };
        if let Err(e) = adapter.set_discovery_filter(filter).await {
            warn!("Failed to set discovery filter: {}", e);
        }

        let discovery = adapter.discover_devices_with_changes().await?;
        let (tx, rx) = mpsc::channel(ADVERTISEMENT_CHANNEL_BUFFER_SIZE);

        tokio::spawn(async move {
            // Discovery stops once the stream and session are dropped
            let _session = session;
            pin_mut!(discovery);

            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    event = discovery.next() => match event {
                        Some(AdapterEvent::DeviceAdded(address)) => {
                            let advertisements = match read_advertisements(&adapter, address).await {
                                Ok(advertisements) => advertisements,
                                Err(e) => {
                                    debug!("Failed to read advertisement from {}: {}", address, e);
                                    continue;
                                }
                            };
                            for advertisement in advertisements {
                                if tx.send(Ok(advertisement)).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Some(event) => debug!("Discovery event: {:?}", event),
                        None => {
                            let _ = tx
                                .send(Err(ScanError::Transport("discovery stream ended".into())))
                                .await;
                            break;
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}

/// One advertisement per manufacturer-data entry the device currently exposes
async fn read_advertisements(
    adapter: &bluer::Adapter,
    address: Address,
) -> Result<Vec<RawAdvertisement>, ScanError> {
    let device = adapter.device(address)?;
    Ok(live_advertisements(
        &address.to_string().to_lowercase(),
        device.rssi().await?,
        device.manufacturer_data().await?,
        device.name().await?,
    ))
}

/// Turn a device's advertised properties into advertisements
///
/// BlueZ replays cached properties for every device it already knows about,
/// including ones out of range. Only devices with a signal strength were
/// heard during the current discovery; the rest yield nothing.
fn live_advertisements(
    device_id: &str,
    rssi: Option<i16>,
    manufacturer_data: Option<HashMap<u16, Vec<u8>>>,
    local_name: Option<String>,
) -> Vec<RawAdvertisement> {
    if rssi.is_none() {
        return Vec::new();
    }

    manufacturer_data
        .unwrap_or_default()
        .into_iter()
        .map(|(company_id, data)| {
            let mut blob = company_id.to_le_bytes().to_vec();
            blob.extend(data);
            RawAdvertisement {
                device_id: device_id.to_string(),
                manufacturer_data: blob,
                local_name: local_name.clone(),
            }
        })
        .collect()
}
