//! Fakes shared by unit tests: a scripted radio, a scripted HTTP poster and
//! payload/record builders.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use url::Url;

use crate::bluetooth::radio::{Radio, RadioEvent, ScanError};
use crate::delivery::http::Poster;
use crate::delivery::DeliveryError;
use crate::models::RawAdvertisement;
use crate::records::Record;

/// Pack nine int16 words and a battery byte the way the sensor does
pub fn encode_payload(words: [i16; 9], battery: u8) -> Vec<u8> {
    let mut payload: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    payload.push(battery);
    payload
}

/// A well-formed OMRON advertisement with the given temperature word
pub fn advertisement(device_id: &str, name: &str, temperature: i16) -> RadioEvent {
    let mut blob = vec![0xD5, 0x02, 0x01];
    blob.extend(encode_payload(
        [temperature, 5787, 0, 2, 10165, 3645, 0, 0, 0],
        172,
    ));
    Ok(RawAdvertisement {
        device_id: device_id.to_string(),
        manufacturer_data: blob,
        local_name: Some(name.to_string()),
    })
}

pub fn record(mac: &str) -> Record {
    Record {
        mac_address: mac.into(),
        date_master: "2020-11-05 08:14:00".into(),
        date: "2020-11-05 08:14:13.281416".into(),
        sensor_type: "EP".into(),
        temperature: "23.64".into(),
        humidity: "57.87".into(),
        light: "0".into(),
        uv: "0.02".into(),
        pressure: "1016.5".into(),
        noise: "36.45".into(),
        battery: "2.72".into(),
    }
}

/// What one scan attempt of a `FakeRadio` does
pub enum Attempt {
    /// Radio cannot start at all
    Unavailable,
    /// Emit events, then close the stream
    Events(Vec<RadioEvent>),
    /// Emit events, then keep the stream open until the session drops it
    Hold(Vec<RadioEvent>),
}

/// Plays back one `Attempt` per scan; an exhausted script yields empty scans.
pub struct FakeRadio {
    attempts: Mutex<VecDeque<Attempt>>,
    starts: AtomicUsize,
}

impl FakeRadio {
    pub fn new(attempts: Vec<Attempt>) -> Self {
        Self {
            attempts: Mutex::new(attempts.into()),
            starts: AtomicUsize::new(0),
        }
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Radio for FakeRadio {
    async fn start_scan(&self) -> Result<mpsc::Receiver<RadioEvent>, ScanError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let attempt = self
            .attempts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Attempt::Events(Vec::new()));

        let (events, hold) = match attempt {
            Attempt::Unavailable => {
                return Err(ScanError::Transport("adapter busy".into()));
            }
            Attempt::Events(events) => (events, false),
            Attempt::Hold(events) => (events, true),
        };

        let (tx, rx) = mpsc::channel(events.len().max(1));
        tokio::spawn(async move {
            for event in events {
                let _ = tx.send(event).await;
            }
            if hold {
                tx.closed().await;
            }
        });
        Ok(rx)
    }
}

/// Answers each device's posts from a script; the last answer repeats.
/// Unscripted devices get 200.
#[derive(Default)]
pub struct FakePoster {
    scripts: Mutex<HashMap<String, VecDeque<Result<u16, DeliveryError>>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FakePoster {
    pub fn script(self, mac: &str, answers: Vec<Result<u16, DeliveryError>>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(mac.to_string(), answers.into());
        self
    }

    pub fn calls(&self, mac: &str) -> usize {
        self.calls.lock().unwrap().get(mac).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

fn replay(answer: &Result<u16, DeliveryError>) -> Result<u16, DeliveryError> {
    match answer {
        Ok(status) => Ok(*status),
        Err(e) => Err(DeliveryError::Transport(e.to_string())),
    }
}

#[async_trait]
impl Poster for FakePoster {
    async fn post(&self, _url: &Url, record: &Record) -> Result<u16, DeliveryError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(record.mac_address.clone())
            .or_default() += 1;

        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(&record.mac_address) {
            Some(answers) if answers.len() > 1 => answers.pop_front().unwrap_or(Ok(200)),
            Some(answers) => answers.front().map(replay).unwrap_or(Ok(200)),
            None => Ok(200),
        }
    }
}
