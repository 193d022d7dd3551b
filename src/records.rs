/// Conversion of decoded readings into sink records
use serde::Serialize;
use time::OffsetDateTime;

use crate::models::DeviceReadingMap;
use crate::utils::{cycle_timestamp, format_record_time};

/// Header row of the local file sink, in row order
pub const CSV_HEADER: [&str; 11] = [
    "Date_Master",
    "Date",
    "MacAddress",
    "SensorType",
    "Temperature",
    "Humidity",
    "Light",
    "UV",
    "Pressure",
    "Noise",
    "BatteryVoltage",
];

/// One device's reading for one collection cycle, every value rendered as text.
///
/// Serializes to the keyed shape the HTTP endpoint expects; `row` gives the
/// file sink's column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    #[serde(rename = "MacAddress")]
    pub mac_address: String,
    #[serde(rename = "Date_Master")]
    pub date_master: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "SensorType")]
    pub sensor_type: String,
    #[serde(rename = "Temperature")]
    pub temperature: String,
    #[serde(rename = "Humidity")]
    pub humidity: String,
    #[serde(rename = "Light")]
    pub light: String,
    #[serde(rename = "UV")]
    pub uv: String,
    #[serde(rename = "Pressure")]
    pub pressure: String,
    #[serde(rename = "Noise")]
    pub noise: String,
    #[serde(rename = "Batter")]
    pub battery: String,
}

impl Record {
    /// Values in `CSV_HEADER` order
    pub fn row(&self) -> [&str; 11] {
        [
            self.date_master.as_str(),
            self.date.as_str(),
            self.mac_address.as_str(),
            self.sensor_type.as_str(),
            self.temperature.as_str(),
            self.humidity.as_str(),
            self.light.as_str(),
            self.uv.as_str(),
            self.pressure.as_str(),
            self.noise.as_str(),
            self.battery.as_str(),
        ]
    }
}

/// Build one record per device, all stamped with the same capture time
///
/// Returns an empty vector for an empty map; callers treat that as "no data".
pub fn format_records(readings: &DeviceReadingMap, captured: OffsetDateTime) -> Vec<Record> {
    let date = format_record_time(&captured);
    let date_master = format_record_time(&cycle_timestamp(captured));

    readings
        .iter()
        .map(|(device_id, reading)| Record {
            mac_address: device_id.clone(),
            date_master: date_master.clone(),
            date: date.clone(),
            sensor_type: reading.mode.to_string(),
            temperature: reading.temperature.to_string(),
            humidity: reading.humidity.to_string(),
            light: reading.light.to_string(),
            uv: reading.uv.to_string(),
            pressure: reading.pressure.to_string(),
            noise: reading.noise.to_string(),
            battery: reading.battery.to_string(),
        })
        .collect()
}
