use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Latest reading per device id within one discovery session.
pub type DeviceReadingMap = BTreeMap<String, SensorReading>;

/// Payload layout advertised in the short local name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorMode {
    /// Environment sensor: trailing slots hold discomfort index and WBGT
    Ep,
    /// Motion-capable sensor: trailing slots hold acceleration axes
    Im,
}

impl SensorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorMode::Ep => "EP",
            SensorMode::Im => "IM",
        }
    }
}

impl fmt::Display for SensorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "EP" => Ok(SensorMode::Ep),
            "IM" => Ok(SensorMode::Im),
            other => Err(format!("unknown sensor mode: {}", other)),
        }
    }
}

/// A fixed-point value: `raw / 10^decimals`.
///
/// Kept as the integer the sensor sent so rendering is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scaled {
    raw: i32,
    decimals: u8,
}

impl Scaled {
    pub const fn new(raw: i32, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    #[cfg(test)]
    pub fn as_f64(&self) -> f64 {
        f64::from(self.raw) / 10f64.powi(i32::from(self.decimals))
    }
}

impl fmt::Display for Scaled {
    /// Integers render bare (`0`); scaled values render as the shortest exact
    /// decimal with at least one fractional digit (`23.64`, `1016.5`, `23.0`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.decimals == 0 {
            return write!(f, "{}", self.raw);
        }

        let divisor = 10u32.pow(u32::from(self.decimals));
        let magnitude = self.raw.unsigned_abs();
        let sign = if self.raw < 0 { "-" } else { "" };
        let fraction = format!(
            "{:0width$}",
            magnitude % divisor,
            width = usize::from(self.decimals)
        );
        let fraction = fraction.trim_end_matches('0');
        let fraction = if fraction.is_empty() { "0" } else { fraction };

        write!(f, "{}{}.{}", sign, magnitude / divisor, fraction)
    }
}

/// Values carried by the trailing int16 slots, which differ per mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeExtras {
    Comfort {
        discomfort_index: Scaled,
        wbgt: Scaled,
    },
    Motion {
        acceleration_x: Scaled,
        acceleration_y: Scaled,
        acceleration_z: Scaled,
    },
}

impl fmt::Display for ModeExtras {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeExtras::Comfort {
                discomfort_index,
                wbgt,
            } => write!(f, "discomfort={}, wbgt={}", discomfort_index, wbgt),
            ModeExtras::Motion {
                acceleration_x,
                acceleration_y,
                acceleration_z,
            } => write!(
                f,
                "accel=({}, {}, {})",
                acceleration_x, acceleration_y, acceleration_z
            ),
        }
    }
}

/// One decoded advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorReading {
    pub mode: SensorMode,
    pub temperature: Scaled,
    pub humidity: Scaled,
    pub light: Scaled,
    pub uv: Scaled,
    pub pressure: Scaled,
    pub noise: Scaled,
    pub battery: Scaled,
    pub extras: ModeExtras,
}

/// One broadcast event as observed by the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAdvertisement {
    /// Lowercase colon-separated hardware address
    pub device_id: String,
    /// Manufacturer blob including its little-endian company id
    pub manufacturer_data: Vec<u8>,
    /// Short local name, used as the mode tag
    pub local_name: Option<String>,
}
