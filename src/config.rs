use std::collections::BTreeSet;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::delivery::RetryPolicy;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Tunables for one collection run, read once at startup
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub scan_window: Duration,
    pub scan_retries: u32,
    pub expected_devices: BTreeSet<String>,
    pub retry_policy: RetryPolicy,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub request_concurrency: usize,
    pub post_url: Url,
    pub output_dir: PathBuf,
    pub output_filename: String,
}

impl CollectorConfig {
    pub fn new() -> Result<Self, ConfigError> {
        // Load environment variables
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &'static str, default: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let scan_secs: f64 = parse(&get, "BLE_SCAN_TIME", "5.0")?;
        let scan_window = seconds("BLE_SCAN_TIME", scan_secs)?;
        let scan_retries = parse(&get, "BLE_RETRY", "3")?;

        let expected_devices = get("EXPECTED_DEVICES", "")
            .split(',')
            .map(|id| id.trim().to_lowercase())
            .filter(|id| !id.is_empty())
            .collect();

        let backoff_factor: f64 = parse(&get, "REQUEST_FACTOR", "10")?;
        if !backoff_factor.is_finite() || backoff_factor < 0.0 {
            return Err(invalid(
                "REQUEST_FACTOR",
                &backoff_factor.to_string(),
                "must be a non-negative number",
            ));
        }

        let timeouts: Vec<f64> = parse_list(&get("REQUEST_TIMEOUT", "10.0,30.0"), "REQUEST_TIMEOUT")?;
        let (connect_timeout, read_timeout) = match timeouts.as_slice() {
            [connect, read] => (
                seconds("REQUEST_TIMEOUT", *connect)?,
                seconds("REQUEST_TIMEOUT", *read)?,
            ),
            _ => {
                return Err(invalid(
                    "REQUEST_TIMEOUT",
                    &get("REQUEST_TIMEOUT", ""),
                    "expected connect,read",
                ))
            }
        };

        let retry_policy = RetryPolicy {
            retries: parse(&get, "REQUEST_RETRY", "3")?,
            backoff_factor,
            retryable_statuses: parse_list(
                &get("REQUEST_FORCELIST", "500,502,503,504"),
                "REQUEST_FORCELIST",
            )?,
        };

        let request_concurrency = parse(&get, "REQUEST_CONCURRENCY", "4")?;

        let raw_url = lookup("POST_URL")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or(ConfigError::Missing("POST_URL"))?;
        let post_url =
            Url::parse(&raw_url).map_err(|e| invalid("POST_URL", &raw_url, &e.to_string()))?;

        Ok(CollectorConfig {
            scan_window,
            scan_retries,
            expected_devices,
            retry_policy,
            connect_timeout,
            read_timeout,
            request_concurrency,
            post_url,
            output_dir: PathBuf::from(get("OUTPUT_DIR", "data")),
            output_filename: get("OUTPUT_FILENAME", "omron_env.csv"),
        })
    }
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse<T, G>(get: &G, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&'static str, &str) -> String,
{
    let value = get(key, default);
    value
        .parse()
        .map_err(|e: T::Err| invalid(key, &value, &e.to_string()))
}

/// Parse `a,b,c`, also accepting the bracketed `[a, b, c]` form
fn parse_list<T>(value: &str, key: &'static str) -> Result<Vec<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|item| item.trim().trim_matches('"'))
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse()
                .map_err(|e: T::Err| invalid(key, value, &e.to_string()))
        })
        .collect()
}

fn seconds(key: &'static str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| invalid(key, &secs.to_string(), &e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<CollectorConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CollectorConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[("POST_URL", "https://example.com/exec")]).unwrap();

        assert_eq!(config.scan_window, Duration::from_secs(5));
        assert_eq!(config.scan_retries, 3);
        assert!(config.expected_devices.is_empty());
        assert_eq!(config.retry_policy.retries, 3);
        assert_eq!(config.retry_policy.backoff_factor, 10.0);
        assert_eq!(
            config.retry_policy.retryable_statuses,
            vec![500, 502, 503, 504]
        );
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.read_timeout, Duration::from_secs(30));
        assert_eq!(config.request_concurrency, 4);
        assert_eq!(config.post_url.as_str(), "https://example.com/exec");
        assert_eq!(config.output_dir, PathBuf::from("data"));
        assert_eq!(config.output_filename, "omron_env.csv");
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("POST_URL", "http://localhost:8080/"),
            ("BLE_SCAN_TIME", "2.5"),
            ("BLE_RETRY", "0"),
            ("EXPECTED_DEVICES", "F6:AE:2F:68:1A:B8, da:6f:c8:f0:23:0a,"),
            ("REQUEST_TIMEOUT", "[5.0, 15.0]"),
            ("REQUEST_FORCELIST", "[\"502\", \"503\"]"),
            ("OUTPUT_DIR", "/var/lib/omron"),
        ])
        .unwrap();

        assert_eq!(config.scan_window, Duration::from_millis(2500));
        assert_eq!(config.scan_retries, 0);
        assert_eq!(
            config.expected_devices.iter().collect::<Vec<_>>(),
            vec!["da:6f:c8:f0:23:0a", "f6:ae:2f:68:1a:b8"]
        );
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.read_timeout, Duration::from_secs(15));
        assert_eq!(config.retry_policy.retryable_statuses, vec![502, 503]);
        assert_eq!(config.output_dir, PathBuf::from("/var/lib/omron"));
    }

    #[test]
    fn test_missing_url() {
        assert_eq!(config(&[]).unwrap_err(), ConfigError::Missing("POST_URL"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config(&[("POST_URL", "not a url")]),
            Err(ConfigError::Invalid { key: "POST_URL", .. })
        ));
        assert!(matches!(
            config(&[("POST_URL", "http://x/"), ("BLE_RETRY", "-1")]),
            Err(ConfigError::Invalid { key: "BLE_RETRY", .. })
        ));
        assert!(matches!(
            config(&[("POST_URL", "http://x/"), ("REQUEST_TIMEOUT", "10")]),
            Err(ConfigError::Invalid { key: "REQUEST_TIMEOUT", .. })
        ));
        assert!(matches!(
            config(&[("POST_URL", "http://x/"), ("BLE_SCAN_TIME", "-3")]),
            Err(ConfigError::Invalid { key: "BLE_SCAN_TIME", .. })
        ));
        assert!(matches!(
            config(&[("POST_URL", "http://x/"), ("REQUEST_FACTOR", "-1")]),
            Err(ConfigError::Invalid { key: "REQUEST_FACTOR", .. })
        ));
    }
}
