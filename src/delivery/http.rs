/// HTTP sink: one form-encoded POST per record, retried with exponential backoff
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use log::{error, info, warn};
use reqwest::Client;
use tokio::time::{sleep, Duration};
use url::Url;

use crate::delivery::{DeliveryError, Severity};
use crate::records::Record;

/// Upper bound for a single backoff delay
const BACKOFF_MAX_SECS: f64 = 120.0;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retries: u32,
    /// Backoff base in seconds
    pub backoff_factor: f64,
    /// Status codes worth another attempt
    pub retryable_statuses: Vec<u16>,
}

impl RetryPolicy {
    /// Delay before the next attempt, given how many attempts failed so far.
    ///
    /// The first retry goes out immediately, then `factor * 2^(failures - 1)`.
    pub fn backoff(&self, failures: u32) -> Duration {
        if failures <= 1 {
            return Duration::ZERO;
        }
        // 2^62 keeps the product finite for any finite factor, including zero
        let exponent = (failures - 1).min(62) as i32;
        let secs = self.backoff_factor * 2f64.powi(exponent);
        if !secs.is_finite() || secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(secs.min(BACKOFF_MAX_SECS))
    }

    pub fn is_retryable(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }
}

/// A single POST attempt. Returns the status code or a transport failure.
#[async_trait]
pub trait Poster: Send + Sync {
    async fn post(&self, url: &Url, record: &Record) -> Result<u16, DeliveryError>;
}

/// reqwest-backed poster with per-attempt connect and read timeouts
#[derive(Debug, Clone)]
pub struct ReqwestPoster {
    client: Client,
}

impl ReqwestPoster {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Poster for ReqwestPoster {
    async fn post(&self, url: &Url, record: &Record) -> Result<u16, DeliveryError> {
        self.client
            .post(url.clone())
            .form(record)
            .send()
            .await
            .map(|response| response.status().as_u16())
            .map_err(|e| DeliveryError::Transport(e.to_string()))
    }
}

pub struct HttpSink<P> {
    poster: P,
    url: Url,
    policy: RetryPolicy,
    concurrency: usize,
}

impl<P: Poster> HttpSink<P> {
    pub fn new(poster: P, url: Url, policy: RetryPolicy, concurrency: usize) -> Self {
        Self {
            poster,
            url,
            policy,
            concurrency: concurrency.max(1),
        }
    }

    #[cfg(test)]
    pub fn poster(&self) -> &P {
        &self.poster
    }

    /// Post every record independently and grade the pass
    ///
    /// `Error` when there is nothing to send, `Warning` when any record
    /// could not be delivered, `Normal` otherwise. A failing record never
    /// stops the others.
    pub async fn post_all(&self, records: &[Record]) -> Severity {
        if records.is_empty() {
            error!("Sending data to {} skipped: {}", self.url, DeliveryError::NoData);
            return Severity::Error;
        }

        stream::iter(records)
            .map(|record| async move { (record, self.post_with_retry(record).await) })
            .buffer_unordered(self.concurrency)
            .fold(Severity::Normal, |severity, (record, result)| async move {
                match result {
                    Ok(()) => severity,
                    Err(e) => {
                        error!(
                            "Sending data for {} to {} failed: {}",
                            record.mac_address, self.url, e
                        );
                        severity.worst(Severity::Warning)
                    }
                }
            })
            .await
    }

    async fn post_with_retry(&self, record: &Record) -> Result<(), DeliveryError> {
        let mut failures = 0;

        loop {
            info!("Start request (POST) to ({}) for {}", self.url, record.mac_address);

            let error = match self.poster.post(&self.url, record).await {
                Ok(status) if (200..300).contains(&status) => return Ok(()),
                Ok(status) if !self.policy.is_retryable(status) => {
                    return Err(DeliveryError::Rejected(status));
                }
                Ok(status) => DeliveryError::Rejected(status),
                Err(e) => e,
            };

            failures += 1;
            if failures > self.policy.retries {
                return Err(error);
            }

            let delay = self.policy.backoff(failures);
            warn!(
                "Request for {} failed ({}), retry {}/{} in {:?}",
                record.mac_address, error, failures, self.policy.retries, delay
            );
            sleep(delay).await;
        }
    }
}
