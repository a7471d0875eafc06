/// HTTP push of smoothed readings to InfluxDB
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tokio::time::{sleep, Duration};

use crate::config::InfluxConfig;
use crate::influx::line_protocol::format_record;
use crate::models::Reading;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("giving up after {attempts} attempts, last error: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

/// Destination for one smoothed reading per completed batch.
#[async_trait]
pub trait ReadingSink: Send + Sync {
    async fn push(&self, reading: &Reading) -> Result<(), PushError>;
}

/// Writes readings to an InfluxDB `/write` endpoint.
pub struct InfluxClient {
    http: reqwest::Client,
    url: String,
    measurement: String,
    location: String,
    retry_count: u32,
    retry_delay: Duration,
}

impl InfluxClient {
    pub fn new(config: &InfluxConfig) -> Result<Self, PushError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            // Connect directly, ignoring system proxy settings
            .no_proxy()
            .user_agent(concat!("rust-dht22-etl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(PushError::Client)?;

        Ok(Self {
            http,
            url: config.url.clone(),
            measurement: config.measurement.clone(),
            location: config.location.clone(),
            retry_count: config.retry_count,
            retry_delay: config.retry_delay,
        })
    }

    pub fn record(&self, reading: &Reading) -> String {
        format_record(&self.measurement, &self.location, reading)
    }

    async fn post_once(&self, body: &str) -> Result<(), String> {
        let response = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body.to_owned())
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        Err(format!("HTTP {}: {}", status, detail.trim()))
    }
}

#[async_trait]
impl ReadingSink for InfluxClient {
    /// POST the reading, retrying transport errors and non-2xx responses up
    /// to the configured attempt count with a fixed delay in between.
    async fn push(&self, reading: &Reading) -> Result<(), PushError> {
        let body = self.record(reading);
        let mut last = String::new();

        for attempt in 1..=self.retry_count {
            match self.post_once(&body).await {
                Ok(()) => {
                    debug!("Pushed '{}' on attempt {}", body, attempt);
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "Attempt {}/{}: push to InfluxDB failed: {}",
                        attempt, self.retry_count, e
                    );
                    last = e;
                }
            }

            if attempt < self.retry_count {
                sleep(self.retry_delay).await;
            }
        }

        Err(PushError::RetriesExhausted {
            attempts: self.retry_count,
            last,
        })
    }
}
