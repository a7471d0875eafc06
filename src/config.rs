use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Smallest batch that still leaves a value after trimming min and max
pub const MIN_SAMPLE_COUNT: usize = 3;

/// Largest batch the service will allocate storage for
pub const MAX_SAMPLE_COUNT: usize = 1000;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} has an invalid value '{value}'")]
    InvalidVar { name: &'static str, value: String },

    #[error("sample count must be between 3 and 1000, got {0}")]
    SampleCount(usize),

    #[error("invalid InfluxDB endpoint '{url}': {reason}")]
    Endpoint { url: String, reason: String },

    #[error("bit threshold {threshold} must be below the stall limit {stall_limit}")]
    Threshold { threshold: u32, stall_limit: u32 },

    #[error("max transitions {max} must exceed the {skipped} skipped handshake transitions")]
    Transitions { max: usize, skipped: usize },

    #[error("retry count must be at least 1")]
    RetryCount,

    #[error("measurement name must not be empty")]
    Measurement,

    #[error("location tag must not be empty")]
    Location,
}

/// Timing parameters of the single-wire protocol.
///
/// `bit_threshold` and `stall_limit` are counted in polling iterations of
/// roughly one microsecond each. The real per-iteration cost depends on the
/// host, so both are calibration values rather than protocol constants.
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderConfig {
    /// How long the line is held low to request a frame
    pub start_signal_ms: u64,
    /// Upper bound on level changes observed per attempt
    pub max_transitions: usize,
    /// Iteration count at which a level is considered stuck
    pub stall_limit: u32,
    /// Leading transitions that belong to the response handshake
    pub skipped_transitions: usize,
    /// High pulses longer than this many iterations encode a 1
    pub bit_threshold: u32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            start_signal_ms: 18,
            max_transitions: 85,
            stall_limit: 255,
            skipped_transitions: 4,
            bit_threshold: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InfluxConfig {
    /// Full write URL including database and credentials query
    pub url: String,
    pub measurement: String,
    pub location: String,
    /// Total number of POST attempts per reading
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            url: "http://rpi3:8086/write?db=sensor_data&u=basement&p=basement".to_string(),
            measurement: "dht22".to_string(),
            location: "basement".to_string(),
            retry_count: 3,
            retry_delay: Duration::from_millis(1000),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// BCM GPIO number of the sensor data line
    pub pin: u8,
    /// Successful reads folded into one pushed measurement
    pub sample_count: usize,
    /// Pause between two read attempts
    pub sample_interval: Duration,
    pub decoder: DecoderConfig,
    pub influx: InfluxConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pin: 4,
            sample_count: 6,
            sample_interval: Duration::from_millis(10_000),
            decoder: DecoderConfig::default(),
            influx: InfluxConfig::default(),
        }
    }
}

impl Config {
    /// Load the reference configuration, applying any overrides found in the
    /// process environment, and validate the result.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`Config::from_env`] but reads variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(pin) = parse_var(&lookup, "DHT_PIN")? {
            config.pin = pin;
        }
        if let Some(count) = parse_var(&lookup, "DHT_SAMPLE_COUNT")? {
            config.sample_count = count;
        }
        if let Some(ms) = parse_var(&lookup, "DHT_SAMPLE_INTERVAL_MS")? {
            config.sample_interval = Duration::from_millis(ms);
        }
        if let Some(threshold) = parse_var(&lookup, "DHT_BIT_THRESHOLD")? {
            config.decoder.bit_threshold = threshold;
        }
        if let Some(limit) = parse_var(&lookup, "DHT_STALL_LIMIT")? {
            config.decoder.stall_limit = limit;
        }
        if let Some(max) = parse_var(&lookup, "DHT_MAX_TRANSITIONS")? {
            config.decoder.max_transitions = max;
        }
        if let Some(url) = lookup("INFLUX_URL") {
            config.influx.url = url.trim().to_string();
        }
        if let Some(measurement) = lookup("INFLUX_MEASUREMENT") {
            config.influx.measurement = measurement.trim().to_string();
        }
        if let Some(location) = lookup("INFLUX_LOCATION") {
            config.influx.location = location.trim().to_string();
        }
        if let Some(retries) = parse_var(&lookup, "INFLUX_RETRY_COUNT")? {
            config.influx.retry_count = retries;
        }
        if let Some(ms) = parse_var(&lookup, "INFLUX_RETRY_DELAY_MS")? {
            config.influx.retry_delay = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_SAMPLE_COUNT..=MAX_SAMPLE_COUNT).contains(&self.sample_count) {
            return Err(ConfigError::SampleCount(self.sample_count));
        }

        let decoder = &self.decoder;
        if decoder.bit_threshold >= decoder.stall_limit {
            return Err(ConfigError::Threshold {
                threshold: decoder.bit_threshold,
                stall_limit: decoder.stall_limit,
            });
        }
        if decoder.max_transitions <= decoder.skipped_transitions {
            return Err(ConfigError::Transitions {
                max: decoder.max_transitions,
                skipped: decoder.skipped_transitions,
            });
        }

        let url = Url::parse(&self.influx.url).map_err(|e| ConfigError::Endpoint {
            url: self.influx.url.clone(),
            reason: e.to_string(),
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Endpoint {
                url: self.influx.url.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        if self.influx.retry_count == 0 {
            return Err(ConfigError::RetryCount);
        }
        if self.influx.measurement.is_empty() {
            return Err(ConfigError::Measurement);
        }
        if self.influx.location.is_empty() {
            return Err(ConfigError::Location);
        }

        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidVar { name, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn default_is_reference_configuration() {
        let config = Config::default();
        assert_eq!(config.sample_count, 6);
        assert_eq!(config.sample_interval, Duration::from_secs(10));
        assert_eq!(config.decoder.max_transitions, 85);
        assert_eq!(config.decoder.stall_limit, 255);
        assert_eq!(config.decoder.bit_threshold, 16);
        assert_eq!(config.influx.retry_count, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn overrides_are_applied() {
        let config = Config::from_lookup(lookup_from(&[
            ("DHT_PIN", "17"),
            ("DHT_SAMPLE_COUNT", " 9 "),
            ("DHT_BIT_THRESHOLD", "30"),
            ("INFLUX_URL", "https://influx.local:8086/write?db=home"),
            ("INFLUX_LOCATION", "attic"),
            ("INFLUX_RETRY_DELAY_MS", "250"),
        ]))
        .unwrap();

        assert_eq!(config.pin, 17);
        assert_eq!(config.sample_count, 9);
        assert_eq!(config.decoder.bit_threshold, 30);
        assert_eq!(config.influx.url, "https://influx.local:8086/write?db=home");
        assert_eq!(config.influx.location, "attic");
        assert_eq!(config.influx.retry_delay, Duration::from_millis(250));
        assert_eq!(config.influx.measurement, "dht22");
    }

    #[test]
    fn unparsable_variable_is_an_error() {
        let err = Config::from_lookup(lookup_from(&[("DHT_PIN", "seven")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidVar {
                name: "DHT_PIN",
                value: "seven".to_string()
            }
        );
    }

    #[test]
    fn rejects_batches_too_small_to_trim() {
        let err = Config::from_lookup(lookup_from(&[("DHT_SAMPLE_COUNT", "2")])).unwrap_err();
        assert_eq!(err, ConfigError::SampleCount(2));
    }

    #[test]
    fn rejects_batches_larger_than_storage() {
        let err = Config::from_lookup(lookup_from(&[("DHT_SAMPLE_COUNT", "18446744073709551615")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::SampleCount(usize::MAX));

        let err = Config::from_lookup(lookup_from(&[("DHT_SAMPLE_COUNT", "1001")])).unwrap_err();
        assert_eq!(err, ConfigError::SampleCount(1001));

        let config = Config::from_lookup(lookup_from(&[("DHT_SAMPLE_COUNT", "1000")])).unwrap();
        assert_eq!(config.sample_count, MAX_SAMPLE_COUNT);
    }

    #[test]
    fn rejects_blank_location() {
        let err = Config::from_lookup(lookup_from(&[("INFLUX_LOCATION", "  ")])).unwrap_err();
        assert_eq!(err, ConfigError::Location);

        let mut config = Config::default();
        config.influx.location.clear();
        assert_eq!(config.validate(), Err(ConfigError::Location));
    }

    #[test]
    fn rejects_threshold_at_stall_limit() {
        let mut config = Config::default();
        config.decoder.bit_threshold = config.decoder.stall_limit;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Threshold { .. })
        ));
    }

    #[test]
    fn rejects_non_http_endpoint() {
        let mut config = Config::default();
        config.influx.url = "ftp://rpi3/write".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Endpoint { .. })));

        config.influx.url = "not a url".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Endpoint { .. })));
    }

    #[test]
    fn rejects_zero_retries() {
        let mut config = Config::default();
        config.influx.retry_count = 0;
        assert_eq!(config.validate(), Err(ConfigError::RetryCount));
    }
}
