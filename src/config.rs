//! Configuration for the analytics client.
//!
//! A [`Config`] is passed explicitly to [`Client::new`](crate::client::Client::new);
//! there is no process-wide state. It can be built in code or loaded from
//! `ANALYTICS_*` environment variables.

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

/// Default ingestion endpoint for the HTTP transport
const DEFAULT_ENDPOINT: &str = "http://localhost:8000/v1/batch";

/// Default maximum number of messages per batch
const DEFAULT_UPLOAD_SIZE: usize = 100;

/// Default time budget for assembling one batch, in milliseconds
const DEFAULT_UPLOAD_INTERVAL_MS: u64 = 500;

/// Default number of additional attempts after a failed request
const DEFAULT_RETRIES: u32 = 3;

/// Default number of consumer tasks
const DEFAULT_CONSUMERS: usize = 1;

/// Default HTTP request timeout in seconds
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default time `flush` waits for the queue to drain, in seconds
const DEFAULT_FLUSH_TIMEOUT_SECS: u64 = 10;

/// Default base delay for exponential backoff, in milliseconds
const DEFAULT_BACKOFF_BASE_MS: u64 = 500;

/// Default cap on a single backoff delay, in milliseconds
const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;

/// Upper bound on `upload_size`
const MAX_UPLOAD_SIZE: usize = 100_000;

/// Bounds on `upload_interval`, in milliseconds
const MIN_UPLOAD_INTERVAL_MS: u64 = 10;
const MAX_UPLOAD_INTERVAL_MS: u64 = 300_000;

/// Upper bound on the consumer pool size
const MAX_CONSUMERS: usize = 64;

/// Upper bound on `retries`
const MAX_RETRIES: u32 = 100;

/// Upper bound on `request_timeout`, in seconds
const MAX_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Upper bound on `flush_timeout`, in seconds
const MAX_FLUSH_TIMEOUT_SECS: u64 = 3_600;

/// Upper bound on either backoff setting, in milliseconds
const MAX_BACKOFF_MS: u64 = 600_000;

/// Configuration for the analytics client.
///
/// Settings recognised by [`Config::from_env`]:
/// - `ANALYTICS_SOURCE_ID` (required)
/// - `ANALYTICS_DESTINATION` (required)
/// - `ANALYTICS_CREDENTIALS`: bearer token passed to the transport
/// - `ANALYTICS_ENDPOINT`: ingestion URL (default: http://localhost:8000/v1/batch)
/// - `ANALYTICS_UPLOAD_SIZE`: messages per batch (default: 100)
/// - `ANALYTICS_UPLOAD_INTERVAL_MS`: batch time budget (default: 500)
/// - `ANALYTICS_RETRIES`: extra attempts after a failure (default: 3)
/// - `ANALYTICS_CONSUMERS`: consumer tasks (default: 1)
/// - `ANALYTICS_REQUEST_TIMEOUT_SECS`: HTTP timeout (default: 30)
/// - `ANALYTICS_FLUSH_TIMEOUT_SECS`: flush wait (default: 10)
/// - `ANALYTICS_BACKOFF_BASE_MS`: first retry delay (default: 500)
/// - `ANALYTICS_BACKOFF_MAX_MS`: cap on a retry delay (default: 30000)
/// - `ANALYTICS_DEBUG`: `1`/`true` for verbose request logging
#[derive(Debug, Clone)]
pub struct Config {
    /// Identifier of the application emitting events
    pub source_id: String,

    /// Identifier of the destination (bus, stream, project) events go to
    pub destination: String,

    /// Opaque credentials handed to the transport
    pub credentials: Option<String>,

    /// Ingestion URL used by the HTTP transport
    pub endpoint: String,

    /// Maximum number of messages in one batch
    pub upload_size: usize,

    /// Time budget for assembling one batch
    pub upload_interval: Duration,

    /// Additional attempts after the first failed request
    pub retries: u32,

    /// Number of consumer tasks draining the queue
    pub consumers: usize,

    /// HTTP request timeout
    pub request_timeout: Duration,

    /// How long `flush` waits for the queue to drain
    pub flush_timeout: Duration,

    /// Base delay for exponential backoff
    pub backoff_base: Duration,

    /// Cap on a single backoff delay
    pub backoff_max: Duration,

    /// Log request payloads
    pub debug: bool,
}

/// Error type for configuration failures
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub message: String,
    pub env_var: Option<String>,
}

impl ConfigError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            env_var: None,
        }
    }

    fn for_var(env_var: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            env_var: Some(env_var.to_string()),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.env_var {
            Some(var) => write!(f, "Configuration error for {}: {}", var, self.message),
            None => write!(f, "Configuration error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Create a configuration for the given source and destination with
    /// default tuning.
    pub fn new(source_id: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            destination: destination.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing, a numeric
    /// variable does not parse, or a value is out of range.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use analytics_batcher::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Sending to: {}", config.endpoint);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let source_id = required_var("ANALYTICS_SOURCE_ID")?;
        let destination = required_var("ANALYTICS_DESTINATION")?;

        let credentials = env::var("ANALYTICS_CREDENTIALS")
            .ok()
            .filter(|v| !v.trim().is_empty());

        let endpoint = env::var("ANALYTICS_ENDPOINT")
            .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string();

        let upload_size = parse_bounded(
            "ANALYTICS_UPLOAD_SIZE",
            DEFAULT_UPLOAD_SIZE,
            1,
            MAX_UPLOAD_SIZE,
        )?;

        let upload_interval_ms = parse_bounded(
            "ANALYTICS_UPLOAD_INTERVAL_MS",
            DEFAULT_UPLOAD_INTERVAL_MS,
            MIN_UPLOAD_INTERVAL_MS,
            MAX_UPLOAD_INTERVAL_MS,
        )?;

        let retries = parse_bounded("ANALYTICS_RETRIES", DEFAULT_RETRIES, 0, MAX_RETRIES)?;

        let consumers = parse_bounded("ANALYTICS_CONSUMERS", DEFAULT_CONSUMERS, 1, MAX_CONSUMERS)?;

        let request_timeout_secs = parse_bounded(
            "ANALYTICS_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
            1,
            MAX_REQUEST_TIMEOUT_SECS,
        )?;

        let flush_timeout_secs = parse_bounded(
            "ANALYTICS_FLUSH_TIMEOUT_SECS",
            DEFAULT_FLUSH_TIMEOUT_SECS,
            1,
            MAX_FLUSH_TIMEOUT_SECS,
        )?;

        let backoff_base_ms = parse_bounded(
            "ANALYTICS_BACKOFF_BASE_MS",
            DEFAULT_BACKOFF_BASE_MS,
            1,
            MAX_BACKOFF_MS,
        )?;

        let backoff_max_ms = parse_bounded(
            "ANALYTICS_BACKOFF_MAX_MS",
            DEFAULT_BACKOFF_MAX_MS,
            1,
            MAX_BACKOFF_MS,
        )?;

        let debug = env::var("ANALYTICS_DEBUG")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let config = Self {
            source_id,
            destination,
            credentials,
            endpoint,
            upload_size,
            upload_interval: Duration::from_millis(upload_interval_ms),
            retries,
            consumers,
            request_timeout: Duration::from_secs(request_timeout_secs),
            flush_timeout: Duration::from_secs(flush_timeout_secs),
            backoff_base: Duration::from_millis(backoff_base_ms),
            backoff_max: Duration::from_millis(backoff_max_ms),
            debug,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that required identifiers are present and tuning values are
    /// in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_id.trim().is_empty() {
            return Err(ConfigError::new("source_id must be set"));
        }

        if self.destination.trim().is_empty() {
            return Err(ConfigError::new("destination must be set"));
        }

        if self.upload_size == 0 || self.upload_size > MAX_UPLOAD_SIZE {
            return Err(ConfigError::new(format!(
                "upload_size {} must be between 1 and {}",
                self.upload_size, MAX_UPLOAD_SIZE
            )));
        }

        if self.upload_interval.is_zero() {
            return Err(ConfigError::new("upload_interval must be greater than 0"));
        }

        if self.consumers == 0 || self.consumers > MAX_CONSUMERS {
            return Err(ConfigError::new(format!(
                "consumers {} must be between 1 and {}",
                self.consumers, MAX_CONSUMERS
            )));
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::new("request_timeout must be greater than 0"));
        }

        if self.flush_timeout.is_zero() {
            return Err(ConfigError::new("flush_timeout must be greater than 0"));
        }

        if self.backoff_base > self.backoff_max {
            return Err(ConfigError::new("backoff_base must not exceed backoff_max"));
        }

        Ok(())
    }
}

impl Default for Config {
    /// Default tuning with empty identifiers; `validate` rejects it until
    /// `source_id` and `destination` are filled in.
    fn default() -> Self {
        Self {
            source_id: String::new(),
            destination: String::new(),
            credentials: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            upload_size: DEFAULT_UPLOAD_SIZE,
            upload_interval: Duration::from_millis(DEFAULT_UPLOAD_INTERVAL_MS),
            retries: DEFAULT_RETRIES,
            consumers: DEFAULT_CONSUMERS,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            flush_timeout: Duration::from_secs(DEFAULT_FLUSH_TIMEOUT_SECS),
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            backoff_max: Duration::from_millis(DEFAULT_BACKOFF_MAX_MS),
            debug: false,
        }
    }
}

fn required_var(env_var: &str) -> Result<String, ConfigError> {
    match env::var(env_var) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::for_var(env_var, "must be set")),
    }
}

/// Parse a numeric environment variable, enforcing `min..=max`.
fn parse_bounded<T>(env_var: &str, default: T, min: T, max: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Display + Copy,
{
    match env::var(env_var) {
        Ok(value) => {
            let parsed: T = value.trim().parse().map_err(|_| {
                ConfigError::for_var(env_var, format!("'{}' is not a valid number", value))
            })?;

            if parsed < min {
                return Err(ConfigError::for_var(
                    env_var,
                    format!("{} is below minimum ({})", parsed, min),
                ));
            }

            if parsed > max {
                return Err(ConfigError::for_var(
                    env_var,
                    format!("{} exceeds maximum ({})", parsed, max),
                ));
            }

            Ok(parsed)
        }
        Err(_) => Ok(default),
    }
}
