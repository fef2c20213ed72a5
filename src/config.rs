//! Configuration module for the resource sender.
//!
//! This module provides environment-based configuration: the ingestion API
//! URL and credential, queue and batch thresholds, flush timing, and the
//! reconnect and drain policy.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::buffer::{
    SenderConfig, DEFAULT_DRAIN_ATTEMPTS, DEFAULT_FLUSH_INTERVAL, DEFAULT_MAX_BATCH_SIZE,
    DEFAULT_MAX_RECONNECT_RETRIES, DEFAULT_MIN_BATCH_SIZE, DEFAULT_QUEUE_CAPACITY,
};
use crate::connection::ReconnectPolicy;

/// Default API URL for the ingestion service
const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Default HTTP request timeout in seconds
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum allowed batch size to prevent memory issues
const MAX_BATCH_SIZE: usize = 10_000;

/// Maximum queue capacity
const MAX_QUEUE_CAPACITY: usize = 100_000;

/// Minimum flush interval to prevent overwhelming the API
const MIN_FLUSH_INTERVAL_SECS: u64 = 1;

/// Maximum flush interval to bound end-to-end latency
const MAX_FLUSH_INTERVAL_SECS: u64 = 300;

/// Configuration for the resource sender.
///
/// All settings can be configured via environment variables:
/// - `RESOURCE_SENDER_API_URL`: Ingestion API URL (default: http://localhost:8000)
/// - `RESOURCE_SENDER_TOKEN`: Bearer token attached to every call (default: none)
/// - `RESOURCE_SENDER_QUEUE_CAPACITY`: Queue capacity (default: 1000)
/// - `RESOURCE_SENDER_MAX_BATCH_SIZE`: Batch size forcing a flush (default: 100)
/// - `RESOURCE_SENDER_MIN_BATCH_SIZE`: Minimum batch for a timer flush (default: 10)
/// - `RESOURCE_SENDER_FLUSH_INTERVAL_SECS`: Flush timer period (default: 5)
/// - `RESOURCE_SENDER_REQUEST_TIMEOUT_SECS`: HTTP request timeout (default: 30)
/// - `RESOURCE_SENDER_MAX_RETRIES`: Reconnect retries (default: 3)
/// - `RESOURCE_SENDER_DRAIN_ATTEMPTS`: Final flush attempts on finish (default: 3)
/// - `RESOURCE_SENDER_RECONNECT_ON_ANY_FAILURE`: Reconnect after every failure (default: false)
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL for the ingestion API
    pub api_url: String,

    /// Bearer token, if the endpoint requires one
    pub token: Option<String>,

    pub queue_capacity: usize,
    pub max_batch_size: usize,
    pub min_batch_size: usize,

    /// Period of the flush timer
    pub flush_interval: Duration,

    /// HTTP request timeout duration
    pub request_timeout: Duration,

    /// Maximum number of reconnect retries
    pub max_retries: u32,

    /// Final flush attempts during shutdown
    pub drain_attempts: u32,

    pub reconnect_policy: ReconnectPolicy,
}

/// Error type for configuration loading failures
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub env_var: Option<String>,
}

impl ConfigError {
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
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a numeric variable does not parse or is out
    /// of range, or if the minimum batch size exceeds the maximum.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use resource_sender::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("API URL: {}", config.api_url);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = env::var("RESOURCE_SENDER_API_URL")
            .unwrap_or_else(|_| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let token = env::var("RESOURCE_SENDER_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());

        let queue_capacity = parse_bounded(
            "RESOURCE_SENDER_QUEUE_CAPACITY",
            DEFAULT_QUEUE_CAPACITY,
            1,
            MAX_QUEUE_CAPACITY,
        )?;
        let max_batch_size = parse_bounded(
            "RESOURCE_SENDER_MAX_BATCH_SIZE",
            DEFAULT_MAX_BATCH_SIZE,
            1,
            MAX_BATCH_SIZE,
        )?;
        let min_batch_size = parse_bounded(
            "RESOURCE_SENDER_MIN_BATCH_SIZE",
            DEFAULT_MIN_BATCH_SIZE,
            1,
            MAX_BATCH_SIZE,
        )?;
        if min_batch_size > max_batch_size {
            return Err(ConfigError::for_var(
                "RESOURCE_SENDER_MIN_BATCH_SIZE",
                format!(
                    "minimum batch size {} exceeds maximum batch size {}",
                    min_batch_size, max_batch_size
                ),
            ));
        }

        let flush_interval_secs = parse_bounded(
            "RESOURCE_SENDER_FLUSH_INTERVAL_SECS",
            DEFAULT_FLUSH_INTERVAL.as_secs(),
            MIN_FLUSH_INTERVAL_SECS,
            MAX_FLUSH_INTERVAL_SECS,
        )?;

        let request_timeout_secs: u64 = env::var("RESOURCE_SENDER_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);

        let max_retries: u32 = env::var("RESOURCE_SENDER_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_RECONNECT_RETRIES);

        let drain_attempts = parse_bounded(
            "RESOURCE_SENDER_DRAIN_ATTEMPTS",
            DEFAULT_DRAIN_ATTEMPTS,
            1,
            100,
        )?;

        let reconnect_policy = match parse_flag("RESOURCE_SENDER_RECONNECT_ON_ANY_FAILURE")? {
            true => ReconnectPolicy::OnAnyFailure,
            false => ReconnectPolicy::OnClosed,
        };

        Ok(Self {
            api_url,
            token,
            queue_capacity,
            max_batch_size,
            min_batch_size,
            flush_interval: Duration::from_secs(flush_interval_secs),
            request_timeout: Duration::from_secs(request_timeout_secs),
            max_retries,
            drain_attempts,
            reconnect_policy,
        })
    }

    /// Queue, batching, and reconnect settings for the sender.
    pub fn sender_config(&self) -> SenderConfig {
        SenderConfig {
            queue_capacity: self.queue_capacity,
            max_batch_size: self.max_batch_size,
            min_batch_size: self.min_batch_size,
            flush_interval: self.flush_interval,
            drain_attempts: self.drain_attempts,
            max_reconnect_retries: self.max_retries,
            reconnect_policy: self.reconnect_policy,
        }
    }
}

impl Default for Config {
    /// Create a default configuration using default values.
    ///
    /// This is useful for testing or when environment variables are not set.
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            min_batch_size: DEFAULT_MIN_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RECONNECT_RETRIES,
            drain_attempts: DEFAULT_DRAIN_ATTEMPTS,
            reconnect_policy: ReconnectPolicy::OnClosed,
        }
    }
}

/// Parse a numeric variable, falling back to `default` when unset.
fn parse_bounded<T>(env_var: &str, default: T, min: T, max: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + std::fmt::Display + Copy,
{
    let value = match env::var(env_var) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };

    let parsed: T = value
        .trim()
        .parse()
        .map_err(|_| ConfigError::for_var(env_var, format!("'{}' is not a valid number", value)))?;

    if parsed < min {
        return Err(ConfigError::for_var(
            env_var,
            format!("value {} is below minimum ({})", parsed, min),
        ));
    }

    if parsed > max {
        return Err(ConfigError::for_var(
            env_var,
            format!("value {} exceeds maximum ({})", parsed, max),
        ));
    }

    Ok(parsed)
}

fn parse_flag(env_var: &str) -> Result<bool, ConfigError> {
    match env::var(env_var) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            other => Err(ConfigError::for_var(
                env_var,
                format!("'{}' is not a valid boolean", other),
            )),
        },
        Err(_) => Ok(false),
    }
}
