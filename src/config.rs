//! Configuration types for wavy-history

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Remote API settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the legacy wavy.fm API (default: "https://wavy.fm/api/internal/legacy")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Items requested per page (default: 100)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Timeout for a single outbound request (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Most pages one retrieval may fan out to (default: 10000)
    ///
    /// A reported total needing more pages fails the retrieval instead of
    /// spawning a fetch per page.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            page_size: default_page_size(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
            max_pages: default_max_pages(),
        }
    }
}

/// Admission control for outbound requests
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GateConfig {
    /// Maximum outstanding requests across the whole process (default: 200)
    #[serde(default = "default_max_outstanding")]
    pub max_outstanding_requests: usize,

    /// Give up waiting for a permit after this long (default: wait indefinitely)
    #[serde(default, with = "optional_duration_serde")]
    pub acquire_timeout: Option<Duration>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_outstanding_requests: default_max_outstanding(),
            acquire_timeout: None,
        }
    }
}

/// Retry configuration for transient page failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts per page (default: 3, 0 disables retries)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 500 ms)
    #[serde(default = "default_initial_delay", with = "millis_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 10 seconds)
    #[serde(default = "default_max_delay", with = "millis_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Retry configuration that never retries
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }
}

/// Main configuration for [`Retriever`](crate::Retriever)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Remote API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Request admission control
    #[serde(default)]
    pub gate: GateConfig,

    /// Per-page retry behaviour
    #[serde(default)]
    pub retry: RetryConfig,

    /// Capacity of the event broadcast channel (default: 1000)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            gate: GateConfig::default(),
            retry: RetryConfig::default(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl Config {
    /// Check the configuration for values the retrieval engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.api.page_size == 0 {
            return Err(config_error("page size must be at least 1", "api.page_size"));
        }
        if self.api.max_pages == 0 {
            return Err(config_error("page limit must be at least 1", "api.max_pages"));
        }
        if self.gate.max_outstanding_requests == 0 {
            return Err(config_error(
                "at least one outstanding request must be allowed",
                "gate.max_outstanding_requests",
            ));
        }
        if self.event_buffer == 0 {
            return Err(config_error(
                "event buffer must hold at least one event",
                "event_buffer",
            ));
        }
        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return Err(config_error(
                "backoff multiplier must be a finite number >= 1.0",
                "retry.backoff_multiplier",
            ));
        }

        let base = url::Url::parse(&self.api.base_url).map_err(|e| Error::Config {
            message: format!("base URL '{}' is not valid: {}", self.api.base_url, e),
            key: Some("api.base_url".to_string()),
        })?;
        if base.cannot_be_a_base() {
            return Err(config_error(
                "base URL cannot carry path segments",
                "api.base_url",
            ));
        }
        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

fn default_base_url() -> String {
    "https://wavy.fm/api/internal/legacy".to_string()
}

fn default_page_size() -> u32 {
    100
}

fn default_max_pages() -> u32 {
    10_000
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    concat!("wavy-history/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_max_outstanding() -> usize {
    200
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_event_buffer() -> usize {
    1000
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Retry delays are sub-second, so they travel as milliseconds.
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
