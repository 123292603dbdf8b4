//! Configuration types for translation-apply

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Remote task API connection settings
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskApiConfig {
    /// Base URL of the translation connector API (e.g., "https://connector.example.com/api/v3/")
    #[serde(default)]
    pub base_url: String,

    /// API key sent in the `api-key` header
    #[serde(default)]
    pub api_key: String,

    /// Connector (project) key every task call is scoped to
    #[serde(default)]
    pub connector_key: String,

    /// Page size used when listing submission tasks (default: 20)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_ms_serde")]
    pub request_timeout: Duration,
}

impl Default for TaskApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            connector_key: String::new(),
            page_size: default_page_size(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Retry configuration for transient remote failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first call (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt (default: 1000 ms)
    #[serde(default = "default_initial_delay", with = "duration_ms_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between attempts (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_ms_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

/// Workflow states assigned to content items as translations progress
///
/// Each entry is a workflow state id; `None` disables the transition.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatuses {
    /// State assigned to items once they are submitted for translation
    #[serde(default)]
    pub in_progress: Option<String>,

    /// State assigned once a translation has been applied
    #[serde(default)]
    pub translated: Option<String>,
}

/// Translation apply behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApplyConfig {
    /// Number of tasks applied concurrently by "apply all" (default: 3)
    #[serde(default = "default_max_parallel_tasks")]
    pub max_parallel_tasks: usize,

    /// Page size when listing localizations of a content item (default: 100)
    #[serde(default = "default_localization_page_size")]
    pub localization_page_size: u32,

    /// Minimum time between localization polls (default: 1000 ms)
    #[serde(default = "default_poll_interval", with = "duration_ms_serde")]
    pub poll_interval: Duration,

    /// Give up waiting for a requested localization after this long (None = wait forever)
    #[serde(default, with = "optional_duration_ms_serde")]
    pub poll_timeout: Option<Duration>,

    /// Workflow state transitions
    #[serde(default)]
    pub statuses: WorkflowStatuses,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            max_parallel_tasks: default_max_parallel_tasks(),
            localization_page_size: default_localization_page_size(),
            poll_interval: default_poll_interval(),
            poll_timeout: None,
            statuses: WorkflowStatuses::default(),
        }
    }
}

/// Main configuration
///
/// Fields are organized into sub-configs:
/// - [`api`](TaskApiConfig) - remote task API connection
/// - [`retry`](RetryConfig) - backoff for remote calls
/// - [`apply`](ApplyConfig) - concurrency, polling and workflow transitions
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote task API connection
    #[serde(default)]
    pub api: TaskApiConfig,

    /// Retry behavior for remote calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Translation apply behavior
    #[serde(default)]
    pub apply: ApplyConfig,
}

impl Config {
    /// Parse a configuration from JSON and validate it
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde defaults cannot express
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(config_error("must be at least 1", "retry.max_attempts"));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(config_error(
                "must be at least 1.0",
                "retry.backoff_multiplier",
            ));
        }
        if self.apply.max_parallel_tasks == 0 {
            return Err(config_error(
                "must be at least 1",
                "apply.max_parallel_tasks",
            ));
        }
        if self.apply.localization_page_size == 0 {
            return Err(config_error(
                "must be at least 1",
                "apply.localization_page_size",
            ));
        }
        if self.api.page_size == 0 {
            return Err(config_error("must be at least 1", "api.page_size"));
        }
        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: format!("{key} {message}"),
        key: Some(key.to_string()),
    }
}

fn default_page_size() -> u32 {
    20
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(1000)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_parallel_tasks() -> usize {
    3
}

fn default_localization_page_size() -> u32 {
    100
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(1000)
}

// Duration serialization helper (milliseconds)
mod duration_ms_serde {
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
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

// Optional Duration serialization helper (milliseconds)
mod optional_duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = Option::<u64>::deserialize(deserializer)?;
        Ok(ms.map(Duration::from_millis))
    }
}
