//! Queue configuration

use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// Environment variable holding the queue name
pub const ENV_QUEUE_NAME: &str = "CADENCE_QUEUE_NAME";
/// Environment variable holding the concurrency limit
pub const ENV_CONCURRENCY_LIMIT: &str = "CADENCE_CONCURRENCY_LIMIT";
/// Environment variable selecting whether the queue starts paused
pub const ENV_START_PAUSED: &str = "CADENCE_START_PAUSED";

/// Task queue configuration
///
/// # Example
///
/// ```
/// use cadence_queue::QueueConfig;
///
/// let config = QueueConfig::new(2)
///     .with_name("renders")
///     .with_start_paused(true);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueConfig {
    /// Queue name, attached to every tracing event
    pub name: String,

    /// Maximum number of work items running at once
    pub concurrency_limit: usize,

    /// Construct the queue in the paused state
    #[serde(default)]
    pub start_paused: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            concurrency_limit: 4,
            start_paused: false,
        }
    }
}

impl QueueConfig {
    /// Create a configuration with the given concurrency limit
    pub fn new(concurrency_limit: usize) -> Self {
        Self {
            concurrency_limit,
            ..Default::default()
        }
    }

    /// Set the queue name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the concurrency limit
    ///
    /// Zero is accepted here and rejected by [`validate`](Self::validate).
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    /// Start the queue paused
    pub fn with_start_paused(mut self, paused: bool) -> Self {
        self.start_paused = paused;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.concurrency_limit == 0 {
            return Err(QueueError::InvalidConfig(
                "concurrency_limit must be at least 1".into(),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(QueueError::InvalidConfig("name must not be empty".into()));
        }
        Ok(())
    }

    /// Load configuration from environment variables
    ///
    /// - `CADENCE_QUEUE_NAME`: queue name (default: "default")
    /// - `CADENCE_CONCURRENCY_LIMIT`: concurrency limit (default: 4)
    /// - `CADENCE_START_PAUSED`: `true`/`false`/`1`/`0` (default: false)
    pub fn from_env() -> Result<Self, QueueError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, QueueError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup(ENV_QUEUE_NAME) {
            config.name = name;
        }

        if let Some(raw) = lookup(ENV_CONCURRENCY_LIMIT) {
            config.concurrency_limit = raw.trim().parse().map_err(|_| {
                QueueError::InvalidConfig(format!(
                    "{ENV_CONCURRENCY_LIMIT} must be a positive integer, got {raw:?}"
                ))
            })?;
        }

        if let Some(raw) = lookup(ENV_START_PAUSED) {
            config.start_paused = parse_bool(&raw).ok_or_else(|| {
                QueueError::InvalidConfig(format!(
                    "{ENV_START_PAUSED} must be a boolean, got {raw:?}"
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
