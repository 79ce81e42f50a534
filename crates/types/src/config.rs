//! Staging engine configuration.
//!
//! Values are validated at construction time via the fallible builder.
//! Post-deserialization validation is available via [`StagingConfig::validate`].

// The schemars `JsonSchema` derive expands to code using `.unwrap()`.
#![allow(clippy::disallowed_methods)]

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::Snafu;

use crate::id::{DEFAULT_FINAL_PREFIX, TEMPORARY_ID_PREFIX};

/// Largest accepted queue capacity of the batch pipeline.
const MAX_QUEUE_CAPACITY: usize = 64;

/// Configuration validation error.
#[derive(Debug, Snafu)]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[snafu(display("invalid config: {message}"))]
    Validation {
        /// Description of the validation failure.
        message: String,
    },
}

/// Configuration of one staging engine instance.
///
/// # Validation Rules
///
/// - `batch_size` must be >= 1
/// - `batch_timeout` must be non-zero
/// - `queue_capacity` must be 1-64
/// - `temporary_id_prefix` must be non-empty and free of ASCII alphanumerics
/// - `final_id_prefix` must be an ASCII alphanumeric
///
/// # Example
///
/// ```
/// # use std::time::Duration;
/// # use taxostage_types::config::StagingConfig;
/// let config = StagingConfig::builder()
///     .batch_size(5_000)
///     .batch_timeout(Duration::from_secs(600))
///     .build()
///     .expect("valid staging config");
/// assert_eq!(config.queue_capacity, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StagingConfig {
    /// Number of nodes processed per pipeline transaction.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// How long the pipeline producer waits for queue space before failing.
    #[serde(default = "default_batch_timeout")]
    #[serde(with = "humantime_serde")]
    #[schemars(with = "String")]
    pub batch_timeout: Duration,
    /// Number of batches buffered between pipeline producer and consumer.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Flush every commit to disk before returning.
    ///
    /// Staging data does not outlive one import attempt, so this is off by default.
    #[serde(default)]
    pub durable_commits: bool,
    /// Sentinel prefix of temporary record ids.
    #[serde(default = "default_temporary_id_prefix")]
    pub temporary_id_prefix: String,
    /// Preferred character of the final id prefix.
    #[serde(default = "default_final_id_prefix")]
    pub final_id_prefix: char,
}

#[bon::bon]
impl StagingConfig {
    /// Creates a new staging configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value violates the rules
    /// listed on [`StagingConfig`].
    #[builder]
    pub fn new(
        #[builder(default = default_batch_size())] batch_size: usize,
        #[builder(default = default_batch_timeout())] batch_timeout: Duration,
        #[builder(default = default_queue_capacity())] queue_capacity: usize,
        #[builder(default)] durable_commits: bool,
        #[builder(default = default_temporary_id_prefix(), into)] temporary_id_prefix: String,
        #[builder(default = default_final_id_prefix())] final_id_prefix: char,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            batch_size,
            batch_timeout,
            queue_capacity,
            durable_commits,
            temporary_id_prefix,
            final_id_prefix,
        };
        config.validate()?;
        Ok(config)
    }
}

impl StagingConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Validation { message: "batch_size must be >= 1".to_string() });
        }
        if self.batch_timeout.is_zero() {
            return Err(ConfigError::Validation {
                message: "batch_timeout must be non-zero".to_string(),
            });
        }
        if self.queue_capacity == 0 || self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(ConfigError::Validation {
                message: format!(
                    "queue_capacity must be 1-{MAX_QUEUE_CAPACITY}, got {}",
                    self.queue_capacity
                ),
            });
        }
        if self.temporary_id_prefix.is_empty()
            || self.temporary_id_prefix.chars().any(|c| c.is_ascii_alphanumeric())
        {
            return Err(ConfigError::Validation {
                message: format!(
                    "temporary_id_prefix must be non-empty without ASCII alphanumerics, got {:?}",
                    self.temporary_id_prefix
                ),
            });
        }
        if !self.final_id_prefix.is_ascii_alphanumeric() {
            return Err(ConfigError::Validation {
                message: format!(
                    "final_id_prefix must be an ASCII alphanumeric, got {:?}",
                    self.final_id_prefix
                ),
            });
        }
        Ok(())
    }
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_timeout: default_batch_timeout(),
            queue_capacity: default_queue_capacity(),
            durable_commits: false,
            temporary_id_prefix: default_temporary_id_prefix(),
            final_id_prefix: default_final_id_prefix(),
        }
    }
}

fn default_batch_size() -> usize {
    10_000
}

fn default_batch_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_queue_capacity() -> usize {
    3
}

fn default_temporary_id_prefix() -> String {
    TEMPORARY_ID_PREFIX.to_string()
}

fn default_final_id_prefix() -> char {
    DEFAULT_FINAL_PREFIX
}

/// Duration serialization using humantime format.
mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = StagingConfig::builder().build().expect("defaults should be valid");
        assert_eq!(config, StagingConfig::default());
        assert_eq!(config.batch_size, 10_000);
        assert_eq!(config.batch_timeout, Duration::from_secs(1800));
        assert_eq!(config.queue_capacity, 3);
        assert_eq!(config.temporary_id_prefix, "~");
        assert_eq!(config.final_id_prefix, 'x');
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let err = StagingConfig::builder().batch_size(0).build().unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = StagingConfig::builder().batch_timeout(Duration::ZERO).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_queue_capacity_bounds() {
        assert!(StagingConfig::builder().queue_capacity(0).build().is_err());
        assert!(StagingConfig::builder().queue_capacity(65).build().is_err());
        assert!(StagingConfig::builder().queue_capacity(1).build().is_ok());
    }

    #[test]
    fn test_alphanumeric_temporary_prefix_rejected() {
        let err = StagingConfig::builder().temporary_id_prefix("tmp").build().unwrap_err();
        assert!(err.to_string().contains("temporary_id_prefix"));
        assert!(StagingConfig::builder().temporary_id_prefix("~~").build().is_ok());
    }

    #[test]
    fn test_final_prefix_must_be_alphanumeric() {
        assert!(StagingConfig::builder().final_id_prefix('-').build().is_err());
    }

    #[test]
    fn test_deserialize_humantime_and_defaults() {
        let config: StagingConfig =
            serde_json::from_str(r#"{"batch_size": 500, "batch_timeout": "2m"}"#).unwrap();
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.batch_timeout, Duration::from_secs(120));
        assert_eq!(config.queue_capacity, 3);
        config.validate().unwrap();
    }

    #[test]
    fn test_serialize_timeout_as_text() {
        let json = serde_json::to_string(&StagingConfig::default()).unwrap();
        assert!(json.contains(r#""batch_timeout":"30m""#), "{json}");
    }

    #[test]
    fn test_schema_names_fields() {
        let schema = schemars::schema_for!(StagingConfig);
        let json = serde_json::to_string(&schema).unwrap();
        assert!(json.contains("batch_timeout"));
        assert!(json.contains("queue_capacity"));
    }
}
