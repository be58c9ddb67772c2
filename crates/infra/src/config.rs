//! Engine configuration.
//!
//! Loaded from TOML, then overridden from the environment:
//!
//! ```toml
//! edit_grant_ttl_minutes = 30
//! timeline_gap_millis = 2000
//! min_observation_chars = 10
//! min_discount_reason_chars = 5
//! ```
//!
//! Every key is optional; missing keys take the defaults above.

use std::path::Path;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use orderflow_audit::{DEFAULT_GROUP_GAP_MILLIS, TimelineOptions};
use orderflow_orders::{DEFAULT_EDIT_GRANT_TTL_MINUTES, MIN_DISCOUNT_REASON_CHARS, MIN_OBSERVATION_CHARS};

pub const ENV_EDIT_GRANT_TTL_MINUTES: &str = "ORDERFLOW_EDIT_GRANT_TTL_MINUTES";
pub const ENV_TIMELINE_GAP_MILLIS: &str = "ORDERFLOW_TIMELINE_GAP_MILLIS";

/// Longest edit grant an administrator can hand out (one week).
pub const MAX_EDIT_GRANT_TTL_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Parse(String),

    #[error("validation error: {0}")]
    Validation(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.message().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Lifetime of an approved edit grant.
    pub edit_grant_ttl_minutes: i64,
    /// Max gap between consecutive audit entries of one timeline event.
    pub timeline_gap_millis: i64,
    pub min_observation_chars: usize,
    pub min_discount_reason_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            edit_grant_ttl_minutes: DEFAULT_EDIT_GRANT_TTL_MINUTES,
            timeline_gap_millis: DEFAULT_GROUP_GAP_MILLIS,
            min_observation_chars: MIN_OBSERVATION_CHARS,
            min_discount_reason_chars: MIN_DISCOUNT_REASON_CHARS,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Apply `ORDERFLOW_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup. Unparseable values are
    /// ignored with a warning.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_EDIT_GRANT_TTL_MINUTES) {
            match raw.trim().parse() {
                Ok(v) => self.edit_grant_ttl_minutes = v,
                Err(_) => tracing::warn!(key = ENV_EDIT_GRANT_TTL_MINUTES, value = %raw, "ignoring invalid override"),
            }
        }
        if let Some(raw) = lookup(ENV_TIMELINE_GAP_MILLIS) {
            match raw.trim().parse() {
                Ok(v) => self.timeline_gap_millis = v,
                Err(_) => tracing::warn!(key = ENV_TIMELINE_GAP_MILLIS, value = %raw, "ignoring invalid override"),
            }
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.edit_grant_ttl_minutes <= 0 {
            return Err(ConfigError::Validation(
                "edit_grant_ttl_minutes must be positive".to_string(),
            ));
        }
        if self.edit_grant_ttl_minutes > MAX_EDIT_GRANT_TTL_MINUTES {
            return Err(ConfigError::Validation(format!(
                "edit_grant_ttl_minutes must not exceed {MAX_EDIT_GRANT_TTL_MINUTES}"
            )));
        }
        if self.timeline_gap_millis <= 0 {
            return Err(ConfigError::Validation(
                "timeline_gap_millis must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Grant lifetime, clamped to the validated range for configs built by hand.
    pub fn edit_grant_ttl(&self) -> Duration {
        Duration::try_minutes(self.edit_grant_ttl_minutes.clamp(1, MAX_EDIT_GRANT_TTL_MINUTES))
            .unwrap_or_else(|| Duration::minutes(DEFAULT_EDIT_GRANT_TTL_MINUTES))
    }

    pub fn timeline_options(&self) -> TimelineOptions {
        TimelineOptions::with_gap_millis(self.timeline_gap_millis)
    }
}
