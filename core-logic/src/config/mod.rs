//! Campaign configuration loaded from TOML.

use crate::error::ConfigError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Backoff applied after a failed attempt, chosen by error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffTable {
    pub rate_limited_ms: u64,
    pub aborted_ms: u64,
    pub server_error_ms: u64,
    pub network_error_ms: u64,
    pub unknown_ms: u64,
}

impl Default for BackoffTable {
    fn default() -> Self {
        Self {
            rate_limited_ms: 300,
            aborted_ms: 10,
            server_error_ms: 500,
            network_error_ms: 150,
            unknown_ms: 200,
        }
    }
}

/// Attempt ceilings for each kind of remote call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub baseline_attempts: u32,
    pub acquire_attempts: u32,
    pub finalize_attempts: u32,
    pub health_check_attempts: u32,
    /// `None` falls back to a flat base delay for every classification.
    pub backoff: Option<BackoffTable>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            baseline_attempts: 3,
            acquire_attempts: 2,
            finalize_attempts: 2,
            health_check_attempts: 1,
            backoff: Some(BackoffTable::default()),
        }
    }
}

/// Configuration for one campaign. Immutable once the campaign is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignConfig {
    /// Number of work items to process
    pub target: u64,
    /// Work items dispatched per gate
    pub batch_size: usize,
    /// Ceiling on in-flight remote calls
    pub max_concurrent: usize,
    /// Batches per second
    pub target_rate: f64,
    pub retry: RetryPolicy,
    /// Processed items between best-effort baseline re-fetches
    pub health_check_interval: u64,
    /// Per-index start delay inside a batch
    pub stagger_ms: u64,
    /// Extra random start delay in `0..=stagger_jitter_ms`
    pub stagger_jitter_ms: u64,
    /// Fixed pause after each batch, on top of the governor
    pub inter_batch_delay_ms: u64,
    /// Timeout applied to every outbound call
    pub call_timeout_ms: u64,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            target: 0,
            batch_size: 2,
            max_concurrent: 2,
            target_rate: 2.0,
            retry: RetryPolicy::default(),
            health_check_interval: 100,
            stagger_ms: 50,
            stagger_jitter_ms: 0,
            inter_batch_delay_ms: 30,
            call_timeout_ms: 8_000,
        }
    }
}

impl CampaignConfig {
    /// Load configuration from a TOML file
    ///
    /// # Example
    /// ```ignore
    /// let config = CampaignConfig::from_path("config/campaign.toml")?;
    /// ```
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            }
            .into());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            msg: e.to_string(),
        })?;
        let config = Self::from_toml_str(&content)
            .context(format!("Failed to parse config TOML {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            ConfigError::ParseError {
                path: "<inline>".to_string(),
                msg: e.to_string(),
            }
            .into()
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be at least 1"));
        }
        if self.max_concurrent == 0 {
            return Err(invalid("max_concurrent", "must be at least 1"));
        }
        if !self.target_rate.is_finite() || self.target_rate < 0.0 {
            return Err(invalid(
                "target_rate",
                "must be a finite, non-negative number of batches per second",
            ));
        }
        let attempts = [
            ("retry.baseline_attempts", self.retry.baseline_attempts),
            ("retry.acquire_attempts", self.retry.acquire_attempts),
            ("retry.finalize_attempts", self.retry.finalize_attempts),
            ("retry.health_check_attempts", self.retry.health_check_attempts),
        ];
        for (field, value) in attempts {
            if value == 0 {
                return Err(invalid(field, "must allow at least one attempt"));
            }
        }
        if self.call_timeout_ms == 0 {
            return Err(invalid("call_timeout_ms", "must be greater than zero"));
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }

    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
