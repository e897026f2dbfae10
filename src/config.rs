//! Configuration types and loading.
//!
//! Provides all configuration structures for agentmesh:
//! - `CoordConfig`: Top-level configuration with validation
//! - `FabricConfig`, `ConflictConfig`, `AllocatorConfig`: per-subsystem settings

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{CoordError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordConfig {
    pub fabric: FabricConfig,
    pub conflict: ConflictConfig,
    pub allocator: AllocatorConfig,
}

impl CoordConfig {
    pub async fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join("agentmesh.toml");
        let config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).await?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, dir: &Path) -> Result<()> {
        self.validate()?;
        let config_path = dir.join("agentmesh.toml");
        let content =
            toml::to_string_pretty(self).map_err(|e| CoordError::Config(e.to_string()))?;
        fs::write(&config_path, content).await?;
        Ok(())
    }

    /// Validate configuration values for consistency and safety.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.fabric.heartbeat_interval_secs == 0 {
            errors.push("fabric.heartbeat_interval_secs must be greater than 0");
        }
        if self.fabric.default_ttl_secs == 0 {
            errors.push("fabric.default_ttl_secs must be greater than 0");
        }
        if self.fabric.event_capacity == 0 {
            errors.push("fabric.event_capacity must be greater than 0");
        }

        if self.conflict.max_resolution_attempts == 0 {
            errors.push("conflict.max_resolution_attempts must be greater than 0");
        }
        if self.conflict.history_limit < self.conflict.history_retain {
            errors.push("conflict.history_limit must be at least conflict.history_retain");
        }

        if self.allocator.monitor_interval_secs == 0 {
            errors.push("allocator.monitor_interval_secs must be greater than 0");
        }
        if !(0.0..=1.0).contains(&self.allocator.forecast_log_confidence) {
            errors.push("allocator.forecast_log_confidence must be between 0.0 and 1.0");
        }
        if !(0.0..=1.0).contains(&self.allocator.forecast_execute_confidence) {
            errors.push("allocator.forecast_execute_confidence must be between 0.0 and 1.0");
        }
        if self.allocator.forecast_log_confidence > self.allocator.forecast_execute_confidence {
            errors.push(
                "allocator.forecast_log_confidence must not exceed forecast_execute_confidence",
            );
        }
        if self.allocator.high_utilization_threshold <= self.allocator.moderate_utilization_threshold
        {
            errors.push(
                "allocator.high_utilization_threshold must exceed moderate_utilization_threshold",
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CoordError::Config(errors.join("; ")))
        }
    }
}

/// Message fabric settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FabricConfig {
    /// Interval between liveness sweeps in seconds.
    pub heartbeat_interval_secs: u64,
    /// Default message time-to-live in seconds.
    pub default_ttl_secs: u64,
    /// Capacity of the coordination event broadcast channel.
    pub event_capacity: usize,
    /// Maximum retained entries in the global message history.
    pub history_limit: usize,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 30,
            default_ttl_secs: 300,
            event_capacity: 256,
            history_limit: 1000,
        }
    }
}

/// Conflict engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictConfig {
    /// Maximum resolution attempts before forced escalation.
    pub max_resolution_attempts: u32,
    /// Delay before the deferred auto-resolution attempt in milliseconds.
    pub auto_resolve_delay_ms: u64,
    /// Interval of the auto-resolution scan loop in milliseconds.
    pub auto_resolve_interval_ms: u64,
    /// Resolved conflicts older than this are pruned, in seconds.
    pub prune_resolved_after_secs: u64,
    /// History truncation kicks in past this many entries.
    pub history_limit: usize,
    /// Entries retained after truncation.
    pub history_retain: usize,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            max_resolution_attempts: 3,
            auto_resolve_delay_ms: 500,
            auto_resolve_interval_ms: 1000,
            prune_resolved_after_secs: 3600,
            history_limit: 1000,
            history_retain: 500,
        }
    }
}

/// Resource allocator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Interval of the monitoring/scaling cycle in seconds.
    pub monitor_interval_secs: u64,
    /// Forecast recommendations at or above this confidence are logged.
    pub forecast_log_confidence: f64,
    /// Forecast recommendations at or above this confidence are auto-executed.
    pub forecast_execute_confidence: f64,
    /// Minimum seconds between forecast-driven scalings of the same pool.
    pub forecast_cooldown_secs: u64,
    /// Average utilization above this selects the most sophisticated
    /// load-balancing strategy.
    pub high_utilization_threshold: f64,
    /// Average utilization above this (but below high) selects the
    /// resource-aware strategy.
    pub moderate_utilization_threshold: f64,
    /// Retained metric samples per pool for sustained-trigger evaluation.
    pub metric_history_limit: usize,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            monitor_interval_secs: 10,
            forecast_log_confidence: 0.5,
            forecast_execute_confidence: 0.85,
            forecast_cooldown_secs: 300,
            high_utilization_threshold: 0.8,
            moderate_utilization_threshold: 0.5,
            metric_history_limit: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CoordConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fabric.heartbeat_interval_secs, 30);
        assert_eq!(config.fabric.default_ttl_secs, 300);
        assert_eq!(config.conflict.max_resolution_attempts, 3);
        assert_eq!(config.allocator.monitor_interval_secs, 10);
    }

    #[test]
    fn test_validation_collects_errors() {
        let mut config = CoordConfig::default();
        config.fabric.heartbeat_interval_secs = 0;
        config.conflict.max_resolution_attempts = 0;

        let err = config.validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("heartbeat_interval_secs"));
        assert!(msg.contains("max_resolution_attempts"));
    }

    #[test]
    fn test_confidence_thresholds_ordering() {
        let mut config = CoordConfig::default();
        config.allocator.forecast_log_confidence = 0.9;
        config.allocator.forecast_execute_confidence = 0.5;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = CoordConfig::load(dir.path()).await.unwrap();
        assert_eq!(config.fabric.default_ttl_secs, 300);
    }

    #[tokio::test]
    async fn test_save_and_reload_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = CoordConfig::default();
        config.fabric.heartbeat_interval_secs = 5;
        config.save(dir.path()).await.unwrap();

        let loaded = CoordConfig::load(dir.path()).await.unwrap();
        assert_eq!(loaded.fabric.heartbeat_interval_secs, 5);
    }
}
