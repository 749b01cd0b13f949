//! Patch driver configuration
//!
//! Timeout budgets, bolus pacing, reconnect policy, and the location of the
//! persisted pairing record. All fields carry serde defaults so a partial
//! TOML file (or none at all) yields a working configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Configuration for a patch pump driver
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatchDriverConfig {
    /// Per-operation protocol timeout budgets
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Reconnect sequence policy
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    /// Bolus progress pacing
    #[serde(default)]
    pub bolus: BolusConfig,
    /// Where the pairing record survives restarts; `None` keeps it in memory
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

impl PatchDriverConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().display().to_string(), e.to_string()))?;
        toml::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

/// Protocol timeout budgets, in milliseconds.
///
/// Timeouts are always enforced by the runtime, never by the device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Settings, cancels, and status queries
    #[serde(default = "default_settings_ms")]
    pub settings_ms: u64,
    /// Basal program updates
    #[serde(default = "default_basal_program_ms")]
    pub basal_program_ms: u64,
    /// Immediate bolus start (device priming is slower)
    #[serde(default = "default_bolus_start_ms")]
    pub bolus_start_ms: u64,
    /// Best-effort finish-bolus confirmation
    #[serde(default = "default_finish_bolus_ms")]
    pub finish_bolus_ms: u64,
}

impl TimeoutConfig {
    pub fn settings(&self) -> Duration {
        Duration::from_millis(self.settings_ms)
    }

    pub fn basal_program(&self) -> Duration {
        Duration::from_millis(self.basal_program_ms)
    }

    pub fn bolus_start(&self) -> Duration {
        Duration::from_millis(self.bolus_start_ms)
    }

    pub fn finish_bolus(&self) -> Duration {
        Duration::from_millis(self.finish_bolus_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            settings_ms: default_settings_ms(),
            basal_program_ms: default_basal_program_ms(),
            bolus_start_ms: default_bolus_start_ms(),
            finish_bolus_ms: default_finish_bolus_ms(),
        }
    }
}

fn default_settings_ms() -> u64 {
    3000
}

fn default_basal_program_ms() -> u64 {
    10_000
}

fn default_bolus_start_ms() -> u64 {
    20_000
}

fn default_finish_bolus_ms() -> u64 {
    3000
}

/// Reconnect sequence policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Overall budget for one connect → discover → enable-notifications pass
    #[serde(default = "default_sequence_timeout_ms")]
    pub sequence_timeout_ms: u64,
    /// Characteristic to enable notifications on once services are discovered
    #[serde(default = "default_notify_characteristic")]
    pub notify_characteristic: Uuid,
}

impl ReconnectConfig {
    pub fn sequence_timeout(&self) -> Duration {
        Duration::from_millis(self.sequence_timeout_ms)
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            sequence_timeout_ms: default_sequence_timeout_ms(),
            notify_characteristic: default_notify_characteristic(),
        }
    }
}

fn default_sequence_timeout_ms() -> u64 {
    10_000
}

fn default_notify_characteristic() -> Uuid {
    // TX characteristic of the patch's serial service
    Uuid::from_u128(0x0000_fff1_0000_1000_8000_0080_5f9b_34fb)
}

/// Bolus progress pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BolusConfig {
    /// Step granularity, in units
    #[serde(default = "default_step_units")]
    pub step_units: f64,
}

impl Default for BolusConfig {
    fn default() -> Self {
        Self {
            step_units: default_step_units(),
        }
    }
}

fn default_step_units() -> f64 {
    0.05
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(String, String),

    #[error("Failed to parse config: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_toml_yields_defaults() {
        let config: PatchDriverConfig = toml::from_str("").unwrap();
        assert_eq!(config.timeouts.settings(), Duration::from_secs(3));
        assert_eq!(config.timeouts.basal_program(), Duration::from_secs(10));
        assert_eq!(config.timeouts.bolus_start(), Duration::from_secs(20));
        assert_eq!(config.reconnect.sequence_timeout(), Duration::from_secs(10));
        assert_eq!(config.bolus.step_units, 0.05);
        assert!(config.store_path.is_none());
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let config: PatchDriverConfig = toml::from_str(
            r#"
            [timeouts]
            bolus_start_ms = 15000
            "#,
        )
        .unwrap();
        assert_eq!(config.timeouts.bolus_start(), Duration::from_secs(15));
        assert_eq!(config.timeouts.settings(), Duration::from_secs(3));
    }
}
