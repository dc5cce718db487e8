//! Engine configuration loading and management.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::CoreError;

/// Full configuration for the routing and payment engine.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Pathfinding and route building settings.
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Payment executor settings.
    #[serde(default)]
    pub payment: PaymentConfig,

    /// Prober settings.
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Maximum number of alternative paths the k-path finder returns.
    #[serde(default = "default_path_limit")]
    pub path_limit: usize,
    /// CLTV buffer the sender adds for the final hop.
    #[serde(default = "default_initial_cltv")]
    pub initial_cltv: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    /// Buffer size of payment event streams.
    #[serde(default = "default_event_capacity")]
    pub event_channel_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Overall probe deadline (seconds).
    #[serde(default = "default_probe_timeout_secs")]
    pub timeout_secs: u64,
    /// Deadline for a single path attempt (seconds).
    #[serde(default = "default_path_timeout_secs")]
    pub path_timeout_secs: u64,
    /// Buffer size of probe event streams.
    #[serde(default = "default_event_capacity")]
    pub event_channel_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_path_limit() -> usize {
    20
}
fn default_initial_cltv() -> u32 {
    40
}
fn default_event_capacity() -> usize {
    64
}
fn default_probe_timeout_secs() -> u64 {
    24 * 60 * 60
}
fn default_path_timeout_secs() -> u64 {
    60
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            path_limit: default_path_limit(),
            initial_cltv: default_initial_cltv(),
        }
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_capacity(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_probe_timeout_secs(),
            path_timeout_secs: default_path_timeout_secs(),
            event_channel_capacity: default_event_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn path_timeout(&self) -> Duration {
        Duration::from_secs(self.path_timeout_secs)
    }
}

impl EngineConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: EngineConfig = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save the current config to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }
}
