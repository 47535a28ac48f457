//! Daemon configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration loaded by `chronosd`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChronosConfig {
    #[serde(default)]
    pub daemon: DaemonConfig,
}

impl Default for ChronosConfig {
    fn default() -> Self {
        Self {
            daemon: DaemonConfig::default(),
        }
    }
}

/// Daemon-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Socket path for IPC with `chronosctl`.
    #[serde(default = "default_socket_path")]
    pub socket_path: String,

    /// Base directory for per-fraction lock files.
    #[serde(default = "default_lock_dir")]
    pub lock_dir: String,

    /// Monitor sweep period in seconds. The spec nominal value is 1.
    #[serde(default = "default_monitor_period_secs")]
    pub monitor_period_secs: u64,

    /// Log level passed to the tracing env filter.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            lock_dir: default_lock_dir(),
            monitor_period_secs: default_monitor_period_secs(),
            log_level: default_log_level(),
        }
    }
}

fn default_socket_path() -> String {
    "/run/chronos/chronosd.sock".to_string()
}

fn default_lock_dir() -> String {
    std::env::temp_dir()
        .join("chronos_locks")
        .to_string_lossy()
        .into_owned()
}

fn default_monitor_period_secs() -> u64 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ChronosConfig {
    /// Loads from `path`, falling back to defaults if the file is absent.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
