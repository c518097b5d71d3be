//! Configuration loading and types

use std::path::{Path, PathBuf};
use std::time::Duration;

use otaflow_core::OrchestratorConfig;
use otaflow_transport::{HttpTransportConfig, RestartMode};
use serde::{Deserialize, Serialize};

/// Top-level configuration for the otaflow daemon
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Daemon server settings
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Orchestrator and ticker settings
    #[serde(default)]
    pub ota: OtaConfig,
    /// HTTP download settings
    #[serde(default)]
    pub transport: HttpTransportConfig,
    /// Firmware slot location
    #[serde(default)]
    pub slot: SlotConfig,
    /// Restart behaviour after a successful update
    #[serde(default)]
    pub restart: RestartConfig,
}

/// Daemon server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Address and port to bind to
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtaConfig {
    #[serde(flatten)]
    pub orchestrator: OrchestratorConfig,
    /// How often the status ticker runs
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for OtaConfig {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorConfig::default(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl OtaConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

fn default_tick_interval_ms() -> u64 {
    200
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotConfig {
    /// Directory the pending image is written to
    #[serde(default = "default_slot_dir")]
    pub dir: PathBuf,
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            dir: default_slot_dir(),
        }
    }
}

fn default_slot_dir() -> PathBuf {
    PathBuf::from("/var/lib/otaflow/slot")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestartConfig {
    #[serde(default)]
    pub mode: RestartMode,
    /// Exit code used in `exit` mode
    #[serde(default)]
    pub exit_code: i32,
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from default paths or use defaults
    pub fn load_default() -> eyre::Result<Self> {
        if let Ok(path) = std::env::var("OTAFLOW_CONFIG") {
            return Self::load(Path::new(&path));
        }

        let mut paths = vec![
            PathBuf::from("otaflow.toml"),
            PathBuf::from("/etc/otaflow/otaflow.toml"),
        ];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("otaflow/otaflow.toml"));
        }

        for path in paths {
            if path.exists() {
                return Self::load(&path);
            }
        }

        tracing::warn!("no config file found, using defaults");
        Ok(Config::default())
    }
}
