//! Settings file management

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::deploy::docker::RuntimeTimeouts;
use crate::deploy::health::HealthSettings;
use crate::deploy::ports::PortRange;
use crate::errors::RunnerError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Default location of the settings file
pub const DEFAULT_SETTINGS_PATH: &str = "/runtime/settings.json";

/// Runner settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub json_logs: bool,

    /// Also write runner logs under `<runtime_dir>/logs`
    #[serde(default)]
    pub log_to_file: bool,

    /// First leasable host port (inclusive)
    #[serde(default = "default_port_range_start")]
    pub port_range_start: u16,

    /// Last leasable host port (inclusive)
    #[serde(default = "default_port_range_end")]
    pub port_range_end: u16,

    /// Holds `repos/` and `logs/`
    #[serde(default = "default_runtime_dir")]
    pub runtime_dir: PathBuf,

    /// Fixed container tool; auto-detected when absent
    #[serde(default)]
    pub container_tool: Option<String>,

    /// Image namespace, the `<namespace>` in `<namespace>/<app>:<id>`
    #[serde(default = "default_image_namespace")]
    pub image_namespace: String,

    /// PostgreSQL URL; the in-memory store is used when absent
    #[serde(default)]
    pub database_url: Option<String>,

    /// Wait when the queue is empty
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Pause after each processed deployment
    #[serde(default = "default_iteration_pause_ms")]
    pub iteration_pause_ms: u64,

    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    #[serde(default = "default_build_timeout_secs")]
    pub build_timeout_secs: u64,

    /// Overall health probe bound
    #[serde(default = "default_health_timeout_secs")]
    pub health_timeout_secs: u64,

    #[serde(default = "default_health_interval_ms")]
    pub health_interval_ms: u64,

    #[serde(default = "default_health_attempt_timeout_ms")]
    pub health_attempt_timeout_ms: u64,
}

fn default_port_range_start() -> u16 {
    9000
}

fn default_port_range_end() -> u16 {
    9999
}

fn default_runtime_dir() -> PathBuf {
    PathBuf::from("/runtime")
}

fn default_image_namespace() -> String {
    "keystone".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_iteration_pause_ms() -> u64 {
    1000
}

fn default_command_timeout_secs() -> u64 {
    300
}

fn default_build_timeout_secs() -> u64 {
    600
}

fn default_health_timeout_secs() -> u64 {
    60
}

fn default_health_interval_ms() -> u64 {
    2000
}

fn default_health_attempt_timeout_ms() -> u64 {
    2000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            json_logs: false,
            log_to_file: false,
            port_range_start: default_port_range_start(),
            port_range_end: default_port_range_end(),
            runtime_dir: default_runtime_dir(),
            container_tool: None,
            image_namespace: default_image_namespace(),
            database_url: None,
            poll_interval_ms: default_poll_interval_ms(),
            iteration_pause_ms: default_iteration_pause_ms(),
            command_timeout_secs: default_command_timeout_secs(),
            build_timeout_secs: default_build_timeout_secs(),
            health_timeout_secs: default_health_timeout_secs(),
            health_interval_ms: default_health_interval_ms(),
            health_attempt_timeout_ms: default_health_attempt_timeout_ms(),
        }
    }
}

impl Settings {
    /// Read settings from `file`, falling back to defaults when it is missing,
    /// then apply environment overrides
    pub async fn load(file: &File) -> Result<Self, RunnerError> {
        let mut settings = if file.exists().await {
            file.read_json::<Settings>().await?
        } else {
            Settings::default()
        };
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply `PORT_RANGE_START`, `PORT_RANGE_END`, `DATABASE_URL`,
    /// `KEYSTONE_RUNTIME_DIR` and `KEYSTONE_CONTAINER_TOOL`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), RunnerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(start) = lookup("PORT_RANGE_START") {
            self.port_range_start = parse_port("PORT_RANGE_START", &start)?;
        }
        if let Some(end) = lookup("PORT_RANGE_END") {
            self.port_range_end = parse_port("PORT_RANGE_END", &end)?;
        }
        if let Some(url) = lookup("DATABASE_URL").filter(|v| !v.is_empty()) {
            self.database_url = Some(url);
        }
        if let Some(dir) = lookup("KEYSTONE_RUNTIME_DIR").filter(|v| !v.is_empty()) {
            self.runtime_dir = PathBuf::from(dir);
        }
        if let Some(tool) = lookup("KEYSTONE_CONTAINER_TOOL").filter(|v| !v.is_empty()) {
            self.container_tool = Some(tool);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), RunnerError> {
        self.port_range()?;
        if self.poll_interval_ms == 0 {
            return Err(RunnerError::ConfigError(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.image_namespace.trim().is_empty() {
            return Err(RunnerError::ConfigError(
                "image_namespace must not be empty".to_string(),
            ));
        }
        if self.health_attempt_timeout_ms > self.health_timeout_secs.saturating_mul(1000) {
            return Err(RunnerError::ConfigError(format!(
                "health_attempt_timeout_ms ({}) exceeds health_timeout_secs ({})",
                self.health_attempt_timeout_ms, self.health_timeout_secs
            )));
        }
        Ok(())
    }

    pub fn port_range(&self) -> Result<PortRange, RunnerError> {
        PortRange::new(self.port_range_start, self.port_range_end)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn iteration_pause(&self) -> Duration {
        Duration::from_millis(self.iteration_pause_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn runtime_timeouts(&self) -> RuntimeTimeouts {
        RuntimeTimeouts {
            build: Duration::from_secs(self.build_timeout_secs),
            command: self.command_timeout(),
        }
    }

    /// Longest a single deployment can run when every stage uses its full
    /// timeout: fetch plus remote rewrite, build, container removal and
    /// start, then the health deadline.
    pub fn max_pipeline_duration(&self) -> Duration {
        let timeouts = self.runtime_timeouts();
        timeouts.command * 4 + timeouts.build + self.health().deadline
    }

    pub fn health(&self) -> HealthSettings {
        HealthSettings {
            deadline: Duration::from_secs(self.health_timeout_secs),
            interval: Duration::from_millis(self.health_interval_ms),
            attempt_timeout: Duration::from_millis(self.health_attempt_timeout_ms),
        }
    }
}

fn parse_port(key: &str, value: &str) -> Result<u16, RunnerError> {
    value
        .trim()
        .parse()
        .map_err(|_| RunnerError::ConfigError(format!("{} is not a valid port: {}", key, value)))
}
