//! Configuration loading.
//!
//! Settings come from an optional TOML file overridden by `TGDECK_`-prefixed
//! environment variables, e.g. `TGDECK_SERVER__PORT=9000`.

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::tasks::RunDriverConfig;
use crate::worker::{ChannelConfig, SupervisorConfig};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8090,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: "tgdeck.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub command: String,
    pub args: Vec<String>,
    pub ready_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub max_restarts: u32,
    pub command_timeout_secs: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        let defaults = SupervisorConfig::default();
        Self {
            command: defaults.command,
            args: defaults.args,
            ready_timeout_secs: defaults.ready_timeout.as_secs(),
            shutdown_grace_secs: defaults.shutdown_grace.as_secs(),
            backoff_initial_ms: defaults.backoff_initial.as_millis() as u64,
            backoff_max_ms: defaults.backoff_max.as_millis() as u64,
            max_restarts: defaults.max_restarts,
            command_timeout_secs: defaults.channel.command_timeout.as_secs(),
        }
    }
}

impl WorkerSettings {
    /// Translate into the supervisor's config.
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            command: self.command.clone(),
            args: self.args.clone(),
            ready_timeout: Duration::from_secs(self.ready_timeout_secs),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
            backoff_initial: Duration::from_millis(self.backoff_initial_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms),
            max_restarts: self.max_restarts,
            channel: ChannelConfig {
                command_timeout: Duration::from_secs(self.command_timeout_secs),
                ..ChannelConfig::default()
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RealtimeSettings {
    pub heartbeat_secs: u64,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self { heartbeat_secs: 30 }
    }
}

impl RealtimeSettings {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    pub step_delay_ms: u64,
    pub finish_delay_ms: u64,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        let defaults = RunDriverConfig::default();
        Self {
            step_delay_ms: defaults.step_delay.as_millis() as u64,
            finish_delay_ms: defaults.finish_delay.as_millis() as u64,
        }
    }
}

impl RunnerSettings {
    pub fn driver_config(&self) -> RunDriverConfig {
        RunDriverConfig {
            step_delay: Duration::from_millis(self.step_delay_ms),
            finish_delay: Duration::from_millis(self.finish_delay_ms),
        }
    }
}

/// Top-level application settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub worker: WorkerSettings,
    pub realtime: RealtimeSettings,
    pub runner: RunnerSettings,
}

impl Settings {
    /// Load settings from an optional config file plus the environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(
                File::from(path).format(FileFormat::Toml).required(true),
            );
        } else {
            builder = builder.add_source(
                File::with_name("tgdeck").format(FileFormat::Toml).required(false),
            );
        }
        builder = builder.add_source(
            Environment::with_prefix("TGDECK")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .context("reading configuration")?
            .try_deserialize::<Settings>()
            .context("deserializing configuration")?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8090);
        assert_eq!(settings.worker.max_restarts, 5);
        assert_eq!(settings.realtime.heartbeat_secs, 30);
        assert_eq!(settings.runner.driver_config().step_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            "[server]\nport = 9001\n\n[worker]\ncommand = \"python3\"\nargs = [\"worker.py\"]\nmax_restarts = 2"
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.server.port, 9001);
        assert_eq!(settings.worker.command, "python3");
        assert_eq!(settings.worker.args, vec!["worker.py".to_string()]);
        assert_eq!(settings.worker.max_restarts, 2);
        // Untouched sections keep their defaults.
        assert_eq!(settings.database.path, "tgdeck.db");
    }
}
