//! Monitor settings loaded from file and environment

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{ProcessError, Result};
use crate::stop::DEFAULT_MAX_STOP_CYCLES;

/// Environment variable prefix, e.g. `PROCVISOR_STOP_ATTEMPTS`
pub const ENV_PREFIX: &str = "PROCVISOR";

/// Tracing output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Defaults applied by [`ProcessMonitor`](crate::ProcessMonitor)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Tries per escalation phase for `stop`
    pub stop_attempts: u32,
    /// Pause between tries, in milliseconds
    ///
    /// With 0 the exit check runs right after each signal, and a cycle can
    /// finish before the kernel has torn the process down.
    pub stop_wait_interval_ms: u64,
    /// Outer bound on five-phase stop cycles
    pub max_stop_cycles: u32,
    /// Prefix of generated tags
    pub tag_prefix: String,
    pub logging: LoggingSettings,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            stop_attempts: 3,
            stop_wait_interval_ms: 10,
            max_stop_cycles: DEFAULT_MAX_STOP_CYCLES,
            tag_prefix: "gen-tag-".to_string(),
            logging: LoggingSettings::default(),
        }
    }
}

impl MonitorSettings {
    pub fn stop_wait_interval(&self) -> Duration {
        Duration::from_millis(self.stop_wait_interval_ms)
    }

    /// Reject settings the monitor cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.stop_attempts == 0 {
            return Err(ProcessError::InvalidConfig(
                "stop_attempts must be greater than 0".to_string(),
            ));
        }
        if self.max_stop_cycles == 0 {
            return Err(ProcessError::InvalidConfig(
                "max_stop_cycles must be greater than 0".to_string(),
            ));
        }
        if self.tag_prefix.is_empty() {
            return Err(ProcessError::InvalidConfig(
                "tag_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Layers an optional TOML file under `PROCVISOR_*` environment variables
pub struct SettingsLoader {
    config_path: PathBuf,
    env_prefix: String,
}

impl SettingsLoader {
    pub fn new() -> Self {
        Self::with_path(Self::default_config_path())
    }

    /// Read the file at `path` instead of the per-user default
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// `<config dir>/procvisor/config.toml`
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("procvisor")
            .join("config.toml")
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load and validate; a missing file falls back to defaults
    pub fn load(&self) -> Result<MonitorSettings> {
        let config = Config::builder()
            .add_source(File::from(self.config_path.clone()).required(false))
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: MonitorSettings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_defaults() {
        let settings = MonitorSettings::default();
        assert_eq!(settings.stop_attempts, 3);
        assert_eq!(settings.stop_wait_interval(), Duration::from_millis(10));
        assert_eq!(settings.max_stop_cycles, 20);
        assert_eq!(settings.tag_prefix, "gen-tag-");
        assert_eq!(settings.logging.level, "info");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zeroes() {
        let mut settings = MonitorSettings {
            stop_attempts: 0,
            ..MonitorSettings::default()
        };
        assert!(settings.validate().is_err());

        settings.stop_attempts = 1;
        settings.max_stop_cycles = 0;
        assert!(settings.validate().is_err());

        settings.max_stop_cycles = 1;
        settings.tag_prefix.clear();
        assert!(matches!(settings.validate(), Err(ProcessError::InvalidConfig(_))));
    }

    #[test]
    #[serial]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loader = SettingsLoader::with_path(dir.path().join("absent.toml"));
        assert_eq!(loader.load().unwrap(), MonitorSettings::default());
    }

    #[test]
    #[serial]
    fn test_file_overrides_defaults() {
        let (_dir, path) = write_config(
            r#"
stop_attempts = 5
stop_wait_interval_ms = 250
tag_prefix = "job-"

[logging]
level = "debug"
"#,
        );

        let settings = SettingsLoader::with_path(path).load().unwrap();
        assert_eq!(settings.stop_attempts, 5);
        assert_eq!(settings.stop_wait_interval(), Duration::from_millis(250));
        assert_eq!(settings.max_stop_cycles, 20);
        assert_eq!(settings.tag_prefix, "job-");
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    #[serial]
    fn test_environment_wins_over_file() {
        let (_dir, path) = write_config("stop_attempts = 5\n");
        std::env::set_var("PROCVISOR_STOP_ATTEMPTS", "7");
        std::env::set_var("PROCVISOR_LOGGING__LEVEL", "warn");

        let loaded = SettingsLoader::with_path(path).load();

        std::env::remove_var("PROCVISOR_STOP_ATTEMPTS");
        std::env::remove_var("PROCVISOR_LOGGING__LEVEL");

        let settings = loaded.unwrap();
        assert_eq!(settings.stop_attempts, 7);
        assert_eq!(settings.logging.level, "warn");
    }

    #[test]
    #[serial]
    fn test_invalid_file_values_fail_validation() {
        let (_dir, path) = write_config("max_stop_cycles = 0\n");
        let err = SettingsLoader::with_path(path).load().unwrap_err();
        assert_eq!(err.code(), "PROC006");
    }

    #[test]
    fn test_round_trips_through_toml() {
        let settings = MonitorSettings::default();
        let text = toml::to_string(&settings).unwrap();
        assert!(text.contains("tag_prefix = \"gen-tag-\""));
    }
}
