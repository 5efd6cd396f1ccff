//! Tracing setup for hosts that have none of their own

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{ProcessError, Result};
use crate::settings::LoggingSettings;

/// Install a global fmt subscriber
///
/// `RUST_LOG` overrides `settings.level`. Fails if a global subscriber is
/// already installed.
pub fn init_tracing(settings: &LoggingSettings) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.level).map_err(|e| {
            ProcessError::InvalidConfig(format!("invalid log level `{}`: {e}", settings.level))
        })?,
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| ProcessError::Initialization(e.to_string()))?;

    info!(level = %settings.level, "Tracing initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_second_init_fails() {
        let settings = LoggingSettings::default();
        // Another test may have installed the subscriber already
        let _ = init_tracing(&settings);

        let err = init_tracing(&settings).unwrap_err();
        assert_eq!(err.code(), "PROC008");
    }

    #[test]
    #[serial]
    fn test_invalid_level_is_config_error() {
        std::env::remove_var("RUST_LOG");
        let settings = LoggingSettings {
            level: "procvisor=[".to_string(),
        };
        assert!(matches!(
            init_tracing(&settings),
            Err(ProcessError::InvalidConfig(_))
        ));
    }
}
