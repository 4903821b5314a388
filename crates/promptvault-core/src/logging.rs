//! Structured logging setup.
//!
//! Library code only emits `tracing` events. Applications embedding the
//! vault call [`init_from_config`] (or [`init`]) once to print them.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingSection;
use crate::error::{Result, VaultError};

/// Environment variable whose filter directives override the default.
pub const LOG_ENV: &str = "PROMPTVAULT_LOG";

/// Build the filter: `PROMPTVAULT_LOG` if set and valid, else `default_directive`.
pub fn env_filter(default_directive: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(default_directive))
        .map_err(|e| VaultError::Config(format!("Invalid log filter {:?}: {}", default_directive, e)))
}

/// Install a global fmt subscriber.
///
/// Fails instead of panicking when a global subscriber is already set.
pub fn init(default_directive: &str) -> Result<()> {
    let filter = env_filter(default_directive)?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
        .map_err(|e| VaultError::Config(format!("Logging already initialised: {}", e)))
}

/// Install the subscriber using the `[logging]` section of a vault config.
pub fn init_from_config(config: &LoggingSection) -> Result<()> {
    init(&config.level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_default_directive_rejected() {
        if std::env::var(LOG_ENV).is_ok() {
            return;
        }
        assert!(matches!(
            env_filter("promptvault=notalevel"),
            Err(VaultError::Config(_))
        ));
        assert!(env_filter("promptvault_core=debug").is_ok());
    }

    #[test]
    fn test_second_init_reports_config_error() {
        let _ = init("warn");
        let section = LoggingSection {
            level: "debug".to_string(),
        };
        assert!(matches!(
            init_from_config(&section),
            Err(VaultError::Config(_))
        ));
    }
}
