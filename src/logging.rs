//! Tracing subscriber setup for the command line tool

use tracing_subscriber::EnvFilter;

use crate::{Result, StuboError};

/// Level used when neither `RUST_LOG` nor an override is given
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over `level_override`, which takes precedence
/// over [`DEFAULT_LOG_LEVEL`].
///
/// # Errors
///
/// Returns error if the filter is invalid or a subscriber is already set
pub fn init(level_override: Option<&str>) -> Result<()> {
    let filter = resolve_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok(), level_override)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| StuboError::ConfigError(format!("Failed to initialize logging: {e}")))
}

fn resolve_filter(env: Option<String>, level_override: Option<&str>) -> Result<EnvFilter> {
    let directives = env
        .filter(|v| !v.trim().is_empty())
        .or_else(|| level_override.map(|l| l.trim().to_ascii_lowercase()))
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

    EnvFilter::try_new(&directives)
        .map_err(|e| StuboError::ConfigError(format!("Invalid log level `{directives}`: {e}")))
}
