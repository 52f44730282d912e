// ABOUTME: Logging configuration and tracing subscriber installation
// ABOUTME: RUST_LOG overrides the configured level; supports compact and pretty output

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Initialize logging based on configuration.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let log_level = if verbose { "debug" } else { &config.level };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    match config.format.as_str() {
        "compact" => tracing_subscriber::fmt()
            .compact()
            .with_env_filter(env_filter)
            .with_target(false)
            .try_init(),
        _ => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .try_init(),
    }
    .map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_an_error() {
        let config = LoggingConfig {
            level: "warn".to_string(),
            format: "compact".to_string(),
        };
        // Another test may already own the global subscriber.
        let _ = init_logging(&config, false);
        assert!(init_logging(&config, false).is_err());
    }
}
