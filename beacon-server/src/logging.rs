//! Logging initialization.

use tracing_subscriber::EnvFilter;

use beacon_core::config::LoggingConfig;

/// Initializes the global tracing subscriber from configuration.
///
/// The level accepts full `tracing` env-filter syntax, so both `debug`
/// and `beacon_store=debug,info` work. `RUST_LOG` wins when set.
///
/// # Errors
///
/// Returns an error string when a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| format!("Invalid log filter '{}': {e}", config.level))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| format!("Failed to initialize logging: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_accepts_valid_filter() {
        let config = LoggingConfig {
            level: "debug".to_string(),
            json: false,
        };
        // First call in the process wins; repeat calls report the conflict
        // instead of panicking.
        let _ = init_logging(&config);
        assert!(init_logging(&config).is_err());
    }
}
