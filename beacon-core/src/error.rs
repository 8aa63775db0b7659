//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// Path that failed to load.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// File extension is not a recognized configuration format.
    #[error("Unrecognized config format for {0}")]
    UnknownFormat(PathBuf),

    /// Configuration file failed to parse.
    #[error("Failed to parse config file {path}: {message}")]
    Parse {
        /// Path that failed to parse.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },

    /// A configuration value failed validation.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
