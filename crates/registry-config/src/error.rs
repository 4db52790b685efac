//! Configuration-loading error type.

use thiserror::Error;

/// Errors that can occur while loading a [`crate::RegistryConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}")]
    Io {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file's contents did not parse as valid TOML for
    /// [`crate::RegistryConfig`].
    #[error("failed to parse config file {path}")]
    Parse {
        /// Path that was parsed.
        path: String,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },
}
