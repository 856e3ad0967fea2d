//! Error types for configuration loading.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Field contained an invalid value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Section that failed validation.
        section: &'static str,
        /// Field that failed validation.
        field: &'static str,
        /// Offending value when available.
        value: Option<String>,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// Command-line arguments could not be parsed.
    #[error("invalid command-line arguments")]
    Arguments {
        /// Underlying clap failure.
        #[source]
        source: clap::Error,
    },
    /// Preparing a configured directory failed.
    #[error("configuration directory operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn messages_stay_constant() {
        let invalid = ConfigError::InvalidField {
            section: "http",
            field: "bind_addr",
            value: Some("nope".into()),
            reason: "not an ip address",
        };
        assert_eq!(invalid.to_string(), "invalid configuration field");
        assert!(invalid.source().is_none());

        let io = ConfigError::Io {
            operation: "storage.create_dir",
            path: PathBuf::from("/nowhere"),
            source: io::Error::other("denied"),
        };
        assert_eq!(io.to_string(), "configuration directory operation failed");
        assert!(io.source().is_some());
    }
}
