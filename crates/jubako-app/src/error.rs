//! # Design
//!
//! - Centralize application-level errors for bootstrap and shutdown.
//! - Keep error messages constant while carrying the failing operation.

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration operations failed.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: jubako_config::ConfigError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: jubako_telemetry::TelemetryError,
    },
    /// API server operations failed.
    #[error("api server operation failed")]
    ApiServer {
        /// Operation identifier.
        operation: &'static str,
        /// Source API server error.
        source: jubako_api::ApiServerError,
    },
    /// Swarm engine operations failed.
    #[error("swarm engine operation failed")]
    Engine {
        /// Operation identifier.
        operation: &'static str,
        /// Source engine error.
        source: jubako_swarm_core::EngineError,
    },
    /// A background task panicked or was cancelled.
    #[error("background task failed")]
    Task {
        /// Operation identifier.
        operation: &'static str,
        /// Source join error.
        source: tokio::task::JoinError,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: jubako_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: jubako_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn api_server(
        operation: &'static str,
        source: jubako_api::ApiServerError,
    ) -> Self {
        Self::ApiServer { operation, source }
    }

    pub(crate) const fn engine(
        operation: &'static str,
        source: jubako_swarm_core::EngineError,
    ) -> Self {
        Self::Engine { operation, source }
    }

    /// Operation tag recorded when the error was raised.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Config { operation, .. }
            | Self::Telemetry { operation, .. }
            | Self::ApiServer { operation, .. }
            | Self::Engine { operation, .. }
            | Self::Task { operation, .. } => operation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::io;

    #[test]
    fn app_error_helpers_build_variants() {
        let config = AppError::config(
            "config.load",
            jubako_config::ConfigError::InvalidField {
                section: "http",
                field: "port",
                value: Some("abc".to_string()),
                reason: "not_a_number",
            },
        );
        assert!(matches!(config, AppError::Config { .. }));
        assert_eq!(config.operation(), "config.load");

        let api = AppError::api_server(
            "api_server.serve",
            jubako_api::ApiServerError::Serve {
                source: io::Error::other("io"),
            },
        );
        assert!(matches!(api, AppError::ApiServer { .. }));
        assert_eq!(api.to_string(), "api server operation failed");
        assert!(api.source().is_some());

        let Err(utf8) = String::from_utf8(vec![0xff]) else {
            unreachable!("0xff is never valid utf-8");
        };
        let telemetry = AppError::telemetry(
            "telemetry.metrics",
            jubako_telemetry::TelemetryError::MetricsUtf8 { source: utf8 },
        );
        assert!(matches!(telemetry, AppError::Telemetry { .. }));

        let engine = AppError::engine(
            "engine.load_seed_dir",
            jubako_swarm_core::EngineError::Rejected { reason: "test" },
        );
        assert_eq!(engine.operation(), "engine.load_seed_dir");
    }
}
