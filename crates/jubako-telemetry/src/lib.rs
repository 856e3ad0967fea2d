//! Telemetry primitives shared across the Jubako workspace.
//!
//! Logging setup, the process-wide application span, and the Prometheus
//! registry live here so the orchestrator and the HTTP surface report through
//! one place.

/// Application span helpers.
pub mod context;
/// Error types for telemetry operations.
pub mod error;
/// Logging initialisation and configuration.
pub mod init;
/// Prometheus metrics registry.
pub mod metrics;

pub use context::{GlobalContextGuard, record_app_mode};
pub use error::{Result, TelemetryError};
pub use init::{
    DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, build_sha, init_logging, log_format_from_str,
};
pub use metrics::{Metrics, MetricsSnapshot, StreamSource};
