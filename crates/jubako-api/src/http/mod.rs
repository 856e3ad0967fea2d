//! HTTP surface modules (router, handlers, middleware).

/// Shared constants for HTTP surfaces.
pub mod constants;
/// Problem response helpers and error types.
pub mod errors;
/// Health and metrics endpoints.
pub mod health;
/// Router construction and server host.
pub mod router;
/// Stream endpoint serving from disk or the live transfer.
pub mod stream;
/// Metrics middleware for HTTP requests.
pub mod telemetry;
