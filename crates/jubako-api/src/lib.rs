#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]
#![allow(clippy::redundant_pub_crate)]

//! HTTP surface: the stream router plus health and metrics endpoints.
//!
//! # Design
//! - The stream route consults the ready-file registry first and falls back to
//!   reading through the live transfer, so players never see the difference.
//! - Shared state is injected through [`ApiState`] rather than globals.

/// Error types for server bootstrap and serving.
pub mod error;
/// HTTP routes, handlers, and middleware.
pub mod http;
/// Shared handler state.
pub mod state;

pub use error::{ApiServerError, ApiServerResult};
pub use http::router::ApiServer;
pub use state::ApiState;
