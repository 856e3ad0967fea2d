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

//! Jubako application wiring.
//!
//! Layout: `bootstrap.rs` (service wiring), `orchestrator.rs` (per-magnet
//! acquisition tasks), `playback.rs` (startup magnets and the player launch).

/// Application bootstrap and shutdown handling.
pub mod bootstrap;
/// Application error types.
pub mod error;
/// Download orchestration over the swarm engine.
pub mod orchestrator;
/// Startup acquisitions and player launch.
pub mod playback;

pub use bootstrap::run_app;
pub use error::{AppError, AppResult};
pub use orchestrator::{
    METADATA_TIMEOUT, Orchestrator, PROGRESS_INTERVAL, ProgressStream, ProgressUpdate,
    SHUTDOWN_GRACE, TaskOutcome, TaskState,
};
pub use playback::{PLAYER_LAUNCH_PERCENT, PlayerLauncher, start_acquisitions};
