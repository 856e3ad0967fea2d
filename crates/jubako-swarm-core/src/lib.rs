//! Engine-agnostic swarm interfaces, domain types, and the shared completion registry.

pub mod error;
pub mod model;
pub mod registry;
pub mod selection;
pub mod service;

pub use error::{AcquisitionError, EngineError, EngineResult, ErrorContext, LocatorError};
pub use model::{
    CONTENT_ID_LEN, ContentId, FileProgress, MagnetLocator, ProgressSnapshot, SwarmFile,
};
pub use registry::ReadyFileRegistry;
pub use selection::{VIDEO_EXTENSIONS, is_playable, select_playable};
pub use service::{SwarmEngine, Transfer, TransferReader};
