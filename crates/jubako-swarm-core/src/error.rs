//! Error types for swarm acquisition and engine collaborators.

use std::error::Error;
use std::io;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::model::ContentId;

/// Caller-facing context attached to acquisition failures.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ErrorContext {
    /// Caller-supplied identifier, omitted when it equals the locator.
    pub identifier: Option<String>,
    /// Magnet locator the request was made with.
    pub locator: String,
}

impl ErrorContext {
    /// Build a context, dropping the identifier when it is empty or repeats the locator.
    #[must_use]
    pub fn new(identifier: &str, locator: &str) -> Self {
        let identifier = (!identifier.is_empty() && identifier != locator)
            .then(|| identifier.to_string());
        Self {
            identifier,
            locator: locator.to_string(),
        }
    }
}

/// Failures produced while turning text into a magnet locator or content id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocatorError {
    /// Content identifier text had neither the hex nor the base32 length.
    #[error("content identifier has an invalid length")]
    InvalidLength {
        /// Observed character count.
        length: usize,
    },
    /// Content identifier contained non-hex characters.
    #[error("content identifier is not valid hex")]
    InvalidHex,
    /// Content identifier contained characters outside the base32 alphabet.
    #[error("content identifier is not valid base32")]
    InvalidBase32,
    /// Locator could not be parsed as a URI.
    #[error("locator is not a valid uri")]
    InvalidUri,
    /// Locator parsed but used another scheme.
    #[error("locator is not a magnet uri")]
    NotMagnet {
        /// Scheme found in the locator.
        scheme: String,
    },
    /// Magnet had no `xt=urn:btih:` exact topic.
    #[error("magnet locator has no info-hash exact topic")]
    MissingInfoHash,
}

/// Failures reported by a swarm engine collaborator.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Engine refused to create a transfer for the locator.
    #[error("swarm engine rejected the locator")]
    Rejected {
        /// Engine supplied reason.
        reason: &'static str,
    },
    /// Transfer is not known to the engine.
    #[error("transfer not found")]
    TransferNotFound {
        /// Missing content identifier.
        content_id: ContentId,
    },
    /// File index does not exist in the transfer.
    #[error("file not found in transfer")]
    FileNotFound {
        /// Transfer content identifier.
        content_id: ContentId,
        /// Requested file index.
        index: usize,
    },
    /// Transfer metadata has not been resolved yet.
    #[error("transfer metadata not yet available")]
    MetadataPending {
        /// Transfer content identifier.
        content_id: ContentId,
    },
    /// Transfer has been torn down.
    #[error("transfer closed")]
    Closed {
        /// Transfer content identifier.
        content_id: ContentId,
    },
    /// Local storage access failed.
    #[error("swarm engine storage operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved when available.
        path: Option<PathBuf>,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
}

/// Convenience alias for engine results.
pub type EngineResult<T> = Result<T, EngineError>;

/// Terminal failures of a content-acquisition request.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// Locator was malformed or refused by the engine before a task started.
    #[error("invalid magnet locator")]
    InvalidLocator {
        /// Request context.
        context: ErrorContext,
        /// Underlying parse or engine failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// Metadata did not arrive within the wait bound.
    #[error("reached timeout for fetching metadata")]
    MetadataTimeout {
        /// Request context.
        context: ErrorContext,
    },
    /// Transfer contained no file with a playable video extension.
    #[error("magnet points to no playable video file (.mkv or .mp4)")]
    NoPlayableFile {
        /// Request context.
        context: ErrorContext,
    },
    /// Transfer was closed before the selected file completed.
    #[error("transfer closed unexpectedly")]
    TransferClosedUnexpectedly {
        /// Request context.
        context: ErrorContext,
    },
    /// Stream target is unknown to both the registry and the engine.
    #[error("stream target not found")]
    StreamNotFound {
        /// Request context.
        context: ErrorContext,
    },
    /// A task for the same content is already running.
    #[error("content is already being acquired")]
    DuplicateTransfer {
        /// Request context.
        context: ErrorContext,
        /// Content identifier of the running task.
        content_id: ContentId,
    },
    /// Engine collaborator failed during the task.
    #[error("swarm engine operation failed")]
    Engine {
        /// Request context.
        context: ErrorContext,
        /// Underlying engine failure.
        #[source]
        source: EngineError,
    },
}

impl AcquisitionError {
    /// Wrap a parse or engine rejection as an invalid-locator error.
    pub fn invalid_locator(
        context: ErrorContext,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        Self::InvalidLocator {
            context,
            source: Box::new(source),
        }
    }

    /// Context recorded for the failed request.
    #[must_use]
    pub const fn context(&self) -> &ErrorContext {
        match self {
            Self::InvalidLocator { context, .. }
            | Self::MetadataTimeout { context }
            | Self::NoPlayableFile { context }
            | Self::TransferClosedUnexpectedly { context }
            | Self::StreamNotFound { context }
            | Self::DuplicateTransfer { context, .. }
            | Self::Engine { context, .. } => context,
        }
    }

    /// Stable label used for metrics and structured logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidLocator { .. } => "invalid_locator",
            Self::MetadataTimeout { .. } => "metadata_timeout",
            Self::NoPlayableFile { .. } => "no_playable_file",
            Self::TransferClosedUnexpectedly { .. } => "transfer_closed",
            Self::StreamNotFound { .. } => "stream_not_found",
            Self::DuplicateTransfer { .. } => "duplicate_transfer",
            Self::Engine { .. } => "engine",
        }
    }
}
