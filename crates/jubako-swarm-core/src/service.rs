//! Collaborator traits implemented by swarm engine adapters.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::error::EngineResult;
use crate::model::{ContentId, FileProgress, MagnetLocator, SwarmFile};

/// Sequential byte reader over one file of a transfer.
pub type TransferReader = Box<dyn AsyncRead + Send + Unpin>;

/// Swarm engine that owns transfers keyed by content identifier.
#[async_trait]
pub trait SwarmEngine: Send + Sync {
    /// Create (or return the existing) transfer for a magnet locator.
    async fn add_magnet(&self, magnet: &MagnetLocator) -> EngineResult<Arc<dyn Transfer>>;

    /// Look up an active transfer.
    fn transfer(&self, content_id: &ContentId) -> Option<Arc<dyn Transfer>>;

    /// Tear a transfer down; running waiters observe its closed signal.
    async fn drop_transfer(&self, content_id: &ContentId) -> EngineResult<()>;

    /// Content identifiers of every active transfer.
    fn transfers(&self) -> Vec<ContentId>;
}

/// One in-flight transfer.
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Content identifier of the transfer.
    fn content_id(&self) -> ContentId;

    /// Resolve once the file list and sizes are known.
    async fn metadata_ready(&self);

    /// Resolve once the transfer has been torn down.
    async fn closed(&self);

    /// Whether the closed signal already fired.
    fn is_closed(&self) -> bool;

    /// Files of the transfer; empty until metadata resolves.
    fn files(&self) -> Vec<SwarmFile>;

    /// Begin fetching one file.
    ///
    /// # Errors
    ///
    /// Fails when the index is unknown or the transfer is closed.
    fn start_download(&self, file_index: usize) -> EngineResult<()>;

    /// Completed and total bytes for one file.
    fn progress(&self, file_index: usize) -> FileProgress;

    /// Peers currently connected; engines without swarm stats report zero.
    fn active_peers(&self) -> usize {
        0
    }

    /// Absolute on-disk path the file is written to.
    ///
    /// # Errors
    ///
    /// Fails when the index is unknown.
    fn local_path(&self, file_index: usize) -> EngineResult<PathBuf>;

    /// Open a sequential reader from the start of the file, buffering up to
    /// `read_ahead` bytes ahead of the consumer.
    ///
    /// # Errors
    ///
    /// Fails when the index is unknown or the transfer is closed.
    fn open_reader(&self, file_index: usize, read_ahead: usize) -> EngineResult<TransferReader>;
}
