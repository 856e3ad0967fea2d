use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, Weak};

use async_trait::async_trait;
use jubako_swarm_core::{
    ContentId, EngineError, EngineResult, FileProgress, SwarmFile, Transfer, TransferReader,
};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, watch};
use tracing::debug;

use crate::FeedRate;
use crate::reader;
use crate::seed::SeedContent;
use crate::worker;

struct FileSlot {
    meta: SwarmFile,
    completed: watch::Sender<u64>,
    started: AtomicBool,
}

/// In-process transfer whose bytes land under its own directory.
pub struct LocalTransfer {
    this: Weak<Self>,
    content_id: ContentId,
    root: PathBuf,
    seed: Option<SeedContent>,
    feed: FeedRate,
    files: RwLock<Vec<FileSlot>>,
    metadata: watch::Sender<bool>,
    closed: watch::Sender<bool>,
    peers: AtomicUsize,
    writes: Mutex<()>,
}

impl LocalTransfer {
    pub(crate) fn new(
        content_id: ContentId,
        root: PathBuf,
        seed: Option<SeedContent>,
        feed: FeedRate,
    ) -> Arc<Self> {
        let transfer = Arc::new_cyclic(|this| Self {
            this: this.clone(),
            content_id,
            root,
            seed,
            feed,
            files: RwLock::new(Vec::new()),
            metadata: watch::Sender::new(false),
            closed: watch::Sender::new(false),
            peers: AtomicUsize::new(0),
            writes: Mutex::new(()),
        });
        if let Some(seed) = transfer.seed.as_ref() {
            let files: Vec<(String, u64)> = seed
                .files()
                .iter()
                .map(|file| (file.path.clone(), file.source.length()))
                .collect();
            transfer.install_metadata(files);
            transfer.set_active_peers(1);
        }
        transfer
    }

    /// Publish the file list; later calls are ignored.
    ///
    /// Returns whether this call resolved the metadata.
    pub fn resolve_metadata(&self, files: &[(&str, u64)]) -> bool {
        self.install_metadata(
            files
                .iter()
                .map(|(path, length)| ((*path).to_string(), *length))
                .collect(),
        )
    }

    fn install_metadata(&self, files: Vec<(String, u64)>) -> bool {
        if *self.metadata.borrow() {
            return false;
        }
        {
            let mut slots = self.files.write().unwrap_or_else(PoisonError::into_inner);
            *slots = files
                .into_iter()
                .enumerate()
                .map(|(index, (path, length))| FileSlot {
                    meta: SwarmFile {
                        index,
                        path,
                        length,
                    },
                    completed: watch::Sender::new(0),
                    started: AtomicBool::new(false),
                })
                .collect();
        }
        self.metadata.send_replace(true);
        debug!(content_id = %self.content_id, "transfer metadata resolved");
        true
    }

    /// Append bytes to a file, clamped to its length.
    ///
    /// Returns the completed byte count after the write.
    ///
    /// # Errors
    ///
    /// Fails when the transfer is closed, the index is unknown, or the write fails.
    pub async fn deliver(&self, file_index: usize, bytes: &[u8]) -> EngineResult<u64> {
        if self.is_closed() {
            return Err(EngineError::Closed {
                content_id: self.content_id,
            });
        }
        let _guard = self.writes.lock().await;
        let (path, length, already) = self.with_slot(file_index, |slot| {
            (
                self.root.join(relative_path(&slot.meta.path)),
                slot.meta.length,
                *slot.completed.borrow(),
            )
        })?;

        let room = length.saturating_sub(already);
        let take = usize::try_from(room).map_or(bytes.len(), |room| room.min(bytes.len()));
        if take == 0 {
            return Ok(already);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| io_error("transfer.create_dir", parent, source))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| io_error("transfer.open", &path, source))?;
        file.write_all(&bytes[..take])
            .await
            .map_err(|source| io_error("transfer.write", &path, source))?;
        file.flush()
            .await
            .map_err(|source| io_error("transfer.flush", &path, source))?;

        let completed = already + u64::try_from(take).unwrap_or(u64::MAX);
        self.with_slot(file_index, |slot| {
            slot.completed.send_replace(completed);
        })?;
        Ok(completed)
    }

    /// Override the reported peer count.
    pub fn set_active_peers(&self, peers: usize) {
        self.peers.store(peers, Ordering::Relaxed);
    }

    /// Fire the closed signal.
    pub fn close(&self) {
        if !self.closed.send_replace(true) {
            debug!(content_id = %self.content_id, "transfer closed");
        }
    }

    fn slots(&self) -> RwLockReadGuard<'_, Vec<FileSlot>> {
        self.files.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_slot<T>(&self, file_index: usize, f: impl FnOnce(&FileSlot) -> T) -> EngineResult<T> {
        if !*self.metadata.borrow() {
            return Err(EngineError::MetadataPending {
                content_id: self.content_id,
            });
        }
        let slots = self.slots();
        let slot = slots.get(file_index).ok_or(EngineError::FileNotFound {
            content_id: self.content_id,
            index: file_index,
        })?;
        Ok(f(slot))
    }

    fn closed_error(&self) -> EngineError {
        EngineError::Closed {
            content_id: self.content_id,
        }
    }
}

#[async_trait]
impl Transfer for LocalTransfer {
    fn content_id(&self) -> ContentId {
        self.content_id
    }

    async fn metadata_ready(&self) {
        let mut ready = self.metadata.subscribe();
        if ready.wait_for(|resolved| *resolved).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    async fn closed(&self) {
        let mut closed = self.closed.subscribe();
        if closed.wait_for(|closed| *closed).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn files(&self) -> Vec<SwarmFile> {
        self.slots().iter().map(|slot| slot.meta.clone()).collect()
    }

    fn start_download(&self, file_index: usize) -> EngineResult<()> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        let first_start =
            self.with_slot(file_index, |slot| !slot.started.swap(true, Ordering::SeqCst))?;
        if !first_start {
            return Ok(());
        }
        debug!(content_id = %self.content_id, file_index, "file download started");

        let source = self
            .seed
            .as_ref()
            .and_then(|seed| seed.files().get(file_index))
            .map(|file| file.source.clone());
        if let (Some(source), Some(this)) = (source, self.this.upgrade()) {
            worker::spawn_feeder(this, file_index, source, self.feed);
        }
        Ok(())
    }

    fn progress(&self, file_index: usize) -> FileProgress {
        self.with_slot(file_index, |slot| FileProgress {
            completed: *slot.completed.borrow(),
            total: slot.meta.length,
        })
        .unwrap_or_default()
    }

    fn active_peers(&self) -> usize {
        self.peers.load(Ordering::Relaxed)
    }

    fn local_path(&self, file_index: usize) -> EngineResult<PathBuf> {
        self.with_slot(file_index, |slot| {
            self.root.join(relative_path(&slot.meta.path))
        })
    }

    fn open_reader(&self, file_index: usize, read_ahead: usize) -> EngineResult<TransferReader> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        let source = self.with_slot(file_index, |slot| reader::PumpSource {
            content_id: self.content_id,
            path: self.root.join(relative_path(&slot.meta.path)),
            total: slot.meta.length,
            completed: slot.completed.subscribe(),
            closed: self.closed.subscribe(),
        })?;
        Ok(reader::spawn(source, read_ahead))
    }
}

fn io_error(operation: &'static str, path: &Path, source: std::io::Error) -> EngineError {
    EngineError::Io {
        operation,
        path: Some(path.to_path_buf()),
        source,
    }
}

/// Map a `/` separated display path onto a relative path with no parent hops.
pub(crate) fn relative_path(display: &str) -> PathBuf {
    display
        .split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != "." && *part != "..")
        .collect()
}
