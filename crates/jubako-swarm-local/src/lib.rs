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

//! In-process swarm engine that stores transfers on local disk.
//!
//! Transfers are driven either by seeded content, which is delivered to disk
//! at a fixed rate once a file is started, or by hand through the
//! [`LocalTransfer`] control methods.

mod reader;
/// Seeded content definitions and seed directory scanning.
pub mod seed;
/// Transfer state and control handles.
pub mod transfer;
mod worker;

pub use seed::{SeedContent, SeedFile, SeedSource};
pub use transfer::LocalTransfer;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use jubako_swarm_core::{
    ContentId, EngineError, EngineResult, MagnetLocator, SwarmEngine, Transfer,
};
use tracing::{debug, info};

/// Default amount of seeded bytes delivered per feed tick.
pub const DEFAULT_FEED_CHUNK: usize = 1024 * 1024;
/// Default interval between feed ticks.
pub const DEFAULT_FEED_INTERVAL: Duration = Duration::from_millis(200);

/// Delivery rate for seeded content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedRate {
    /// Bytes written per tick.
    pub chunk: usize,
    /// Interval between ticks.
    pub interval: Duration,
}

impl Default for FeedRate {
    fn default() -> Self {
        Self {
            chunk: DEFAULT_FEED_CHUNK,
            interval: DEFAULT_FEED_INTERVAL,
        }
    }
}

struct EngineInner {
    download_root: PathBuf,
    feed: FeedRate,
    transfers: RwLock<HashMap<ContentId, Arc<LocalTransfer>>>,
    seeds: RwLock<HashMap<ContentId, SeedContent>>,
}

/// Cloneable handle over the in-process engine.
#[derive(Clone)]
pub struct LocalEngine {
    inner: Arc<EngineInner>,
}

impl LocalEngine {
    /// Construct an engine writing transfers below `download_root`.
    #[must_use]
    pub fn new(download_root: impl Into<PathBuf>) -> Self {
        Self::with_feed_rate(download_root, FeedRate::default())
    }

    /// Construct an engine with a custom seeded delivery rate.
    #[must_use]
    pub fn with_feed_rate(download_root: impl Into<PathBuf>, feed: FeedRate) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                download_root: download_root.into(),
                feed,
                transfers: RwLock::new(HashMap::new()),
                seeds: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Directory transfers are written below.
    #[must_use]
    pub fn download_root(&self) -> &Path {
        &self.inner.download_root
    }

    /// Make content available to future transfers of `content_id`.
    pub fn seed(&self, content_id: ContentId, content: SeedContent) {
        self.inner
            .seeds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(content_id, content);
    }

    /// Seed every `<40-hex>/` subdirectory of `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Io`] when the directory cannot be walked.
    pub fn load_seed_dir(&self, dir: &Path) -> EngineResult<usize> {
        let seeds = seed::scan_seed_dir(dir).map_err(|source| EngineError::Io {
            operation: "seed.scan",
            path: Some(dir.to_path_buf()),
            source,
        })?;
        let count = seeds.len();
        for (content_id, content) in seeds {
            debug!(content_id = %content_id, files = content.files().len(), "seeded content");
            self.seed(content_id, content);
        }
        Ok(count)
    }

    /// Control handle for an active transfer.
    #[must_use]
    pub fn local_transfer(&self, content_id: &ContentId) -> Option<Arc<LocalTransfer>> {
        self.inner
            .transfers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(content_id)
            .cloned()
    }

    fn seed_for(&self, content_id: &ContentId) -> Option<SeedContent> {
        self.inner
            .seeds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(content_id)
            .cloned()
    }
}

#[async_trait]
impl SwarmEngine for LocalEngine {
    async fn add_magnet(&self, magnet: &MagnetLocator) -> EngineResult<Arc<dyn Transfer>> {
        let content_id = magnet.content_id();
        if let Some(existing) = self.local_transfer(&content_id)
            && !existing.is_closed()
        {
            return Ok(existing);
        }

        let seed = self.seed_for(&content_id);
        let seeded = seed.is_some();
        let transfer = LocalTransfer::new(
            content_id,
            self.inner.download_root.join(content_id.to_hex()),
            seed,
            self.inner.feed,
        );
        self.inner
            .transfers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(content_id, Arc::clone(&transfer));
        info!(
            content_id = %content_id,
            name = magnet.display_name().unwrap_or_default(),
            seeded,
            "transfer added"
        );
        Ok(transfer)
    }

    fn transfer(&self, content_id: &ContentId) -> Option<Arc<dyn Transfer>> {
        self.local_transfer(content_id)
            .map(|transfer| transfer as Arc<dyn Transfer>)
    }

    async fn drop_transfer(&self, content_id: &ContentId) -> EngineResult<()> {
        let removed = self
            .inner
            .transfers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(content_id);
        let transfer = removed.ok_or(EngineError::TransferNotFound {
            content_id: *content_id,
        })?;
        transfer.close();
        info!(content_id = %content_id, "transfer dropped");
        Ok(())
    }

    fn transfers(&self) -> Vec<ContentId> {
        self.inner
            .transfers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCATOR: &str = "magnet:?xt=urn:btih:dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c&dn=demo";

    #[tokio::test]
    async fn add_returns_existing_transfer_until_dropped() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let engine = LocalEngine::new(dir.path());
        let magnet = MagnetLocator::parse(LOCATOR)?;

        let first = engine.add_magnet(&magnet).await?;
        let second = engine.add_magnet(&magnet).await?;
        assert_eq!(first.content_id(), second.content_id());
        let control = engine
            .local_transfer(&magnet.content_id())
            .ok_or_else(|| anyhow::anyhow!("transfer missing"))?;
        control.set_active_peers(4);
        assert_eq!(first.active_peers(), 4);
        assert_eq!(engine.transfers(), vec![magnet.content_id()]);

        engine.drop_transfer(&magnet.content_id()).await?;
        assert!(first.is_closed());
        first.closed().await;
        assert!(engine.transfer(&magnet.content_id()).is_none());
        assert!(matches!(
            engine.drop_transfer(&magnet.content_id()).await,
            Err(EngineError::TransferNotFound { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn seeded_transfer_resolves_metadata_on_add() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let engine = LocalEngine::new(dir.path());
        let magnet = MagnetLocator::parse(LOCATOR)?;
        engine.seed(
            magnet.content_id(),
            SeedContent::new(vec![
                SeedFile::memory("demo/movie.mkv", b"0123456789".to_vec()),
                SeedFile::memory("demo/readme.txt", b"hi".to_vec()),
            ]),
        );

        let transfer = engine.add_magnet(&magnet).await?;
        transfer.metadata_ready().await;
        let files = transfer.files();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "demo/movie.mkv");
        assert_eq!(files[0].length, 10);
        assert_eq!(transfer.active_peers(), 1);
        assert_eq!(
            transfer.local_path(0)?,
            dir.path()
                .join(magnet.content_id().to_hex())
                .join("demo")
                .join("movie.mkv")
        );
        Ok(())
    }
}
