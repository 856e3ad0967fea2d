//! Shared completion state: finished files plus the active download counter.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::model::ContentId;

#[derive(Debug, Default)]
struct RegistryState {
    ready: HashMap<ContentId, PathBuf>,
    active_downloads: usize,
}

/// Cloneable handle over the content-id to on-disk path map.
///
/// The active download counter shares the same lock so that registering a
/// finished file and releasing its slot happen as one write.
#[derive(Debug, Clone, Default)]
pub struct ReadyFileRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl ReadyFileRegistry {
    /// Construct an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the absolute path of a finished file. Last writer wins.
    pub async fn put(&self, content_id: ContentId, path: PathBuf) {
        self.state.write().await.ready.insert(content_id, path);
    }

    /// Path of a finished file, if one was registered.
    pub async fn get(&self, content_id: &ContentId) -> Option<PathBuf> {
        self.state.read().await.ready.get(content_id).cloned()
    }

    /// Register a finished file and release its active slot under one write lock.
    ///
    /// Returns the active download count after the release.
    pub async fn complete(&self, content_id: ContentId, path: PathBuf) -> usize {
        let mut state = self.state.write().await;
        state.ready.insert(content_id, path);
        state.active_downloads = state.active_downloads.saturating_sub(1);
        state.active_downloads
    }

    /// Count one more task past metadata resolution.
    pub async fn increment_active(&self) -> usize {
        let mut state = self.state.write().await;
        state.active_downloads += 1;
        state.active_downloads
    }

    /// Release one active slot, saturating at zero.
    pub async fn decrement_active(&self) -> usize {
        let mut state = self.state.write().await;
        state.active_downloads = state.active_downloads.saturating_sub(1);
        state.active_downloads
    }

    /// Current active download count.
    pub async fn active_downloads(&self) -> usize {
        self.state.read().await.active_downloads
    }

    /// Number of registered files.
    pub async fn len(&self) -> usize {
        self.state.read().await.ready.len()
    }

    /// Whether no file has been registered yet.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.ready.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(seed: u8) -> ContentId {
        ContentId::from_bytes([seed; 20])
    }

    #[tokio::test]
    async fn put_then_get_returns_path() {
        let registry = ReadyFileRegistry::new();
        assert!(registry.is_empty().await);
        assert!(registry.get(&id(1)).await.is_none());

        registry.put(id(1), PathBuf::from("/data/a.mkv")).await;
        registry.put(id(1), PathBuf::from("/data/b.mkv")).await;

        assert_eq!(
            registry.get(&id(1)).await,
            Some(PathBuf::from("/data/b.mkv"))
        );
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn counter_saturates_at_zero() {
        let registry = ReadyFileRegistry::new();
        assert_eq!(registry.decrement_active().await, 0);
        assert_eq!(registry.increment_active().await, 1);
        assert_eq!(registry.increment_active().await, 2);
        assert_eq!(registry.complete(id(2), PathBuf::from("/x.mp4")).await, 1);
        assert_eq!(registry.decrement_active().await, 0);
        assert_eq!(registry.decrement_active().await, 0);
        assert_eq!(registry.get(&id(2)).await, Some(PathBuf::from("/x.mp4")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_and_readers_agree() -> anyhow::Result<()> {
        let registry = ReadyFileRegistry::new();
        let mut handles = Vec::new();
        for seed in 0..32_u8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.increment_active().await;
                let path = PathBuf::from(format!("/data/{seed}.mkv"));
                registry.complete(id(seed), path.clone()).await;
                registry.get(&id(seed)).await == Some(path)
            }));
        }
        for handle in handles {
            assert!(handle.await?);
        }
        assert_eq!(registry.len().await, 32);
        assert_eq!(registry.active_downloads().await, 0);
        Ok(())
    }
}
