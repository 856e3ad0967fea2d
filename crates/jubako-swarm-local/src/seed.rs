use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use jubako_swarm_core::ContentId;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;
use walkdir::WalkDir;

/// Where seeded bytes come from.
#[derive(Debug, Clone)]
pub enum SeedSource {
    /// Bytes held in memory.
    Memory(Arc<[u8]>),
    /// Bytes read from an existing file.
    Disk {
        /// Source file path.
        path: PathBuf,
        /// Source file length.
        length: u64,
    },
}

impl SeedSource {
    /// Length of the seeded file in bytes.
    #[must_use]
    pub fn length(&self) -> u64 {
        match self {
            Self::Memory(bytes) => u64::try_from(bytes.len()).unwrap_or(u64::MAX),
            Self::Disk { length, .. } => *length,
        }
    }

    pub(crate) async fn read_chunk(&self, offset: u64, max: usize) -> io::Result<Vec<u8>> {
        match self {
            Self::Memory(bytes) => {
                let start = usize::try_from(offset)
                    .unwrap_or(usize::MAX)
                    .min(bytes.len());
                let end = start.saturating_add(max).min(bytes.len());
                Ok(bytes[start..end].to_vec())
            }
            Self::Disk { path, length } => {
                let remaining = length.saturating_sub(offset);
                let take = usize::try_from(remaining).map_or(max, |left| left.min(max));
                let mut file = File::open(path).await?;
                file.seek(SeekFrom::Start(offset)).await?;
                let mut chunk = vec![0_u8; take];
                file.read_exact(&mut chunk).await?;
                Ok(chunk)
            }
        }
    }

    pub(crate) fn origin(&self) -> Option<PathBuf> {
        match self {
            Self::Memory(_) => None,
            Self::Disk { path, .. } => Some(path.clone()),
        }
    }
}

/// One file of seeded content.
#[derive(Debug, Clone)]
pub struct SeedFile {
    /// Display path within the transfer, `/` separated.
    pub path: String,
    /// Byte source.
    pub source: SeedSource,
}

impl SeedFile {
    /// Seed a file from in-memory bytes.
    pub fn memory(path: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            path: path.into(),
            source: SeedSource::Memory(bytes.into()),
        }
    }

    /// Seed a file from an existing file on disk.
    pub fn disk(path: impl Into<String>, origin: PathBuf, length: u64) -> Self {
        Self {
            path: path.into(),
            source: SeedSource::Disk {
                path: origin,
                length,
            },
        }
    }
}

/// Full file list of seeded content, in transfer order.
#[derive(Debug, Clone, Default)]
pub struct SeedContent {
    files: Vec<SeedFile>,
}

impl SeedContent {
    /// Wrap a file list.
    #[must_use]
    pub const fn new(files: Vec<SeedFile>) -> Self {
        Self { files }
    }

    /// Seeded files in transfer order.
    #[must_use]
    pub fn files(&self) -> &[SeedFile] {
        &self.files
    }
}

/// Collect seeded content from `<dir>/<40-hex>/**`, files ordered by name.
pub(crate) fn scan_seed_dir(dir: &Path) -> io::Result<Vec<(ContentId, SeedContent)>> {
    let mut seeds = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(content_id) = name.to_str().and_then(|hex| ContentId::from_hex(hex).ok()) else {
            debug!(entry = %entry.path().display(), "skipping non-hash seed entry");
            continue;
        };

        let root = entry.path();
        let mut files = Vec::new();
        for item in WalkDir::new(&root).sort_by_file_name() {
            let item = item.map_err(io::Error::from)?;
            if !item.file_type().is_file() {
                continue;
            }
            let relative = item
                .path()
                .strip_prefix(&root)
                .map_err(|_| io::Error::other("seed entry escaped its root"))?;
            let display = relative
                .components()
                .map(|part| part.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let length = item.metadata().map_err(io::Error::from)?.len();
            files.push(SeedFile::disk(display, item.path().to_path_buf(), length));
        }
        seeds.push((content_id, SeedContent::new(files)));
    }
    Ok(seeds)
}
