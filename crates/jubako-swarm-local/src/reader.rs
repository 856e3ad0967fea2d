//! Sequential readers over files that may still be downloading.

use std::io::{self, ErrorKind};
use std::path::PathBuf;

use jubako_swarm_core::{ContentId, TransferReader};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::watch;
use tracing::{debug, warn};

const PUMP_CHUNK: usize = 64 * 1024;

pub(crate) struct PumpSource {
    pub(crate) content_id: ContentId,
    pub(crate) path: PathBuf,
    pub(crate) total: u64,
    pub(crate) completed: watch::Receiver<u64>,
    pub(crate) closed: watch::Receiver<bool>,
}

/// Spawn a pump that copies completed bytes into a pipe holding at most
/// `read_ahead` unread bytes. Dropping the returned reader stops the pump.
pub(crate) fn spawn(source: PumpSource, read_ahead: usize) -> TransferReader {
    let (reader, writer) = tokio::io::duplex(read_ahead.max(1));
    tokio::spawn(async move {
        let content_id = source.content_id;
        match pump(source, writer).await {
            Ok(()) => debug!(content_id = %content_id, "transfer reader reached end of file"),
            Err(err) if err.kind() == ErrorKind::BrokenPipe => {
                debug!(content_id = %content_id, "transfer reader released by consumer");
            }
            Err(err) => warn!(content_id = %content_id, error = %err, "transfer reader stopped"),
        }
    });
    Box::new(reader)
}

async fn pump(source: PumpSource, mut writer: DuplexStream) -> io::Result<()> {
    let PumpSource {
        path,
        total,
        mut completed,
        mut closed,
        ..
    } = source;
    let mut file: Option<File> = None;
    let mut position = 0_u64;
    let mut buf = vec![0_u8; PUMP_CHUNK];

    while position < total {
        let available = *completed.borrow_and_update();
        if available > position {
            if file.is_none() {
                file = Some(File::open(&path).await?);
            }
            let Some(reader) = file.as_mut() else {
                continue;
            };
            let want = usize::try_from(available - position)
                .map_or(PUMP_CHUNK, |left| left.min(PUMP_CHUNK));
            let read = reader.read(&mut buf[..want]).await?;
            if read == 0 {
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "file shorter than its reported progress",
                ));
            }
            writer.write_all(&buf[..read]).await?;
            position += u64::try_from(read).unwrap_or(u64::MAX);
            continue;
        }

        tokio::select! {
            changed = completed.changed() => {
                if changed.is_err() {
                    return Err(io::Error::new(ErrorKind::UnexpectedEof, "transfer released"));
                }
            }
            _ = closed.wait_for(|closed| *closed) => {
                return Err(io::Error::new(ErrorKind::UnexpectedEof, "transfer closed"));
            }
        }
    }
    writer.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reader_ends_when_transfer_closes() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("partial.mkv");
        tokio::fs::write(&path, b"abc").await?;
        let (_progress, completed) = watch::channel(3_u64);
        let (closing, closed) = watch::channel(false);

        let mut reader = spawn(
            PumpSource {
                content_id: ContentId::from_bytes([1; 20]),
                path,
                total: 10,
                completed,
                closed,
            },
            4,
        );
        let mut first = [0_u8; 3];
        reader.read_exact(&mut first).await?;
        assert_eq!(&first, b"abc");

        closing.send_replace(true);
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await?;
        assert!(rest.is_empty());
        Ok(())
    }
}
