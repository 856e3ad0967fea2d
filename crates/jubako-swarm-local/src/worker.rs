//! Background delivery of seeded content.

use std::sync::Arc;

use jubako_swarm_core::{EngineError, EngineResult, Transfer};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, warn};

use crate::FeedRate;
use crate::seed::SeedSource;
use crate::transfer::LocalTransfer;

pub(crate) fn spawn_feeder(
    transfer: Arc<LocalTransfer>,
    file_index: usize,
    source: SeedSource,
    rate: FeedRate,
) {
    tokio::spawn(async move {
        let mut ticker = interval(rate.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = transfer.closed() => break,
                _ = ticker.tick() => {
                    match feed_once(&transfer, file_index, &source, rate.chunk).await {
                        Ok(true) => {
                            debug!(content_id = %transfer.content_id(), file_index, "seeded file delivered");
                            break;
                        }
                        Ok(false) => {}
                        Err(err) => {
                            warn!(content_id = %transfer.content_id(), file_index, error = %err, "seeded delivery failed");
                            break;
                        }
                    }
                }
            }
        }
    });
}

async fn feed_once(
    transfer: &LocalTransfer,
    file_index: usize,
    source: &SeedSource,
    chunk: usize,
) -> EngineResult<bool> {
    let progress = transfer.progress(file_index);
    if progress.completed >= progress.total {
        return Ok(true);
    }
    let bytes = source
        .read_chunk(progress.completed, chunk.max(1))
        .await
        .map_err(|err| EngineError::Io {
            operation: "seed.read",
            path: source.origin(),
            source: err,
        })?;
    let completed = transfer.deliver(file_index, &bytes).await?;
    Ok(completed >= progress.total)
}
