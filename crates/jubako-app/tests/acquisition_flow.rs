use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use jubako_api::{ApiServer, ApiState};
use jubako_app::{Orchestrator, ProgressUpdate, TaskOutcome, TaskState};
use jubako_swarm_core::{
    AcquisitionError, ContentId, MagnetLocator, ProgressSnapshot, ReadyFileRegistry,
    SwarmEngine,
};
use jubako_swarm_local::{FeedRate, LocalEngine, SeedContent, SeedFile};
use jubako_telemetry::Metrics;
use tokio::time::timeout;
use tokio_stream::StreamExt;
use tower::ServiceExt;

const FEATURE: &str = "dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c";
const SUBTITLES: &str = "0123456789abcdef0123456789abcdef01234567";
const UNSEEDED: &str = "fedcba9876543210fedcba9876543210fedcba98";

fn locator(hash: &str) -> String {
    format!("magnet:?xt=urn:btih:{hash}&dn=test")
}

fn payload() -> Vec<u8> {
    (0..=255_u8).cycle().take(64 * 1024).collect()
}

struct Harness {
    _dir: tempfile::TempDir,
    engine: LocalEngine,
    registry: ReadyFileRegistry,
    metrics: Metrics,
    orchestrator: Orchestrator,
}

fn harness() -> anyhow::Result<Harness> {
    let dir = tempfile::tempdir()?;
    let engine = LocalEngine::with_feed_rate(
        dir.path().join("downloads"),
        FeedRate {
            chunk: 16 * 1024,
            interval: Duration::from_millis(400),
        },
    );
    engine.seed(
        ContentId::from_hex(FEATURE)?,
        SeedContent::new(vec![
            SeedFile::memory("test/sample.mkv", vec![1_u8; 512]),
            SeedFile::memory("test/feature.mp4", payload()),
            SeedFile::memory("test/feature.srt", b"1\n00:00 --> 00:01\nhi".to_vec()),
        ]),
    );
    engine.seed(
        ContentId::from_hex(SUBTITLES)?,
        SeedContent::new(vec![
            SeedFile::memory("subs/feature.srt", b"subs".to_vec()),
            SeedFile::memory("subs/feature.nfo", b"info".to_vec()),
        ]),
    );
    let registry = ReadyFileRegistry::new();
    let metrics = Metrics::new()?;
    let orchestrator = Orchestrator::new(
        Arc::new(engine.clone()),
        registry.clone(),
        metrics.clone(),
    );
    Ok(Harness {
        _dir: dir,
        engine,
        registry,
        metrics,
        orchestrator,
    })
}

async fn collect(stream: jubako_app::ProgressStream) -> anyhow::Result<Vec<ProgressUpdate>> {
    Ok(timeout(Duration::from_secs(20), stream.collect::<Vec<_>>()).await?)
}

#[tokio::test]
async fn seeded_magnet_completes_with_single_final_hundred() -> anyhow::Result<()> {
    let harness = harness()?;
    let updates = collect(
        harness
            .orchestrator
            .add_magnet(&locator(FEATURE), "Feature")
            .await,
    )
    .await?;

    let (last, progress) = updates
        .split_last()
        .ok_or_else(|| anyhow::anyhow!("no updates"))?;
    let mut previous = 0.0;
    for update in progress {
        let ProgressUpdate::Progress(snapshot) = update else {
            anyhow::bail!("terminal update before the end of the sequence");
        };
        assert!(snapshot.percent < 100.0);
        assert!(snapshot.percent >= previous);
        assert_eq!(snapshot.path, "test/feature.mp4");
        previous = snapshot.percent;
    }
    let ProgressUpdate::Terminal(TaskOutcome::Ready { snapshot, path }) = last else {
        anyhow::bail!("expected ready outcome");
    };
    assert!((snapshot.percent - 100.0).abs() < f64::EPSILON);
    assert!(path.is_absolute());
    assert_eq!(tokio::fs::read(path).await?, payload());

    let content_id = ContentId::from_hex(FEATURE)?;
    assert_eq!(harness.registry.get(&content_id).await.as_ref(), Some(path));
    assert_eq!(harness.orchestrator.active_downloads().await, 0);
    assert!(harness.orchestrator.active_tasks().is_empty());
    assert_eq!(harness.metrics.snapshot().downloads_completed_total, 1);
    assert_eq!(harness.metrics.snapshot().active_downloads, 0);
    Ok(())
}

#[tokio::test]
async fn finished_download_is_served_from_disk() -> anyhow::Result<()> {
    let harness = harness()?;
    let updates = collect(
        harness
            .orchestrator
            .add_magnet(&locator(FEATURE), "")
            .await,
    )
    .await?;
    assert!(matches!(
        updates.last(),
        Some(ProgressUpdate::Terminal(TaskOutcome::Ready { .. }))
    ));

    let router = ApiServer::new(ApiState::new(
        harness.registry.clone(),
        Arc::new(harness.engine.clone()),
        harness.metrics.clone(),
    ))
    .router();
    let response = router
        .oneshot(
            Request::builder()
                .uri(format!("/stream?hash={FEATURE}"))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    assert_eq!(body.as_ref(), payload().as_slice());
    Ok(())
}

#[tokio::test]
async fn concurrent_requests_terminate_independently() -> anyhow::Result<()> {
    let harness = harness()?;
    let feature_locator = locator(FEATURE);
    let subtitles_locator = locator(SUBTITLES);
    let feature = harness.orchestrator.add_magnet(&feature_locator, "feature");
    let subtitles = harness
        .orchestrator
        .add_magnet(&subtitles_locator, "subtitles");
    let broken = harness.orchestrator.add_magnet("magnet:?dn=broken", "broken");
    let (feature, subtitles, broken) = tokio::join!(feature, subtitles, broken);
    let (feature, subtitles, broken) =
        tokio::try_join!(collect(feature), collect(subtitles), collect(broken))?;

    assert!(matches!(
        feature.last(),
        Some(ProgressUpdate::Terminal(TaskOutcome::Ready { .. }))
    ));
    assert_eq!(subtitles.len(), 1);
    assert!(matches!(
        &subtitles[0],
        ProgressUpdate::Terminal(TaskOutcome::Failed {
            error: AcquisitionError::NoPlayableFile { .. }
        })
    ));
    assert_eq!(broken.len(), 1);
    let ProgressUpdate::Terminal(TaskOutcome::Failed { error }) = &broken[0] else {
        anyhow::bail!("expected rejection");
    };
    assert_eq!(error.kind(), "invalid_locator");
    assert_eq!(error.context().identifier.as_deref(), Some("broken"));

    assert_eq!(harness.orchestrator.active_downloads().await, 0);
    assert_eq!(harness.registry.len().await, 1);
    Ok(())
}

#[tokio::test]
async fn duplicate_admission_leaves_running_task_alone() -> anyhow::Result<()> {
    let harness = harness()?;
    let first = harness
        .orchestrator
        .add_magnet(&locator(FEATURE), "first")
        .await;
    let second = collect(
        harness
            .orchestrator
            .add_magnet(&locator(FEATURE), "second")
            .await,
    )
    .await?;
    assert_eq!(second.len(), 1);
    assert!(matches!(
        &second[0],
        ProgressUpdate::Terminal(TaskOutcome::Failed {
            error: AcquisitionError::DuplicateTransfer { .. }
        })
    ));

    let first = collect(first).await?;
    assert!(matches!(
        first.last(),
        Some(ProgressUpdate::Terminal(TaskOutcome::Ready { .. }))
    ));
    Ok(())
}

#[tokio::test]
async fn double_cancel_reports_cancelled_once() -> anyhow::Result<()> {
    let harness = harness()?;
    let magnet = locator(UNSEEDED);
    let stream = harness.orchestrator.add_magnet(&magnet, "").await;
    let control = harness
        .engine
        .local_transfer(&MagnetLocator::parse(&magnet)?.content_id())
        .ok_or_else(|| anyhow::anyhow!("transfer missing"))?;
    control.resolve_metadata(&[("film.mkv", 1024)]);
    control.deliver(0, &[0_u8; 100]).await?;

    harness.orchestrator.cancel_magnet(&magnet).await?;
    harness.orchestrator.cancel_magnet(&magnet).await?;

    let updates = collect(stream).await?;
    let Some(ProgressUpdate::Terminal(outcome)) = updates.last() else {
        anyhow::bail!("expected terminal update");
    };
    assert_eq!(outcome.state(), TaskState::Cancelled);
    assert!(matches!(
        outcome.error(),
        Some(AcquisitionError::TransferClosedUnexpectedly { .. })
    ));
    assert_eq!(harness.orchestrator.active_downloads().await, 0);
    assert!(harness.registry.is_empty().await);
    assert!(harness.orchestrator.active_tasks().is_empty());
    Ok(())
}

#[tokio::test]
async fn shutdown_cancels_running_tasks() -> anyhow::Result<()> {
    let harness = harness()?;
    let magnet = locator(UNSEEDED);
    let stream = harness.orchestrator.add_magnet(&magnet, "").await;
    let control = harness
        .engine
        .local_transfer(&MagnetLocator::parse(&magnet)?.content_id())
        .ok_or_else(|| anyhow::anyhow!("transfer missing"))?;
    control.resolve_metadata(&[("film.mkv", 1024)]);
    assert_eq!(harness.orchestrator.active_tasks().len(), 1);

    timeout(Duration::from_secs(15), harness.orchestrator.shutdown()).await?;
    assert!(harness.orchestrator.active_tasks().is_empty());
    assert!(harness.engine.transfers().is_empty());

    let updates = collect(stream).await?;
    assert!(matches!(
        updates.last(),
        Some(ProgressUpdate::Terminal(TaskOutcome::Cancelled { .. }))
    ));
    Ok(())
}

#[tokio::test]
async fn callback_adapter_reports_progress_then_error() -> anyhow::Result<()> {
    let harness = harness()?;
    let seen: Arc<Mutex<Vec<(Option<ProgressSnapshot>, Option<String>)>>> =
        Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handle = harness
        .orchestrator
        .add_magnet_with_callback(&locator(SUBTITLES), "subs", move |snapshot, error| {
            if let Ok(mut seen) = sink.lock() {
                seen.push((snapshot, error.map(|err| err.kind().to_string())));
            }
        })
        .await;
    timeout(Duration::from_secs(20), handle).await??;

    let seen = seen
        .lock()
        .map_err(|_| anyhow::anyhow!("callback log poisoned"))?;
    assert_eq!(seen.len(), 1);
    assert!(seen[0].0.is_none());
    assert_eq!(seen[0].1.as_deref(), Some("no_playable_file"));
    Ok(())
}
