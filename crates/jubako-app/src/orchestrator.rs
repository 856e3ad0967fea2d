//! Download orchestrator that drives one task per magnet from metadata
//! resolution through file selection and progress polling to registration in
//! the ready-file registry.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use jubako_swarm_core::{
    AcquisitionError, ContentId, EngineError, ErrorContext, MagnetLocator, ProgressSnapshot,
    ReadyFileRegistry, SwarmEngine, SwarmFile, Transfer, select_playable,
};
use jubako_telemetry::Metrics;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

/// Upper bound on the wait for transfer metadata.
pub const METADATA_TIMEOUT: Duration = Duration::from_secs(60);
/// Cadence of progress polling once a file is downloading.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);
/// Grace period granted to running tasks during [`Orchestrator::shutdown`].
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);
/// Progress items buffered per task before the task waits on its consumer.
pub const PROGRESS_BUFFER: usize = 64;

/// Highest percentage reported before the final update.
const IN_FLIGHT_CEILING: f64 = 99.99;

/// Ordered progress items of one acquisition task.
pub type ProgressStream = ReceiverStream<ProgressUpdate>;

/// One item of a task's progress sequence.
#[derive(Debug)]
pub enum ProgressUpdate {
    /// Intermediate progress while downloading.
    Progress(ProgressSnapshot),
    /// Final item; nothing follows it.
    Terminal(TaskOutcome),
}

/// How an acquisition task ended.
#[derive(Debug)]
pub enum TaskOutcome {
    /// Selected file completed and was registered.
    Ready {
        /// Final snapshot, always at exactly 100 percent.
        snapshot: ProgressSnapshot,
        /// Path registered in the ready-file registry.
        path: PathBuf,
    },
    /// Task failed.
    Failed {
        /// Failure reported to the caller.
        error: AcquisitionError,
    },
    /// Transfer was closed after a cancellation request.
    Cancelled {
        /// Close observed by the task.
        error: AcquisitionError,
    },
}

impl TaskOutcome {
    /// Terminal state for the outcome.
    #[must_use]
    pub const fn state(&self) -> TaskState {
        match self {
            Self::Ready { .. } => TaskState::Ready,
            Self::Failed { .. } => TaskState::Failed,
            Self::Cancelled { .. } => TaskState::Cancelled,
        }
    }

    /// Error carried by a failed or cancelled outcome.
    #[must_use]
    pub const fn error(&self) -> Option<&AcquisitionError> {
        match self {
            Self::Ready { .. } => None,
            Self::Failed { error } | Self::Cancelled { error } => Some(error),
        }
    }
}

/// Lifecycle states of an acquisition task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting for the transfer's file list.
    AwaitingMetadata,
    /// Selected file is downloading.
    Downloading,
    /// Selected file completed.
    Ready,
    /// Task ended with an error.
    Failed,
    /// Task ended after a cancellation request.
    Cancelled,
}

impl TaskState {
    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskEvent {
    MetadataReady,
    MetadataTimeout,
    Tick,
    Closed,
}

#[derive(Debug)]
enum Step {
    Emit(ProgressSnapshot),
    Idle,
    Finish(TaskOutcome),
}

struct TaskEntry {
    serial: u64,
    cancel_requested: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

type TaskTable = Arc<Mutex<HashMap<ContentId, TaskEntry>>>;

/// Coordinates acquisition tasks against a swarm engine and the shared registry.
#[derive(Clone)]
pub struct Orchestrator {
    engine: Arc<dyn SwarmEngine>,
    registry: ReadyFileRegistry,
    metrics: Metrics,
    tasks: TaskTable,
    serials: Arc<AtomicU64>,
}

impl Orchestrator {
    /// Construct an orchestrator over shared dependencies.
    #[must_use]
    pub fn new(engine: Arc<dyn SwarmEngine>, registry: ReadyFileRegistry, metrics: Metrics) -> Self {
        Self {
            engine,
            registry,
            metrics,
            tasks: Arc::new(Mutex::new(HashMap::new())),
            serials: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start acquiring the content behind `locator`.
    ///
    /// The returned stream yields progress while the selected file downloads
    /// and always ends with exactly one [`ProgressUpdate::Terminal`]. An empty
    /// `identifier` is replaced by the locator itself.
    pub async fn add_magnet(&self, locator: &str, identifier: &str) -> ProgressStream {
        let identifier = if identifier.is_empty() {
            locator
        } else {
            identifier
        };
        let context = ErrorContext::new(identifier, locator);
        let (updates, receiver) = mpsc::channel(PROGRESS_BUFFER);
        let stream = ReceiverStream::new(receiver);

        let magnet = match MagnetLocator::parse(locator) {
            Ok(magnet) => magnet,
            Err(err) => {
                self.reject(&updates, AcquisitionError::invalid_locator(context, err));
                return stream;
            }
        };
        let content_id = magnet.content_id();
        let transfer = match self.engine.add_magnet(&magnet).await {
            Ok(transfer) => transfer,
            Err(err) => {
                self.reject(&updates, AcquisitionError::invalid_locator(context, err));
                return stream;
            }
        };

        if let Err(error) = self.spawn_task(transfer, context, updates.clone()) {
            self.reject(&updates, error);
            return stream;
        }
        info!(content_id = %content_id, identifier, "acquisition task started");
        stream
    }

    /// Callback adapter over [`Self::add_magnet`].
    ///
    /// The callback receives `(Some(snapshot), None)` for each progress item,
    /// including the final 100 percent one, and `(None, Some(error))` once on
    /// failure or cancellation. The returned handle resolves after the last
    /// invocation.
    pub async fn add_magnet_with_callback<F>(
        &self,
        locator: &str,
        identifier: &str,
        mut callback: F,
    ) -> JoinHandle<()>
    where
        F: FnMut(Option<ProgressSnapshot>, Option<AcquisitionError>) + Send + 'static,
    {
        let mut stream = self.add_magnet(locator, identifier).await;
        tokio::spawn(async move {
            while let Some(update) = stream.next().await {
                match update {
                    ProgressUpdate::Progress(snapshot)
                    | ProgressUpdate::Terminal(TaskOutcome::Ready { snapshot, .. }) => {
                        callback(Some(snapshot), None);
                    }
                    ProgressUpdate::Terminal(
                        TaskOutcome::Failed { error } | TaskOutcome::Cancelled { error },
                    ) => callback(None, Some(error)),
                }
            }
        })
    }

    /// Ask the engine to drop the transfer behind `locator`.
    ///
    /// A running task observes the drop as a close and ends as cancelled.
    /// Unknown content is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`AcquisitionError::InvalidLocator`] when the locator cannot be parsed.
    pub async fn cancel_magnet(&self, locator: &str) -> Result<(), AcquisitionError> {
        let magnet = MagnetLocator::parse(locator).map_err(|err| {
            AcquisitionError::invalid_locator(ErrorContext::new(locator, locator), err)
        })?;
        let content_id = magnet.content_id();

        if let Some(entry) = self.lock_tasks().get(&content_id) {
            entry.cancel_requested.store(true, Ordering::SeqCst);
        }
        if self.engine.transfer(&content_id).is_none() {
            debug!(content_id = %content_id, "cancel requested for inactive content");
            return Ok(());
        }
        match self.engine.drop_transfer(&content_id).await {
            Ok(()) => info!(content_id = %content_id, "acquisition cancel requested"),
            Err(EngineError::TransferNotFound { .. }) => {
                debug!(content_id = %content_id, "transfer already dropped");
            }
            Err(err) => {
                warn!(content_id = %content_id, error = %err, "engine failed to drop transfer");
            }
        }
        Ok(())
    }

    /// Cancel every running task and wait for them to finish.
    ///
    /// Tasks still running after [`SHUTDOWN_GRACE`] are aborted.
    pub async fn shutdown(&self) {
        let entries: Vec<(ContentId, TaskEntry)> = self.lock_tasks().drain().collect();
        if entries.is_empty() {
            return;
        }
        info!(tasks = entries.len(), "cancelling acquisition tasks");

        for (content_id, entry) in &entries {
            entry.cancel_requested.store(true, Ordering::SeqCst);
            if let Err(err) = self.engine.drop_transfer(content_id).await {
                debug!(content_id = %content_id, error = %err, "transfer already gone at shutdown");
            }
        }

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        for (content_id, entry) in entries {
            let mut handle = entry.handle;
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(content_id = %content_id, error = %err, "acquisition task join failed");
                }
                Err(_) => {
                    warn!(content_id = %content_id, "acquisition task exceeded shutdown grace; aborting");
                    handle.abort();
                }
            }
        }
    }

    /// Tasks past metadata resolution and not yet terminal.
    pub async fn active_downloads(&self) -> usize {
        self.registry.active_downloads().await
    }

    /// Content identifiers of every running task.
    #[must_use]
    pub fn active_tasks(&self) -> Vec<ContentId> {
        self.lock_tasks().keys().copied().collect()
    }

    fn spawn_task(
        &self,
        transfer: Arc<dyn Transfer>,
        context: ErrorContext,
        updates: mpsc::Sender<ProgressUpdate>,
    ) -> Result<(), AcquisitionError> {
        let content_id = transfer.content_id();
        let mut tasks = self.lock_tasks();
        if tasks.contains_key(&content_id) {
            return Err(AcquisitionError::DuplicateTransfer {
                context,
                content_id,
            });
        }

        let serial = self.serials.fetch_add(1, Ordering::Relaxed);
        let cancel_requested = Arc::new(AtomicBool::new(false));
        let mut task = AcquisitionTask::new(
            transfer,
            Arc::clone(&self.engine),
            self.registry.clone(),
            self.metrics.clone(),
            context,
            Arc::clone(&cancel_requested),
        );
        let table = Arc::clone(&self.tasks);
        let handle = tokio::spawn(async move {
            let outcome = task.drive(&updates).await;
            task.record_outcome(&outcome);
            release_entry(&table, &content_id, serial);
            if updates.send(ProgressUpdate::Terminal(outcome)).await.is_err() {
                debug!(content_id = %content_id, "progress consumer dropped before terminal update");
            }
        });
        tasks.insert(
            content_id,
            TaskEntry {
                serial,
                cancel_requested,
                handle,
            },
        );
        Ok(())
    }

    fn reject(&self, updates: &mpsc::Sender<ProgressUpdate>, error: AcquisitionError) {
        warn!(
            error = %error,
            kind = error.kind(),
            locator = %error.context().locator,
            "acquisition request rejected"
        );
        self.metrics.inc_download_failed(error.kind());
        if updates
            .try_send(ProgressUpdate::Terminal(TaskOutcome::Failed { error }))
            .is_err()
        {
            debug!("progress consumer dropped before rejection");
        }
    }

    fn lock_tasks(&self) -> MutexGuard<'_, HashMap<ContentId, TaskEntry>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn release_entry(table: &TaskTable, content_id: &ContentId, serial: u64) {
    let mut tasks = table.lock().unwrap_or_else(PoisonError::into_inner);
    if tasks
        .get(content_id)
        .is_some_and(|entry| entry.serial == serial)
    {
        tasks.remove(content_id);
    }
}

/// Task-local state machine for one acquisition.
struct AcquisitionTask {
    transfer: Arc<dyn Transfer>,
    engine: Arc<dyn SwarmEngine>,
    registry: ReadyFileRegistry,
    metrics: Metrics,
    context: ErrorContext,
    cancel_requested: Arc<AtomicBool>,
    state: TaskState,
    selected: Option<SwarmFile>,
    last_percent: f64,
}

impl AcquisitionTask {
    fn new(
        transfer: Arc<dyn Transfer>,
        engine: Arc<dyn SwarmEngine>,
        registry: ReadyFileRegistry,
        metrics: Metrics,
        context: ErrorContext,
        cancel_requested: Arc<AtomicBool>,
    ) -> Self {
        Self {
            transfer,
            engine,
            registry,
            metrics,
            context,
            cancel_requested,
            state: TaskState::AwaitingMetadata,
            selected: None,
            last_percent: 0.0,
        }
    }

    /// Race the transfer signals and feed them to [`Self::handle`] until a
    /// terminal step.
    async fn drive(&mut self, updates: &mpsc::Sender<ProgressUpdate>) -> TaskOutcome {
        let transfer = Arc::clone(&self.transfer);
        let event = tokio::select! {
            biased;
            () = transfer.metadata_ready() => TaskEvent::MetadataReady,
            () = transfer.closed() => TaskEvent::Closed,
            () = tokio::time::sleep(METADATA_TIMEOUT) => TaskEvent::MetadataTimeout,
        };
        if let Step::Finish(outcome) = self.handle(event).await {
            return outcome;
        }

        let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        let mut attached = true;
        loop {
            let event = tokio::select! {
                biased;
                () = transfer.closed() => TaskEvent::Closed,
                _ = ticker.tick() => TaskEvent::Tick,
            };
            match self.handle(event).await {
                Step::Emit(snapshot) => {
                    if attached && updates.send(ProgressUpdate::Progress(snapshot)).await.is_err() {
                        attached = false;
                        debug!(
                            content_id = %self.transfer.content_id(),
                            "progress consumer dropped; download continues"
                        );
                    }
                }
                Step::Idle => {}
                Step::Finish(outcome) => return outcome,
            }
        }
    }

    async fn handle(&mut self, event: TaskEvent) -> Step {
        match (self.state, event) {
            (TaskState::AwaitingMetadata, TaskEvent::MetadataReady) => {
                self.enter_downloading().await
            }
            (TaskState::AwaitingMetadata, TaskEvent::MetadataTimeout) => {
                self.release_transfer().await;
                self.fail(AcquisitionError::MetadataTimeout {
                    context: self.context.clone(),
                })
            }
            (TaskState::AwaitingMetadata, TaskEvent::Closed) => self.closed(),
            (TaskState::Downloading, TaskEvent::Tick) => self.poll().await,
            (TaskState::Downloading, TaskEvent::Closed) => {
                self.decrement_active().await;
                self.closed()
            }
            _ => Step::Idle,
        }
    }

    async fn enter_downloading(&mut self) -> Step {
        let count = self.registry.increment_active().await;
        self.metrics.set_active_downloads(count);
        self.state = TaskState::Downloading;

        let files = self.transfer.files();
        let Some(file) = select_playable(&files).cloned() else {
            self.release_transfer().await;
            self.decrement_active().await;
            return self.fail(AcquisitionError::NoPlayableFile {
                context: self.context.clone(),
            });
        };

        if let Err(source) = self.transfer.start_download(file.index) {
            if self.transfer.is_closed() {
                self.decrement_active().await;
                return self.closed();
            }
            self.release_transfer().await;
            self.decrement_active().await;
            return self.fail(AcquisitionError::Engine {
                context: self.context.clone(),
                source,
            });
        }
        info!(
            content_id = %self.transfer.content_id(),
            file = %file.path,
            length = file.length,
            "selected file downloading"
        );
        self.selected = Some(file);
        Step::Idle
    }

    async fn poll(&mut self) -> Step {
        let Some(file) = self.selected.clone() else {
            return Step::Idle;
        };
        let progress = self.transfer.progress(file.index);
        if progress.total == 0 {
            return Step::Idle;
        }

        if !progress.is_complete() {
            let percent = progress
                .percent()
                .min(IN_FLIGHT_CEILING)
                .max(self.last_percent);
            self.last_percent = percent;
            return Step::Emit(self.snapshot(&file, percent));
        }

        let path = match self.transfer.local_path(file.index) {
            Ok(path) => path,
            Err(source) => {
                self.decrement_active().await;
                return self.fail(AcquisitionError::Engine {
                    context: self.context.clone(),
                    source,
                });
            }
        };
        let count = self
            .registry
            .complete(self.transfer.content_id(), path.clone())
            .await;
        self.metrics.set_active_downloads(count);
        self.state = TaskState::Ready;
        Step::Finish(TaskOutcome::Ready {
            snapshot: self.snapshot(&file, 100.0),
            path,
        })
    }

    fn closed(&mut self) -> Step {
        let error = AcquisitionError::TransferClosedUnexpectedly {
            context: self.context.clone(),
        };
        if self.cancel_requested.load(Ordering::SeqCst) {
            self.state = TaskState::Cancelled;
            Step::Finish(TaskOutcome::Cancelled { error })
        } else {
            self.fail(error)
        }
    }

    fn fail(&mut self, error: AcquisitionError) -> Step {
        self.state = TaskState::Failed;
        Step::Finish(TaskOutcome::Failed { error })
    }

    fn snapshot(&self, file: &SwarmFile, percent: f64) -> ProgressSnapshot {
        ProgressSnapshot {
            content_id: self.transfer.content_id(),
            path: file.path.clone(),
            percent,
            active_peers: self.transfer.active_peers(),
        }
    }

    async fn decrement_active(&self) {
        let count = self.registry.decrement_active().await;
        self.metrics.set_active_downloads(count);
    }

    async fn release_transfer(&self) {
        let content_id = self.transfer.content_id();
        if let Err(err) = self.engine.drop_transfer(&content_id).await {
            debug!(content_id = %content_id, error = %err, "transfer already released");
        }
    }

    fn record_outcome(&self, outcome: &TaskOutcome) {
        let content_id = self.transfer.content_id();
        match outcome {
            TaskOutcome::Ready { path, .. } => {
                self.metrics.inc_download_completed();
                info!(content_id = %content_id, path = %path.display(), "download ready");
            }
            TaskOutcome::Failed { error } => {
                self.metrics.inc_download_failed(error.kind());
                warn!(
                    content_id = %content_id,
                    error = %error,
                    kind = error.kind(),
                    "acquisition failed"
                );
            }
            TaskOutcome::Cancelled { .. } => {
                self.metrics.inc_download_failed("cancelled");
                info!(content_id = %content_id, "acquisition cancelled");
            }
        }
    }
}
