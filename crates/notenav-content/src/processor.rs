//! Batch processor driving one content provider.
//!
//! Files are queued, debounced, then processed in bounded batches. Each
//! batch runs its jobs in chunks of `parallel_limit` concurrent futures,
//! yields between chunks, and ends with a single batched database write.
//!
//! Every stop increments the processor's session. Work captures the session
//! it started in and becomes a no-op once the session moves on, so results
//! from before a stop never touch the state of the next start. A batch task
//! that outlives its session still counts as busy until it exits, so
//! batches never overlap.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use notenav_core::{
    defaults, logging, ContentJob, ContentProvider, ContentSettings, ContentType, ContentUpdate,
    ContentValue, Error, FileData, FileDatabase, ProcessedMtimeUpdate, ProviderBatchUpdate,
    Result, ShutdownSignal, Vault, VaultFile,
};

use crate::config::ProcessorConfig;
use crate::queue::{Enqueued, JobQueue};
use crate::retry::{RetryDecision, RetryScheduler};

/// Event emitted by a content processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorEvent {
    /// `start_processing` was called.
    ProcessingStarted { provider: ContentType },
    /// `stop_processing` ended an active session.
    ProcessingStopped { provider: ContentType, session: u64 },
    /// A batch was taken from the queue.
    BatchStarted {
        provider: ContentType,
        jobs: usize,
        skipped: usize,
    },
    /// A batch ran to completion.
    BatchCompleted {
        provider: ContentType,
        processed: usize,
        failed: usize,
        written: bool,
    },
    /// The batched database write failed.
    BatchWriteFailed { provider: ContentType, error: String },
    /// A failed file will be re-queued after `delay`.
    RetryScheduled {
        provider: ContentType,
        path: String,
        attempts: u32,
        delay: Duration,
    },
    /// A file failed too often and was dropped.
    RetryExhausted {
        provider: ContentType,
        path: String,
        attempts: u32,
    },
}

/// Snapshot of a processor's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorStatus {
    pub session: u64,
    pub stopped: bool,
    pub processing: bool,
    pub debouncing: bool,
    pub queued: usize,
    pub in_flight: usize,
    pub retrying: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Activity {
    /// A batch (or a chain of batches) is in flight.
    processing: bool,
    /// Work is waiting on the debounce timer, the queue or a retry.
    pending: bool,
}

struct State {
    queue: JobQueue,
    retry: RetryScheduler,
    settings: Option<Arc<ContentSettings>>,
    session: u64,
    stopped: bool,
    /// The current session owns the batch task.
    processing: bool,
    /// A batch task is running, possibly for an earlier session.
    batch_active: bool,
    abort: CancellationToken,
    debounce: Option<JoinHandle<()>>,
    debounce_seq: u64,
    retry_timer: Option<(Instant, JoinHandle<()>)>,
    retry_seq: u64,
}

impl State {
    fn activity(&self) -> Activity {
        let pending = !self.stopped
            && self.settings.is_some()
            && (self.debounce.is_some() || !self.queue.is_empty() || self.retry_timer.is_some());
        Activity {
            processing: self.processing || self.batch_active,
            pending,
        }
    }
}

struct Inner {
    provider: Arc<dyn ContentProvider>,
    kind: ContentType,
    db: Arc<dyn FileDatabase>,
    vault: Arc<dyn Vault>,
    shutdown: Arc<dyn ShutdownSignal>,
    config: ProcessorConfig,
    state: Mutex<State>,
    activity: watch::Sender<Activity>,
    events: broadcast::Sender<ProcessorEvent>,
}

/// Jobs taken from the queue for one batch.
struct Batch {
    jobs: Vec<(ContentJob, Option<FileData>)>,
    settings: Arc<ContentSettings>,
    abort: CancellationToken,
}

#[derive(Debug, Default)]
struct BatchSummary {
    processed: usize,
    failed: usize,
    written: bool,
}

enum JobResult {
    Processed {
        path: String,
        mtime: i64,
        expected_previous_mtime: Option<i64>,
        update: Option<ContentValue>,
    },
    Failed {
        path: String,
    },
}

/// Queue-driven processor for one content provider.
///
/// Cheap to clone; clones share state. Methods that arm timers must run
/// inside a tokio runtime.
#[derive(Clone)]
pub struct ContentProcessor {
    inner: Arc<Inner>,
}

impl ContentProcessor {
    pub fn new(
        provider: Arc<dyn ContentProvider>,
        db: Arc<dyn FileDatabase>,
        vault: Arc<dyn Vault>,
        shutdown: Arc<dyn ShutdownSignal>,
        mut config: ProcessorConfig,
    ) -> Self {
        config.batch_size = config.batch_size.max(1);
        config.parallel_limit = config.parallel_limit.max(1);
        let (events, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        let (activity, _) = watch::channel(Activity::default());
        let kind = provider.content_type();
        let state = State {
            queue: JobQueue::new(),
            retry: RetryScheduler::new(config.retry),
            settings: None,
            session: 0,
            stopped: false,
            processing: false,
            batch_active: false,
            abort: CancellationToken::new(),
            debounce: None,
            debounce_seq: 0,
            retry_timer: None,
            retry_seq: 0,
        };

        Self {
            inner: Arc::new(Inner {
                provider,
                kind,
                db,
                vault,
                shutdown,
                config,
                state: Mutex::new(state),
                activity,
                events,
            }),
        }
    }

    pub fn content_type(&self) -> ContentType {
        self.inner.kind
    }

    pub fn provider(&self) -> &Arc<dyn ContentProvider> {
        &self.inner.provider
    }

    /// Get a receiver for processor events.
    pub fn events(&self) -> broadcast::Receiver<ProcessorEvent> {
        self.inner.events.subscribe()
    }

    pub fn settings(&self) -> Option<Arc<ContentSettings>> {
        self.lock().settings.clone()
    }

    pub fn session(&self) -> u64 {
        self.lock().session
    }

    pub fn status(&self) -> ProcessorStatus {
        let state = self.lock();
        ProcessorStatus {
            session: state.session,
            stopped: state.stopped,
            processing: state.processing || state.batch_active,
            debouncing: state.debounce.is_some(),
            queued: state.queue.len(),
            in_flight: state.queue.processing_len(),
            retrying: state.retry.len(),
        }
    }

    /// Failures recorded for `path`, if it is waiting on a retry.
    pub fn retry_attempts(&self, path: &str) -> Option<u32> {
        self.lock().retry.attempts(path)
    }

    /// Add files to the queue.
    ///
    /// Files already queued keep their place with a refreshed snapshot.
    /// Files mid-processing are replayed after their batch. Processing
    /// starts after the debounce period once settings are known.
    pub fn queue_files<I>(&self, files: I)
    where
        I: IntoIterator<Item = VaultFile>,
    {
        let mut state = self.lock();
        self.enqueue_locked(&mut state, files);
        self.publish(&state);
    }

    /// Begin (or resume) processing with `settings`.
    pub fn start_processing(&self, settings: Arc<ContentSettings>) {
        let mut state = self.lock();
        state.stopped = false;
        state.settings = Some(settings);
        self.arm_debounce(&mut state);
        self.publish(&state);

        info!(
            subsystem = logging::SUBSYSTEM_CONTENT,
            provider = %self.inner.kind,
            session = state.session,
            queue_len = state.queue.len(),
            "Content processing started"
        );
        self.emit(ProcessorEvent::ProcessingStarted {
            provider: self.inner.kind,
        });
    }

    /// Replace the settings snapshot without restarting.
    pub fn update_settings(&self, settings: Arc<ContentSettings>) {
        let mut state = self.lock();
        state.settings = Some(settings);
        self.maybe_arm_debounce(&mut state);
        self.publish(&state);
    }

    /// Cancel everything and forget all pending work. Idempotent.
    pub fn stop_processing(&self) {
        let mut state = self.lock();
        state.session += 1;
        let was_running = !state.stopped;
        state.stopped = true;
        state.abort.cancel();
        state.abort = CancellationToken::new();
        self.cancel_debounce(&mut state);
        state.retry.clear_all();
        self.rearm_retry_timer(&mut state);
        state.queue.clear();
        state.processing = false;
        self.publish(&state);

        if was_running {
            info!(
                subsystem = logging::SUBSYSTEM_CONTENT,
                provider = %self.inner.kind,
                session = state.session,
                "Content processing stopped"
            );
            self.emit(ProcessorEvent::ProcessingStopped {
                provider: self.inner.kind,
                session: state.session,
            });
        }
    }

    /// Stop, drop this provider's stored content, and reprocess `files`
    /// under `settings`.
    pub async fn clear_and_requeue(&self, settings: Arc<ContentSettings>, files: Vec<VaultFile>) {
        self.stop_processing();
        if let Err(e) = self
            .inner
            .provider
            .clear_content(self.inner.db.as_ref())
            .await
        {
            error!(
                subsystem = logging::SUBSYSTEM_CONTENT,
                provider = %self.inner.kind,
                error = %e,
                "Failed to clear provider content"
            );
        }
        self.queue_files(files);
        self.start_processing(settings);
    }

    /// Resolve once no batch is in flight, including chained batches.
    pub async fn wait_for_idle(&self) {
        let mut rx = self.inner.activity.subscribe();
        let _ = rx.wait_for(|a| !a.processing).await;
    }

    /// Resolve once nothing is in flight, debouncing, queued or awaiting a
    /// retry.
    pub async fn settle(&self) {
        let mut rx = self.inner.activity.subscribe();
        let _ = rx.wait_for(|a| !a.processing && !a.pending).await;
    }

    // ------------------------------------------------------------------
    // Queue and timers
    // ------------------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock()
    }

    fn publish(&self, state: &State) {
        let activity = state.activity();
        self.inner.activity.send_if_modified(|current| {
            if *current == activity {
                false
            } else {
                *current = activity;
                true
            }
        });
    }

    fn emit(&self, event: ProcessorEvent) {
        let _ = self.inner.events.send(event);
    }

    fn enqueue_locked<I>(&self, state: &mut State, files: I)
    where
        I: IntoIterator<Item = VaultFile>,
    {
        let mut queued = 0usize;
        let mut deferred = 0usize;
        for file in files {
            match state.queue.enqueue(file) {
                Enqueued::Queued => queued += 1,
                Enqueued::Refreshed => {}
                Enqueued::Deferred => deferred += 1,
            }
        }
        if queued > 0 || deferred > 0 {
            trace!(
                provider = %self.inner.kind,
                queued,
                deferred,
                queue_len = state.queue.len(),
                "Files queued"
            );
        }
        self.maybe_arm_debounce(state);
    }

    fn maybe_arm_debounce(&self, state: &mut State) {
        if state.settings.is_some()
            && !state.stopped
            && !state.processing
            && !state.batch_active
            && state.debounce.is_none()
            && !state.queue.is_empty()
        {
            self.arm_debounce(state);
        }
    }

    fn cancel_debounce(&self, state: &mut State) {
        if let Some(handle) = state.debounce.take() {
            handle.abort();
        }
        state.debounce_seq += 1;
    }

    fn arm_debounce(&self, state: &mut State) {
        self.cancel_debounce(state);
        let seq = state.debounce_seq;
        let delay = self.inner.config.debounce;
        let weak = Arc::downgrade(&self.inner);

        state.debounce = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                ContentProcessor { inner }.on_debounce_elapsed(seq);
            }
        }));
        debug!(
            provider = %self.inner.kind,
            delay_ms = delay.as_millis() as u64,
            "Debounce armed"
        );
    }

    fn on_debounce_elapsed(&self, seq: u64) {
        let mut state = self.lock();
        if state.debounce_seq != seq {
            return;
        }
        state.debounce = None;

        // A batch left over from before a stop re-arms the timer on exit.
        if state.stopped
            || state.processing
            || state.batch_active
            || state.settings.is_none()
            || state.queue.is_empty()
        {
            self.publish(&state);
            return;
        }

        state.processing = true;
        state.batch_active = true;
        let session = state.session;
        self.publish(&state);
        drop(state);

        let guard = DriveGuard {
            processor: self.clone(),
            session,
        };
        tokio::spawn(async move {
            guard.processor.drive(session).await;
            drop(guard);
        });
    }

    fn rearm_retry_timer(&self, state: &mut State) {
        let next = state.retry.next_deadline();
        if let Some((armed_at, _)) = &state.retry_timer {
            if Some(*armed_at) == next {
                return;
            }
        }
        if let Some((_, handle)) = state.retry_timer.take() {
            handle.abort();
        }
        state.retry_seq += 1;

        let Some(deadline) = next else {
            return;
        };
        let seq = state.retry_seq;
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = weak.upgrade() {
                ContentProcessor { inner }.on_retry_timer(seq);
            }
        });
        state.retry_timer = Some((deadline, handle));
    }

    fn on_retry_timer(&self, seq: u64) {
        let mut state = self.lock();
        if state.retry_seq != seq || state.stopped {
            return;
        }
        state.retry_timer = None;

        let due = state.retry.take_due(Instant::now());
        let mut files = Vec::with_capacity(due.len());
        for path in due {
            match self.inner.vault.file(&path) {
                Some(file) => files.push(file),
                None => {
                    state.retry.clear(&path);
                    debug!(
                        provider = %self.inner.kind,
                        path = %path,
                        "Dropping retry for missing file"
                    );
                }
            }
        }

        if !files.is_empty() {
            debug!(
                provider = %self.inner.kind,
                count = files.len(),
                "Re-queueing files for retry"
            );
            self.enqueue_locked(&mut state, files);
        }
        self.rearm_retry_timer(&mut state);
        self.publish(&state);
    }

    // ------------------------------------------------------------------
    // Batches
    // ------------------------------------------------------------------

    #[instrument(skip_all, fields(provider = %self.inner.kind, session = session))]
    async fn drive(&self, session: u64) {
        loop {
            let batch = self.take_batch(session);
            let paths: Vec<String> = batch
                .as_ref()
                .map(|b| b.jobs.iter().map(|(job, _)| job.path().to_string()).collect())
                .unwrap_or_default();

            if let Some(batch) = batch {
                let start = std::time::Instant::now();
                match self.execute_batch(session, batch).await {
                    Ok(summary) => {
                        debug!(
                            processed = summary.processed,
                            failed = summary.failed,
                            written = summary.written,
                            duration_ms = start.elapsed().as_millis() as u64,
                            "Content batch completed"
                        );
                        self.emit(ProcessorEvent::BatchCompleted {
                            provider: self.inner.kind,
                            processed: summary.processed,
                            failed: summary.failed,
                            written: summary.written,
                        });
                    }
                    Err(e) if e.is_cancelled() => {
                        trace!("Content batch cancelled");
                    }
                    Err(e) => {
                        error!(error = %e, "Content batch write failed");
                        self.emit(ProcessorEvent::BatchWriteFailed {
                            provider: self.inner.kind,
                            error: e.to_string(),
                        });
                    }
                }
            }

            if !self.finish_batch(session, &paths) {
                break;
            }
            tokio::task::yield_now().await;
        }
    }

    fn take_batch(&self, session: u64) -> Option<Batch> {
        let mut state = self.lock();
        if state.session != session || state.stopped {
            return None;
        }
        let settings = state.settings.clone()?;

        let jobs = state.queue.take(self.inner.config.batch_size);
        let now = Instant::now();
        let mut ready = Vec::with_capacity(jobs.len());
        let mut skipped = 0usize;

        for job in jobs {
            let Some(file) = self.inner.vault.file(job.path()) else {
                trace!(path = %job.path(), "File vanished before processing");
                state.retry.clear(job.path());
                skipped += 1;
                continue;
            };
            let job = if file == job.file {
                job
            } else {
                ContentJob::new(file)
            };

            let file_data = self.inner.db.get_file(job.path());
            let needed = panic::catch_unwind(AssertUnwindSafe(|| {
                self.inner
                    .provider
                    .needs_processing(file_data.as_ref(), &job.file, &settings)
            }));
            match needed {
                Ok(true) => ready.push((job, file_data)),
                Ok(false) => {
                    state.retry.clear(job.path());
                    skipped += 1;
                }
                Err(_) => {
                    error!(path = %job.path(), "Content provider panicked checking file");
                    self.register_failure_locked(&mut state, job.path().to_string(), now);
                    skipped += 1;
                }
            }
        }

        state
            .queue
            .mark_processing(ready.iter().map(|(job, _)| job.path()));
        self.rearm_retry_timer(&mut state);
        self.publish(&state);

        debug!(
            batch_size = ready.len(),
            skipped,
            queue_len = state.queue.len(),
            "Content batch taken"
        );
        self.emit(ProcessorEvent::BatchStarted {
            provider: self.inner.kind,
            jobs: ready.len(),
            skipped,
        });

        Some(Batch {
            jobs: ready,
            settings,
            abort: state.abort.clone(),
        })
    }

    async fn execute_batch(&self, session: u64, batch: Batch) -> Result<BatchSummary> {
        let Batch {
            jobs,
            settings,
            abort,
        } = batch;
        let mut staged = ProviderBatchUpdate::new(self.inner.kind);
        let mut summary = BatchSummary::default();

        for chunk in jobs.chunks(self.inner.config.parallel_limit) {
            self.ensure_current(session, &abort)?;

            let pending = chunk
                .iter()
                .map(|(job, data)| self.process_job(job, data.as_ref(), &settings));
            let results = tokio::select! {
                biased;
                _ = abort.cancelled() => return Err(Error::Cancelled),
                results = join_all(pending) => results,
            };

            self.record_results(session, results, &mut staged, &mut summary)?;

            tokio::task::yield_now().await;
            self.ensure_current(session, &abort)?;
        }

        if staged.is_empty() {
            return Ok(summary);
        }
        self.ensure_current(session, &abort)?;
        if self.inner.shutdown.is_shutdown_in_progress() {
            debug!("Shutdown in progress, skipping batch write");
            return Ok(summary);
        }

        let write = self
            .inner
            .db
            .batch_update_file_content_and_provider_processed_mtimes(staged);
        tokio::select! {
            biased;
            _ = abort.cancelled() => return Err(Error::Cancelled),
            result = write => result?,
        }
        summary.written = true;
        Ok(summary)
    }

    async fn process_job(
        &self,
        job: &ContentJob,
        file_data: Option<&FileData>,
        settings: &ContentSettings,
    ) -> JobResult {
        let path = job.path().to_string();
        let mtime = self
            .inner
            .vault
            .file(&path)
            .map(|f| f.mtime)
            .unwrap_or(job.file.mtime);
        let expected_previous_mtime = file_data.and_then(|d| d.processed_mtime(self.inner.kind));

        let extraction = self.inner.provider.process_file(job, file_data, settings);
        match AssertUnwindSafe(extraction).catch_unwind().await {
            Ok(Ok(outcome)) if outcome.processed => JobResult::Processed {
                path,
                mtime,
                expected_previous_mtime,
                update: outcome.update,
            },
            Ok(Ok(_)) => {
                debug!(path = %path, "Provider left file unprocessed");
                JobResult::Failed { path }
            }
            Ok(Err(e)) => {
                warn!(path = %path, error = %e, "Content extraction failed");
                JobResult::Failed { path }
            }
            Err(_) => {
                error!(path = %path, "Content provider panicked");
                JobResult::Failed { path }
            }
        }
    }

    fn record_results(
        &self,
        session: u64,
        results: Vec<JobResult>,
        staged: &mut ProviderBatchUpdate,
        summary: &mut BatchSummary,
    ) -> Result<()> {
        let mut state = self.lock();
        if state.session != session {
            return Err(Error::Cancelled);
        }

        let now = Instant::now();
        for result in results {
            match result {
                JobResult::Processed {
                    path,
                    mtime,
                    expected_previous_mtime,
                    update,
                } => {
                    state.retry.clear(&path);
                    if let Some(value) = update {
                        staged.content_updates.push(ContentUpdate {
                            path: path.clone(),
                            value,
                        });
                    }
                    staged.processed_mtime_updates.push(ProcessedMtimeUpdate {
                        path,
                        mtime,
                        expected_previous_mtime,
                    });
                    summary.processed += 1;
                }
                JobResult::Failed { path } => {
                    summary.failed += 1;
                    self.register_failure_locked(&mut state, path, now);
                }
            }
        }

        self.rearm_retry_timer(&mut state);
        self.publish(&state);
        Ok(())
    }

    fn register_failure_locked(&self, state: &mut State, path: String, now: Instant) {
        match state.retry.register_failure(&path, now) {
            RetryDecision::Scheduled { attempts, delay } => {
                debug!(
                    path = %path,
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Retry scheduled"
                );
                self.emit(ProcessorEvent::RetryScheduled {
                    provider: self.inner.kind,
                    path,
                    attempts,
                    delay,
                });
            }
            RetryDecision::Exhausted { attempts } => {
                error!(
                    path = %path,
                    attempt = attempts,
                    "Giving up on file after repeated failures"
                );
                self.emit(ProcessorEvent::RetryExhausted {
                    provider: self.inner.kind,
                    path,
                    attempts,
                });
            }
        }
    }

    fn ensure_current(&self, session: u64, abort: &CancellationToken) -> Result<()> {
        if abort.is_cancelled() || self.lock().session != session {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Clear the batch's processing marks and replay deferred files.
    /// Returns whether another batch should run.
    fn finish_batch(&self, session: u64, paths: &[String]) -> bool {
        let mut state = self.lock();
        if state.session != session {
            return false;
        }

        let replay = state
            .queue
            .finish_processing(paths.iter().map(String::as_str));
        for file in replay {
            state.queue.enqueue(file);
        }

        !state.stopped && state.settings.is_some() && !state.queue.is_empty()
    }

    /// Runs when the batch task ends, normally or by unwinding.
    fn on_drive_exit(&self, session: u64) {
        let mut state = self.lock();
        state.batch_active = false;
        if state.session == session {
            state.processing = false;
            let replay = state.queue.finish_all();
            for file in replay {
                state.queue.enqueue(file);
            }
        }
        self.maybe_arm_debounce(&mut state);
        self.publish(&state);
    }
}

/// Releases the batch task's claim on the processor when dropped.
struct DriveGuard {
    processor: ContentProcessor,
    session: u64,
}

impl Drop for DriveGuard {
    fn drop(&mut self) {
        self.processor.on_drive_exit(self.session);
    }
}
