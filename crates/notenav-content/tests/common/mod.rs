//! Shared fixtures for processor and service tests.
//!
//! The mocks never touch real I/O so processor tests can run with paused
//! time.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;

use notenav_content::{ContentProcessor, ProcessorConfig, ProcessorEvent};
use notenav_core::{
    is_stale, ContentJob, ContentProvider, ContentSettings, ContentType, ContentValue, Error,
    FileData, FileDatabase, ProcessOutcome, ProviderBatchUpdate, Result, SettingKey,
    ShutdownFlag, Vault, VaultFile,
};

// ============================================================================
// VAULT
// ============================================================================

#[derive(Default)]
pub struct MockVault {
    files: RwLock<HashMap<String, VaultFile>>,
}

impl MockVault {
    pub fn insert(&self, path: &str, mtime: i64) -> VaultFile {
        let file = VaultFile::new(path, mtime);
        self.files.write().insert(path.to_string(), file.clone());
        file
    }

    pub fn remove(&self, path: &str) {
        self.files.write().remove(path);
    }
}

#[async_trait]
impl Vault for MockVault {
    fn file(&self, path: &str) -> Option<VaultFile> {
        self.files.read().get(path).cloned()
    }

    fn files(&self) -> Vec<VaultFile> {
        let mut files: Vec<VaultFile> = self.files.read().values().cloned().collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    async fn read(&self, file: &VaultFile) -> Result<String> {
        if self.files.read().contains_key(&file.path) {
            Ok(String::new())
        } else {
            Err(Error::NotFound(file.path.clone()))
        }
    }
}

// ============================================================================
// DATABASE
// ============================================================================

/// In-memory `FileDatabase` applying the same optimistic guard as the
/// SQLite store and recording every accepted write.
#[derive(Default)]
pub struct MockDb {
    records: RwLock<HashMap<String, FileData>>,
    writes: Mutex<Vec<ProviderBatchUpdate>>,
    cleared: Mutex<Vec<ContentType>>,
    fail_writes: AtomicBool,
    write_delay: Mutex<Duration>,
    writes_in_flight: AtomicUsize,
    max_writes_in_flight: AtomicUsize,
}

impl MockDb {
    pub fn insert(&self, path: &str, mtime: i64) {
        self.records
            .write()
            .insert(path.to_string(), FileData::new(path, mtime));
    }

    pub fn record(&self, path: &str) -> Option<FileData> {
        self.records.read().get(path).cloned()
    }

    pub fn set_processed(&self, path: &str, kind: ContentType, mtime: i64) {
        if let Some(data) = self.records.write().get_mut(path) {
            data.set_processed_mtime(kind, mtime);
        }
    }

    pub fn set_content(&self, path: &str, value: ContentValue) {
        if let Some(data) = self.records.write().get_mut(path) {
            data.apply(value);
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Every write sleeps `delay` before it is applied.
    pub fn set_write_delay(&self, delay: Duration) {
        *self.write_delay.lock() = delay;
    }

    pub fn writes_in_flight(&self) -> usize {
        self.writes_in_flight.load(Ordering::SeqCst)
    }

    pub fn max_writes_in_flight(&self) -> usize {
        self.max_writes_in_flight.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> Vec<ProviderBatchUpdate> {
        self.writes.lock().clone()
    }

    /// Accepted processed-mtime updates for `path` across all writes.
    pub fn write_count_for(&self, path: &str) -> usize {
        self.writes
            .lock()
            .iter()
            .flat_map(|w| w.processed_mtime_updates.iter())
            .filter(|u| u.path == path)
            .count()
    }

    pub fn cleared(&self) -> Vec<ContentType> {
        self.cleared.lock().clone()
    }
}

#[async_trait]
impl FileDatabase for MockDb {
    fn get_file(&self, path: &str) -> Option<FileData> {
        self.record(path)
    }

    async fn batch_update_file_content_and_provider_processed_mtimes(
        &self,
        batch: ProviderBatchUpdate,
    ) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Internal("scripted write failure".into()));
        }

        let now = self.writes_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_writes_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.writes_in_flight);
        let delay = *self.write_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut records = self.records.write();
        let mut accepted = ProviderBatchUpdate::new(batch.provider);
        let mut accepted_paths = HashSet::new();

        for update in batch.processed_mtime_updates {
            let Some(data) = records.get_mut(&update.path) else {
                continue;
            };
            if data.processed_mtime(batch.provider) != update.expected_previous_mtime {
                continue;
            }
            data.set_processed_mtime(batch.provider, update.mtime);
            accepted_paths.insert(update.path.clone());
            accepted.processed_mtime_updates.push(update);
        }
        for update in batch.content_updates {
            if !accepted_paths.contains(&update.path) {
                continue;
            }
            if let Some(data) = records.get_mut(&update.path) {
                data.apply(update.value.clone());
            }
            accepted.content_updates.push(update);
        }

        self.writes.lock().push(accepted);
        Ok(())
    }

    async fn clear_provider_content(&self, kind: ContentType) -> Result<()> {
        for data in self.records.write().values_mut() {
            data.clear(kind);
        }
        self.cleared.lock().push(kind);
        Ok(())
    }
}

// ============================================================================
// PROVIDER
// ============================================================================

/// Behaviour of one scripted `process_file` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Tags become `[mtime]`.
    Succeed,
    NotProcessed,
    Fail,
    Panic,
}

/// Tags provider whose results are scripted per path.
pub struct ScriptedProvider {
    delay: Duration,
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    always: Mutex<HashMap<String, Step>>,
    calls: Mutex<Vec<String>>,
    panic_on_check: Mutex<HashSet<String>>,
    completed: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    /// Each call sleeps `delay` before returning.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            scripts: Mutex::new(HashMap::new()),
            always: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            panic_on_check: Mutex::new(HashSet::new()),
            completed: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Queue steps for `path`; once exhausted the path succeeds.
    pub fn script(&self, path: &str, steps: &[Step]) {
        self.scripts
            .lock()
            .entry(path.to_string())
            .or_default()
            .extend(steps.iter().copied());
    }

    /// Every call for `path` takes `step`.
    pub fn always(&self, path: &str, step: Step) {
        self.always.lock().insert(path.to_string(), step);
    }

    /// `needs_processing` panics for `path`.
    pub fn panic_on_check(&self, path: &str) {
        self.panic_on_check.lock().insert(path.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, path: &str) -> usize {
        self.calls.lock().iter().filter(|p| *p == path).count()
    }

    /// Calls that ran to the end of their delay.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_step(&self, path: &str) -> Step {
        if let Some(step) = self
            .scripts
            .lock()
            .get_mut(path)
            .and_then(|steps| steps.pop_front())
        {
            return step;
        }
        self.always
            .lock()
            .get(path)
            .copied()
            .unwrap_or(Step::Succeed)
    }
}

#[async_trait]
impl ContentProvider for ScriptedProvider {
    fn content_type(&self) -> ContentType {
        ContentType::Tags
    }

    fn relevant_settings(&self) -> &'static [SettingKey] {
        &[SettingKey::ShowTags]
    }

    fn needs_processing(
        &self,
        file_data: Option<&FileData>,
        file: &VaultFile,
        _settings: &ContentSettings,
    ) -> bool {
        if self.panic_on_check.lock().contains(&file.path) {
            panic!("scripted check panic for {}", file.path);
        }
        is_stale(ContentType::Tags, file_data, file)
    }

    async fn process_file(
        &self,
        job: &ContentJob,
        _file_data: Option<&FileData>,
        _settings: &ContentSettings,
    ) -> Result<ProcessOutcome> {
        self.calls.lock().push(job.path().to_string());
        let step = self.next_step(job.path());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);

        match step {
            Step::Succeed => Ok(ProcessOutcome::updated(ContentValue::Tags(Some(vec![
                job.file.mtime.to_string(),
            ])))),
            Step::NotProcessed => Ok(ProcessOutcome::not_processed()),
            Step::Fail => Err(Error::Extraction("scripted failure".into())),
            Step::Panic => panic!("scripted panic for {}", job.path()),
        }
    }
}

// ============================================================================
// HARNESS
// ============================================================================

pub struct Harness {
    pub vault: Arc<MockVault>,
    pub db: Arc<MockDb>,
    pub provider: Arc<ScriptedProvider>,
    pub shutdown: ShutdownFlag,
    pub processor: ContentProcessor,
}

impl Harness {
    pub fn new(config: ProcessorConfig, provider: ScriptedProvider) -> Self {
        let vault = Arc::new(MockVault::default());
        let db = Arc::new(MockDb::default());
        let provider = Arc::new(provider);
        let shutdown = ShutdownFlag::new();
        let processor = ContentProcessor::new(
            provider.clone(),
            db.clone(),
            vault.clone(),
            Arc::new(shutdown.clone()),
            config,
        );
        Self {
            vault,
            db,
            provider,
            shutdown,
            processor,
        }
    }

    pub fn with_provider(provider: ScriptedProvider) -> Self {
        Self::new(ProcessorConfig::default(), provider)
    }

    /// Add a file to both the vault and the database.
    pub fn add_file(&self, path: &str, mtime: i64) -> VaultFile {
        self.db.insert(path, mtime);
        self.vault.insert(path, mtime)
    }

    pub fn add_files(&self, count: usize) -> Vec<VaultFile> {
        (0..count)
            .map(|i| self.add_file(&format!("note{i:02}.md"), 1))
            .collect()
    }

    pub fn start(&self) {
        self.processor.start_processing(settings());
    }

    /// Tags stored for `path`.
    pub fn tags(&self, path: &str) -> Option<Vec<String>> {
        self.db.record(path).and_then(|d| d.tags)
    }
}

pub fn settings() -> Arc<ContentSettings> {
    Arc::new(ContentSettings::default())
}

/// Everything currently buffered on `rx`.
pub fn drain(rx: &mut broadcast::Receiver<ProcessorEvent>) -> Vec<ProcessorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
