//! Content service: one processor per provider over a shared vault, file
//! store and read cache.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, error, info};

use notenav_core::{
    logging, ContentProvider, ContentSettings, ContentType, FileDatabase, FileEvent, Result,
    ShutdownSignal, Vault, VaultFile,
};
use notenav_db::FileStore;

use crate::config::ProcessorConfig;
use crate::processor::ContentProcessor;
use crate::providers::default_providers;
use crate::read_cache::{ContentReadCache, ContentReader};

#[derive(Default)]
struct ServiceState {
    settings: Option<Arc<ContentSettings>>,
    running: bool,
}

/// Fans lifecycle calls and file events out to every processor.
pub struct ContentService {
    store: FileStore,
    db: Arc<dyn FileDatabase>,
    vault: Arc<dyn Vault>,
    cache: Arc<ContentReadCache>,
    processors: Vec<ContentProcessor>,
    state: Mutex<ServiceState>,
}

impl ContentService {
    pub fn new(
        store: FileStore,
        vault: Arc<dyn Vault>,
        cache: Arc<ContentReadCache>,
        providers: Vec<Arc<dyn ContentProvider>>,
        shutdown: Arc<dyn ShutdownSignal>,
        config: ProcessorConfig,
    ) -> Self {
        let db: Arc<dyn FileDatabase> = Arc::new(store.clone());
        let processors = providers
            .into_iter()
            .map(|provider| {
                ContentProcessor::new(
                    provider,
                    Arc::clone(&db),
                    Arc::clone(&vault),
                    Arc::clone(&shutdown),
                    config.clone(),
                )
            })
            .collect();

        Self {
            store,
            db,
            vault,
            cache,
            processors,
            state: Mutex::new(ServiceState::default()),
        }
    }

    /// Service running every built-in provider.
    pub fn with_default_providers(
        store: FileStore,
        vault: Arc<dyn Vault>,
        cache_capacity: usize,
        shutdown: Arc<dyn ShutdownSignal>,
        config: ProcessorConfig,
    ) -> Self {
        let cache = Arc::new(ContentReadCache::new(cache_capacity));
        let reader = ContentReader::new(Arc::clone(&vault), Arc::clone(&cache));
        Self::new(
            store,
            vault,
            cache,
            default_providers(reader),
            shutdown,
            config,
        )
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    pub fn cache(&self) -> &Arc<ContentReadCache> {
        &self.cache
    }

    pub fn processors(&self) -> &[ContentProcessor] {
        &self.processors
    }

    pub fn processor(&self, kind: ContentType) -> Option<&ContentProcessor> {
        self.processors.iter().find(|p| p.content_type() == kind)
    }

    pub fn settings(&self) -> Option<Arc<ContentSettings>> {
        self.state.lock().settings.clone()
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Start every processor with `settings`.
    pub fn start(&self, settings: ContentSettings) {
        let settings = Arc::new(settings);
        {
            let mut state = self.state.lock();
            state.settings = Some(Arc::clone(&settings));
            state.running = true;
        }
        for processor in &self.processors {
            processor.start_processing(Arc::clone(&settings));
        }
        info!(
            subsystem = logging::SUBSYSTEM_CONTENT,
            providers = self.processors.len(),
            "Content service started"
        );
    }

    /// Stop every processor and drop their pending work.
    pub fn stop(&self) {
        self.state.lock().running = false;
        for processor in &self.processors {
            processor.stop_processing();
        }
        info!(subsystem = logging::SUBSYSTEM_CONTENT, "Content service stopped");
    }

    /// Resolve once no processor has a batch in flight.
    pub async fn wait_for_idle(&self) {
        join_all(self.processors.iter().map(|p| p.wait_for_idle())).await;
    }

    /// Resolve once every processor has drained its queue and retries.
    pub async fn settle(&self) {
        join_all(self.processors.iter().map(|p| p.settle())).await;
    }

    pub fn queue_files(&self, files: &[VaultFile]) {
        for processor in &self.processors {
            processor.queue_files(files.iter().cloned());
        }
    }

    /// Enqueue every vault file to every processor. Returns the file count.
    pub fn queue_all(&self) -> usize {
        let files = self.vault.files();
        self.queue_files(&files);
        files.len()
    }

    /// Bring the file store in line with the vault: add new files, refresh
    /// changed mtimes and delete records for files that are gone.
    ///
    /// Returns the vault's files.
    pub async fn reconcile(&self) -> Result<Vec<VaultFile>> {
        let files = self.vault.files();
        let present: HashSet<&str> = files.iter().map(|f| f.path.as_str()).collect();
        let missing: Vec<String> = self
            .store
            .paths()
            .into_iter()
            .filter(|path| !present.contains(path.as_str()))
            .collect();

        let removed = self.store.remove_files(&missing).await?;
        let written = self.store.upsert_files(&files).await?;
        for path in &missing {
            self.cache.invalidate(path);
        }

        info!(
            subsystem = logging::SUBSYSTEM_CONTENT,
            files = files.len(),
            written,
            removed,
            "Vault reconciled"
        );
        Ok(files)
    }

    /// Apply a file-system change to the store, the cache and the queues.
    pub async fn handle_event(&self, event: FileEvent) -> Result<()> {
        match event {
            FileEvent::Created(file) | FileEvent::Modified(file) => {
                self.store.upsert_files(std::slice::from_ref(&file)).await?;
                self.cache.invalidate(&file.path);
                debug!(path = %file.path, "File changed");
                self.queue_files(&[file]);
            }
            FileEvent::Deleted(path) => {
                self.store.remove_files(std::slice::from_ref(&path)).await?;
                self.cache.invalidate(&path);
                debug!(path = %path, "File deleted");
            }
            FileEvent::Renamed { from, file } => {
                self.store.rename_file(&from, &file).await?;
                self.cache.invalidate(&from);
                self.cache.invalidate(&file.path);
                debug!(from = %from, to = %file.path, "File renamed");
                self.queue_files(&[file]);
            }
        }
        Ok(())
    }

    /// Swap in new settings.
    ///
    /// Providers whose relevant settings changed have their stored content
    /// cleared and, while running, every vault file requeued. Other
    /// providers take the new snapshot in place. Returns the regenerated
    /// kinds.
    pub async fn update_settings(&self, settings: ContentSettings) -> Vec<ContentType> {
        let settings = Arc::new(settings);
        let (previous, running) = {
            let mut state = self.state.lock();
            (state.settings.replace(Arc::clone(&settings)), state.running)
        };
        let Some(previous) = previous else {
            return Vec::new();
        };

        let files = if running {
            self.vault.files()
        } else {
            Vec::new()
        };
        let mut regenerated = Vec::new();

        for processor in &self.processors {
            if !processor.provider().should_regenerate(&previous, &settings) {
                processor.update_settings(Arc::clone(&settings));
                continue;
            }
            regenerated.push(processor.content_type());

            if running {
                processor
                    .clear_and_requeue(Arc::clone(&settings), files.clone())
                    .await;
            } else {
                if let Err(e) = processor.provider().clear_content(self.db.as_ref()).await {
                    error!(
                        subsystem = logging::SUBSYSTEM_CONTENT,
                        provider = %processor.content_type(),
                        error = %e,
                        "Failed to clear provider content"
                    );
                }
                processor.update_settings(Arc::clone(&settings));
            }
        }

        info!(
            subsystem = logging::SUBSYSTEM_CONTENT,
            regenerated = ?regenerated,
            running,
            "Content settings updated"
        );
        regenerated
    }
}
