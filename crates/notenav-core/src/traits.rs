//! Core traits for notenav abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::*;
use crate::settings::{ContentSettings, SettingKey};

// =============================================================================
// VAULT
// =============================================================================

/// The host's file-system view of a vault.
#[async_trait]
pub trait Vault: Send + Sync {
    /// Resolve a path against the live file system.
    fn file(&self, path: &str) -> Option<VaultFile>;

    /// All files currently in the vault.
    fn files(&self) -> Vec<VaultFile>;

    /// Read a file as UTF-8 text.
    async fn read(&self, file: &VaultFile) -> Result<String>;
}

// =============================================================================
// FILE DATABASE
// =============================================================================

/// Per-file record store.
#[async_trait]
pub trait FileDatabase: Send + Sync {
    /// Synchronous point lookup.
    fn get_file(&self, path: &str) -> Option<FileData>;

    /// Apply content field updates and guarded processed-mtime updates for
    /// one provider.
    ///
    /// An mtime update whose `expected_previous_mtime` does not match the
    /// stored processed mtime is skipped along with the path's content
    /// update. Paths without a record are skipped.
    async fn batch_update_file_content_and_provider_processed_mtimes(
        &self,
        batch: ProviderBatchUpdate,
    ) -> Result<()>;

    /// Remove `kind`'s derived content and processed mtimes from every record.
    async fn clear_provider_content(&self, kind: ContentType) -> Result<()>;
}

// =============================================================================
// CONTENT PROVIDERS
// =============================================================================

/// Extractor of one kind of derived file content.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// The content kind this provider produces.
    fn content_type(&self) -> ContentType;

    /// Settings whose change invalidates this provider's stored content.
    fn relevant_settings(&self) -> &'static [SettingKey];

    /// Whether a settings change requires regenerating all content.
    fn should_regenerate(&self, old: &ContentSettings, new: &ContentSettings) -> bool {
        old.any_differs(new, self.relevant_settings())
    }

    /// Drop this provider's stored content.
    async fn clear_content(&self, db: &dyn FileDatabase) -> Result<()> {
        db.clear_provider_content(self.content_type()).await
    }

    /// Whether `file` must be (re)processed given its stored record.
    fn needs_processing(
        &self,
        file_data: Option<&FileData>,
        file: &VaultFile,
        settings: &ContentSettings,
    ) -> bool;

    /// Extract content for one job.
    async fn process_file(
        &self,
        job: &ContentJob,
        file_data: Option<&FileData>,
        settings: &ContentSettings,
    ) -> Result<ProcessOutcome>;
}

/// Default staleness check: the record is missing or was processed at a
/// different mtime than the file's current one.
pub fn is_stale(kind: ContentType, file_data: Option<&FileData>, file: &VaultFile) -> bool {
    match file_data {
        Some(data) => data.processed_mtime(kind) != Some(file.mtime),
        None => true,
    }
}

// =============================================================================
// SHUTDOWN
// =============================================================================

/// Global query consulted before writing results.
pub trait ShutdownSignal: Send + Sync {
    fn is_shutdown_in_progress(&self) -> bool;
}

/// Shared shutdown flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the host as shutting down.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl ShutdownSignal for ShutdownFlag {
    fn is_shutdown_in_progress(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_stale_without_record() {
        let file = VaultFile::new("a.md", 10);
        assert!(is_stale(ContentType::Tags, None, &file));
    }

    #[test]
    fn test_is_stale_compares_provider_mtime() {
        let file = VaultFile::new("a.md", 10);
        let mut data = FileData::new("a.md", 10);
        assert!(is_stale(ContentType::Tags, Some(&data), &file));

        data.set_processed_mtime(ContentType::Tags, 10);
        assert!(!is_stale(ContentType::Tags, Some(&data), &file));
        assert!(is_stale(ContentType::Preview, Some(&data), &file));

        let modified = VaultFile::new("a.md", 11);
        assert!(is_stale(ContentType::Tags, Some(&data), &modified));
    }

    #[test]
    fn test_shutdown_flag_shared_between_clones() {
        let flag = ShutdownFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_shutdown_in_progress());
        flag.trigger();
        assert!(clone.is_shutdown_in_progress());
    }
}
