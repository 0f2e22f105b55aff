//! Shared file-content read cache.
//!
//! Every provider reads the same files. Entries are keyed by path and
//! validated against the file's mtime, so a modified file is re-read.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::trace;

use notenav_core::{Result, Vault, VaultFile};

/// LRU of file text keyed by path, tagged with the mtime it was read at.
pub struct ContentReadCache {
    entries: Mutex<LruCache<String, (i64, Arc<str>)>>,
}

impl ContentReadCache {
    /// Create a cache holding up to `capacity` files (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Cached text for `file` if it was read at the same mtime.
    pub fn get(&self, file: &VaultFile) -> Option<Arc<str>> {
        let mut entries = self.entries.lock();
        match entries.get(&file.path) {
            Some((mtime, text)) if *mtime == file.mtime => Some(Arc::clone(text)),
            _ => None,
        }
    }

    /// Return cached text or read through `vault` and cache it.
    pub async fn read(&self, vault: &dyn Vault, file: &VaultFile) -> Result<Arc<str>> {
        if let Some(text) = self.get(file) {
            trace!(path = %file.path, "Read cache hit");
            return Ok(text);
        }

        let text: Arc<str> = Arc::from(vault.read(file).await?);
        self.entries
            .lock()
            .put(file.path.clone(), (file.mtime, Arc::clone(&text)));
        Ok(text)
    }

    pub fn invalidate(&self, path: &str) {
        self.entries.lock().pop(path);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Vault access for providers, backed by the shared read cache.
#[derive(Clone)]
pub struct ContentReader {
    vault: Arc<dyn Vault>,
    cache: Arc<ContentReadCache>,
}

impl ContentReader {
    pub fn new(vault: Arc<dyn Vault>, cache: Arc<ContentReadCache>) -> Self {
        Self { vault, cache }
    }

    pub async fn read(&self, file: &VaultFile) -> Result<Arc<str>> {
        self.cache.read(self.vault.as_ref(), file).await
    }

    pub fn cache(&self) -> &Arc<ContentReadCache> {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    struct CountingVault {
        texts: HashMap<String, String>,
        reads: AtomicUsize,
    }

    impl CountingVault {
        fn new(files: &[(&str, &str)]) -> Self {
            Self {
                texts: files
                    .iter()
                    .map(|(p, t)| (p.to_string(), t.to_string()))
                    .collect(),
                reads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Vault for CountingVault {
        fn file(&self, path: &str) -> Option<VaultFile> {
            self.texts.get(path).map(|_| VaultFile::new(path, 1))
        }

        fn files(&self) -> Vec<VaultFile> {
            self.texts.keys().map(|p| VaultFile::new(p.clone(), 1)).collect()
        }

        async fn read(&self, file: &VaultFile) -> Result<String> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.texts
                .get(&file.path)
                .cloned()
                .ok_or_else(|| notenav_core::Error::NotFound(file.path.clone()))
        }
    }

    #[tokio::test]
    async fn test_read_is_cached_per_mtime() {
        let vault = CountingVault::new(&[("a.md", "hello")]);
        let cache = ContentReadCache::new(4);

        let v1 = VaultFile::new("a.md", 1);
        assert_eq!(&*cache.read(&vault, &v1).await.unwrap(), "hello");
        assert_eq!(&*cache.read(&vault, &v1).await.unwrap(), "hello");
        assert_eq!(vault.reads.load(Ordering::SeqCst), 1);

        let v2 = VaultFile::new("a.md", 2);
        cache.read(&vault, &v2).await.unwrap();
        assert_eq!(vault.reads.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reread() {
        let vault = CountingVault::new(&[("a.md", "hello")]);
        let cache = ContentReadCache::new(4);
        let file = VaultFile::new("a.md", 1);

        cache.read(&vault, &file).await.unwrap();
        cache.invalidate("a.md");
        assert!(cache.get(&file).is_none());
        cache.read(&vault, &file).await.unwrap();
        assert_eq!(vault.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recent() {
        let vault = CountingVault::new(&[("a.md", "a"), ("b.md", "b")]);
        let cache = ContentReadCache::new(1);

        cache.read(&vault, &VaultFile::new("a.md", 1)).await.unwrap();
        cache.read(&vault, &VaultFile::new("b.md", 1)).await.unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&VaultFile::new("a.md", 1)).is_none());
    }

    #[tokio::test]
    async fn test_read_errors_are_not_cached() {
        let vault = CountingVault::new(&[]);
        let cache = ContentReadCache::new(0);
        assert!(cache.read(&vault, &VaultFile::new("x.md", 1)).await.is_err());
        assert!(cache.is_empty());
    }
}
