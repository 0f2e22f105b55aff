//! Directory-backed vault.

use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use tracing::{debug, trace};
use walkdir::WalkDir;

use notenav_core::{Error, Result, Vault, VaultFile};

/// A vault rooted at a directory on disk. Paths are relative to the root
/// and use `/` separators. Hidden files and directories are skipped.
#[derive(Debug, Clone)]
pub struct FsVault {
    root: PathBuf,
}

impl FsVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a vault path to a location under the root.
    ///
    /// Absolute paths and `..` segments are rejected.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(relative))
    }

    fn snapshot(path: String, metadata: &std::fs::Metadata) -> VaultFile {
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        VaultFile {
            path,
            mtime,
            size: metadata.len(),
        }
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

#[async_trait]
impl Vault for FsVault {
    fn file(&self, path: &str) -> Option<VaultFile> {
        let full = self.resolve(path)?;
        let metadata = std::fs::metadata(&full).ok()?;
        if !metadata.is_file() {
            return None;
        }
        Some(Self::snapshot(path.to_string(), &metadata))
    }

    fn files(&self) -> Vec<VaultFile> {
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable vault entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let path = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            trace!(path = %path, "Vault file");
            files.push(Self::snapshot(path, &metadata));
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    async fn read(&self, file: &VaultFile) -> Result<String> {
        let full = self
            .resolve(&file.path)
            .ok_or_else(|| Error::NotFound(file.path.clone()))?;
        Ok(tokio::fs::read_to_string(full).await?)
    }
}
