//! Data models shared by the database, the providers and the processors.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// CONTENT KINDS
// =============================================================================

/// Kind of derived content a provider produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Frontmatter and inline tags
    Tags,
    /// Plain-text preview of the note body
    Preview,
    /// Image shown next to the file
    FeatureImage,
    /// Display name and dates from frontmatter
    Metadata,
    /// Value of a user-chosen frontmatter property
    CustomProperty,
}

impl ContentType {
    /// Every content kind, in processing order.
    pub const ALL: [ContentType; 5] = [
        ContentType::Tags,
        ContentType::Preview,
        ContentType::FeatureImage,
        ContentType::Metadata,
        ContentType::CustomProperty,
    ];

    /// Stable snake_case name used in logs and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Tags => "tags",
            ContentType::Preview => "preview",
            ContentType::FeatureImage => "feature_image",
            ContentType::Metadata => "metadata",
            ContentType::CustomProperty => "custom_property",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// VAULT FILES
// =============================================================================

/// Snapshot of a file in the vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultFile {
    /// Vault-relative path using `/` separators.
    pub path: String,
    /// Modification time in milliseconds since the Unix epoch.
    pub mtime: i64,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
}

impl VaultFile {
    pub fn new(path: impl Into<String>, mtime: i64) -> Self {
        Self {
            path: path.into(),
            mtime,
            size: 0,
        }
    }

    /// File extension without the dot, if any.
    pub fn extension(&self) -> Option<&str> {
        let name = self.name();
        match name.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(&name[idx + 1..]),
        }
    }

    /// Final path segment.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// File name without its extension.
    pub fn basename(&self) -> &str {
        let name = self.name();
        match name.rfind('.') {
            Some(0) | None => name,
            Some(idx) => &name[..idx],
        }
    }

    /// Path split into non-empty segments.
    pub fn path_parts(&self) -> Vec<String> {
        self.path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    /// Whether the file is a markdown note.
    pub fn is_markdown(&self) -> bool {
        self.extension()
            .map(|ext| ext.eq_ignore_ascii_case(crate::defaults::MARKDOWN_EXTENSION))
            .unwrap_or(false)
    }
}

/// A change reported by the host's file system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    Created(VaultFile),
    Modified(VaultFile),
    Deleted(String),
    Renamed { from: String, file: VaultFile },
}

// =============================================================================
// FILE RECORDS
// =============================================================================

/// Metadata pulled from frontmatter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub name: Option<String>,
    /// Creation time in milliseconds since the Unix epoch.
    pub created: Option<i64>,
    /// Modification time in milliseconds since the Unix epoch.
    pub modified: Option<i64>,
}

impl FileMetadata {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.created.is_none() && self.modified.is_none()
    }
}

/// Database record for one vault file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileData {
    pub path: String,
    /// File mtime last seen by the database.
    pub mtime: i64,
    /// File mtime at which each provider last extracted successfully.
    #[serde(default)]
    pub provider_mtimes: BTreeMap<ContentType, i64>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub preview: Option<String>,
    #[serde(default)]
    pub feature_image: Option<String>,
    #[serde(default)]
    pub metadata: Option<FileMetadata>,
    #[serde(default)]
    pub custom_property: Option<String>,
}

impl FileData {
    /// Create an unprocessed record.
    pub fn new(path: impl Into<String>, mtime: i64) -> Self {
        Self {
            path: path.into(),
            mtime,
            ..Default::default()
        }
    }

    /// Mtime at which `kind` last processed this file.
    pub fn processed_mtime(&self, kind: ContentType) -> Option<i64> {
        self.provider_mtimes.get(&kind).copied()
    }

    pub fn set_processed_mtime(&mut self, kind: ContentType, mtime: i64) {
        self.provider_mtimes.insert(kind, mtime);
    }

    /// Write a derived value into its field.
    pub fn apply(&mut self, value: ContentValue) {
        match value {
            ContentValue::Tags(v) => self.tags = v,
            ContentValue::Preview(v) => self.preview = v,
            ContentValue::FeatureImage(v) => self.feature_image = v,
            ContentValue::Metadata(v) => self.metadata = v,
            ContentValue::CustomProperty(v) => self.custom_property = v,
        }
    }

    /// Drop the derived value and processed mtime for `kind`.
    pub fn clear(&mut self, kind: ContentType) {
        self.provider_mtimes.remove(&kind);
        self.apply(ContentValue::empty(kind));
    }
}

/// A derived value for one field of a [`FileData`] record.
///
/// `None` payloads clear the field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentValue {
    Tags(Option<Vec<String>>),
    Preview(Option<String>),
    FeatureImage(Option<String>),
    Metadata(Option<FileMetadata>),
    CustomProperty(Option<String>),
}

impl ContentValue {
    /// The cleared value for `kind`.
    pub fn empty(kind: ContentType) -> Self {
        match kind {
            ContentType::Tags => ContentValue::Tags(None),
            ContentType::Preview => ContentValue::Preview(None),
            ContentType::FeatureImage => ContentValue::FeatureImage(None),
            ContentType::Metadata => ContentValue::Metadata(None),
            ContentType::CustomProperty => ContentValue::CustomProperty(None),
        }
    }

    pub fn content_type(&self) -> ContentType {
        match self {
            ContentValue::Tags(_) => ContentType::Tags,
            ContentValue::Preview(_) => ContentType::Preview,
            ContentValue::FeatureImage(_) => ContentType::FeatureImage,
            ContentValue::Metadata(_) => ContentType::Metadata,
            ContentValue::CustomProperty(_) => ContentType::CustomProperty,
        }
    }
}

// =============================================================================
// BATCHED WRITES
// =============================================================================

/// Content field update staged by a processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentUpdate {
    pub path: String,
    pub value: ContentValue,
}

/// Processed-mtime update guarded by the mtime the processor last saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedMtimeUpdate {
    pub path: String,
    /// File mtime captured before extraction started.
    pub mtime: i64,
    /// Provider mtime in the record when the job was read; the write is
    /// skipped if the record moved on since.
    pub expected_previous_mtime: Option<i64>,
}

/// One batched write issued by a processor at the end of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderBatchUpdate {
    pub provider: ContentType,
    pub content_updates: Vec<ContentUpdate>,
    pub processed_mtime_updates: Vec<ProcessedMtimeUpdate>,
}

impl ProviderBatchUpdate {
    pub fn new(provider: ContentType) -> Self {
        Self {
            provider,
            content_updates: Vec::new(),
            processed_mtime_updates: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content_updates.is_empty() && self.processed_mtime_updates.is_empty()
    }
}

// =============================================================================
// JOBS
// =============================================================================

/// One pending extraction attempt for a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentJob {
    pub file: VaultFile,
    pub path_parts: Vec<String>,
}

impl ContentJob {
    pub fn new(file: VaultFile) -> Self {
        let path_parts = file.path_parts();
        Self { file, path_parts }
    }

    pub fn path(&self) -> &str {
        &self.file.path
    }
}

/// Result of a provider's extraction for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Value to write, if the field changed.
    pub update: Option<ContentValue>,
    /// `false` asks the processor to retry the file later.
    pub processed: bool,
}

impl ProcessOutcome {
    /// Extraction succeeded with a new value.
    pub fn updated(value: ContentValue) -> Self {
        Self {
            update: Some(value),
            processed: true,
        }
    }

    /// Extraction succeeded and the stored value is already current.
    pub fn unchanged() -> Self {
        Self {
            update: None,
            processed: true,
        }
    }

    /// Extraction could not complete; retry later.
    pub fn not_processed() -> Self {
        Self {
            update: None,
            processed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vault_file_name_parts() {
        let file = VaultFile::new("Projects/2024/plan.final.md", 10);
        assert_eq!(file.name(), "plan.final.md");
        assert_eq!(file.basename(), "plan.final");
        assert_eq!(file.extension(), Some("md"));
        assert_eq!(file.path_parts(), vec!["Projects", "2024", "plan.final.md"]);
        assert!(file.is_markdown());
    }

    #[test]
    fn test_vault_file_without_extension() {
        let file = VaultFile::new("README", 1);
        assert_eq!(file.extension(), None);
        assert_eq!(file.basename(), "README");
        assert!(!file.is_markdown());

        let hidden = VaultFile::new(".obsidian", 1);
        assert_eq!(hidden.extension(), None);
    }

    #[test]
    fn test_content_job_splits_path() {
        let job = ContentJob::new(VaultFile::new("a/b/c.md", 1));
        assert_eq!(job.path(), "a/b/c.md");
        assert_eq!(job.path_parts, vec!["a", "b", "c.md"]);
    }

    #[test]
    fn test_file_data_apply_and_clear() {
        let mut data = FileData::new("a.md", 5);
        data.apply(ContentValue::Tags(Some(vec!["x".into()])));
        data.set_processed_mtime(ContentType::Tags, 5);
        assert_eq!(data.tags, Some(vec!["x".to_string()]));
        assert_eq!(data.processed_mtime(ContentType::Tags), Some(5));

        data.clear(ContentType::Tags);
        assert_eq!(data.tags, None);
        assert_eq!(data.processed_mtime(ContentType::Tags), None);
    }

    #[test]
    fn test_file_data_json_uses_snake_case_keys() {
        let mut data = FileData::new("a.md", 5);
        data.set_processed_mtime(ContentType::FeatureImage, 5);
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["provider_mtimes"]["feature_image"], 5);

        let back: FileData = serde_json::from_value(json).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_content_value_kind() {
        for kind in ContentType::ALL {
            assert_eq!(ContentValue::empty(kind).content_type(), kind);
        }
    }

    #[test]
    fn test_process_outcome_constructors() {
        assert!(ProcessOutcome::unchanged().processed);
        assert!(!ProcessOutcome::not_processed().processed);
        let outcome = ProcessOutcome::updated(ContentValue::Preview(Some("hi".into())));
        assert!(outcome.processed);
        assert!(outcome.update.is_some());
    }
}
