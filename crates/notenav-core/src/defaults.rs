//! Centralized default constants for notenav.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers.

// =============================================================================
// CONTENT PROCESSING
// =============================================================================

/// Maximum number of jobs taken from the queue head per batch.
pub const CONTENT_BATCH_SIZE: usize = 100;

/// Maximum number of jobs in flight at once within a batch.
pub const CONTENT_PARALLEL_LIMIT: usize = 10;

/// Delay between the last enqueue and the start of processing (milliseconds).
pub const CONTENT_DEBOUNCE_MS: u64 = 100;

/// Broadcast channel capacity for processor events.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// RETRY
// =============================================================================

/// First retry delay after a failed extraction (milliseconds).
pub const RETRY_INITIAL_DELAY_MS: u64 = 1_000;

/// Upper bound for the exponential retry delay (milliseconds).
pub const RETRY_MAX_DELAY_MS: u64 = 30_000;

/// Failures tolerated before a path is dropped from retry.
pub const RETRY_MAX_ATTEMPTS: u32 = 5;

// =============================================================================
// PROVIDERS
// =============================================================================

/// Preview length in characters.
pub const PREVIEW_LENGTH: usize = 300;

/// Frontmatter properties checked for a feature image, in priority order.
pub const FEATURE_IMAGE_PROPERTIES: &[&str] = &["thumbnail", "featureResized", "feature"];

/// Frontmatter field holding the creation date.
pub const METADATA_CREATED_FIELD: &str = "created";

/// Frontmatter field holding the modification date.
pub const METADATA_MODIFIED_FIELD: &str = "modified";

/// `chrono` format used to parse frontmatter dates before falling back to RFC 3339.
pub const METADATA_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Extension of files the text providers process.
pub const MARKDOWN_EXTENSION: &str = "md";

// =============================================================================
// STORAGE
// =============================================================================

/// Default SQLite database URL.
pub const DATABASE_URL: &str = "sqlite://notenav.db";

/// Maximum connections in the SQLite pool.
pub const DB_MAX_CONNECTIONS: u32 = 4;

/// Entries kept in the shared file-content read cache.
pub const READ_CACHE_CAPACITY: usize = 256;
