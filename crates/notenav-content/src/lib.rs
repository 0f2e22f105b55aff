//! # notenav-content
//!
//! Queue-driven content extraction for notenav.
//!
//! This crate provides:
//! - Debounced, batched processing per content provider
//! - Bounded parallelism within a batch
//! - Retry with exponential backoff for failed files
//! - Session-based cancellation on stop
//! - Built-in providers for tags, previews, feature images, frontmatter
//!   metadata and a custom property
//! - A service that fans vault events out to every processor
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use notenav_content::{ContentService, FsVault, ProcessorConfig};
//! use notenav_core::{ContentSettings, ShutdownFlag};
//! use notenav_db::Database;
//!
//! let db = Database::connect("sqlite://notenav.db").await?;
//! let service = ContentService::with_default_providers(
//!     db.files.clone(),
//!     Arc::new(FsVault::new("/path/to/vault")),
//!     256,
//!     Arc::new(ShutdownFlag::new()),
//!     ProcessorConfig::from_env(),
//! );
//!
//! let files = service.reconcile().await?;
//! service.start(ContentSettings::default());
//! service.queue_files(&files);
//! service.settle().await;
//! ```

pub mod config;
pub mod frontmatter;
pub mod processor;
pub mod providers;
pub mod queue;
pub mod read_cache;
pub mod retry;
pub mod service;
pub mod vault;

// Re-export core types
pub use notenav_core::*;

pub use config::ProcessorConfig;
pub use processor::{ContentProcessor, ProcessorEvent, ProcessorStatus};
pub use providers::{
    default_providers, CustomPropertyProvider, FeatureImageProvider, MetadataProvider,
    PreviewProvider, TagsProvider,
};
pub use read_cache::{ContentReadCache, ContentReader};
pub use retry::{RetryDecision, RetryPolicy, RetryScheduler};
pub use service::ContentService;
pub use vault::FsVault;
