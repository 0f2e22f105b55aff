//! # notenav-db
//!
//! Embedded SQLite storage for notenav's per-file records.
//!
//! This crate provides:
//! - Connection pool management
//! - [`FileStore`], the [`FileDatabase`] implementation with synchronous
//!   point lookups and guarded batched provider writes
//!
//! ## Example
//!
//! ```rust,ignore
//! use notenav_db::Database;
//! use notenav_core::{FileDatabase, VaultFile};
//!
//! let db = Database::connect("sqlite://notenav.db").await?;
//! db.files.upsert_files(&[VaultFile::new("Inbox/todo.md", 1_700_000_000_000)]).await?;
//! assert!(db.files.get_file("Inbox/todo.md").is_some());
//! ```

pub mod files;
pub mod pool;

// Re-export core types
pub use notenav_core::*;

pub use files::FileStore;
pub use pool::{create_pool, create_pool_with_config, PoolConfig, MEMORY_URL};

use sqlx::sqlite::SqlitePool;

/// Combined database handle.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: SqlitePool,
    /// Per-file record store.
    pub files: FileStore,
}

impl Database {
    /// Connect with the default pool configuration and load all records.
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::connect_with_config(database_url, PoolConfig::default()).await
    }

    /// Connect with a custom pool configuration and load all records.
    pub async fn connect_with_config(database_url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(database_url, config).await?;
        Self::new(pool).await
    }

    /// Private in-memory database, mostly for tests.
    pub async fn in_memory() -> Result<Self> {
        Self::connect(MEMORY_URL).await
    }

    /// Wrap an existing pool.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        let files = FileStore::load(pool.clone()).await?;
        Ok(Self { pool, files })
    }
}
