//! SQLite connection pool management.

use std::str::FromStr;
use std::time::{Duration, Instant};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

use notenav_core::{defaults, logging, Result};

/// Default connection timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// URL of a private in-memory database.
pub const MEMORY_URL: &str = "sqlite::memory:";

/// Pool configuration options.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Connection timeout duration.
    pub connect_timeout: Duration,
    /// Create the database file when it does not exist.
    pub create_if_missing: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: defaults::DB_MAX_CONNECTIONS,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            create_if_missing: true,
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of connections.
    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set whether a missing database file is created.
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }
}

/// Create a SQLite connection pool with default configuration.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

/// Create a SQLite connection pool with custom configuration.
///
/// In-memory URLs get a single connection that is never recycled, since
/// every SQLite memory connection is its own database.
pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<SqlitePool> {
    let start = Instant::now();
    let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

    info!(
        subsystem = logging::SUBSYSTEM_DB,
        op = "create_pool",
        in_memory,
        max_connections = config.max_connections,
        "Creating database connection pool"
    );

    let mut connect = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(config.create_if_missing);
    if !in_memory {
        connect = connect.journal_mode(SqliteJournalMode::Wal);
    }

    let options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(config.max_connections)
    };

    let pool = options
        .acquire_timeout(config.connect_timeout)
        .connect_with(connect)
        .await?;

    info!(
        subsystem = logging::SUBSYSTEM_DB,
        op = "pool_established",
        pool_size = pool.size(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Database connection pool established"
    );
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.max_connections, defaults::DB_MAX_CONNECTIONS);
        assert!(config.create_if_missing);
    }

    #[test]
    fn test_pool_config_builder() {
        let config = PoolConfig::new()
            .max_connections(8)
            .connect_timeout(Duration::from_secs(5))
            .create_if_missing(false);

        assert_eq!(config.max_connections, 8);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert!(!config.create_if_missing);
    }

    #[tokio::test]
    async fn test_memory_pool_single_connection() {
        let pool = create_pool(MEMORY_URL).await.unwrap();
        let (one,): (i64,) = sqlx::query_as("SELECT 1").fetch_one(&pool).await.unwrap();
        assert_eq!(one, 1);
        assert!(pool.size() <= 1);
    }
}
