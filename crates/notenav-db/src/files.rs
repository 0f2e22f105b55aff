//! File record store.
//!
//! Records are persisted as JSON rows in SQLite and mirrored in memory so
//! that point lookups stay synchronous. Every write holds an async write
//! lock across its read-modify-write, so batched writes from different
//! providers never drop each other's fields.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::sqlite::SqlitePool;
use sqlx::{Sqlite, Transaction};
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use notenav_core::{
    logging, ContentType, FileData, FileDatabase, ProviderBatchUpdate, Result, VaultFile,
};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS files (
    path TEXT PRIMARY KEY NOT NULL,
    record TEXT NOT NULL
)";

/// SQLite-backed [`FileDatabase`] with an in-memory mirror.
#[derive(Clone)]
pub struct FileStore {
    pool: SqlitePool,
    mirror: Arc<RwLock<HashMap<String, FileData>>>,
    write_lock: Arc<Mutex<()>>,
}

impl FileStore {
    /// Create the schema if needed and load every record into memory.
    pub async fn load(pool: SqlitePool) -> Result<Self> {
        sqlx::query(SCHEMA).execute(&pool).await?;

        let rows: Vec<(String, String)> = sqlx::query_as("SELECT path, record FROM files")
            .fetch_all(&pool)
            .await?;

        let mut mirror = HashMap::with_capacity(rows.len());
        for (path, record) in rows {
            match serde_json::from_str::<FileData>(&record) {
                Ok(data) => {
                    mirror.insert(path, data);
                }
                Err(e) => {
                    warn!(
                        subsystem = logging::SUBSYSTEM_DB,
                        path = %path,
                        error = %e,
                        "Skipping unreadable file record"
                    );
                }
            }
        }

        info!(
            subsystem = logging::SUBSYSTEM_DB,
            records = mirror.len(),
            "File records loaded"
        );

        Ok(Self {
            pool,
            mirror: Arc::new(RwLock::new(mirror)),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.mirror.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.mirror.read().is_empty()
    }

    /// Every stored path, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.mirror.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Insert records for new files and refresh the mtime of changed ones.
    ///
    /// Returns the number of records written.
    pub async fn upsert_files(&self, files: &[VaultFile]) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        let changed: Vec<FileData> = {
            let mirror = self.mirror.read();
            files
                .iter()
                .filter_map(|file| match mirror.get(&file.path) {
                    Some(existing) if existing.mtime == file.mtime => None,
                    Some(existing) => {
                        let mut data = existing.clone();
                        data.mtime = file.mtime;
                        Some(data)
                    }
                    None => Some(FileData::new(file.path.clone(), file.mtime)),
                })
                .collect()
        };

        if changed.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for data in &changed {
            write_record(&mut tx, data).await?;
        }
        tx.commit().await?;

        let count = changed.len();
        let mut mirror = self.mirror.write();
        for data in changed {
            mirror.insert(data.path.clone(), data);
        }
        debug!(subsystem = logging::SUBSYSTEM_DB, count, "Upserted file records");
        Ok(count)
    }

    /// Delete records. Returns how many existed.
    pub async fn remove_files(&self, paths: &[String]) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        let existing: Vec<&String> = {
            let mirror = self.mirror.read();
            paths.iter().filter(|p| mirror.contains_key(*p)).collect()
        };
        if existing.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for path in &existing {
            delete_record(&mut tx, path).await?;
        }
        tx.commit().await?;

        let mut mirror = self.mirror.write();
        for path in &existing {
            mirror.remove(*path);
        }
        debug!(
            subsystem = logging::SUBSYSTEM_DB,
            count = existing.len(),
            "Removed file records"
        );
        Ok(existing.len())
    }

    /// Move a record to a new path, keeping its derived content.
    ///
    /// Creates a fresh record when `from` is unknown.
    pub async fn rename_file(&self, from: &str, file: &VaultFile) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut data = self
            .mirror
            .read()
            .get(from)
            .cloned()
            .unwrap_or_else(|| FileData::new(file.path.clone(), file.mtime));
        data.path = file.path.clone();
        data.mtime = file.mtime;

        let mut tx = self.pool.begin().await?;
        delete_record(&mut tx, from).await?;
        write_record(&mut tx, &data).await?;
        tx.commit().await?;

        let mut mirror = self.mirror.write();
        mirror.remove(from);
        mirror.insert(data.path.clone(), data);
        debug!(
            subsystem = logging::SUBSYSTEM_DB,
            from,
            to = %file.path,
            "Renamed file record"
        );
        Ok(())
    }
}

#[async_trait]
impl FileDatabase for FileStore {
    fn get_file(&self, path: &str) -> Option<FileData> {
        self.mirror.read().get(path).cloned()
    }

    async fn batch_update_file_content_and_provider_processed_mtimes(
        &self,
        batch: ProviderBatchUpdate,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let kind = batch.provider;

        let mut changed: HashMap<String, FileData> = HashMap::new();
        let mut rejected: HashSet<String> = HashSet::new();
        {
            let mirror = self.mirror.read();

            for update in &batch.processed_mtime_updates {
                let current = changed
                    .get(&update.path)
                    .or_else(|| mirror.get(&update.path))
                    .cloned();
                let Some(mut data) = current else {
                    trace!(
                        subsystem = logging::SUBSYSTEM_DB,
                        path = %update.path,
                        "No record for processed mtime update"
                    );
                    rejected.insert(update.path.clone());
                    continue;
                };
                if data.processed_mtime(kind) != update.expected_previous_mtime {
                    debug!(
                        subsystem = logging::SUBSYSTEM_DB,
                        provider = %kind,
                        path = %update.path,
                        stored = ?data.processed_mtime(kind),
                        expected = ?update.expected_previous_mtime,
                        "Skipping stale processed mtime update"
                    );
                    rejected.insert(update.path.clone());
                    continue;
                }
                data.set_processed_mtime(kind, update.mtime);
                changed.insert(update.path.clone(), data);
            }

            for update in batch.content_updates {
                if rejected.contains(&update.path) {
                    continue;
                }
                let current = changed
                    .remove(&update.path)
                    .or_else(|| mirror.get(&update.path).cloned());
                let Some(mut data) = current else {
                    continue;
                };
                data.apply(update.value);
                changed.insert(update.path, data);
            }
        }

        if changed.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for data in changed.values() {
            write_record(&mut tx, data).await?;
        }
        tx.commit().await?;

        let count = changed.len();
        self.mirror.write().extend(changed);
        debug!(
            subsystem = logging::SUBSYSTEM_DB,
            provider = %kind,
            count,
            skipped = rejected.len(),
            "Applied provider batch update"
        );
        Ok(())
    }

    async fn clear_provider_content(&self, kind: ContentType) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let cleared: Vec<FileData> = self
            .mirror
            .read()
            .values()
            .map(|data| {
                let mut data = data.clone();
                data.clear(kind);
                data
            })
            .collect();

        let mut tx = self.pool.begin().await?;
        for data in &cleared {
            write_record(&mut tx, data).await?;
        }
        tx.commit().await?;

        let count = cleared.len();
        let mut mirror = self.mirror.write();
        for data in cleared {
            mirror.insert(data.path.clone(), data);
        }
        info!(
            subsystem = logging::SUBSYSTEM_DB,
            provider = %kind,
            count,
            "Cleared provider content"
        );
        Ok(())
    }
}

async fn write_record(tx: &mut Transaction<'_, Sqlite>, data: &FileData) -> Result<()> {
    let record = serde_json::to_string(data)?;
    sqlx::query(
        "INSERT INTO files (path, record) VALUES (?, ?)
         ON CONFLICT(path) DO UPDATE SET record = excluded.record",
    )
    .bind(&data.path)
    .bind(record)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn delete_record(tx: &mut Transaction<'_, Sqlite>, path: &str) -> Result<()> {
    sqlx::query("DELETE FROM files WHERE path = ?")
        .bind(path)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
