//! Durable per-folder index status.
//!
//! One row per `(owner_id, folder_path)` in `indexed_folders`. Every write
//! is a full upsert that stamps `last_indexed_at` with the current time.
//! Transition legality is the caller's concern; the only guarded write is
//! [`StatusStore::try_begin_indexing`].

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use folder_search_core::models::{FolderIndexRecord, IndexStatus};

use crate::error::{Error, Result};

#[derive(Clone)]
pub struct StatusStore {
    pool: SqlitePool,
}

impl StatusStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn set_status(
        &self,
        owner_id: &str,
        folder_path: &str,
        status: IndexStatus,
        chunk_count: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO indexed_folders (owner_id, folder_path, last_indexed_at, status, chunk_count)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(owner_id, folder_path) DO UPDATE SET
                last_indexed_at = excluded.last_indexed_at,
                status = excluded.status,
                chunk_count = excluded.chunk_count
            "#,
        )
        .bind(owner_id)
        .bind(folder_path)
        .bind(now_rfc3339())
        .bind(status.as_str())
        .bind(chunk_count)
        .execute(&self.pool)
        .await?;

        tracing::debug!(owner = owner_id, folder = folder_path, %status, chunk_count, "status written");
        Ok(())
    }

    /// Move the folder to `indexing` unless it is already there.
    ///
    /// Returns `false` when another job holds the folder. The check and the
    /// write are a single statement, so two callers cannot both win.
    pub async fn try_begin_indexing(&self, owner_id: &str, folder_path: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO indexed_folders (owner_id, folder_path, last_indexed_at, status, chunk_count)
            VALUES (?, ?, ?, 'indexing', 0)
            ON CONFLICT(owner_id, folder_path) DO UPDATE SET
                last_indexed_at = excluded.last_indexed_at,
                status = 'indexing',
                chunk_count = 0
            WHERE indexed_folders.status <> 'indexing'
            "#,
        )
        .bind(owner_id)
        .bind(folder_path)
        .bind(now_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_status(
        &self,
        owner_id: &str,
        folder_path: &str,
    ) -> Result<Option<FolderIndexRecord>> {
        let row = sqlx::query(
            "SELECT id, owner_id, folder_path, last_indexed_at, status, chunk_count \
             FROM indexed_folders WHERE owner_id = ? AND folder_path = ?",
        )
        .bind(owner_id)
        .bind(folder_path)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    /// Records for the requested paths that exist. Missing paths are
    /// omitted, and an empty request never touches the database.
    pub async fn get_statuses(
        &self,
        owner_id: &str,
        folder_paths: &[String],
    ) -> Result<HashMap<String, FolderIndexRecord>> {
        if folder_paths.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, owner_id, folder_path, last_indexed_at, status, chunk_count \
             FROM indexed_folders WHERE owner_id = ",
        );
        query.push_bind(owner_id);
        query.push(" AND folder_path IN (");
        let mut separated = query.separated(", ");
        for path in folder_paths {
            separated.push_bind(path.as_str());
        }
        separated.push_unseparated(")");

        let rows = query.build().fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| record_from_row(row).map(|r| (r.folder_path.clone(), r)))
            .collect()
    }

    pub async fn remove_folder(&self, owner_id: &str, folder_path: &str) -> Result<()> {
        sqlx::query("DELETE FROM indexed_folders WHERE owner_id = ? AND folder_path = ?")
            .bind(owner_id)
            .bind(folder_path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Mark every row left in `indexing` by a previous process as `failed`.
    ///
    /// Runs once at startup before any job can start. Returns the number of
    /// rows reset.
    pub async fn reconcile_on_startup(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE indexed_folders SET status = 'failed', last_indexed_at = ? \
             WHERE status = 'indexing'",
        )
        .bind(now_rfc3339())
        .execute(&self.pool)
        .await?;

        let reset = result.rows_affected();
        if reset > 0 {
            tracing::warn!(reset, "reset interrupted indexing jobs to failed");
        } else {
            tracing::info!("no interrupted indexing jobs found");
        }
        Ok(reset)
    }

    /// Drop every record. Used when the whole vector index is reset.
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM indexed_folders")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn record_from_row(row: &SqliteRow) -> Result<FolderIndexRecord> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<IndexStatus>()
        .map_err(|e| Error::Storage(sqlx::Error::Decode(e.into())))?;

    let last_indexed_at: Option<String> = row.try_get("last_indexed_at")?;
    let last_indexed_at = last_indexed_at
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|ts| ts.with_timezone(&Utc));

    Ok(FolderIndexRecord {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        folder_path: row.try_get("folder_path")?,
        status,
        last_indexed_at,
        chunk_count: row.try_get("chunk_count")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::{db, migrate};
    use tempfile::TempDir;

    async fn open_store(dir: &TempDir) -> StatusStore {
        let config = Config::minimal(dir.path());
        let pool = db::connect(&config).await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        StatusStore::new(pool)
    }

    #[tokio::test]
    async fn test_upsert_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store
            .set_status("local", "docs", IndexStatus::Indexing, 0)
            .await
            .unwrap();
        let first = store.get_status("local", "docs").await.unwrap().unwrap();

        store
            .set_status("local", "docs", IndexStatus::Indexed, 7)
            .await
            .unwrap();
        let second = store.get_status("local", "docs").await.unwrap().unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.status, IndexStatus::Indexed);
        assert_eq!(second.chunk_count, 7);
        assert!(second.last_indexed_at.unwrap() >= first.last_indexed_at.unwrap());
    }

    #[tokio::test]
    async fn test_missing_record_is_none() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        assert!(store.get_status("local", "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_records_are_scoped_by_owner() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store
            .set_status("local", "docs", IndexStatus::Indexed, 3)
            .await
            .unwrap();
        assert!(store
            .get_status("synology:me@nas:5001", "docs")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_get_statuses_omits_absent_paths() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store
            .set_status("local", "a", IndexStatus::Indexed, 1)
            .await
            .unwrap();
        store
            .set_status("local", "b", IndexStatus::Failed, 0)
            .await
            .unwrap();

        let paths = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let statuses = store.get_statuses("local", &paths).await.unwrap();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses["a"].status, IndexStatus::Indexed);
        assert_eq!(statuses["b"].status, IndexStatus::Failed);
        assert!(!statuses.contains_key("c"));

        assert!(store.get_statuses("local", &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_folder() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store
            .set_status("local", "docs", IndexStatus::Indexed, 2)
            .await
            .unwrap();
        store.remove_folder("local", "docs").await.unwrap();
        assert!(store.get_status("local", "docs").await.unwrap().is_none());

        // Removing again is a no-op
        store.remove_folder("local", "docs").await.unwrap();
    }

    #[tokio::test]
    async fn test_reconcile_resets_only_indexing_rows() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store
            .set_status("local", "stuck", IndexStatus::Indexing, 0)
            .await
            .unwrap();
        store
            .set_status("local", "done", IndexStatus::Indexed, 4)
            .await
            .unwrap();
        let done_before = store.get_status("local", "done").await.unwrap().unwrap();

        assert_eq!(store.reconcile_on_startup().await.unwrap(), 1);

        let stuck = store.get_status("local", "stuck").await.unwrap().unwrap();
        assert_eq!(stuck.status, IndexStatus::Failed);
        let done_after = store.get_status("local", "done").await.unwrap().unwrap();
        assert_eq!(done_after, done_before);

        assert_eq!(store.reconcile_on_startup().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_try_begin_indexing_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        assert!(store.try_begin_indexing("local", "docs").await.unwrap());
        assert!(!store.try_begin_indexing("local", "docs").await.unwrap());

        store
            .set_status("local", "docs", IndexStatus::Indexed, 5)
            .await
            .unwrap();
        assert!(store.try_begin_indexing("local", "docs").await.unwrap());

        let record = store.get_status("local", "docs").await.unwrap().unwrap();
        assert_eq!(record.status, IndexStatus::Indexing);
        assert_eq!(record.chunk_count, 0);
    }
}
