use sqlx::SqlitePool;

use crate::error::Result;

/// Create the status table and its indexes. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS indexed_folders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id TEXT NOT NULL,
            folder_path TEXT NOT NULL,
            last_indexed_at TEXT,
            status TEXT NOT NULL CHECK (
                status IN ('not_indexed', 'indexing', 'indexed', 'outdated', 'failed')
            ),
            chunk_count INTEGER NOT NULL DEFAULT 0,
            UNIQUE(owner_id, folder_path)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Crash recovery scans by status on every startup
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_indexed_folders_status ON indexed_folders(status)")
        .execute(pool)
        .await?;

    Ok(())
}
