//! SQLite connection management and the process lease.
//!
//! The pool runs in WAL mode with a busy timeout, so a CLI invocation and a
//! running server can share one database file. Only the process holding the
//! [`Lease`] (an exclusive lock on `<db>.lock`) may run crash recovery or
//! write the index; everyone else opens read-mostly.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::fs::{File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::config::Config;
use crate::error::Result;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Exclusive ownership of a database's writer role. Released on drop.
#[derive(Debug)]
pub struct Lease {
    _file: File,
    path: PathBuf,
}

impl Lease {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Take the writer lease for `db_path` without blocking. `None` means
/// another open context (in this or another process) holds it.
pub fn try_acquire_lease(db_path: &Path) -> Result<Option<Lease>> {
    let mut name = db_path.as_os_str().to_owned();
    name.push(".lock");
    let path = PathBuf::from(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&path)?;
    match file.try_lock() {
        Ok(()) => Ok(Some(Lease { _file: file, path })),
        Err(TryLockError::WouldBlock) => Ok(None),
        Err(TryLockError::Error(e)) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lease_is_exclusive_until_dropped() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("data/fsearch.sqlite");

        let first = try_acquire_lease(&db).unwrap().expect("first lease");
        assert_eq!(first.path(), dir.path().join("data/fsearch.sqlite.lock"));
        assert!(try_acquire_lease(&db).unwrap().is_none());

        drop(first);
        assert!(try_acquire_lease(&db).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_connect_sets_busy_timeout() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::minimal(dir.path());
        let pool = connect(&cfg).await.unwrap();

        let (timeout,): (i64,) = sqlx::query_as("PRAGMA busy_timeout")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(timeout, 5000);
        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(mode, "wal");
    }
}
