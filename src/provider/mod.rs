//! Storage provider capability.
//!
//! A [`Provider`] is a file tree the indexer can walk and read: the local
//! sandbox or a Synology NAS reached through File Station. Each provider
//! acts for exactly one owner identity ([`Provider::provider_id`]), which
//! scopes index status records.
//!
//! Providers are shared as `Arc<dyn Provider>` between HTTP handlers and
//! detached indexing jobs.

pub mod local;
pub mod synology;

use async_trait::async_trait;
use futures::stream::BoxStream;

use folder_search_core::models::FileItem;

use crate::error::Result;

pub use local::LocalProvider;
pub use synology::{SynologyLogin, SynologyProvider};

/// Streamed file body. Local reads yield chunks of at most
/// [`DOWNLOAD_CHUNK_SIZE`] bytes.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>>>;

pub const DOWNLOAD_CHUNK_SIZE: usize = 1024 * 1024;

#[async_trait]
pub trait Provider: Send + Sync {
    /// Owner identity this provider acts for.
    fn provider_id(&self) -> &str;

    /// Direct children of a directory. A missing path or a file yields
    /// [`Error::NotFound`](crate::error::Error::NotFound).
    async fn list_files(&self, path: &str) -> Result<Vec<FileItem>>;

    /// Every descendant file and directory below `path`.
    async fn list_files_recursive(&self, path: &str) -> Result<Vec<FileItem>>;

    /// Metadata for one entry, `None` when it does not exist.
    async fn get_metadata(&self, path: &str) -> Result<Option<FileItem>>;

    /// Decoded text of a file, `None` when `path` is not a readable file.
    async fn read_file_content(&self, path: &str) -> Result<Option<String>>;

    /// Write `bytes` to `destination_path`, creating parent directories.
    async fn upload_file(&self, destination_path: &str, bytes: Vec<u8>) -> Result<()>;

    async fn download_file(&self, path: &str) -> Result<ByteStream>;

    /// Delete a file or directory tree. Returns `false` if nothing existed.
    async fn delete_item(&self, path: &str) -> Result<bool>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Chunk-ID prefix covering every file below `folder_path`.
    fn chunk_prefix(&self, folder_path: &str) -> String {
        folder_prefix(folder_path)
    }
}

/// `folder_path` with exactly one trailing `/`, so `docs` never matches
/// `docs2/...`. The empty path stays empty and matches everything.
pub fn folder_prefix(folder_path: &str) -> String {
    let trimmed = folder_path.trim_end_matches('/');
    if trimmed.is_empty() && folder_path.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

/// Final path component of a `/`-separated path.
pub(crate) fn file_name(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
}

/// Lowercased extension of a `/`-separated path, if any.
pub fn extension(path: &str) -> Option<String> {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => None,
        Some(idx) => Some(name[idx + 1..].to_ascii_lowercase()),
    }
}
