//! Local filesystem provider, sandboxed to a root directory.
//!
//! Request paths are relative to the root (a leading `/` is ignored) and
//! are normalized lexically: `.` is dropped and `..` pops a component.
//! Popping past the root is a [`Error::PermissionDenied`], and so is any
//! path whose existing part resolves outside the root through a symlink.
//! Returned [`FileItem`] paths are root-relative with `/` separators.

use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncReadExt;
use walkdir::WalkDir;

use folder_search_core::models::FileItem;

use super::{folder_prefix, ByteStream, Provider, DOWNLOAD_CHUNK_SIZE};
use crate::decode::decode_text;
use crate::error::{Error, Result};

pub const LOCAL_OWNER_ID: &str = "local";

pub struct LocalProvider {
    root: PathBuf,
    provider_id: String,
}

impl LocalProvider {
    /// Open a provider rooted at `root`, creating the directory if needed.
    pub fn new(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        let root = root.canonicalize()?;
        Ok(Self {
            root,
            provider_id: LOCAL_OWNER_ID.to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a request path to an absolute path inside the root.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        let trimmed = path.trim_start_matches(['/', '\\']);
        let mut parts: Vec<&std::ffi::OsStr> = Vec::new();

        for component in Path::new(trimmed).components() {
            match component {
                Component::Normal(part) => parts.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if parts.pop().is_none() {
                        return Err(Error::PermissionDenied(format!(
                            "path escapes the local root: {}",
                            path
                        )));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(Error::PermissionDenied(format!(
                        "absolute paths are not allowed: {}",
                        path
                    )));
                }
            }
        }

        let mut full = self.root.clone();
        full.extend(parts);
        self.confine(&full, path)?;
        Ok(full)
    }

    /// Reject a lexically valid path whose existing part leads outside the
    /// root through a symlink. Missing tail components are fine; a dangling
    /// link is not, since writing through it would create its target.
    fn confine(&self, full: &Path, requested: &str) -> Result<()> {
        let escape = || {
            Error::PermissionDenied(format!("path escapes the local root: {}", requested))
        };

        let mut existing = full;
        loop {
            match std::fs::canonicalize(existing) {
                Ok(real) if real.starts_with(&self.root) => return Ok(()),
                Ok(_) => return Err(escape()),
                Err(_) if std::fs::symlink_metadata(existing).is_ok() => return Err(escape()),
                Err(_) => match existing.parent() {
                    Some(parent) if parent.starts_with(&self.root) => existing = parent,
                    _ => return Ok(()),
                },
            }
        }
    }
}

fn relative(root: &Path, full: &Path) -> String {
    full.strip_prefix(root)
        .unwrap_or(full)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn file_item(root: &Path, full: &Path, metadata: &std::fs::Metadata) -> FileItem {
    let is_directory = metadata.is_dir();
    FileItem {
        name: full
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        is_directory,
        path: relative(root, full),
        size: if is_directory {
            None
        } else {
            Some(metadata.len())
        },
        last_modified: modified_secs(metadata),
    }
}

fn modified_secs(metadata: &std::fs::Metadata) -> f64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
}

#[async_trait]
impl Provider for LocalProvider {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// Item paths are root-relative, so the prefix is built from the
    /// normalized folder rather than the raw request path.
    fn chunk_prefix(&self, folder_path: &str) -> String {
        match self.resolve(folder_path) {
            Ok(full) => folder_prefix(&relative(&self.root, &full)),
            Err(_) => folder_prefix(folder_path),
        }
    }

    async fn list_files(&self, path: &str) -> Result<Vec<FileItem>> {
        let full = self.resolve(path)?;
        if !tokio::fs::metadata(&full).await.is_ok_and(|m| m.is_dir()) {
            return Err(Error::NotFound(format!("directory not found: {}", path)));
        }

        let mut items = Vec::new();
        let mut entries = tokio::fs::read_dir(&full).await?;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            items.push(file_item(&self.root, &entry.path(), &metadata));
        }
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    async fn list_files_recursive(&self, path: &str) -> Result<Vec<FileItem>> {
        let full = self.resolve(path)?;
        if !tokio::fs::metadata(&full).await.is_ok_and(|m| m.is_dir()) {
            return Err(Error::NotFound(format!("directory not found: {}", path)));
        }

        let root = self.root.clone();
        blocking(move || {
            let mut found = Vec::new();
            for entry in WalkDir::new(&full).min_depth(1).sort_by_file_name() {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping unreadable entry");
                        continue;
                    }
                };
                match entry.metadata() {
                    Ok(metadata) => found.push(file_item(&root, entry.path(), &metadata)),
                    Err(e) => {
                        tracing::warn!(path = %entry.path().display(), error = %e, "skipping entry without metadata");
                    }
                }
            }
            Ok(found)
        })
        .await
    }

    async fn get_metadata(&self, path: &str) -> Result<Option<FileItem>> {
        let full = match self.resolve(path) {
            Ok(full) => full,
            Err(Error::PermissionDenied(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        match tokio::fs::metadata(&full).await {
            Ok(metadata) => Ok(Some(file_item(&self.root, &full, &metadata))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_file_content(&self, path: &str) -> Result<Option<String>> {
        let full = self.resolve(path)?;
        if !tokio::fs::metadata(&full).await.is_ok_and(|m| m.is_file()) {
            return Ok(None);
        }

        let bytes = tokio::fs::read(&full).await?;
        match decode_text(&bytes, path) {
            Ok(text) => Ok(Some(text)),
            Err(e) => {
                tracing::warn!(path, error = %e, "unreadable text file");
                Ok(None)
            }
        }
    }

    async fn upload_file(&self, destination_path: &str, bytes: Vec<u8>) -> Result<()> {
        let full = self.resolve(destination_path)?;
        if full == self.root {
            return Err(Error::PermissionDenied(
                "cannot overwrite the local root".to_string(),
            ));
        }
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes).await?;
        Ok(())
    }

    async fn download_file(&self, path: &str) -> Result<ByteStream> {
        let full = self.resolve(path)?;
        if !tokio::fs::metadata(&full).await.is_ok_and(|m| m.is_file()) {
            return Err(Error::NotFound(format!("file not found: {}", path)));
        }

        let file = tokio::fs::File::open(&full).await?;
        let stream = futures::stream::unfold(Some(file), |state| async move {
            let mut file = state?;
            let mut buf = vec![0u8; DOWNLOAD_CHUNK_SIZE];
            match file.read(&mut buf).await {
                Ok(0) => None,
                Ok(n) => {
                    buf.truncate(n);
                    Some((Ok(buf), Some(file)))
                }
                Err(e) => Some((Err(Error::from(e)), None)),
            }
        });
        Ok(stream.boxed())
    }

    async fn delete_item(&self, path: &str) -> Result<bool> {
        let full = self.resolve(path)?;
        if full == self.root {
            return Err(Error::PermissionDenied(
                "cannot delete the local root".to_string(),
            ));
        }

        let metadata = match tokio::fs::symlink_metadata(&full).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        if metadata.is_dir() {
            tokio::fs::remove_dir_all(&full).await?;
        } else {
            tokio::fs::remove_file(&full).await?;
        }
        Ok(true)
    }
}
