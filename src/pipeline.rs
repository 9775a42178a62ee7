//! Folder indexing pipeline: crawl → filter → read → chunk → submit.
//!
//! [`index_folder`] assumes the folder's record is already `indexing`
//! (see [`StatusStore::try_begin_indexing`]) and owns every later status
//! write for the run:
//!
//! - success writes `indexed` with the total chunk count;
//! - an enumeration or submission failure writes `failed`;
//! - cancellation writes nothing, since whoever cancelled owns the record.
//!
//! Per-file problems (unreadable, undecodable, empty) skip that file only.
//! Chunks submitted before a later failure are not rolled back.

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use folder_search_core::chunk::chunk_file;
use folder_search_core::index::{into_columns, VectorIndex};
use folder_search_core::models::{FileItem, IndexStatus};

use crate::config::ChunkingConfig;
use crate::error::Result;
use crate::provider::{extension, Provider};
use crate::status_store::StatusStore;

/// Counters for one completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    /// Files under the folder, before the extension filter.
    pub files_seen: usize,
    pub files_indexed: usize,
    /// Eligible files that could not be read or were empty.
    pub files_skipped: usize,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(IndexReport),
    Cancelled,
}

/// Whether `path` has an extension on the allow-list (case-insensitive).
pub fn is_indexable(path: &str, extensions: &[String]) -> bool {
    match extension(path) {
        Some(ext) => extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(&ext)),
        None => false,
    }
}

pub async fn index_folder(
    provider: &dyn Provider,
    index: &dyn VectorIndex,
    store: &StatusStore,
    chunking: &ChunkingConfig,
    folder_path: &str,
    cancel: &CancellationToken,
) -> Result<RunOutcome> {
    let owner = provider.provider_id();
    tracing::info!(owner, folder = folder_path, "indexing started");

    // A failed final status write counts as a failed run.
    let run = match crawl_and_submit(provider, index, chunking, folder_path, cancel).await {
        Ok(RunOutcome::Completed(report)) => store
            .set_status(owner, folder_path, IndexStatus::Indexed, report.chunk_count as i64)
            .await
            .map(|()| RunOutcome::Completed(report)),
        other => other,
    };

    match run {
        Ok(RunOutcome::Completed(report)) => {
            if let Err(e) = index.persist().await {
                tracing::warn!(error = %e, "failed to persist vector index");
            }
            tracing::info!(
                owner,
                folder = folder_path,
                files_seen = report.files_seen,
                files_indexed = report.files_indexed,
                files_skipped = report.files_skipped,
                chunks = report.chunk_count,
                "indexing complete"
            );
            Ok(RunOutcome::Completed(report))
        }
        Ok(RunOutcome::Cancelled) => {
            tracing::info!(owner, folder = folder_path, "indexing cancelled");
            Ok(RunOutcome::Cancelled)
        }
        Err(e) => {
            tracing::error!(owner, folder = folder_path, error = %e, "indexing failed");
            if let Err(status_err) = store
                .set_status(owner, folder_path, IndexStatus::Failed, 0)
                .await
            {
                tracing::error!(owner, folder = folder_path, error = %status_err, "could not record failure");
            }
            Err(e)
        }
    }
}

async fn crawl_and_submit(
    provider: &dyn Provider,
    index: &dyn VectorIndex,
    chunking: &ChunkingConfig,
    folder_path: &str,
    cancel: &CancellationToken,
) -> Result<RunOutcome> {
    let entries = provider.list_files_recursive(folder_path).await?;
    let files: Vec<FileItem> = entries.into_iter().filter(|e| !e.is_directory).collect();

    let mut report = IndexReport {
        files_seen: files.len(),
        ..Default::default()
    };
    let params = chunking.params();

    for file in files
        .iter()
        .filter(|f| is_indexable(&f.path, &chunking.extensions))
    {
        if cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }

        let text = match provider.read_file_content(&file.path).await {
            Ok(Some(text)) if !text.trim().is_empty() => text,
            Ok(Some(_)) => {
                tracing::debug!(path = %file.path, "skipping empty file");
                report.files_skipped += 1;
                continue;
            }
            Ok(None) => {
                tracing::warn!(path = %file.path, "skipping unreadable file");
                report.files_skipped += 1;
                continue;
            }
            Err(e) => {
                tracing::warn!(path = %file.path, error = %e, "skipping file");
                report.files_skipped += 1;
                continue;
            }
        };

        let chunks = chunk_file(&file.path, &text, &params);
        let submitted = chunks.len();
        let (ids, documents, metadatas) = into_columns(chunks);
        index.add(&ids, &documents, &metadatas).await?;

        report.files_indexed += 1;
        report.chunk_count += submitted;
        tracing::debug!(path = %file.path, chunks = submitted, "file indexed");
    }

    if cancel.is_cancelled() {
        return Ok(RunOutcome::Cancelled);
    }
    Ok(RunOutcome::Completed(report))
}
