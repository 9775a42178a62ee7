//! Core data models shared by the indexing pipeline, the status store and
//! the search orchestrator.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Indexing state of a folder as stored and as reported to callers.
///
/// The string forms (`"not_indexed"`, `"indexing"`, …) are what the status
/// table stores and what the HTTP API returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    NotIndexed,
    Indexing,
    Indexed,
    Outdated,
    Failed,
}

impl IndexStatus {
    pub const ALL: [IndexStatus; 5] = [
        IndexStatus::NotIndexed,
        IndexStatus::Indexing,
        IndexStatus::Indexed,
        IndexStatus::Outdated,
        IndexStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::NotIndexed => "not_indexed",
            IndexStatus::Indexing => "indexing",
            IndexStatus::Indexed => "indexed",
            IndexStatus::Outdated => "outdated",
            IndexStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        IndexStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown index status: '{}'", s))
    }
}

/// Durable per-folder indexing record, keyed by `(owner_id, folder_path)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FolderIndexRecord {
    pub id: i64,
    pub owner_id: String,
    pub folder_path: String,
    pub status: IndexStatus,
    /// Time of the last status write. `None` only for rows written by
    /// external tooling; every upsert through the store sets it.
    pub last_indexed_at: Option<DateTime<Utc>>,
    pub chunk_count: i64,
}

/// A file or directory entry as reported by a storage provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileItem {
    pub name: String,
    pub is_directory: bool,
    pub path: String,
    #[serde(default)]
    pub size: Option<u64>,
    /// Modification time in seconds since the Unix epoch.
    pub last_modified: f64,
}

/// Metadata stored alongside every chunk in the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub file_path: String,
    pub chunk_number: u32,
}

/// A slice of a file's text, ready for submission to a vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Deterministic `"{file_path}-chunk-{n}"` identifier (1-based `n`).
    pub id: String,
    pub document: String,
    pub metadata: ChunkMetadata,
}

/// A row returned by [`VectorIndex::query`](crate::index::VectorIndex::query).
///
/// Metadata is kept as raw JSON because remote backends may return rows
/// written by other tools; the search orchestrator tolerates missing keys.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub document: String,
    pub metadata: serde_json::Value,
    /// Embedding distance; lower is more similar.
    pub distance: f64,
}

/// A ranked search hit. Produced per query, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub file_path: String,
    pub content_snippet: String,
    /// Retrieval distance, kept for diagnostics only.
    pub distance: f64,
    pub chunk_number: u32,
    pub relevance_score: f64,
}
