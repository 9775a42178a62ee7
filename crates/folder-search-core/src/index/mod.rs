//! Vector index capability.
//!
//! The [`VectorIndex`] trait is the contract the indexing pipeline and the
//! search orchestrator consume. Chunks are keyed by their deterministic ID,
//! so `add` has upsert semantics: re-submitting a chunk overwrites it.
//!
//! Implementations must be `Send + Sync` to be shared across tokio tasks.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`add`](VectorIndex::add) | Upsert a batch of chunks |
//! | [`query`](VectorIndex::query) | Nearest candidates for a query text |
//! | [`delete_by_ids`](VectorIndex::delete_by_ids) | Remove chunks by ID |
//! | [`ids`](VectorIndex::ids) | List every stored chunk ID |
//! | [`count`](VectorIndex::count) | Number of stored chunks |
//! | [`reset_collection`](VectorIndex::reset_collection) | Drop everything |
//! | [`persist`](VectorIndex::persist) | Flush to durable storage |

pub mod memory;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{Candidate, Chunk, ChunkMetadata};

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Upsert `ids[i]` with `documents[i]` and `metadatas[i]`.
    ///
    /// All three slices must have the same length.
    async fn add(
        &self,
        ids: &[String],
        documents: &[String],
        metadatas: &[ChunkMetadata],
    ) -> Result<()>;

    /// Return up to `k` candidates ordered by ascending distance.
    async fn query(&self, text: &str, k: usize) -> Result<Vec<Candidate>>;

    async fn delete_by_ids(&self, ids: &[String]) -> Result<()>;

    async fn ids(&self) -> Result<Vec<String>>;

    async fn count(&self) -> Result<usize>;

    async fn reset_collection(&self) -> Result<()>;

    /// Flush pending state to durable storage. Backends that persist on
    /// every write keep the default no-op.
    async fn persist(&self) -> Result<()> {
        Ok(())
    }
}

/// Split chunks into the parallel `(ids, documents, metadatas)` columns
/// expected by [`VectorIndex::add`].
pub fn into_columns(chunks: Vec<Chunk>) -> (Vec<String>, Vec<String>, Vec<ChunkMetadata>) {
    let mut ids = Vec::with_capacity(chunks.len());
    let mut documents = Vec::with_capacity(chunks.len());
    let mut metadatas = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        ids.push(chunk.id);
        documents.push(chunk.document);
        metadatas.push(chunk.metadata);
    }
    (ids, documents, metadatas)
}

/// Validate that the columns passed to [`VectorIndex::add`] line up.
pub fn check_columns(
    ids: &[String],
    documents: &[String],
    metadatas: &[ChunkMetadata],
) -> Result<()> {
    if ids.len() != documents.len() || ids.len() != metadatas.len() {
        bail!(
            "mismatched batch: {} ids, {} documents, {} metadatas",
            ids.len(),
            documents.len(),
            metadatas.len()
        );
    }
    Ok(())
}

/// Delete every chunk whose ID starts with `prefix`. Returns the number of
/// chunks removed.
///
/// Chunk IDs are `"{file_path}-chunk-{n}"`, so passing `"{folder}/"` removes
/// every chunk of every file below that folder and nothing beside it.
pub async fn delete_by_prefix<V: VectorIndex + ?Sized>(index: &V, prefix: &str) -> Result<usize> {
    let matching: Vec<String> = index
        .ids()
        .await?
        .into_iter()
        .filter(|id| id.starts_with(prefix))
        .collect();

    if matching.is_empty() {
        return Ok(0);
    }

    index.delete_by_ids(&matching).await?;
    Ok(matching.len())
}
