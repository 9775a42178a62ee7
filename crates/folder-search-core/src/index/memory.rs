//! In-memory [`VectorIndex`] implementation.
//!
//! Stores chunks in a `BTreeMap` behind `std::sync::RwLock`. Distance is
//! lexical rather than embedding-based: `1 - |q ∩ d| / |q|` over lowercase
//! alphanumeric tokens, so a chunk containing every query term has distance
//! `0.0`. Good enough for local runs and tests; semantic retrieval belongs to
//! a real engine behind the same trait.
//!
//! The full contents can be exported with [`InMemoryVectorIndex::snapshot`]
//! and restored with [`InMemoryVectorIndex::from_snapshot`], which the app
//! crate uses to persist the index as JSON between runs.

use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{check_columns, VectorIndex};
use crate::models::{Candidate, ChunkMetadata};

/// One stored chunk, also the unit of the JSON snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub id: String,
    pub document: String,
    pub metadata: ChunkMetadata,
}

pub struct InMemoryVectorIndex {
    chunks: RwLock<BTreeMap<String, StoredChunk>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn from_snapshot(chunks: Vec<StoredChunk>) -> Self {
        let map = chunks.into_iter().map(|c| (c.id.clone(), c)).collect();
        Self {
            chunks: RwLock::new(map),
        }
    }

    /// Copy of every stored chunk, ordered by ID.
    pub fn snapshot(&self) -> Result<Vec<StoredChunk>> {
        let chunks = self
            .chunks
            .read()
            .map_err(|_| anyhow!("vector index lock poisoned"))?;
        Ok(chunks.values().cloned().collect())
    }
}

impl Default for InMemoryVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercase alphanumeric tokens of `text` (Unicode-aware).
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn lexical_distance(query_terms: &HashSet<String>, document: &str) -> f64 {
    if query_terms.is_empty() {
        return 1.0;
    }
    let doc_terms: HashSet<String> = tokenize(document).into_iter().collect();
    let shared = query_terms.intersection(&doc_terms).count();
    1.0 - shared as f64 / query_terms.len() as f64
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn add(
        &self,
        ids: &[String],
        documents: &[String],
        metadatas: &[ChunkMetadata],
    ) -> Result<()> {
        check_columns(ids, documents, metadatas)?;
        let mut chunks = self
            .chunks
            .write()
            .map_err(|_| anyhow!("vector index lock poisoned"))?;
        for ((id, document), metadata) in ids.iter().zip(documents).zip(metadatas) {
            chunks.insert(
                id.clone(),
                StoredChunk {
                    id: id.clone(),
                    document: document.clone(),
                    metadata: metadata.clone(),
                },
            );
        }
        Ok(())
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<Candidate>> {
        let query_terms: HashSet<String> = tokenize(text).into_iter().collect();
        let chunks = self
            .chunks
            .read()
            .map_err(|_| anyhow!("vector index lock poisoned"))?;

        let mut candidates: Vec<Candidate> = chunks
            .values()
            .map(|c| Candidate {
                id: c.id.clone(),
                document: c.document.clone(),
                metadata: serde_json::to_value(&c.metadata).unwrap_or_default(),
                distance: lexical_distance(&query_terms, &c.document),
            })
            .collect();

        // BTreeMap iteration is ID-ordered, so the stable sort breaks
        // distance ties by ID.
        candidates.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(k);
        Ok(candidates)
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<()> {
        let mut chunks = self
            .chunks
            .write()
            .map_err(|_| anyhow!("vector index lock poisoned"))?;
        for id in ids {
            chunks.remove(id);
        }
        Ok(())
    }

    async fn ids(&self) -> Result<Vec<String>> {
        let chunks = self
            .chunks
            .read()
            .map_err(|_| anyhow!("vector index lock poisoned"))?;
        Ok(chunks.keys().cloned().collect())
    }

    async fn count(&self) -> Result<usize> {
        let chunks = self
            .chunks
            .read()
            .map_err(|_| anyhow!("vector index lock poisoned"))?;
        Ok(chunks.len())
    }

    async fn reset_collection(&self) -> Result<()> {
        let mut chunks = self
            .chunks
            .write()
            .map_err(|_| anyhow!("vector index lock poisoned"))?;
        chunks.clear();
        Ok(())
    }
}
