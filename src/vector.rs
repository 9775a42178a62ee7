//! Vector index backends selected by `[vector] backend`.
//!
//! - `memory`: [`PersistentMemoryIndex`], the core in-memory index with an
//!   optional JSON snapshot on disk, written by [`VectorIndex::persist`].
//! - `chroma`: [`ChromaVectorIndex`], a ChromaDB server reached over its
//!   REST API. The server embeds documents and queries itself.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};

use folder_search_core::index::memory::{InMemoryVectorIndex, StoredChunk};
use folder_search_core::index::{check_columns, VectorIndex};
use folder_search_core::models::{Candidate, ChunkMetadata};

use crate::config::VectorConfig;

/// Build the configured backend. A non-`writable` memory index loads the
/// snapshot but never writes it back.
pub async fn build_vector_index(
    config: &VectorConfig,
    writable: bool,
) -> Result<Arc<dyn VectorIndex>> {
    match config.backend.as_str() {
        "memory" => {
            let index = PersistentMemoryIndex::open(config.path.clone())?;
            if writable {
                Ok(Arc::new(index))
            } else {
                Ok(Arc::new(index.read_only()))
            }
        }
        "chroma" => {
            let url = config
                .url
                .as_deref()
                .context("vector.url must be set when backend is 'chroma'")?;
            let index = ChromaVectorIndex::connect(
                url,
                &config.collection,
                Duration::from_secs(config.timeout_secs),
            )
            .await?;
            Ok(Arc::new(index))
        }
        other => bail!("Unknown vector backend: {}", other),
    }
}

// ============ memory ============

pub struct PersistentMemoryIndex {
    inner: InMemoryVectorIndex,
    path: Option<PathBuf>,
    read_only: bool,
    /// Serializes snapshot writers so an older snapshot never lands last.
    persist_lock: Mutex<()>,
}

impl PersistentMemoryIndex {
    /// Load the snapshot at `path` if it exists. `None` keeps the index
    /// purely in memory.
    pub fn open(path: Option<PathBuf>) -> Result<Self> {
        let inner = match path.as_deref() {
            Some(p) if p.exists() => {
                let bytes = std::fs::read(p)
                    .with_context(|| format!("Failed to read vector snapshot: {}", p.display()))?;
                let chunks: Vec<StoredChunk> = serde_json::from_slice(&bytes)
                    .with_context(|| format!("Corrupt vector snapshot: {}", p.display()))?;
                tracing::info!(path = %p.display(), chunks = chunks.len(), "loaded vector snapshot");
                InMemoryVectorIndex::from_snapshot(chunks)
            }
            _ => InMemoryVectorIndex::new(),
        };
        Ok(Self {
            inner,
            path,
            read_only: false,
            persist_lock: Mutex::new(()),
        })
    }

    /// Keep serving the loaded snapshot but turn [`VectorIndex::persist`]
    /// into a no-op, so another process owning the file is not clobbered.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[async_trait]
impl VectorIndex for PersistentMemoryIndex {
    async fn add(
        &self,
        ids: &[String],
        documents: &[String],
        metadatas: &[ChunkMetadata],
    ) -> Result<()> {
        self.inner.add(ids, documents, metadatas).await
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<Candidate>> {
        self.inner.query(text, k).await
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<()> {
        self.inner.delete_by_ids(ids).await
    }

    async fn ids(&self) -> Result<Vec<String>> {
        self.inner.ids().await
    }

    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }

    async fn reset_collection(&self) -> Result<()> {
        self.inner.reset_collection().await
    }

    /// Write the snapshot atomically: a uniquely named temp file in the
    /// same directory, then rename over the target. The snapshot is taken
    /// under the writer lock so the last rename always carries the newest
    /// state.
    async fn persist(&self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        if self.read_only {
            return Ok(());
        }

        let _guard = self.persist_lock.lock().await;
        let bytes = serde_json::to_vec(&self.inner.snapshot()?)?;

        tokio::task::spawn_blocking(move || -> Result<()> {
            let parent = match path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                _ => PathBuf::from("."),
            };
            std::fs::create_dir_all(&parent)?;
            let mut tmp = tempfile::NamedTempFile::new_in(&parent)
                .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path)
                .map_err(|e| e.error)
                .with_context(|| format!("Failed to replace {}", path.display()))?;
            Ok(())
        })
        .await??;

        Ok(())
    }
}

// ============ chroma ============

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    id: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<Value>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f64>>>>,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    #[serde(default)]
    ids: Vec<String>,
}

/// ChromaDB REST (v1) client bound to one collection.
pub struct ChromaVectorIndex {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    collection_id: RwLock<String>,
}

impl ChromaVectorIndex {
    pub async fn connect(url: &str, collection: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = format!("{}/api/v1", url.trim_end_matches('/'));
        let id = get_or_create(&client, &base_url, collection).await?;

        tracing::info!(collection, url, "connected to Chroma");
        Ok(Self {
            client,
            base_url,
            collection: collection.to_string(),
            collection_id: RwLock::new(id),
        })
    }

    async fn post(&self, op: &str, body: Value) -> Result<reqwest::Response> {
        let id = self.collection_id.read().await.clone();
        let url = format!("{}/collections/{}/{}", self.base_url, id, op);
        let resp = self.client.post(&url).json(&body).send().await?;
        check(resp, op).await
    }
}

async fn get_or_create(client: &reqwest::Client, base_url: &str, name: &str) -> Result<String> {
    let resp = client
        .post(format!("{}/collections", base_url))
        .json(&json!({ "name": name, "get_or_create": true }))
        .send()
        .await?;
    let info: CollectionInfo = check(resp, "create collection").await?.json().await?;
    Ok(info.id)
}

async fn check(resp: reqwest::Response, op: &str) -> Result<reqwest::Response> {
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        bail!("Chroma {} failed {}: {}", op, status, body);
    }
    Ok(resp)
}

#[async_trait]
impl VectorIndex for ChromaVectorIndex {
    async fn add(
        &self,
        ids: &[String],
        documents: &[String],
        metadatas: &[ChunkMetadata],
    ) -> Result<()> {
        check_columns(ids, documents, metadatas)?;
        if ids.is_empty() {
            return Ok(());
        }
        // Upsert keeps re-indexing idempotent.
        self.post(
            "upsert",
            json!({ "ids": ids, "documents": documents, "metadatas": metadatas }),
        )
        .await?;
        Ok(())
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<Candidate>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let resp: QueryResponse = self
            .post(
                "query",
                json!({
                    "query_texts": [text],
                    "n_results": k,
                    "include": ["documents", "metadatas", "distances"],
                }),
            )
            .await?
            .json()
            .await?;

        let ids = resp.ids.into_iter().next().unwrap_or_default();
        let mut documents = resp.documents.and_then(|d| d.into_iter().next()).unwrap_or_default();
        let mut metadatas = resp.metadatas.and_then(|m| m.into_iter().next()).unwrap_or_default();
        let mut distances = resp.distances.and_then(|d| d.into_iter().next()).unwrap_or_default();
        documents.resize(ids.len(), None);
        metadatas.resize(ids.len(), None);
        distances.resize(ids.len(), None);

        Ok(ids
            .into_iter()
            .zip(documents)
            .zip(metadatas)
            .zip(distances)
            .map(|(((id, document), metadata), distance)| Candidate {
                id,
                document: document.unwrap_or_default(),
                metadata: metadata.unwrap_or(Value::Null),
                distance: distance.unwrap_or(f64::MAX),
            })
            .collect())
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.post("delete", json!({ "ids": ids })).await?;
        Ok(())
    }

    async fn ids(&self) -> Result<Vec<String>> {
        let resp: GetResponse = self
            .post("get", json!({ "include": [] }))
            .await?
            .json()
            .await?;
        Ok(resp.ids)
    }

    async fn count(&self) -> Result<usize> {
        let id = self.collection_id.read().await.clone();
        let url = format!("{}/collections/{}/count", self.base_url, id);
        let resp = check(self.client.get(&url).send().await?, "count").await?;
        Ok(resp.json().await?)
    }

    async fn reset_collection(&self) -> Result<()> {
        let url = format!("{}/collections/{}", self.base_url, self.collection);
        check(self.client.delete(&url).send().await?, "delete collection").await?;

        let id = get_or_create(&self.client, &self.base_url, &self.collection).await?;
        *self.collection_id.write().await = id;
        tracing::info!(collection = %self.collection, "Chroma collection reset");
        Ok(())
    }
}
