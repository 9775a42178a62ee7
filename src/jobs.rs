//! Background indexing jobs.
//!
//! At most one job runs per `(owner, folder)`. A start request first checks
//! the in-process registry, then claims the folder in the status store with
//! [`StatusStore::try_begin_indexing`], so a stale `indexing` row written by
//! another process also blocks it. Finished handles are reaped lazily.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use folder_search_core::index::VectorIndex;

use crate::config::ChunkingConfig;
use crate::error::Result;
use crate::pipeline::index_folder;
use crate::provider::Provider;
use crate::status_store::StatusStore;

type JobKey = (String, String);

struct JobHandle {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

pub struct IndexJobs {
    store: StatusStore,
    index: Arc<dyn VectorIndex>,
    chunking: ChunkingConfig,
    jobs: Mutex<HashMap<JobKey, JobHandle>>,
}

impl IndexJobs {
    pub fn new(store: StatusStore, index: Arc<dyn VectorIndex>, chunking: ChunkingConfig) -> Self {
        Self {
            store,
            index,
            chunking,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Spawn an indexing job for `folder_path` as `provider`'s owner.
    /// Returns immediately; progress is visible through the status store.
    pub async fn start(&self, provider: Arc<dyn Provider>, folder_path: &str) -> Result<StartOutcome> {
        let key = (provider.provider_id().to_string(), folder_path.to_string());

        let mut jobs = self.jobs.lock().await;
        jobs.retain(|_, job| !job.handle.is_finished());

        if jobs.contains_key(&key) {
            return Ok(StartOutcome::AlreadyRunning);
        }
        if !self.store.try_begin_indexing(&key.0, &key.1).await? {
            tracing::info!(owner = %key.0, folder = %key.1, "folder already marked indexing");
            return Ok(StartOutcome::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        let handle = {
            let cancel = cancel.clone();
            let store = self.store.clone();
            let index = self.index.clone();
            let chunking = self.chunking.clone();
            let folder = key.1.clone();
            tokio::spawn(async move {
                // Outcome and errors are logged and recorded by the pipeline.
                let _ = index_folder(
                    provider.as_ref(),
                    index.as_ref(),
                    &store,
                    &chunking,
                    &folder,
                    &cancel,
                )
                .await;
            })
        };

        jobs.insert(key, JobHandle { handle, cancel });
        Ok(StartOutcome::Started)
    }

    pub async fn is_running(&self, owner_id: &str, folder_path: &str) -> bool {
        let mut jobs = self.jobs.lock().await;
        jobs.retain(|_, job| !job.handle.is_finished());
        jobs.contains_key(&(owner_id.to_string(), folder_path.to_string()))
    }

    /// Wait for a job to finish on its own. Returns `false` if none was
    /// registered.
    pub async fn join(&self, owner_id: &str, folder_path: &str) -> bool {
        let job = self
            .jobs
            .lock()
            .await
            .remove(&(owner_id.to_string(), folder_path.to_string()));
        match job {
            Some(job) => {
                if let Err(e) = job.handle.await {
                    tracing::error!(owner = owner_id, folder = folder_path, error = %e, "indexing task panicked");
                }
                true
            }
            None => false,
        }
    }

    /// Cancel a job and wait until it has stopped submitting chunks.
    /// Returns `false` if none was running.
    pub async fn cancel_and_wait(&self, owner_id: &str, folder_path: &str) -> bool {
        let job = self
            .jobs
            .lock()
            .await
            .remove(&(owner_id.to_string(), folder_path.to_string()));
        let Some(job) = job else {
            return false;
        };

        job.cancel.cancel();
        if let Err(e) = job.handle.await {
            tracing::error!(owner = owner_id, folder = folder_path, error = %e, "indexing task panicked");
        }
        true
    }

    /// Signal every job to stop without waiting. Returns how many were
    /// signalled.
    pub async fn cancel_all(&self) -> usize {
        let mut jobs = self.jobs.lock().await;
        let count = jobs.len();
        for (_, job) in jobs.drain() {
            job.cancel.cancel();
        }
        count
    }
}
