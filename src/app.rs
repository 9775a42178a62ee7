//! Application context.
//!
//! [`AppContext`] owns every long-lived component (status store, vector
//! index, reranker, provider sessions, indexing jobs). It is built once by
//! [`AppContext::open`], shared as `Arc<AppContext>` with HTTP handlers and
//! CLI commands, and torn down with [`AppContext::shutdown`].
//!
//! Several contexts may open the same database (a running server plus CLI
//! invocations). The first one takes the [`db::Lease`] and becomes the
//! primary: it recovers interrupted jobs at startup and is the only one
//! allowed to index, delete or persist. Secondaries only read.

use std::collections::HashMap;
use std::sync::Arc;

use folder_search_core::index::{delete_by_prefix, VectorIndex};
use folder_search_core::models::{IndexStatus, SearchResult};
use folder_search_core::rerank::Reranker;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::jobs::{IndexJobs, StartOutcome};
use crate::pipeline::{index_folder, RunOutcome};
use crate::provider::{LocalProvider, Provider};
use crate::rerank::build_reranker;
use crate::session::SessionRegistry;
use crate::status_store::StatusStore;
use crate::vector::build_vector_index;
use crate::{db, migrate, reconcile, search};

pub struct AppContext {
    pub config: Config,
    pub store: StatusStore,
    pub index: Arc<dyn VectorIndex>,
    pub reranker: Arc<dyn Reranker>,
    pub sessions: SessionRegistry,
    pub jobs: IndexJobs,
    lease: Option<db::Lease>,
}

impl AppContext {
    /// Connect storage, recover from an unclean shutdown and build the
    /// configured backends. Recovery only runs when this context wins the
    /// lease; a secondary must not fail rows a live primary is working on.
    pub async fn open(config: Config) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;

        let lease = db::try_acquire_lease(&config.db.path)?;
        let pool = db::connect(&config).await?;
        migrate::run_migrations(&pool).await?;
        let store = StatusStore::new(pool);
        if lease.is_some() {
            store.reconcile_on_startup().await?;
        } else {
            tracing::info!(
                db = %config.db.path.display(),
                "database is owned by another process; opening read-only"
            );
        }

        let index = build_vector_index(&config.vector, lease.is_some()).await?;
        let reranker = build_reranker(&config.rerank)?;

        let local = Arc::new(LocalProvider::new(&config.local.root)?);
        let sessions = SessionRegistry::new(local, config.synology.clone());
        let jobs = IndexJobs::new(store.clone(), index.clone(), config.chunking.clone());

        tracing::info!(
            db = %config.db.path.display(),
            vector = %config.vector.backend,
            rerank = %config.rerank.backend,
            primary = lease.is_some(),
            "application context ready"
        );

        Ok(Self {
            config,
            store,
            index,
            reranker,
            sessions,
            jobs,
            lease,
        })
    }

    /// Whether this context holds the writer lease.
    pub fn is_primary(&self) -> bool {
        self.lease.is_some()
    }

    fn require_primary(&self) -> Result<()> {
        match &self.lease {
            Some(_) => Ok(()),
            None => Err(Error::Locked(self.config.db.path.display().to_string())),
        }
    }

    pub async fn provider(&self, session: Option<&str>) -> Result<Arc<dyn Provider>> {
        self.sessions.resolve(session).await
    }

    /// Queue a background indexing job.
    pub async fn start_indexing(
        &self,
        provider: Arc<dyn Provider>,
        folder_path: &str,
    ) -> Result<StartOutcome> {
        self.require_primary()?;
        let outcome = self.jobs.start(provider.clone(), folder_path).await?;
        tracing::info!(owner = provider.provider_id(), folder = folder_path, ?outcome, "index request");
        Ok(outcome)
    }

    /// Index in the foreground, for the CLI. `None` means another job
    /// already holds the folder.
    pub async fn index_now(
        &self,
        provider: &dyn Provider,
        folder_path: &str,
    ) -> Result<Option<RunOutcome>> {
        self.require_primary()?;
        if !self
            .store
            .try_begin_indexing(provider.provider_id(), folder_path)
            .await?
        {
            return Ok(None);
        }
        let outcome = index_folder(
            provider,
            self.index.as_ref(),
            &self.store,
            &self.config.chunking,
            folder_path,
            &CancellationToken::new(),
        )
        .await?;
        Ok(Some(outcome))
    }

    pub async fn statuses(
        &self,
        provider: &dyn Provider,
        folder_paths: &[String],
    ) -> Result<HashMap<String, IndexStatus>> {
        reconcile::batch_status(&self.store, provider, folder_paths).await
    }

    pub async fn search(&self, query: &str, k: Option<usize>) -> Result<Vec<SearchResult>> {
        let params = self.config.retrieval.params(k);
        search::run_search(self.index.as_ref(), self.reranker.as_ref(), query, &params).await
    }

    /// Remove a folder's index: stop its job, purge its chunks, then its
    /// status record. Returns the number of chunks deleted.
    pub async fn delete_index(&self, provider: &dyn Provider, folder_path: &str) -> Result<usize> {
        self.require_primary()?;
        let owner_id = provider.provider_id();
        if self.jobs.cancel_and_wait(owner_id, folder_path).await {
            tracing::info!(owner = owner_id, folder = folder_path, "cancelled running job before delete");
        }

        let prefix = provider.chunk_prefix(folder_path);
        let deleted = delete_by_prefix(self.index.as_ref(), &prefix).await?;
        self.store.remove_folder(owner_id, folder_path).await?;
        if let Err(e) = self.index.persist().await {
            tracing::warn!(error = %e, "failed to persist vector index");
        }

        tracing::info!(owner = owner_id, folder = folder_path, deleted, "index deleted");
        Ok(deleted)
    }

    /// Drop every chunk and every status record.
    pub async fn reset(&self) -> Result<()> {
        self.require_primary()?;
        self.jobs.cancel_all().await;
        self.index.reset_collection().await?;
        self.index.persist().await?;
        let removed = self.store.clear().await?;
        tracing::info!(records = removed, "index reset");
        Ok(())
    }

    /// Stop jobs (without draining them), close sessions, persist the
    /// vector index and close the store, in that order.
    pub async fn shutdown(&self) {
        let cancelled = self.jobs.cancel_all().await;
        if cancelled > 0 {
            tracing::info!(cancelled, "signalled running jobs to stop");
        }
        self.sessions.close_all().await;
        if let Err(e) = self.index.persist().await {
            tracing::error!(error = %e, "failed to persist vector index on shutdown");
        }
        self.store.close().await;
        tracing::info!("shutdown complete");
    }
}
