//! Query entry point shared by the CLI and the HTTP server.

use std::time::Instant;

use folder_search_core::index::VectorIndex;
use folder_search_core::models::SearchResult;
use folder_search_core::rerank::Reranker;
use folder_search_core::search::{search, SearchParams};

use crate::error::Result;

/// Retrieve, rerank and dedupe. An empty index yields no results.
pub async fn run_search(
    index: &dyn VectorIndex,
    reranker: &dyn Reranker,
    query: &str,
    params: &SearchParams,
) -> Result<Vec<SearchResult>> {
    let started = Instant::now();
    let results = search(index, reranker, query, params).await?;
    tracing::debug!(
        k = params.k,
        results = results.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "search"
    );
    Ok(results)
}
