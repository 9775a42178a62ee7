//! Query-time retrieval, rerank, and per-file deduplication.
//!
//! The orchestrator works entirely through the [`VectorIndex`] and
//! [`Reranker`] traits. The calling application decides which backends to
//! use and how many results to ask for.
//!
//! # Algorithm
//!
//! 1. Empty index → empty result.
//! 2. Fetch `min(2k, max_candidates, index_size)` nearest candidates.
//! 3. Score every candidate document against the query with the reranker.
//! 4. Sort by relevance score, descending (distance is carried along for
//!    diagnostics only; NaN scores sort last; ties keep retrieval order).
//! 5. Keep the first hit per `file_path` until `k` distinct files are
//!    collected.

use std::cmp::Ordering;
use std::collections::HashSet;

use anyhow::{bail, Result};

use crate::index::VectorIndex;
use crate::models::{Candidate, SearchResult};
use crate::rerank::Reranker;

pub const DEFAULT_RESULT_COUNT: usize = 5;
pub const DEFAULT_MAX_CANDIDATES: usize = 20;

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchParams {
    /// Number of distinct files to return.
    pub k: usize,
    /// Upper bound on candidates fetched for reranking.
    pub max_candidates: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            k: DEFAULT_RESULT_COUNT,
            max_candidates: DEFAULT_MAX_CANDIDATES,
        }
    }
}

impl SearchParams {
    /// Number of candidates to request from an index holding `index_size`
    /// chunks.
    pub fn candidate_count(&self, index_size: usize) -> usize {
        (self.k * 2).min(self.max_candidates).min(index_size)
    }
}

/// Run a search against `index`, reranking candidates with `reranker`.
pub async fn search<V, R>(
    index: &V,
    reranker: &R,
    query: &str,
    params: &SearchParams,
) -> Result<Vec<SearchResult>>
where
    V: VectorIndex + ?Sized,
    R: Reranker + ?Sized,
{
    if query.trim().is_empty() || params.k == 0 {
        return Ok(Vec::new());
    }

    let index_size = index.count().await?;
    if index_size == 0 {
        return Ok(Vec::new());
    }

    let candidates = index
        .query(query, params.candidate_count(index_size))
        .await?;
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let documents: Vec<String> = candidates.iter().map(|c| c.document.clone()).collect();
    let scores = reranker.score(query, &documents).await?;
    if scores.len() != candidates.len() {
        bail!(
            "reranker returned {} scores for {} candidates",
            scores.len(),
            candidates.len()
        );
    }

    let mut scored: Vec<SearchResult> = candidates
        .into_iter()
        .zip(scores)
        .map(|(candidate, score)| to_result(candidate, score))
        .collect();

    scored.sort_by(|a, b| by_score_desc(a.relevance_score, b.relevance_score));

    Ok(dedupe_by_file(scored, params.k))
}

/// Descending order by score, NaN last.
fn by_score_desc(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

fn to_result(candidate: Candidate, relevance_score: f64) -> SearchResult {
    let file_path = candidate
        .metadata
        .get("file_path")
        .and_then(|v| v.as_str())
        .unwrap_or("Unknown")
        .to_string();
    let chunk_number = candidate
        .metadata
        .get("chunk_number")
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32;

    SearchResult {
        file_path,
        content_snippet: candidate.document,
        distance: candidate.distance,
        chunk_number,
        relevance_score,
    }
}

/// Keep the first result per `file_path`, stopping at `k` files.
///
/// Input must already be sorted best-first.
pub fn dedupe_by_file(sorted: Vec<SearchResult>, k: usize) -> Vec<SearchResult> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut results = Vec::with_capacity(k);
    for result in sorted {
        if results.len() >= k {
            break;
        }
        if seen.insert(result.file_path.clone()) {
            results.push(result);
        }
    }
    results
}
