//! Reranker capability.
//!
//! A [`Reranker`] scores `(query, document)` pairs more precisely than raw
//! retrieval distance. Higher scores mean more relevant. Scores are only
//! compared within one call, so backends are free to use any scale.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;

use crate::index::memory::tokenize;

#[async_trait]
pub trait Reranker: Send + Sync {
    /// Score every document against `query`. Returns one score per
    /// document, in input order.
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f64>>;
}

/// Token-overlap reranker.
///
/// Scores each document with the harmonic mean of query-term recall and
/// document-term precision, so short passages that contain the whole query
/// beat long passages that merely mention it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalReranker;

impl LexicalReranker {
    fn score_one(query_terms: &HashSet<String>, document: &str) -> f64 {
        let doc_terms: HashSet<String> = tokenize(document).into_iter().collect();
        if query_terms.is_empty() || doc_terms.is_empty() {
            return 0.0;
        }
        let shared = query_terms.intersection(&doc_terms).count() as f64;
        if shared == 0.0 {
            return 0.0;
        }
        let recall = shared / query_terms.len() as f64;
        let precision = shared / doc_terms.len() as f64;
        2.0 * recall * precision / (recall + precision)
    }
}

#[async_trait]
impl Reranker for LexicalReranker {
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f64>> {
        let query_terms: HashSet<String> = tokenize(query).into_iter().collect();
        Ok(documents
            .iter()
            .map(|doc| Self::score_one(&query_terms, doc))
            .collect())
    }
}
