//! Reranker backends selected by `[rerank] backend`.
//!
//! `lexical` is the core [`LexicalReranker`]. `http` posts the query and
//! candidate texts to a cross-encoder service (for example a
//! text-embeddings-inference `/rerank` endpoint) and reads back one score
//! per text.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use folder_search_core::rerank::{LexicalReranker, Reranker};

use crate::config::RerankConfig;

pub fn build_reranker(config: &RerankConfig) -> Result<Arc<dyn Reranker>> {
    match config.backend.as_str() {
        "lexical" => Ok(Arc::new(LexicalReranker)),
        "http" => {
            let url = config
                .url
                .as_deref()
                .context("rerank.url must be set when backend is 'http'")?;
            Ok(Arc::new(HttpReranker::new(
                url,
                Duration::from_secs(config.timeout_secs),
            )?))
        }
        other => bail!("Unknown rerank backend: {}", other),
    }
}

pub struct HttpReranker {
    client: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [String],
}

#[derive(Deserialize)]
struct RerankScore {
    index: usize,
    score: f64,
}

impl HttpReranker {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f64>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let resp = self
            .client
            .post(&self.url)
            .json(&RerankRequest {
                query,
                texts: documents,
            })
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Rerank API error {}: {}", status, body);
        }

        let scored: Vec<RerankScore> = resp.json().await?;
        scores_in_order(scored, documents.len())
    }
}

/// Services return scores sorted by relevance; put them back in input order.
fn scores_in_order(scored: Vec<RerankScore>, n: usize) -> Result<Vec<f64>> {
    let mut scores = vec![None; n];
    for RerankScore { index, score } in scored {
        match scores.get_mut(index) {
            Some(slot) => *slot = Some(score),
            None => bail!("rerank response index {} out of range ({} texts)", index, n),
        }
    }
    scores
        .into_iter()
        .enumerate()
        .map(|(i, s)| s.with_context(|| format!("rerank response missing index {}", i)))
        .collect()
}
