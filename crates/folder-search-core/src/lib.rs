//! # folder-search core
//!
//! Shared, runtime-agnostic logic for folder-search: data models,
//! sliding-window chunking, the vector index and reranker capability traits,
//! the query-time search orchestrator, and the staleness rule used when
//! reporting folder status.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or network
//! dependencies. Concrete storage providers, the SQLite status store and
//! remote capability clients live in the `folder-search` app crate.

pub mod chunk;
pub mod index;
pub mod models;
pub mod rerank;
pub mod search;
pub mod staleness;
