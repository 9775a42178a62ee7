//! # folder-search
//!
//! Folder indexing and reranked search over local disks and Synology NAS
//! shares.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ Providers  │──▶│  Pipeline   │──▶│ Vector index │
//! │ local/NAS  │   │ crawl+chunk │   │ memory/chroma│
//! └────────────┘   └──────┬──────┘   └──────┬───────┘
//!                         │                 │
//!                         ▼                 ▼
//!                  ┌────────────┐    ┌────────────┐
//!                  │ Status     │    │ Search +   │
//!                  │ store      │    │ rerank     │
//!                  └────────────┘    └────────────┘
//! ```
//!
//! Every long-lived component hangs off [`app::AppContext`], which the
//! `fsearch` CLI and the [`server`] share.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] / [`migrate`] | SQLite pool and schema |
//! | [`status_store`] | Per-folder index status, crash recovery |
//! | [`provider`] | Local and Synology file trees |
//! | [`decode`] | Legacy text encoding fallback |
//! | [`pipeline`] | Crawl, filter, chunk, submit |
//! | [`jobs`] | Background job registry |
//! | [`reconcile`] | Stored status vs live folder metadata |
//! | [`vector`] / [`rerank`] | Capability backends |
//! | [`search`] | Query entry point |
//! | [`session`] | Per-caller provider sessions |
//! | [`server`] | HTTP API |

pub mod app;
pub mod config;
pub mod db;
pub mod decode;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod migrate;
pub mod pipeline;
pub mod provider;
pub mod reconcile;
pub mod rerank;
pub mod search;
pub mod server;
pub mod session;
pub mod status_store;
pub mod vector;

pub use error::{Error, Result};
