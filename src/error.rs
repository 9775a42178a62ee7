//! Error taxonomy for the app crate.
//!
//! Provider, status-store and pipeline operations return [`Result`] so
//! callers can tell a sandbox violation from a missing folder or a NAS
//! outage. Capability backends (vector index, reranker) speak `anyhow` and
//! are wrapped in [`Error::VectorIndex`].

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("remote request failed: {0}")]
    RemoteProtocol(String),

    #[error("could not decode {0} with any supported encoding")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(std::io::Error),

    #[error("vector index error: {0}")]
    VectorIndex(#[from] anyhow::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// Another open context owns the index for writing.
    #[error("index is locked by another process: {0}")]
    Locked(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(err.to_string()),
            std::io::ErrorKind::PermissionDenied => Error::PermissionDenied(err.to_string()),
            _ => Error::Io(err),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::RemoteProtocol(err.to_string())
    }
}
