//! TOML configuration.
//!
//! Loaded once at startup by [`load_config`] (default path
//! `./config/fsearch.toml`) and shared read-only through
//! [`AppContext`](crate::app::AppContext).
//!
//! ```toml
//! [db]
//! path = "./data/fsearch.sqlite"
//!
//! [vector]
//! backend = "memory"            # or "chroma"
//! path = "./data/vectors.json"
//!
//! [rerank]
//! backend = "lexical"           # or "http"
//!
//! [chunking]
//! chunk_size = 500
//! overlap = 50
//!
//! [retrieval]
//! default_k = 5
//! max_candidates = 20
//!
//! [server]
//! bind = "127.0.0.1:8000"
//!
//! [local]
//! root = "./files"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use folder_search_core::chunk::{ChunkParams, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use folder_search_core::search::{SearchParams, DEFAULT_MAX_CANDIDATES, DEFAULT_RESULT_COUNT};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
    pub local: LocalConfig,
    #[serde(default)]
    pub synology: SynologyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorConfig {
    #[serde(default = "default_vector_backend")]
    pub backend: String,
    /// JSON snapshot location for the `memory` backend. `None` keeps the
    /// index purely in memory.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Server URL for the `chroma` backend.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: default_vector_backend(),
            path: None,
            url: None,
            collection: default_collection(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_vector_backend() -> String {
    "memory".to_string()
}
fn default_collection() -> String {
    "file_contents".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RerankConfig {
    #[serde(default = "default_rerank_backend")]
    pub backend: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            backend: default_rerank_backend(),
            url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_rerank_backend() -> String {
    "lexical".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    /// File extensions (without the dot) eligible for indexing.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            extensions: default_extensions(),
        }
    }
}

impl ChunkingConfig {
    pub fn params(&self) -> ChunkParams {
        ChunkParams {
            size: self.chunk_size,
            overlap: self.overlap,
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

pub fn default_extensions() -> Vec<String> {
    [
        "txt", "md", "markdown", "rst", "csv", "log", "json", "yaml", "yml", "toml", "ini", "cfg",
        "conf", "xml", "html", "htm", "css", "js", "ts", "jsx", "tsx", "py", "rs", "go", "java",
        "kt", "c", "h", "cpp", "hpp", "cs", "rb", "php", "sh", "sql",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub default_k: usize,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
            max_candidates: default_max_candidates(),
        }
    }
}

impl RetrievalConfig {
    pub fn params(&self, k: Option<usize>) -> SearchParams {
        SearchParams {
            k: k.unwrap_or(self.default_k),
            max_candidates: self.max_candidates,
        }
    }
}

fn default_k() -> usize {
    DEFAULT_RESULT_COUNT
}
fn default_max_candidates() -> usize {
    DEFAULT_MAX_CANDIDATES
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost".to_string(),
        "http://localhost:3000".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocalConfig {
    /// Sandbox root for the local provider.
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SynologyConfig {
    #[serde(default = "default_timeout_secs")]
    pub list_timeout_secs: u64,
    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for SynologyConfig {
    fn default() -> Self {
        Self {
            list_timeout_secs: default_timeout_secs(),
            upload_timeout_secs: default_upload_timeout_secs(),
            accept_invalid_certs: false,
        }
    }
}

fn default_upload_timeout_secs() -> u64 {
    60
}

impl Config {
    /// In-memory configuration rooted at `dir`: SQLite file and local
    /// provider root both live under it, vectors are not persisted.
    pub fn minimal(dir: &Path) -> Self {
        Self {
            db: DbConfig {
                path: dir.join("fsearch.sqlite"),
            },
            vector: VectorConfig::default(),
            rerank: RerankConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            server: ServerConfig::default(),
            local: LocalConfig {
                root: dir.join("files"),
            },
            synology: SynologyConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            anyhow::bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.overlap >= self.chunking.chunk_size {
            anyhow::bail!("chunking.overlap must be smaller than chunking.chunk_size");
        }
        if self.chunking.extensions.is_empty() {
            anyhow::bail!("chunking.extensions must not be empty");
        }

        if self.retrieval.default_k < 1 {
            anyhow::bail!("retrieval.default_k must be >= 1");
        }
        if self.retrieval.max_candidates < 1 {
            anyhow::bail!("retrieval.max_candidates must be >= 1");
        }

        match self.vector.backend.as_str() {
            "memory" => {}
            "chroma" => {
                if self.vector.url.is_none() {
                    anyhow::bail!("vector.url must be set when backend is 'chroma'");
                }
            }
            other => anyhow::bail!(
                "Unknown vector backend: '{}'. Must be memory or chroma.",
                other
            ),
        }

        match self.rerank.backend.as_str() {
            "lexical" => {}
            "http" => {
                if self.rerank.url.is_none() {
                    anyhow::bail!("rerank.url must be set when backend is 'http'");
                }
            }
            other => anyhow::bail!(
                "Unknown rerank backend: '{}'. Must be lexical or http.",
                other
            ),
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &str) -> Result<Config> {
        let content = format!(
            r#"
[db]
path = "/tmp/fsearch.sqlite"

[local]
root = "/tmp/files"
{}
"#,
            extra
        );
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn test_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.overlap, 50);
        assert!(config.chunking.extensions.contains(&"md".to_string()));
        assert_eq!(config.retrieval.default_k, 5);
        assert_eq!(config.retrieval.max_candidates, 20);
        assert_eq!(config.vector.backend, "memory");
        assert_eq!(config.rerank.backend, "lexical");
        assert_eq!(config.synology.upload_timeout_secs, 60);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let err = parse("[chunking]\nchunk_size = 100\noverlap = 100\n").unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn test_remote_backends_need_url() {
        assert!(parse("[vector]\nbackend = \"chroma\"\n").is_err());
        assert!(parse("[vector]\nbackend = \"chroma\"\nurl = \"http://localhost:8000\"\n").is_ok());
        assert!(parse("[rerank]\nbackend = \"http\"\n").is_err());
        assert!(parse("[rerank]\nbackend = \"cross\"\n").is_err());
    }

    #[test]
    fn test_minimal_is_valid() {
        let dir = Path::new("/tmp/fsearch-test");
        let config = Config::minimal(dir);
        config.validate().unwrap();
        assert_eq!(config.local.root, dir.join("files"));
    }

    #[test]
    fn test_retrieval_params_override() {
        let config = parse("").unwrap();
        assert_eq!(config.retrieval.params(None).k, 5);
        assert_eq!(config.retrieval.params(Some(8)).k, 8);
    }
}
