//! Error types for the retrieval engine
//!
//! Structured error types using thiserror, one taxonomy per subsystem,
//! with actionable messages where the failure has a known remedy.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors, surfaced to the user with remediation hints.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Missing required configuration: {}\nSuggestion: set the listed keys in contextweaver.toml or as environment variables",
        keys.join(", ")
    )]
    MissingKeys { keys: Vec<String> },

    #[error("Invalid configuration: {reason}")]
    Invalid { reason: String },
}

/// Errors from the chunking layer.
///
/// Parser failures are recoverable: the indexer falls back to the
/// line-based splitter for the affected file.
#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("Failed to initialize {language} parser: {reason}")]
    ParserInit { language: String, reason: String },

    #[error("Failed to parse {language} file '{path}': {reason}")]
    Parse {
        path: PathBuf,
        language: String,
        reason: String,
    },

    #[error("Invalid UTF-8 in source file '{path}'")]
    InvalidUtf8 { path: PathBuf },
}

/// Errors from the embedding client.
///
/// The classification drives retry policy: rate-limited errors are retried
/// indefinitely with backoff, network errors up to 3 times, everything else
/// fails the batch and marks its files dirty for a later scan.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding endpoint rate-limited the request")]
    RateLimited,

    #[error("Network error calling embedding endpoint: {reason}")]
    Network { reason: String },

    #[error("Embedding API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error(
        "Embedding dimension mismatch: expected {expected}, got {actual}\nSuggestion: check EMBEDDINGS_DIMENSIONS against the configured model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding response malformed: {reason}")]
    InvalidResponse { reason: String },
}

impl EmbeddingError {
    /// True when the error indicates throttling (429, or 5xx mentioning "rate").
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::RateLimited => true,
            Self::Api { status, body } => {
                *status == 429 || (*status >= 500 && body.to_lowercase().contains("rate"))
            }
            _ => false,
        }
    }

    /// True for transient network-class failures worth a bounded retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}

/// Errors from the reranker client. Never fatal to a query.
#[derive(Error, Debug)]
pub enum RerankError {
    #[error("Network error calling rerank endpoint: {reason}")]
    Network { reason: String },

    #[error("Rerank API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Rerank response malformed: {reason}")]
    InvalidResponse { reason: String },
}

/// Errors from the persistent stores.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error at '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Tantivy operation failed during {operation}: {cause}")]
    Tantivy { operation: String, cause: String },

    #[error("Store appears to be corrupted: {reason}\nSuggestion: run a forced scan to rebuild the index")]
    Corrupted { reason: String },

    #[error(
        "Vector dimension mismatch: store has {stored}, configuration requests {configured}\nThe index will be rebuilt"
    )]
    DimensionChanged { stored: usize, configured: usize },

    #[error("Failed to serialize store state: {reason}")]
    Serialization { reason: String },
}

impl From<tantivy::TantivyError> for StoreError {
    fn from(e: tantivy::TantivyError) -> Self {
        StoreError::Tantivy {
            operation: "index".to_string(),
            cause: e.to_string(),
        }
    }
}

/// Top-level error for scan operations.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(
        "Another scan is in progress (lock '{path}' held by pid {pid})\nSuggestion: wait for it to finish, or delete the lock file if the process is gone"
    )]
    ScanLocked { path: PathBuf, pid: u32 },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("{0}")]
    General(String),
}

/// Top-level error for query operations.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    General(String),
}

/// Result type alias for scan operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for chunking operations
pub type ChunkResult<T> = Result<T, ChunkError>;

/// Result type alias for embedding operations
pub type EmbedResult<T> = Result<T, EmbeddingError>;
