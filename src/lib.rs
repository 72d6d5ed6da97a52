//! ContextWeaver: semantic retrieval over source-code repositories.
//!
//! The crate is organized around two flows:
//! - Index path: `indexing::walker` -> `chunking` -> `indexing::Indexer`
//!   -> (`store::VectorStore`, `store::MetadataStore`, `store::FtsIndex`).
//! - Query path: `search::SearchService` -> `expand::GraphExpander`
//!   -> `pack::ContextPacker` -> formatted segments.

pub mod chunking;
pub mod config;
pub mod embedding;
pub mod error;
pub mod expand;
pub mod indexing;
pub mod pack;
pub mod project;
pub mod rerank;
pub mod retrieve;
pub mod search;
pub mod store;

// Explicit exports for better API clarity
pub use chunking::{Chunk, Chunker, Language};
pub use config::Settings;
pub use error::{
    ChunkError, ConfigError, EmbeddingError, IndexError, IndexResult, RerankError, SearchError,
    StoreError, StoreResult,
};
pub use indexing::{Indexer, ScanOptions, ScanStats};
pub use pack::{ContextPack, Segment};
pub use project::Project;
pub use search::SearchService;
pub use store::{ChunkRecord, FileRecord};
