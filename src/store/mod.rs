//! Persistent index state: file metadata, full-text chunk index, and the
//! vector store.
//!
//! The vector store is authoritative. The FTS index is best-effort and
//! re-applied by later scans when it drifts; the file table records which
//! file versions both stores currently reflect.

mod fts;
mod metadata;
mod vector;

pub use fts::{FtsIndex, LexicalHit};
pub use metadata::MetadataStore;
pub use vector::{VectorHit, VectorStore};

use crate::chunking::{ByteSpan, Chunk};
use serde::{Deserialize, Serialize};

/// Key in the metadata KV pane recording the vector dimension of the
/// current index. A change triggers a full rebuild.
pub const KV_EMBEDDING_DIMENSIONS: &str = "embedding_dimensions";

/// Per-file record in the metadata store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Repo-relative path (primary key)
    pub relative_path: String,
    /// Stable digest over the file bytes
    pub content_hash: String,
    /// Modification time, seconds since UNIX_EPOCH
    pub mtime: u64,
    /// File size in bytes
    pub size: u64,
    /// Language tag
    pub language: String,
    /// The content hash last successfully written to the vector and FTS
    /// stores; `None` means the file has never been (or failed to be)
    /// indexed
    pub vector_index_hash: Option<String>,
}

impl FileRecord {
    /// A file is dirty when the indexed state does not match its contents.
    pub fn is_dirty(&self) -> bool {
        self.vector_index_hash.as_deref() != Some(self.content_hash.as_str())
    }
}

/// A chunk as stored in the vector store: all chunk fields plus the
/// dense vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub relative_path: String,
    pub file_hash: String,
    pub chunk_index: u32,
    pub display_code: String,
    pub breadcrumb: String,
    pub language: String,
    pub raw_span: ByteSpan,
    pub vector_span: ByteSpan,
    pub start_line: u32,
    pub end_line: u32,
    /// Unit-normalized embedding; persisted out-of-band in the vector file
    #[serde(skip)]
    pub vector: Vec<f32>,
}

impl ChunkRecord {
    /// Assemble a record from a chunk and its embedding.
    pub fn new(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self {
            chunk_id: chunk.id(),
            relative_path: chunk.relative_path,
            file_hash: chunk.file_hash,
            chunk_index: chunk.chunk_index,
            display_code: chunk.display_code,
            breadcrumb: chunk.breadcrumb,
            language: chunk.language,
            raw_span: chunk.raw_span,
            vector_span: chunk.vector_span,
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            vector,
        }
    }

    /// Text indexed by the FTS layer: breadcrumb joined with the code.
    pub fn fts_text(&self) -> String {
        if self.breadcrumb.is_empty() {
            self.display_code.clone()
        } else {
            format!("{}\n{}", self.breadcrumb, self.display_code)
        }
    }
}
