//! Per-file change detection.
//!
//! Compares the repository's current contents against the file table and
//! produces one [`ProcessResult`] per file: its status, the refreshed file
//! record, and (when the index needs new chunks) the chunker output.

use crate::chunking::{Chunk, Chunker, Language};
use crate::store::{FileRecord, MetadataStore};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Outcome of looking at one file during a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Added,
    Modified,
    Unchanged,
    Deleted,
    Skipped,
    Error,
}

/// One file's scan outcome.
#[derive(Debug)]
pub struct ProcessResult {
    pub relative_path: String,
    pub status: ProcessStatus,
    /// Refreshed record; `None` for deleted and skipped files
    pub record: Option<FileRecord>,
    /// Chunks for files whose index state must be (re)written
    pub chunks: Vec<Chunk>,
    pub error: Option<String>,
}

/// Stable digest over file bytes, lowercase hex.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Walks the file list and classifies every path.
#[derive(Debug)]
pub struct Scanner {
    chunker: Chunker,
}

impl Scanner {
    pub fn new(chunker: Chunker) -> Self {
        Self { chunker }
    }

    /// Process every candidate file plus the deletions implied by the file
    /// table. Chunking runs for added and modified files, and for unchanged
    /// files whose record is dirty (self-healing).
    pub fn process(
        &self,
        repo_root: &Path,
        candidates: &[PathBuf],
        metadata: &MetadataStore,
    ) -> Vec<ProcessResult> {
        let mut results = Vec::with_capacity(candidates.len());
        let mut seen: HashSet<String> = HashSet::with_capacity(candidates.len());

        for rel in candidates {
            let relative_path = rel.to_string_lossy().replace('\\', "/");
            seen.insert(relative_path.clone());
            results.push(self.process_one(repo_root, rel, relative_path, metadata));
        }

        // Anything in the table that no longer exists on disk is deleted.
        for path in metadata.all_paths() {
            if !seen.contains(&path) {
                results.push(ProcessResult {
                    relative_path: path,
                    status: ProcessStatus::Deleted,
                    record: None,
                    chunks: Vec::new(),
                    error: None,
                });
            }
        }

        results
    }

    fn process_one(
        &self,
        repo_root: &Path,
        rel: &Path,
        relative_path: String,
        metadata: &MetadataStore,
    ) -> ProcessResult {
        let abs = repo_root.join(rel);

        let meta = match fs::metadata(&abs) {
            Ok(m) => m,
            Err(e) => return skipped(relative_path, e.to_string()),
        };
        // Unreadable or non-UTF-8 content is skipped without touching any
        // existing index state.
        let source = match fs::read(&abs) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(s) => s,
                Err(_) => {
                    debug!(path = %relative_path, "skipping non-UTF-8 file");
                    return skipped(relative_path, "non-UTF-8 content".to_string());
                }
            },
            Err(e) => return skipped(relative_path, e.to_string()),
        };

        let hash = content_hash(source.as_bytes());
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let language = Language::from_path(rel)
            .map(|l| l.tag().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let previous = metadata.get(&relative_path);
        let (status, vector_index_hash) = match &previous {
            None => (ProcessStatus::Added, None),
            Some(old) if old.content_hash != hash => (ProcessStatus::Modified, None),
            Some(old) => (ProcessStatus::Unchanged, old.vector_index_hash.clone()),
        };

        let needs_chunks = match status {
            ProcessStatus::Added | ProcessStatus::Modified => true,
            // Self-healing: an unchanged file whose indexed hash drifted
            // (crash between vector write and metadata update) is rechunked.
            ProcessStatus::Unchanged => vector_index_hash.as_deref() != Some(hash.as_str()),
            _ => false,
        };
        let chunks = if needs_chunks {
            self.chunker.chunk_file(&relative_path, &source, &hash)
        } else {
            Vec::new()
        };

        ProcessResult {
            record: Some(FileRecord {
                relative_path: relative_path.clone(),
                content_hash: hash,
                mtime,
                size: meta.len(),
                language,
                vector_index_hash,
            }),
            relative_path,
            status,
            chunks,
            error: None,
        }
    }
}

fn skipped(relative_path: String, reason: String) -> ProcessResult {
    ProcessResult {
        relative_path,
        status: ProcessStatus::Skipped,
        record: None,
        chunks: Vec::new(),
        error: Some(reason),
    }
}
