//! Semantic chunking of source files.
//!
//! Files are split into dual-representation chunks: `display_code` is the
//! unchanged source slice, `vector_text` prepends the breadcrumb path so
//! semantic context travels with the embedding. Supported languages go
//! through the syntax-tree splitter; everything else through the
//! line-based fallback.

mod fallback;
mod languages;
mod parser_pool;
mod splitter;

pub use languages::{node_name, ChunkSpec, Language};
pub use parser_pool::ParserPool;

use crate::config::IndexingConfig;
use splitter::SyntaxSplitter;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Half-open byte range within a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ByteSpan {
    pub start: usize,
    pub end: usize,
}

impl ByteSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// A contiguous, semantically coherent slice of a source file.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Repo-relative path of the source file
    pub relative_path: String,
    /// Content hash of the file version this chunk came from
    pub file_hash: String,
    /// 0-based position within the file, ordered by start byte
    pub chunk_index: u32,
    /// The human-readable source slice, unchanged
    pub display_code: String,
    /// `>`-separated path of enclosing scopes, empty at top level
    pub breadcrumb: String,
    /// Language tag ("unknown" for unrecognized extensions)
    pub language: String,
    /// Byte range of the chunk in the original file
    pub raw_span: ByteSpan,
    /// Byte range covering the vectorized text (raw span plus breadcrumb prefix)
    pub vector_span: ByteSpan,
    /// 1-based inclusive line range
    pub start_line: u32,
    pub end_line: u32,
}

impl Chunk {
    /// Stable chunk id: `{relative_path}#{file_hash}#{chunk_index}`.
    ///
    /// Different file versions produce disjoint id sets.
    pub fn id(&self) -> String {
        format!("{}#{}#{}", self.relative_path, self.file_hash, self.chunk_index)
    }

    /// The embedding-oriented representation: breadcrumb joined with the code.
    pub fn vector_text(&self) -> String {
        if self.breadcrumb.is_empty() {
            self.display_code.clone()
        } else {
            format!("{}\n{}", self.breadcrumb, self.display_code)
        }
    }
}

/// Raw chunk produced by a splitter before assembly: span + breadcrumb.
#[derive(Debug, Clone)]
pub(crate) struct RawChunk {
    pub span: ByteSpan,
    pub breadcrumb: String,
}

/// Splits files into chunks, dispatching by language tag.
#[derive(Debug, Clone)]
pub struct Chunker {
    pool: Arc<ParserPool>,
    max_chunk_chars: usize,
    gap_max_blank_lines: usize,
    fallback_chunk_lines: usize,
}

impl Chunker {
    pub fn new(config: &IndexingConfig, pool: Arc<ParserPool>) -> Self {
        Self {
            pool,
            max_chunk_chars: config.max_chunk_chars,
            gap_max_blank_lines: config.gap_max_blank_lines,
            fallback_chunk_lines: config.fallback_chunk_lines,
        }
    }

    /// Chunk one file. Empty files produce zero chunks.
    ///
    /// Recognized-but-malformed files keep their language tag and fall back
    /// to the line splitter; unrecognized extensions are tagged "unknown".
    pub fn chunk_file(&self, relative_path: &str, source: &str, file_hash: &str) -> Vec<Chunk> {
        if source.trim().is_empty() {
            return Vec::new();
        }

        let (raw, language) = match Language::from_path(Path::new(relative_path)) {
            Some(lang) => match self.parse_and_split(lang, source) {
                Ok(raw) => (raw, lang.tag().to_string()),
                Err(reason) => {
                    debug!(path = relative_path, %reason, "syntax splitter failed, using line fallback");
                    (
                        fallback::split_lines(source, self.fallback_chunk_lines),
                        lang.tag().to_string(),
                    )
                }
            },
            None => (
                fallback::split_lines(source, self.fallback_chunk_lines),
                "unknown".to_string(),
            ),
        };

        self.assemble(relative_path, source, file_hash, &language, raw)
    }

    fn parse_and_split(&self, language: Language, source: &str) -> Result<Vec<RawChunk>, String> {
        let mut parser = self.pool.checkout(language).map_err(|e| e.to_string())?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| "parser returned no tree".to_string())?;
        if tree.root_node().has_error() && tree.root_node().named_child_count() == 0 {
            return Err("unrecoverable parse errors".to_string());
        }
        let splitter = SyntaxSplitter::new(
            source,
            language.chunk_spec(),
            self.max_chunk_chars,
            self.gap_max_blank_lines,
        );
        Ok(splitter.split(&tree))
    }

    /// Turn raw spans into fully populated chunks with contiguous indexes.
    fn assemble(
        &self,
        relative_path: &str,
        source: &str,
        file_hash: &str,
        language: &str,
        mut raw: Vec<RawChunk>,
    ) -> Vec<Chunk> {
        raw.sort_by_key(|r| r.span.start);
        let lines = LineIndex::new(source);

        raw.into_iter()
            .filter(|r| !source[r.span.start..r.span.end].trim().is_empty())
            .enumerate()
            .map(|(i, r)| {
                let display_code = source[r.span.start..r.span.end].to_string();
                let prefix = if r.breadcrumb.is_empty() {
                    0
                } else {
                    r.breadcrumb.len() + 1
                };
                Chunk {
                    relative_path: relative_path.to_string(),
                    file_hash: file_hash.to_string(),
                    chunk_index: i as u32,
                    start_line: lines.line_of(r.span.start),
                    end_line: lines.line_of(r.span.end.saturating_sub(1).max(r.span.start)),
                    vector_span: ByteSpan::new(r.span.start, r.span.end + prefix),
                    raw_span: r.span,
                    display_code,
                    breadcrumb: r.breadcrumb,
                    language: language.to_string(),
                }
            })
            .collect()
    }
}

/// Byte-offset to 1-based line number mapping.
#[derive(Debug)]
pub(crate) struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    pub fn line_of(&self, byte: usize) -> u32 {
        match self.line_starts.binary_search(&byte) {
            Ok(i) => i as u32 + 1,
            Err(i) => i as u32,
        }
    }
}
