//! Full-text index over chunk content, backed by tantivy.
//!
//! The indexed text is `breadcrumb + "\n" + display_code`, so scope names
//! are searchable alongside the code. Failures here are non-fatal to
//! indexing: the vector store is authoritative and a later scan re-applies
//! the FTS rows.

use super::ChunkRecord;
use crate::error::{StoreError, StoreResult};
use parking_lot::Mutex;
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::{BooleanQuery, Occur, PhraseQuery, Query, RegexQuery, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, Schema, Value, STORED, STRING, TEXT,
};
use tantivy::{doc, Index, IndexReader, IndexWriter, TantivyDocument, Term};

/// Tokens shorter than this do not get a prefix query.
const PREFIX_MIN_CHARS: usize = 4;

/// One lexical recall hit.
#[derive(Debug, Clone)]
pub struct LexicalHit {
    pub chunk_id: String,
    pub relative_path: String,
    pub chunk_index: u32,
    pub score: f32,
}

/// Persistent full-text chunk index for one project.
pub struct FtsIndex {
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
    f_chunk_id: Field,
    f_relative_path: Field,
    f_chunk_index: Field,
    f_breadcrumb: Field,
    f_content: Field,
}

impl std::fmt::Debug for FtsIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FtsIndex").finish_non_exhaustive()
    }
}

impl FtsIndex {
    /// Open or create the index under `dir`.
    pub fn open(dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(dir).map_err(|e| StoreError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let mut schema_builder = Schema::builder();
        let f_chunk_id = schema_builder.add_text_field("chunk_id", STRING | STORED);
        let f_relative_path = schema_builder.add_text_field("relative_path", STRING | STORED);
        let f_chunk_index = schema_builder.add_u64_field("chunk_index", STORED);
        let f_breadcrumb = schema_builder.add_text_field("breadcrumb", TEXT | STORED);
        let f_content = schema_builder.add_text_field("content", TEXT);
        let schema = schema_builder.build();

        let directory = MmapDirectory::open(dir).map_err(|e| StoreError::Tantivy {
            operation: "open directory".to_string(),
            cause: e.to_string(),
        })?;
        let index = Index::open_or_create(directory, schema).map_err(|e| StoreError::Tantivy {
            operation: "open index".to_string(),
            cause: e.to_string(),
        })?;
        let writer = index.writer(50_000_000).map_err(|e| StoreError::Tantivy {
            operation: "create writer".to_string(),
            cause: e.to_string(),
        })?;
        let reader = index.reader().map_err(|e| StoreError::Tantivy {
            operation: "create reader".to_string(),
            cause: e.to_string(),
        })?;

        Ok(Self {
            writer: Mutex::new(writer),
            reader,
            f_chunk_id,
            f_relative_path,
            f_chunk_index,
            f_breadcrumb,
            f_content,
        })
    }

    /// Remove all rows for `delete_paths`, then insert `rows`, in one commit.
    pub fn replace_files(&self, delete_paths: &[String], rows: &[ChunkRecord]) -> StoreResult<()> {
        let mut writer = self.writer.lock();
        for path in delete_paths {
            writer.delete_term(Term::from_field_text(self.f_relative_path, path));
        }
        for row in rows {
            writer
                .add_document(doc!(
                    self.f_chunk_id => row.chunk_id.clone(),
                    self.f_relative_path => row.relative_path.clone(),
                    self.f_chunk_index => row.chunk_index as u64,
                    self.f_breadcrumb => row.breadcrumb.clone(),
                    self.f_content => row.fts_text(),
                ))
                .map_err(|e| StoreError::Tantivy {
                    operation: "add document".to_string(),
                    cause: e.to_string(),
                })?;
        }
        writer.commit().map_err(|e| StoreError::Tantivy {
            operation: "commit".to_string(),
            cause: e.to_string(),
        })?;
        drop(writer);
        self.reload()
    }

    /// Remove all rows for the listed paths.
    pub fn delete_files(&self, paths: &[String]) -> StoreResult<()> {
        self.replace_files(paths, &[])
    }

    /// OR-combined token, prefix, and phrase search over chunk content.
    ///
    /// Keeps at most `per_file_cap` best hits per file and `total_cap`
    /// overall, mirroring the lexical recall contract.
    pub fn search(
        &self,
        tokens: &[String],
        phrases: &[String],
        per_file_cap: usize,
        total_cap: usize,
    ) -> StoreResult<Vec<LexicalHit>> {
        if (tokens.is_empty() && phrases.is_empty()) || total_cap == 0 {
            return Ok(Vec::new());
        }

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for token in tokens {
            let lower = token.to_lowercase();
            clauses.push((
                Occur::Should,
                Box::new(TermQuery::new(
                    Term::from_field_text(self.f_content, &lower),
                    IndexRecordOption::WithFreqs,
                )),
            ));
            // Prefix matching for identifier fragments
            if lower.len() >= PREFIX_MIN_CHARS && lower.chars().all(|c| c.is_ascii_alphanumeric()) {
                if let Ok(q) = RegexQuery::from_pattern(&format!("{lower}.*"), self.f_content) {
                    clauses.push((Occur::Should, Box::new(q)));
                }
            }
        }
        for phrase in phrases {
            let terms: Vec<Term> = phrase
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| !w.is_empty())
                .map(|w| Term::from_field_text(self.f_content, &w.to_lowercase()))
                .collect();
            match terms.len() {
                0 => {}
                1 => clauses.push((
                    Occur::Should,
                    Box::new(TermQuery::new(
                        terms.into_iter().next().unwrap(),
                        IndexRecordOption::WithFreqs,
                    )),
                )),
                _ => clauses.push((Occur::Should, Box::new(PhraseQuery::new(terms)))),
            }
        }

        let query = BooleanQuery::new(clauses);
        let searcher = self.reader.searcher();
        // Over-fetch so the per-file cap does not starve the total
        let fetch = total_cap.saturating_mul(4).max(total_cap);
        let top = searcher
            .search(&query, &TopDocs::with_limit(fetch))
            .map_err(|e| StoreError::Tantivy {
                operation: "search".to_string(),
                cause: e.to_string(),
            })?;

        let mut per_file: std::collections::HashMap<String, usize> =
            std::collections::HashMap::new();
        let mut hits = Vec::new();
        for (score, addr) in top {
            let doc: TantivyDocument = searcher.doc(addr).map_err(|e| StoreError::Tantivy {
                operation: "fetch document".to_string(),
                cause: e.to_string(),
            })?;
            let relative_path = doc
                .get_first(self.f_relative_path)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let seen = per_file.entry(relative_path.clone()).or_insert(0);
            if *seen >= per_file_cap {
                continue;
            }
            *seen += 1;
            hits.push(LexicalHit {
                chunk_id: doc
                    .get_first(self.f_chunk_id)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                relative_path,
                chunk_index: doc
                    .get_first(self.f_chunk_index)
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as u32,
                score,
            });
            if hits.len() >= total_cap {
                break;
            }
        }
        Ok(hits)
    }

    pub fn doc_count(&self) -> StoreResult<u64> {
        Ok(self.reader.searcher().num_docs())
    }

    /// Drop every document in the index.
    pub fn clear(&self) -> StoreResult<()> {
        let mut writer = self.writer.lock();
        writer.delete_all_documents().map_err(|e| StoreError::Tantivy {
            operation: "clear".to_string(),
            cause: e.to_string(),
        })?;
        writer.commit().map_err(|e| StoreError::Tantivy {
            operation: "commit".to_string(),
            cause: e.to_string(),
        })?;
        drop(writer);
        self.reload()
    }

    fn reload(&self) -> StoreResult<()> {
        self.reader.reload().map_err(|e| StoreError::Tantivy {
            operation: "reload reader".to_string(),
            cause: e.to_string(),
        })
    }
}
