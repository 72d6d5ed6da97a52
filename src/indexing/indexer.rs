//! Scan orchestration: chunk, embed, and write both stores.
//!
//! The indexer partitions per-file scan results, embeds every pending
//! vector text in one batched call, applies atomic per-file replacement to
//! the vector store, re-applies the FTS rows, and keeps the file table's
//! `vector_index_hash` bookkeeping honest. Unchanged files with stale
//! bookkeeping are healed on the same path, so a crash between a vector
//! write and the metadata update converges on a later scan.

use super::progress::ScanStats;
use super::scanner::{ProcessResult, ProcessStatus, Scanner};
use super::walker::Walker;
use crate::chunking::{Chunk, Chunker, ParserPool};
use crate::config::Settings;
use crate::embedding::{EmbedProgress, EmbeddingProvider};
use crate::error::{IndexError, IndexResult, StoreError};
use crate::project::{Project, ScanLock};
use crate::store::{
    ChunkRecord, FtsIndex, MetadataStore, VectorStore, KV_EMBEDDING_DIMENSIONS,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Options for one scan invocation.
#[derive(Default)]
pub struct ScanOptions {
    /// Drop all index state and rebuild from scratch
    pub force: bool,
    /// Run the embed + store phase (disable for a metadata-only refresh)
    pub vector_index: bool,
    /// Drainable progress events, one per embedding API batch
    pub progress: Option<mpsc::Sender<EmbedProgress>>,
}

impl ScanOptions {
    pub fn full() -> Self {
        Self {
            force: false,
            vector_index: true,
            progress: None,
        }
    }
}

/// Orchestrates chunk -> embed -> store for one project.
pub struct Indexer {
    project: Project,
    settings: Arc<Settings>,
    metadata: Arc<MetadataStore>,
    vectors: Arc<VectorStore>,
    fts: Arc<FtsIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: Chunker,
    pool: Arc<ParserPool>,
}

impl Indexer {
    /// Open the project's stores, rebuilding them when the configured
    /// vector dimension differs from the indexed one.
    pub fn open(
        project: Project,
        settings: Arc<Settings>,
        embedder: Arc<dyn EmbeddingProvider>,
        pool: Arc<ParserPool>,
    ) -> IndexResult<Self> {
        let metadata = Arc::new(MetadataStore::open(&project.files_path())?);
        let dimensions = settings.embeddings.dimensions;

        let recorded: Option<usize> = metadata
            .kv_get(KV_EMBEDDING_DIMENSIONS)
            .and_then(|v| v.parse().ok());
        let mut rebuild = matches!(recorded, Some(d) if d != dimensions);

        let vectors = match VectorStore::open_or_create(&project.vectors_dir(), dimensions) {
            Ok(store) => store,
            Err(StoreError::DimensionChanged { stored, configured }) => {
                warn!(
                    stored,
                    configured, "vector dimension changed, rebuilding the index"
                );
                rebuild = true;
                VectorStore::wipe(&project.vectors_dir())?;
                VectorStore::open_or_create(&project.vectors_dir(), dimensions)?
            }
            Err(e) => return Err(e.into()),
        };
        let fts = FtsIndex::open(&project.fts_dir())?;

        if rebuild {
            warn!(
                "embedding dimension is now {dimensions}, clearing file table so the next scan reindexes everything"
            );
            metadata.clear()?;
            vectors.clear()?;
            if let Err(e) = fts.clear() {
                warn!(error = %e, "failed to clear FTS index during rebuild");
            }
        }
        metadata.kv_set(KV_EMBEDDING_DIMENSIONS, &dimensions.to_string())?;

        let chunker = Chunker::new(&settings.indexing, Arc::clone(&pool));
        Ok(Self {
            project,
            settings,
            metadata,
            vectors: Arc::new(vectors),
            fts: Arc::new(fts),
            embedder,
            chunker,
            pool,
        })
    }

    pub fn metadata(&self) -> Arc<MetadataStore> {
        Arc::clone(&self.metadata)
    }

    pub fn vectors(&self) -> Arc<VectorStore> {
        Arc::clone(&self.vectors)
    }

    pub fn fts(&self) -> Arc<FtsIndex> {
        Arc::clone(&self.fts)
    }

    /// Scan the repository and reconcile both stores with its contents.
    pub async fn scan(&self, opts: ScanOptions) -> IndexResult<ScanStats> {
        let started = Instant::now();
        let _lock = ScanLock::acquire(&self.project.lock_path())?;

        if opts.force {
            info!("forced scan: clearing all index state");
            self.metadata.clear()?;
            self.vectors.clear()?;
            if let Err(e) = self.fts.clear() {
                warn!(error = %e, "failed to clear FTS index");
            }
            self.metadata.kv_set(
                KV_EMBEDDING_DIMENSIONS,
                &self.settings.embeddings.dimensions.to_string(),
            )?;
        }

        // File enumeration, hashing, and parsing are CPU-bound; keep them
        // off the async workers.
        let results = {
            let walker = Walker::new(
                &self.project.repo_root,
                &self.settings.indexing.ignore_patterns,
            )?;
            let scanner = Scanner::new(self.chunker.clone());
            let metadata = Arc::clone(&self.metadata);
            let root = self.project.repo_root.clone();
            tokio::task::spawn_blocking(move || {
                let candidates = walker.walk();
                scanner.process(&root, &candidates, &metadata)
            })
            .await
            .map_err(|e| IndexError::General(format!("scan worker failed: {e}")))?
        };

        let mut stats = self.apply(results, &opts).await?;
        stats.elapsed = started.elapsed();
        self.pool.shutdown();
        Ok(stats)
    }

    async fn apply(&self, results: Vec<ProcessResult>, opts: &ScanOptions) -> IndexResult<ScanStats> {
        let mut stats = ScanStats::default();

        // Partition: files to (re)index, files whose rows must vanish, and
        // plain record refreshes.
        let mut index_files: Vec<(String, String, Vec<Chunk>)> = Vec::new();
        let mut empty_files: Vec<(String, String)> = Vec::new();
        let mut empty_had_rows = 0usize;
        let mut delete_paths: Vec<String> = Vec::new();
        let mut records = Vec::new();

        for result in results {
            match result.status {
                ProcessStatus::Added => stats.added += 1,
                ProcessStatus::Modified => stats.modified += 1,
                ProcessStatus::Unchanged => stats.unchanged += 1,
                ProcessStatus::Deleted => stats.deleted += 1,
                ProcessStatus::Skipped => stats.skipped += 1,
                ProcessStatus::Error => stats.errors += 1,
            }
            match result.status {
                ProcessStatus::Added | ProcessStatus::Modified | ProcessStatus::Unchanged => {
                    let Some(record) = result.record else { continue };
                    let hash = record.content_hash.clone();
                    let dirty = record.is_dirty();
                    records.push(record);
                    if dirty {
                        if result.chunks.is_empty() {
                            if result.status == ProcessStatus::Modified {
                                empty_had_rows += 1;
                            }
                            empty_files.push((result.relative_path, hash));
                        } else {
                            index_files.push((result.relative_path, hash, result.chunks));
                        }
                    }
                }
                ProcessStatus::Deleted => delete_paths.push(result.relative_path),
                ProcessStatus::Skipped | ProcessStatus::Error => {}
            }
        }

        self.metadata.upsert_files(records)?;

        // Rows for deleted files and files that became empty disappear from
        // both stores regardless of whether embedding runs.
        let mut row_removals = delete_paths.clone();
        row_removals.extend(empty_files.iter().map(|(p, _)| p.clone()));
        if !row_removals.is_empty() {
            self.vectors.delete_files(&row_removals)?;
            if let Err(e) = self.fts.delete_files(&row_removals) {
                warn!(error = %e, "FTS deletion failed; a later scan will re-apply it");
            }
            stats.vector_index.deleted += delete_paths.len() + empty_had_rows;
        }
        // An empty file is trivially consistent with the stores.
        self.metadata.set_vector_index_hashes(
            empty_files
                .into_iter()
                .map(|(path, hash)| (path, Some(hash)))
                .collect(),
        )?;
        self.metadata.delete_files(&delete_paths)?;

        if opts.vector_index && !index_files.is_empty() {
            self.embed_and_write(&index_files, opts, &mut stats).await?;
        }

        Ok(stats)
    }

    /// One embedding pass over every pending file, then both store writes.
    async fn embed_and_write(
        &self,
        index_files: &[(String, String, Vec<Chunk>)],
        opts: &ScanOptions,
        stats: &mut ScanStats,
    ) -> IndexResult<()> {
        let texts: Vec<String> = index_files
            .iter()
            .flat_map(|(_, _, chunks)| chunks.iter().map(Chunk::vector_text))
            .collect();
        info!(
            files = index_files.len(),
            chunks = texts.len(),
            "embedding pending chunks"
        );

        let vectors = match self.embedder.embed_batch(&texts, opts.progress.clone()).await {
            Ok(vectors) if vectors.len() == texts.len() => vectors,
            Ok(vectors) => {
                warn!(
                    expected = texts.len(),
                    got = vectors.len(),
                    "embedding batch returned wrong count; marking files dirty"
                );
                self.mark_failed(index_files, stats)?;
                return Ok(());
            }
            Err(e) => {
                warn!(error = %e, "embedding batch failed; files stay dirty for the next scan");
                self.mark_failed(index_files, stats)?;
                return Ok(());
            }
        };

        let mut vector_iter = vectors.into_iter();
        let mut upserts: Vec<(String, Vec<ChunkRecord>)> = Vec::new();
        let mut fts_rows: Vec<ChunkRecord> = Vec::new();
        for (path, _, chunks) in index_files {
            let rows: Vec<ChunkRecord> = chunks
                .iter()
                .cloned()
                .map(|c| {
                    let vector = vector_iter.next().unwrap_or_default();
                    ChunkRecord::new(c, vector)
                })
                .collect();
            fts_rows.extend(rows.iter().cloned());
            upserts.push((path.clone(), rows));
        }

        match self.vectors.batch_upsert_files(upserts) {
            Ok(()) => {
                let paths: Vec<String> =
                    index_files.iter().map(|(p, _, _)| p.clone()).collect();
                if let Err(e) = self.fts.replace_files(&paths, &fts_rows) {
                    warn!(error = %e, "FTS write failed; vector store stays authoritative");
                }
                self.metadata.set_vector_index_hashes(
                    index_files
                        .iter()
                        .map(|(path, hash, _)| (path.clone(), Some(hash.clone())))
                        .collect(),
                )?;
                stats.vector_index.indexed += index_files.len();
            }
            Err(e) => {
                warn!(error = %e, "vector store write failed; marking files dirty");
                self.mark_failed(index_files, stats)?;
            }
        }
        Ok(())
    }

    /// Clear `vector_index_hash` so the files retry on a later scan.
    fn mark_failed(
        &self,
        index_files: &[(String, String, Vec<Chunk>)],
        stats: &mut ScanStats,
    ) -> IndexResult<()> {
        stats.vector_index.errors += index_files.len();
        self.metadata.set_vector_index_hashes(
            index_files
                .iter()
                .map(|(path, _, _)| (path.clone(), None))
                .collect(),
        )?;
        Ok(())
    }
}
