//! The retrieval pipeline: embed, recall, fuse, rerank, cut, expand, pack.

use super::fusion::{reciprocal_rank_fusion, FusedChunk};
use super::query::tokenize_query;
use super::smart_topk::smart_top_k;
use super::Seed;
use crate::config::Settings;
use crate::embedding::EmbeddingProvider;
use crate::error::{SearchError, StoreError};
use crate::expand::GraphExpander;
use crate::pack::{ContextPack, ContextPacker, DebugTimings};
use crate::rerank::RerankProvider;
use crate::store::{ChunkRecord, FtsIndex, VectorStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Builds context packs for natural-language queries.
pub struct SearchService {
    settings: Arc<Settings>,
    vectors: Arc<VectorStore>,
    fts: Arc<FtsIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    reranker: Option<Arc<dyn RerankProvider>>,
    expander: GraphExpander,
}

impl SearchService {
    pub fn new(
        settings: Arc<Settings>,
        repo_root: std::path::PathBuf,
        vectors: Arc<VectorStore>,
        fts: Arc<FtsIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        reranker: Option<Arc<dyn RerankProvider>>,
    ) -> Self {
        let expander = GraphExpander::new(
            settings.expand.clone(),
            repo_root,
            Arc::clone(&vectors),
        );
        Self {
            settings,
            vectors,
            fts,
            embedder,
            reranker,
            expander,
        }
    }

    /// Run the full query path and return the packed context.
    ///
    /// `extra_terms` are appended to lexical recall (tool callers pass
    /// technical identifiers they already know about). An empty query, or a
    /// query with no recall hits, yields an empty pack rather than an error.
    pub async fn build_context_pack(
        &self,
        query: &str,
        extra_terms: &[String],
    ) -> Result<ContextPack, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(ContextPack::empty());
        }
        let mut timings = DebugTimings::default();

        // Embed the query once
        let t = Instant::now();
        let query_vectors = self
            .embedder
            .embed_batch(&[query.to_string()], None)
            .await?;
        let Some(query_vector) = query_vectors.into_iter().next() else {
            return Ok(ContextPack::empty());
        };
        timings.embed_ms = t.elapsed().as_millis() as u64;

        // Vector and lexical recall run in parallel
        let t = Instant::now();
        let (vector_hits, lexical_hits) = {
            let vectors = Arc::clone(&self.vectors);
            let top_k = self.settings.search.vector_top_k;
            let qv = query_vector.clone();
            let vector_task =
                tokio::task::spawn_blocking(move || vectors.search(&qv, top_k, None));

            let fts = Arc::clone(&self.fts);
            let mut terms = tokenize_query(query);
            for extra in extra_terms {
                for term in tokenize_query(extra).tokens {
                    if !terms.tokens.contains(&term) {
                        terms.tokens.push(term);
                    }
                }
            }
            let per_file = self.settings.search.lex_chunks_per_file;
            let total = self.settings.search.lex_total_chunks;
            let lexical_task = tokio::task::spawn_blocking(move || {
                fts.search(&terms.tokens, &terms.phrases, per_file, total)
            });

            let (v, l) = tokio::join!(vector_task, lexical_task);
            let vector_hits = v
                .map_err(|e| SearchError::General(format!("vector recall failed: {e}")))?;
            let lexical_hits = l
                .map_err(|e| SearchError::General(format!("lexical recall failed: {e}")))?
                .unwrap_or_else(|e: StoreError| {
                    warn!(error = %e, "lexical recall failed; continuing with vector hits");
                    Vec::new()
                });
            (vector_hits, lexical_hits)
        };
        timings.recall_ms = t.elapsed().as_millis() as u64;
        debug!(
            vector = vector_hits.len(),
            lexical = lexical_hits.len(),
            "recall complete"
        );

        if vector_hits.is_empty() && lexical_hits.is_empty() {
            return Ok(ContextPack::empty());
        }

        // Reciprocal rank fusion
        let mut records: HashMap<String, ChunkRecord> = vector_hits
            .iter()
            .map(|h| (h.record.chunk_id.clone(), h.record.clone()))
            .collect();
        let vector_ids: Vec<String> =
            vector_hits.iter().map(|h| h.record.chunk_id.clone()).collect();
        let lexical_ids: Vec<String> =
            lexical_hits.iter().map(|h| h.chunk_id.clone()).collect();
        let fused = reciprocal_rank_fusion(
            &vector_ids,
            &lexical_ids,
            self.settings.search.rrf_k0,
            self.settings.search.weight_vector,
            self.settings.search.weight_lexical,
            self.settings.search.fused_top_m,
        );

        // Resolve records; the vector store is authoritative, so fused ids
        // it no longer holds (stale FTS rows) are dropped.
        let mut candidates: Vec<(FusedChunk, ChunkRecord)> = Vec::with_capacity(fused.len());
        for f in fused {
            let record = match records.remove(&f.chunk_id) {
                Some(r) => Some(r),
                None => self.vectors.get(&f.chunk_id),
            };
            match record {
                Some(r) => candidates.push((f, r)),
                None => debug!(chunk_id = %f.chunk_id, "dropping stale lexical hit"),
            }
        }

        // Rerank; failure degrades to fusion order
        let t = Instant::now();
        let mut scored: Vec<(f32, FusedChunk, ChunkRecord)> = match self.rerank(query, &candidates).await
        {
            Some(scores) => scores
                .into_iter()
                .zip(candidates)
                .map(|(s, (f, r))| (s, f, r))
                .collect(),
            None => {
                // Fusion scores live on the reciprocal-rank scale; normalize
                // by the top score so the cutoff thresholds stay meaningful.
                let top = candidates
                    .iter()
                    .map(|(f, _)| f.score)
                    .fold(0.0f32, f32::max);
                let scale = if top > 0.0 { 1.0 / top } else { 1.0 };
                candidates
                    .into_iter()
                    .map(|(f, r)| (f.score * scale, f, r))
                    .collect()
            }
        };
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.chunk_id.cmp(&b.1.chunk_id))
        });
        timings.rerank_ms = t.elapsed().as_millis() as u64;

        // Smart TopK cutoff
        let scores: Vec<f32> = scored.iter().map(|(s, _, _)| *s).collect();
        let k = smart_top_k(&scores, &self.settings.search);
        let seeds: Vec<Seed> = scored
            .into_iter()
            .take(k)
            .map(|(score, fused, record)| Seed {
                record,
                score,
                source: fused.source,
            })
            .collect();

        // Graph expansion and packing
        let t = Instant::now();
        let expanded = self.expander.expand(&seeds);
        timings.expand_ms = t.elapsed().as_millis() as u64;

        let t = Instant::now();
        let mut pack = ContextPacker::new(&self.settings.pack).pack(seeds, expanded);
        timings.pack_ms = t.elapsed().as_millis() as u64;
        pack.debug = Some(timings);
        Ok(pack)
    }

    /// Cross-encoder pass; `None` means "fall back to fusion order".
    async fn rerank(
        &self,
        query: &str,
        candidates: &[(FusedChunk, ChunkRecord)],
    ) -> Option<Vec<f32>> {
        let reranker = self.reranker.as_ref()?;
        if candidates.is_empty() {
            return None;
        }
        let max_chars = self.settings.search.max_rerank_chars;
        let passages: Vec<String> = candidates
            .iter()
            .map(|(_, r)| truncate_chars(&r.display_code, max_chars))
            .collect();
        match reranker
            .rerank(query, &passages, self.settings.rerank.top_n)
            .await
        {
            Ok(scores) if scores.len() == candidates.len() => Some(scores),
            Ok(_) => {
                warn!("reranker returned wrong score count; using fusion order");
                None
            }
            Err(e) => {
                warn!(error = %e, "rerank failed; using fusion order");
                None
            }
        }
    }

    /// Clear per-query caches; call after a scan invalidates the index.
    pub fn invalidate_caches(&self) {
        self.expander.clear_caches();
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.len() <= max_chars {
        return text.to_string();
    }
    let mut cut = max_chars;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text[..cut].to_string()
}
