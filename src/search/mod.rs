//! Query path: hybrid recall, fusion, reranking, and the adaptive cutoff.

mod fusion;
mod query;
mod service;
mod smart_topk;

pub use fusion::{reciprocal_rank_fusion, FusedChunk, SeedSource};
pub use query::{tokenize_query, QueryTerms};
pub use service::SearchService;
pub use smart_topk::smart_top_k;

use crate::store::ChunkRecord;

/// A chunk selected by the retrieval pipeline as directly relevant.
#[derive(Debug, Clone)]
pub struct Seed {
    pub record: ChunkRecord,
    pub score: f32,
    pub source: SeedSource,
}
