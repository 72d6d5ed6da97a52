//! Reciprocal Rank Fusion of the vector and lexical recall lists.
//!
//! `rrf(chunk) = w_vec / (k0 + rank_vec) + w_lex / (k0 + rank_lex)`, with a
//! list the chunk is absent from contributing zero. Ranks are 1-based.
//! Output order is deterministic: score, then better vector rank, then
//! lexicographic chunk id.

use std::collections::HashMap;

/// Where a fused chunk was recalled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SeedSource {
    Vector,
    Lexical,
    Fused,
}

impl SeedSource {
    fn from_ranks(rank_vec: Option<usize>, rank_lex: Option<usize>) -> Self {
        match (rank_vec, rank_lex) {
            (Some(_), Some(_)) => SeedSource::Fused,
            (Some(_), None) => SeedSource::Vector,
            _ => SeedSource::Lexical,
        }
    }
}

impl std::fmt::Display for SeedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SeedSource::Vector => "vector",
            SeedSource::Lexical => "lexical",
            SeedSource::Fused => "fused",
        };
        write!(f, "{s}")
    }
}

/// A chunk after fusion, before reranking.
#[derive(Debug, Clone)]
pub struct FusedChunk {
    pub chunk_id: String,
    pub score: f32,
    pub rank_vec: Option<usize>,
    pub rank_lex: Option<usize>,
    pub source: SeedSource,
}

/// Fuse two ranked id lists, keeping the best `top_m`.
pub fn reciprocal_rank_fusion(
    vector_ids: &[String],
    lexical_ids: &[String],
    k0: f32,
    w_vec: f32,
    w_lex: f32,
    top_m: usize,
) -> Vec<FusedChunk> {
    let mut entries: HashMap<&str, (Option<usize>, Option<usize>)> = HashMap::new();
    for (rank, id) in vector_ids.iter().enumerate() {
        entries.entry(id).or_default().0 = Some(rank + 1);
    }
    for (rank, id) in lexical_ids.iter().enumerate() {
        let slot = entries.entry(id).or_default();
        if slot.1.is_none() {
            slot.1 = Some(rank + 1);
        }
    }

    let mut fused: Vec<FusedChunk> = entries
        .into_iter()
        .map(|(id, (rank_vec, rank_lex))| {
            let score = rank_vec.map_or(0.0, |r| w_vec / (k0 + r as f32))
                + rank_lex.map_or(0.0, |r| w_lex / (k0 + r as f32));
            FusedChunk {
                chunk_id: id.to_string(),
                score,
                rank_vec,
                rank_lex,
                source: SeedSource::from_ranks(rank_vec, rank_lex),
            }
        })
        .collect();

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let ra = a.rank_vec.unwrap_or(usize::MAX);
                let rb = b.rank_vec.unwrap_or(usize::MAX);
                ra.cmp(&rb)
            })
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    fused.truncate(top_m);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn chunk_in_both_lists_outranks_single_list() {
        let fused = reciprocal_rank_fusion(
            &ids(&["both", "vec_only"]),
            &ids(&["both", "lex_only"]),
            60.0,
            1.0,
            0.5,
            10,
        );
        assert_eq!(fused[0].chunk_id, "both");
        assert_eq!(fused[0].source, SeedSource::Fused);
    }

    #[test]
    fn absent_list_contributes_zero() {
        let fused = reciprocal_rank_fusion(&ids(&["a"]), &[], 60.0, 1.0, 0.5, 10);
        assert_eq!(fused.len(), 1);
        assert!((fused[0].score - 1.0 / 61.0).abs() < 1e-6);
        assert_eq!(fused[0].source, SeedSource::Vector);
    }

    #[test]
    fn lexical_weight_is_lower() {
        let fused = reciprocal_rank_fusion(
            &ids(&["v"]),
            &ids(&["l"]),
            60.0,
            1.0,
            0.5,
            10,
        );
        // Same rank in each list, but the vector weight wins
        assert_eq!(fused[0].chunk_id, "v");
        assert_eq!(fused[1].chunk_id, "l");
    }

    #[test]
    fn ties_break_by_vector_rank_then_id() {
        // Two chunks only in the lexical list at equal weight positions
        // cannot tie (different ranks); construct a tie via identical ranks
        // across disjoint lists with equal weights.
        let fused = reciprocal_rank_fusion(
            &ids(&["b"]),
            &ids(&["a"]),
            60.0,
            1.0,
            1.0,
            10,
        );
        // Equal scores: the chunk with a vector rank comes first
        assert_eq!(fused[0].chunk_id, "b");
        assert_eq!(fused[1].chunk_id, "a");
    }

    #[test]
    fn output_is_deterministic() {
        let v = ids(&["x", "y", "z"]);
        let l = ids(&["z", "w"]);
        let a = reciprocal_rank_fusion(&v, &l, 60.0, 1.0, 0.5, 10);
        let b = reciprocal_rank_fusion(&v, &l, 60.0, 1.0, 0.5, 10);
        let order_a: Vec<&str> = a.iter().map(|f| f.chunk_id.as_str()).collect();
        let order_b: Vec<&str> = b.iter().map(|f| f.chunk_id.as_str()).collect();
        assert_eq!(order_a, order_b);
    }

    #[test]
    fn top_m_truncates() {
        let v = ids(&["a", "b", "c", "d"]);
        let fused = reciprocal_rank_fusion(&v, &[], 60.0, 1.0, 0.5, 2);
        assert_eq!(fused.len(), 2);
    }
}
