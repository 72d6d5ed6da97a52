//! Score-adaptive cutoff for the reranked candidate list.
//!
//! Combines an absolute floor, a dynamic threshold derived from the top
//! score, a safe harbor for the leading chunks, and a delta guard that
//! stops a single outlier hit from collapsing recall.

use crate::config::SearchConfig;

/// Number of leading chunks to keep from a descending score list.
///
/// - Safe harbor: the first `smart_min_k` chunks pass whenever they meet
///   the absolute floor.
/// - Later chunks must also clear the dynamic threshold
///   `anchor * smart_top_score_ratio`.
/// - Delta guard: when `s2 < s1 * delta_guard_ratio`, `s1` is treated as an
///   outlier and the dynamic threshold derives from `s2` instead.
/// - The result never exceeds `smart_max_k`.
pub fn smart_top_k(scores: &[f32], config: &SearchConfig) -> usize {
    if scores.is_empty() {
        return 0;
    }

    let anchor = if scores.len() >= 2 && scores[1] < scores[0] * config.delta_guard_ratio {
        scores[1]
    } else {
        scores[0]
    };
    let dynamic = anchor * config.smart_top_score_ratio;
    let floor = config.smart_min_score;
    let late_threshold = dynamic.max(floor);

    let mut k = 0;
    for (i, &score) in scores.iter().enumerate() {
        if k >= config.smart_max_k {
            break;
        }
        let threshold = if i < config.smart_min_k {
            floor
        } else {
            late_threshold
        };
        if score < threshold {
            break;
        }
        k += 1;
    }
    k
}
