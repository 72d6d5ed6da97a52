//! Context packing: merge chunks into file segments under a token budget.
//!
//! Adjacent chunks (index delta of at most one) merge into a single
//! segment; files are admitted greedily in seed-score order until the
//! character budget is spent. A segment that does not fit is dropped
//! whole, never cut mid-token; the only exception is a leading seed
//! segment that alone exceeds the budget, which is truncated at a line
//! boundary and flagged.

use crate::config::PackConfig;
use crate::expand::ExpandedChunk;
use crate::search::Seed;
use crate::store::ChunkRecord;
use std::collections::BTreeMap;

/// Timing breakdown for one query, milliseconds per stage.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct DebugTimings {
    pub embed_ms: u64,
    pub recall_ms: u64,
    pub rerank_ms: u64,
    pub expand_ms: u64,
    pub pack_ms: u64,
}

/// A merged, budgeted slice of one file.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub relative_path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub breadcrumb: String,
    pub language: String,
    pub text: String,
    /// Set when the segment was cut at a line boundary to fit the budget
    pub truncated: bool,
    pub estimated_tokens: usize,
}

/// Segments of one file, in admission order.
#[derive(Debug, Clone, Default)]
pub struct FileSegments {
    pub relative_path: String,
    pub segments: Vec<Segment>,
}

/// The final output of a query.
#[derive(Debug, Default)]
pub struct ContextPack {
    pub seeds: Vec<Seed>,
    pub expanded: Vec<ExpandedChunk>,
    pub files: Vec<FileSegments>,
    pub debug: Option<DebugTimings>,
}

impl ContextPack {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_segments(&self) -> usize {
        self.files.iter().map(|f| f.segments.len()).sum()
    }

    pub fn total_chars(&self) -> usize {
        self.files
            .iter()
            .flat_map(|f| &f.segments)
            .map(|s| s.text.len())
            .sum()
    }
}

/// One chunk queued for packing.
struct Entry {
    record: ChunkRecord,
    score: f32,
    seed_order: Option<usize>,
}

/// A merged run of adjacent chunks, before budgeting.
struct Candidate {
    relative_path: String,
    start_line: u32,
    end_line: u32,
    breadcrumb: String,
    language: String,
    text: String,
    first_seed_order: Option<usize>,
    first_chunk_index: u32,
}

/// Packs seed and expanded chunks into budgeted segments.
pub struct ContextPacker {
    config: PackConfig,
}

impl ContextPacker {
    pub fn new(config: &PackConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn pack(&self, seeds: Vec<Seed>, expanded: Vec<ExpandedChunk>) -> ContextPack {
        // Group everything by file, remembering seed order for sorting
        let mut by_file: BTreeMap<String, Vec<Entry>> = BTreeMap::new();
        let mut file_score: BTreeMap<String, f32> = BTreeMap::new();

        for (order, seed) in seeds.iter().enumerate() {
            let path = seed.record.relative_path.clone();
            let best = file_score.entry(path.clone()).or_insert(f32::MIN);
            *best = best.max(seed.score);
            by_file.entry(path).or_default().push(Entry {
                record: seed.record.clone(),
                score: seed.score,
                seed_order: Some(order),
            });
        }
        for exp in &expanded {
            let path = exp.record.relative_path.clone();
            let best = file_score.entry(path.clone()).or_insert(f32::MIN);
            *best = best.max(exp.score);
            by_file.entry(path).or_default().push(Entry {
                record: exp.record.clone(),
                score: exp.score,
                seed_order: None,
            });
        }

        // Merge adjacent chunks per file
        let mut per_file_candidates: BTreeMap<String, Vec<Candidate>> = BTreeMap::new();
        for (path, mut entries) in by_file {
            entries.sort_by_key(|e| e.record.chunk_index);
            entries.dedup_by(|a, b| a.record.chunk_id == b.record.chunk_id);
            let mut candidates = Vec::new();
            let mut run: Vec<Entry> = Vec::new();
            for entry in entries {
                let adjacent = run
                    .last()
                    .is_some_and(|prev| entry.record.chunk_index - prev.record.chunk_index <= 1);
                if run.is_empty() || adjacent {
                    run.push(entry);
                } else {
                    candidates.push(self.merge_run(&path, std::mem::take(&mut run)));
                    run.push(entry);
                }
            }
            if !run.is_empty() {
                candidates.push(self.merge_run(&path, run));
            }
            // Within a file: first-seed order, then position
            candidates.sort_by_key(|c| {
                (c.first_seed_order.unwrap_or(usize::MAX), c.first_chunk_index)
            });
            per_file_candidates.insert(path, candidates);
        }

        // Admit files by their best seed score
        let mut file_order: Vec<(String, f32)> = per_file_candidates
            .keys()
            .map(|p| (p.clone(), file_score.get(p).copied().unwrap_or(f32::MIN)))
            .collect();
        file_order.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let budget = self.config.max_total_chars;
        let mut total = 0usize;
        let mut admitted = 0usize;
        let mut files: Vec<FileSegments> = Vec::new();

        'files: for (path, _) in file_order {
            let candidates = per_file_candidates.remove(&path).unwrap_or_default();
            let mut out = FileSegments {
                relative_path: path.clone(),
                segments: Vec::new(),
            };
            for candidate in candidates {
                if out.segments.len() >= self.config.max_segments_per_file {
                    break;
                }
                let len = candidate.text.len();
                if total + len <= budget {
                    total += len;
                    admitted += 1;
                    out.segments.push(self.finish(candidate, false));
                } else if admitted == 0 && candidate.first_seed_order.is_some() {
                    // A single seed segment larger than the whole budget:
                    // cut it at a line boundary rather than returning nothing.
                    let truncated = truncate_lines(&candidate.text, budget);
                    if !truncated.is_empty() {
                        let mut candidate = candidate;
                        let lines = truncated.lines().count() as u32;
                        candidate.end_line =
                            candidate.start_line + lines.saturating_sub(1);
                        candidate.text = truncated;
                        out.segments.push(self.finish(candidate, true));
                        files.push(out);
                    }
                    break 'files;
                }
                // Segment does not fit: drop it whole and keep trying
            }
            if !out.segments.is_empty() {
                files.push(out);
            }
        }

        ContextPack {
            seeds,
            expanded,
            files,
            debug: None,
        }
    }

    fn merge_run(&self, path: &str, run: Vec<Entry>) -> Candidate {
        let first = run.first().expect("merge_run called with an empty run");
        let last = run.last().expect("runs are non-empty");
        let breadcrumb = run
            .iter()
            .map(|e| e.record.breadcrumb.as_str())
            .reduce(common_breadcrumb_prefix)
            .unwrap_or_default()
            .to_string();
        let text = run
            .iter()
            .map(|e| e.record.display_code.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Candidate {
            relative_path: path.to_string(),
            start_line: first.record.start_line,
            end_line: last.record.end_line,
            breadcrumb,
            language: first.record.language.clone(),
            text,
            first_seed_order: run.iter().filter_map(|e| e.seed_order).min(),
            first_chunk_index: first.record.chunk_index,
        }
    }

    fn finish(&self, candidate: Candidate, truncated: bool) -> Segment {
        let estimated_tokens =
            (candidate.text.len() as f32 * self.config.tokens_per_char).ceil() as usize;
        Segment {
            relative_path: candidate.relative_path,
            start_line: candidate.start_line,
            end_line: candidate.end_line,
            breadcrumb: candidate.breadcrumb,
            language: candidate.language,
            text: candidate.text,
            truncated,
            estimated_tokens,
        }
    }
}

/// Component-wise longest common prefix of two breadcrumbs.
fn common_breadcrumb_prefix<'a>(a: &'a str, b: &'a str) -> &'a str {
    if a == b {
        return a;
    }
    let shared = a
        .split(" > ")
        .zip(b.split(" > "))
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x.len())
        .collect::<Vec<_>>();
    if shared.is_empty() {
        return "";
    }
    let len = shared.iter().sum::<usize>() + (shared.len() - 1) * 3;
    &a[..len]
}

/// Largest whole-line prefix of `text` within `budget` bytes.
fn truncate_lines(text: &str, budget: usize) -> String {
    let mut out = String::new();
    for line in text.split_inclusive('\n') {
        if out.len() + line.len() > budget {
            break;
        }
        out.push_str(line);
    }
    out.trim_end_matches('\n').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ByteSpan;
    use crate::expand::ExpandPhase;
    use crate::search::SeedSource;

    fn record(path: &str, index: u32, breadcrumb: &str, text: &str) -> ChunkRecord {
        ChunkRecord {
            chunk_id: format!("{path}#h#{index}"),
            relative_path: path.to_string(),
            file_hash: "h".to_string(),
            chunk_index: index,
            display_code: text.to_string(),
            breadcrumb: breadcrumb.to_string(),
            language: "rust".to_string(),
            raw_span: ByteSpan::new(0, text.len()),
            vector_span: ByteSpan::new(0, text.len()),
            start_line: index * 10 + 1,
            end_line: index * 10 + 5,
            vector: Vec::new(),
        }
    }

    fn seed(path: &str, index: u32, score: f32, text: &str) -> Seed {
        Seed {
            record: record(path, index, "", text),
            score,
            source: SeedSource::Vector,
        }
    }

    fn packer(max_total_chars: usize) -> ContextPacker {
        let mut config = PackConfig::default();
        config.max_total_chars = max_total_chars;
        ContextPacker::new(&config)
    }

    #[test]
    fn adjacent_chunks_merge_into_one_segment() {
        let seeds = vec![seed("a.rs", 1, 0.9, "fn one() {}")];
        let expanded = vec![
            ExpandedChunk {
                record: record("a.rs", 0, "", "fn zero() {}"),
                phase: ExpandPhase::E1Neighbors,
                score: 0.72,
            },
            ExpandedChunk {
                record: record("a.rs", 2, "", "fn two() {}"),
                phase: ExpandPhase::E1Neighbors,
                score: 0.72,
            },
        ];
        let pack = packer(48_000).pack(seeds, expanded);
        assert_eq!(pack.files.len(), 1);
        assert_eq!(pack.files[0].segments.len(), 1);
        let segment = &pack.files[0].segments[0];
        assert!(segment.text.contains("fn zero"));
        assert!(segment.text.contains("fn two"));
        assert_eq!(segment.start_line, 1);
        assert_eq!(segment.end_line, 25);
    }

    #[test]
    fn distant_chunks_stay_separate_segments() {
        let seeds = vec![seed("a.rs", 0, 0.9, "fn head() {}")];
        let expanded = vec![ExpandedChunk {
            record: record("a.rs", 5, "", "fn tail() {}"),
            phase: ExpandPhase::E2BreadcrumbSiblings,
            score: 0.5,
        }];
        let pack = packer(48_000).pack(seeds, expanded);
        assert_eq!(pack.files[0].segments.len(), 2);
    }

    #[test]
    fn greedy_budget_skips_then_admits_smaller() {
        // Sized 800 / 300 / 200 with budget 1000: admit the 800, skip the
        // 300, admit the 200.
        let seeds = vec![
            seed("a.rs", 0, 0.9, &"a".repeat(800)),
            seed("b.rs", 0, 0.8, &"b".repeat(300)),
            seed("c.rs", 0, 0.7, &"c".repeat(200)),
        ];
        let pack = packer(1000).pack(seeds, vec![]);
        let paths: Vec<&str> = pack
            .files
            .iter()
            .map(|f| f.relative_path.as_str())
            .collect();
        assert_eq!(paths, vec!["a.rs", "c.rs"]);
        assert!(pack.total_chars() <= 1000);
    }

    #[test]
    fn oversize_lone_seed_segment_is_truncated_at_line_boundary() {
        let text = (0..100)
            .map(|i| format!("line number {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let seeds = vec![seed("big.rs", 0, 0.9, &text)];
        let pack = packer(200).pack(seeds, vec![]);

        assert_eq!(pack.total_segments(), 1);
        let segment = &pack.files[0].segments[0];
        assert!(segment.truncated);
        assert!(segment.text.len() <= 200);
        assert!(segment.text.ends_with(|c: char| c.is_ascii_digit()));
    }

    #[test]
    fn files_ordered_by_best_seed_score() {
        let seeds = vec![
            seed("low.rs", 0, 0.3, "fn l() {}"),
            seed("high.rs", 0, 0.9, "fn h() {}"),
        ];
        let pack = packer(48_000).pack(seeds, vec![]);
        assert_eq!(pack.files[0].relative_path, "high.rs");
        assert_eq!(pack.files[1].relative_path, "low.rs");
    }

    #[test]
    fn per_file_segment_cap_applies() {
        let seeds = vec![
            seed("a.rs", 0, 0.9, "s0"),
            seed("a.rs", 3, 0.8, "s3"),
            seed("a.rs", 6, 0.7, "s6"),
            seed("a.rs", 9, 0.6, "s9"),
        ];
        let pack = packer(48_000).pack(seeds, vec![]);
        assert_eq!(pack.files[0].segments.len(), 3);
    }

    #[test]
    fn merged_breadcrumb_is_common_prefix() {
        let mut a = record("a.rs", 0, "Service > login", "fn login() {}");
        a.breadcrumb = "Service > login".to_string();
        let seeds = vec![Seed {
            record: a,
            score: 0.9,
            source: SeedSource::Vector,
        }];
        let expanded = vec![ExpandedChunk {
            record: record("a.rs", 1, "Service > logout", "fn logout() {}"),
            phase: ExpandPhase::E2BreadcrumbSiblings,
            score: 0.5,
        }];
        let pack = packer(48_000).pack(seeds, expanded);
        assert_eq!(pack.files[0].segments[0].breadcrumb, "Service");
    }

    #[test]
    fn empty_inputs_pack_empty() {
        let pack = packer(48_000).pack(vec![], vec![]);
        assert!(pack.is_empty());
        assert_eq!(pack.total_segments(), 0);
    }

    #[test]
    fn token_estimate_uses_configured_rate() {
        let seeds = vec![seed("a.rs", 0, 0.9, &"x".repeat(100))];
        let pack = packer(48_000).pack(seeds, vec![]);
        assert_eq!(pack.files[0].segments[0].estimated_tokens, 28);
    }
}
