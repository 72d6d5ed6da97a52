//! Three-phase context expansion around recalled seeds.
//!
//! - E1: same-file neighbors by chunk index
//! - E2: same-file breadcrumb siblings (shared scope prefix)
//! - E3: chunks from files the seed's file imports (off by default)
//!
//! Expanded chunks inherit the nearest seed's score decayed by
//! `neighbor_decay^distance`. Caches are per-process and cleared through
//! an explicit hook after scans invalidate the index.

mod imports;

pub use imports::{extract_imports, resolve_import};

use crate::config::ExpandConfig;
use crate::search::Seed;
use crate::store::{ChunkRecord, VectorStore};
use dashmap::DashMap;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Which expansion phase attached a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ExpandPhase {
    E1Neighbors,
    E2BreadcrumbSiblings,
    E3Imports,
}

impl std::fmt::Display for ExpandPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExpandPhase::E1Neighbors => "E1",
            ExpandPhase::E2BreadcrumbSiblings => "E2",
            ExpandPhase::E3Imports => "E3",
        };
        write!(f, "{s}")
    }
}

/// A context chunk attached during expansion.
#[derive(Debug, Clone)]
pub struct ExpandedChunk {
    pub record: ChunkRecord,
    pub phase: ExpandPhase,
    pub score: f32,
}

/// Expands seed sets with surrounding context.
pub struct GraphExpander {
    config: ExpandConfig,
    repo_root: PathBuf,
    vectors: Arc<VectorStore>,
    /// Chunk lists per file, sorted by chunk index
    file_cache: DashMap<String, Arc<Vec<ChunkRecord>>>,
    /// Resolved import targets per file
    import_cache: DashMap<String, Arc<Vec<String>>>,
}

impl GraphExpander {
    pub fn new(config: ExpandConfig, repo_root: PathBuf, vectors: Arc<VectorStore>) -> Self {
        Self {
            config,
            repo_root,
            vectors,
            file_cache: DashMap::new(),
            import_cache: DashMap::new(),
        }
    }

    /// Run all three phases over the seeds, de-duplicated against the seeds
    /// and earlier phases. Output order is deterministic for a given seed
    /// list and index snapshot.
    pub fn expand(&self, seeds: &[Seed]) -> Vec<ExpandedChunk> {
        let mut seen: HashSet<String> =
            seeds.iter().map(|s| s.record.chunk_id.clone()).collect();
        let mut out = Vec::new();

        self.expand_neighbors(seeds, &mut seen, &mut out);
        self.expand_breadcrumb_siblings(seeds, &mut seen, &mut out);
        if self.config.import_files_per_seed > 0 {
            self.expand_imports(seeds, &mut seen, &mut out);
        }
        debug!(seeds = seeds.len(), expanded = out.len(), "expansion complete");
        out
    }

    /// E1: up to `neighbor_hops` chunks on each side of every seed.
    fn expand_neighbors(
        &self,
        seeds: &[Seed],
        seen: &mut HashSet<String>,
        out: &mut Vec<ExpandedChunk>,
    ) {
        for seed in seeds {
            let chunks = self.file_chunks(&seed.record.relative_path);
            let position = chunks
                .iter()
                .position(|c| c.chunk_index == seed.record.chunk_index);
            let Some(position) = position else { continue };

            for hop in 1..=self.config.neighbor_hops {
                let decayed = seed.score * self.config.neighbor_decay.powi(hop as i32);
                let before = position.checked_sub(hop).and_then(|i| chunks.get(i));
                let after = chunks.get(position + hop);
                for neighbor in [before, after].into_iter().flatten() {
                    if seen.insert(neighbor.chunk_id.clone()) {
                        out.push(ExpandedChunk {
                            record: neighbor.clone(),
                            phase: ExpandPhase::E1Neighbors,
                            score: decayed,
                        });
                    }
                }
            }
        }
    }

    /// E2: same-file chunks sharing a breadcrumb prefix with the seed.
    fn expand_breadcrumb_siblings(
        &self,
        seeds: &[Seed],
        seen: &mut HashSet<String>,
        out: &mut Vec<ExpandedChunk>,
    ) {
        for seed in seeds {
            if seed.record.breadcrumb.is_empty() {
                continue;
            }
            let seed_path = breadcrumb_components(&seed.record.breadcrumb);
            let chunks = self.file_chunks(&seed.record.relative_path);

            let mut siblings: Vec<(&ChunkRecord, usize, u32)> = chunks
                .iter()
                .filter(|c| !seen.contains(&c.chunk_id))
                .filter_map(|c| {
                    let path = breadcrumb_components(&c.breadcrumb);
                    let shared = seed_path
                        .iter()
                        .zip(&path)
                        .take_while(|(a, b)| a == b)
                        .count();
                    if shared == 0 {
                        return None;
                    }
                    let distance =
                        (seed_path.len() - shared) + (path.len() - shared);
                    let index_gap = c.chunk_index.abs_diff(seed.record.chunk_index);
                    Some((c, distance.max(1), index_gap))
                })
                .collect();
            siblings.sort_by_key(|(c, _, gap)| (*gap, c.chunk_index));

            for (record, distance, _) in
                siblings.into_iter().take(self.config.breadcrumb_expand_limit)
            {
                seen.insert(record.chunk_id.clone());
                out.push(ExpandedChunk {
                    record: record.clone(),
                    phase: ExpandPhase::E2BreadcrumbSiblings,
                    score: seed.score * self.config.neighbor_decay.powi(distance as i32),
                });
            }
        }
    }

    /// E3: chunks from resolved import targets of each seed's file.
    fn expand_imports(
        &self,
        seeds: &[Seed],
        seen: &mut HashSet<String>,
        out: &mut Vec<ExpandedChunk>,
    ) {
        let known_files: HashSet<String> = self.vectors.paths().into_iter().collect();

        for seed in seeds {
            let targets = self.resolved_imports(
                &seed.record.relative_path,
                &seed.record.language,
                &known_files,
            );
            let seed_idents = identifiers(&seed.record.display_code);

            for target in targets
                .iter()
                .filter(|t| t.as_str() != seed.record.relative_path)
                .take(self.config.import_files_per_seed)
            {
                let chunks = self.file_chunks(target);
                let mut candidates: Vec<&ChunkRecord> = chunks
                    .iter()
                    .filter(|c| !seen.contains(&c.chunk_id))
                    .collect();
                // Prefer chunks whose breadcrumb names something the seed
                // mentions; ties fall back to the head of the file.
                candidates.sort_by_key(|c| {
                    let crumb = c.breadcrumb.to_lowercase();
                    let mentioned = seed_idents.iter().any(|id| crumb.contains(id));
                    (!mentioned, c.chunk_index)
                });

                for record in candidates
                    .into_iter()
                    .take(self.config.chunks_per_import_file)
                {
                    seen.insert(record.chunk_id.clone());
                    out.push(ExpandedChunk {
                        record: record.clone(),
                        phase: ExpandPhase::E3Imports,
                        score: seed.score * self.config.neighbor_decay,
                    });
                }
            }
        }
    }

    fn file_chunks(&self, relative_path: &str) -> Arc<Vec<ChunkRecord>> {
        if let Some(cached) = self.file_cache.get(relative_path) {
            return Arc::clone(&cached);
        }
        let chunks = Arc::new(self.vectors.chunks_for_file(relative_path));
        self.file_cache
            .insert(relative_path.to_string(), Arc::clone(&chunks));
        chunks
    }

    fn resolved_imports(
        &self,
        relative_path: &str,
        language: &str,
        known_files: &HashSet<String>,
    ) -> Arc<Vec<String>> {
        if let Some(cached) = self.import_cache.get(relative_path) {
            return Arc::clone(&cached);
        }
        let resolved = match std::fs::read_to_string(self.repo_root.join(relative_path)) {
            Ok(source) => {
                let mut targets = Vec::new();
                for spec in imports::extract_imports(language, &source) {
                    if let Some(path) =
                        imports::resolve_import(language, relative_path, &spec, known_files)
                    {
                        if !targets.contains(&path) {
                            targets.push(path);
                        }
                    }
                }
                targets
            }
            Err(_) => Vec::new(),
        };
        let resolved = Arc::new(resolved);
        self.import_cache
            .insert(relative_path.to_string(), Arc::clone(&resolved));
        resolved
    }

    /// Drop cached file and import lookups. Invoked after scans.
    pub fn clear_caches(&self) {
        self.file_cache.clear();
        self.import_cache.clear();
    }
}

fn breadcrumb_components(breadcrumb: &str) -> Vec<&str> {
    if breadcrumb.is_empty() {
        Vec::new()
    } else {
        breadcrumb.split(" > ").collect()
    }
}

/// Identifier-ish tokens mentioned in a code slice, lowercased.
fn identifiers(code: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for token in code.split(|c: char| !c.is_alphanumeric() && c != '_') {
        if token.chars().count() >= 3 && token.chars().any(|c| c.is_alphabetic()) {
            let lower = token.to_lowercase();
            if !out.contains(&lower) {
                out.push(lower);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ByteSpan;
    use crate::search::SeedSource;
    use tempfile::TempDir;

    const DIM: usize = 4;

    fn record(path: &str, index: u32, breadcrumb: &str) -> ChunkRecord {
        ChunkRecord {
            chunk_id: format!("{path}#h#{index}"),
            relative_path: path.to_string(),
            file_hash: "h".to_string(),
            chunk_index: index,
            display_code: format!("fn body_{index}() {{}}"),
            breadcrumb: breadcrumb.to_string(),
            language: "rust".to_string(),
            raw_span: ByteSpan::new(0, 10),
            vector_span: ByteSpan::new(0, 10),
            start_line: 1,
            end_line: 1,
            vector: vec![1.0, 0.0, 0.0, 0.0],
        }
    }

    fn store_with(records: Vec<(&str, Vec<ChunkRecord>)>) -> (TempDir, Arc<VectorStore>) {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::open_or_create(dir.path(), DIM).unwrap();
        store
            .batch_upsert_files(
                records
                    .into_iter()
                    .map(|(p, rs)| (p.to_string(), rs))
                    .collect(),
            )
            .unwrap();
        (dir, Arc::new(store))
    }

    fn seed(record: ChunkRecord, score: f32) -> Seed {
        Seed {
            record,
            score,
            source: SeedSource::Vector,
        }
    }

    fn expander(vectors: Arc<VectorStore>, config: ExpandConfig) -> GraphExpander {
        GraphExpander::new(config, PathBuf::from("/nonexistent"), vectors)
    }

    #[test]
    fn e1_includes_both_neighbors() {
        let rows = vec![
            record("a.rs", 0, ""),
            record("a.rs", 1, ""),
            record("a.rs", 2, ""),
        ];
        let (_dir, store) = store_with(vec![("a.rs", rows.clone())]);
        let exp = expander(store, ExpandConfig::default());

        let out = exp.expand(&[seed(rows[1].clone(), 0.9)]);
        let e1: Vec<u32> = out
            .iter()
            .filter(|e| e.phase == ExpandPhase::E1Neighbors)
            .map(|e| e.record.chunk_index)
            .collect();
        assert_eq!(e1, vec![0, 2]);
    }

    #[test]
    fn e1_scores_decay_with_distance() {
        let rows: Vec<ChunkRecord> = (0..5).map(|i| record("a.rs", i, "")).collect();
        let (_dir, store) = store_with(vec![("a.rs", rows.clone())]);
        let mut config = ExpandConfig::default();
        config.neighbor_hops = 2;
        let exp = expander(store, config);

        let out = exp.expand(&[seed(rows[2].clone(), 1.0)]);
        let hop1 = out
            .iter()
            .find(|e| e.record.chunk_index == 1)
            .unwrap()
            .score;
        let hop2 = out
            .iter()
            .find(|e| e.record.chunk_index == 0)
            .unwrap()
            .score;
        assert!((hop1 - 0.8).abs() < 1e-6);
        assert!((hop2 - 0.64).abs() < 1e-6);
    }

    #[test]
    fn e2_prefers_closest_siblings() {
        let rows = vec![
            record("a.rs", 0, "Service"),
            record("a.rs", 1, "Service"),
            record("a.rs", 2, ""),
            record("a.rs", 3, "Service"),
            record("a.rs", 4, "Service"),
            record("a.rs", 5, "Other"),
        ];
        let (_dir, store) = store_with(vec![("a.rs", rows.clone())]);
        let mut config = ExpandConfig::default();
        config.neighbor_hops = 0;
        config.breadcrumb_expand_limit = 2;
        let exp = expander(store, config);

        let out = exp.expand(&[seed(rows[3].clone(), 1.0)]);
        let e2: Vec<u32> = out
            .iter()
            .filter(|e| e.phase == ExpandPhase::E2BreadcrumbSiblings)
            .map(|e| e.record.chunk_index)
            .collect();
        assert_eq!(e2, vec![4, 1]);
    }

    #[test]
    fn e2_skips_seeds_without_breadcrumb() {
        let rows = vec![record("a.rs", 0, ""), record("a.rs", 1, "Scope")];
        let (_dir, store) = store_with(vec![("a.rs", rows.clone())]);
        let mut config = ExpandConfig::default();
        config.neighbor_hops = 0;
        let exp = expander(store, config);

        let out = exp.expand(&[seed(rows[0].clone(), 1.0)]);
        assert!(out.is_empty());
    }

    #[test]
    fn e3_disabled_by_default() {
        let rows = vec![record("a.rs", 0, "")];
        let (_dir, store) = store_with(vec![("a.rs", rows.clone())]);
        let exp = expander(store, ExpandConfig::default());

        let out = exp.expand(&[seed(rows[0].clone(), 1.0)]);
        assert!(out
            .iter()
            .all(|e| e.phase != ExpandPhase::E3Imports));
    }

    #[test]
    fn e3_pulls_chunks_from_imported_file() {
        let repo = TempDir::new().unwrap();
        std::fs::create_dir_all(repo.path().join("src")).unwrap();
        std::fs::write(
            repo.path().join("src/main.rs"),
            "use crate::store;\n\nfn main() { store::run(); }\n",
        )
        .unwrap();
        std::fs::write(repo.path().join("src/store.rs"), "pub fn run() {}\n").unwrap();

        let main_rows = vec![record("src/main.rs", 0, "")];
        let store_rows = vec![record("src/store.rs", 0, "")];
        let (_dir, store) = store_with(vec![
            ("src/main.rs", main_rows.clone()),
            ("src/store.rs", store_rows),
        ]);

        let mut config = ExpandConfig::default();
        config.neighbor_hops = 0;
        config.import_files_per_seed = 2;
        let exp = GraphExpander::new(config, repo.path().to_path_buf(), store);

        let out = exp.expand(&[seed(main_rows[0].clone(), 1.0)]);
        let e3: Vec<&str> = out
            .iter()
            .filter(|e| e.phase == ExpandPhase::E3Imports)
            .map(|e| e.record.relative_path.as_str())
            .collect();
        assert_eq!(e3, vec!["src/store.rs"]);
    }

    #[test]
    fn expansion_never_duplicates_seeds() {
        let rows = vec![record("a.rs", 0, "S"), record("a.rs", 1, "S")];
        let (_dir, store) = store_with(vec![("a.rs", rows.clone())]);
        let exp = expander(store, ExpandConfig::default());

        let out = exp.expand(&[
            seed(rows[0].clone(), 1.0),
            seed(rows[1].clone(), 0.9),
        ]);
        assert!(out.is_empty(), "both chunks are seeds; nothing to expand");
    }

    #[test]
    fn caches_clear_on_demand() {
        let rows = vec![record("a.rs", 0, "")];
        let (_dir, store) = store_with(vec![("a.rs", rows.clone())]);
        let exp = expander(store, ExpandConfig::default());
        exp.expand(&[seed(rows[0].clone(), 1.0)]);
        assert!(!exp.file_cache.is_empty());
        exp.clear_caches();
        assert!(exp.file_cache.is_empty());
    }
}
