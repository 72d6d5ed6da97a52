//! Configuration module for the retrieval engine.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file (`contextweaver.toml`)
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `CW_` and use double underscores
//! to separate nested levels:
//! - `CW_EMBEDDINGS__DIMENSIONS=768` sets `embeddings.dimensions`
//! - `CW_SEARCH__SMART_MAX_K=10` sets `search.smart_max_k`
//!
//! The flat names used by tool integrations are also honored:
//! `EMBEDDINGS_DIMENSIONS`, `EMBEDDINGS_MAX_CONCURRENCY`, `RERANK_TOP_N`,
//! and `IGNORE_PATTERNS` (comma-separated, appended to the defaults).

use crate::error::ConfigError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Override for the per-project state directory root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    /// Embedding endpoint settings
    #[serde(default)]
    pub embeddings: EmbeddingConfig,

    /// Reranker endpoint settings
    #[serde(default)]
    pub rerank: RerankConfig,

    /// Indexing and chunking settings
    #[serde(default)]
    pub indexing: IndexingConfig,

    /// Retrieval pipeline settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Graph expansion settings
    #[serde(default)]
    pub expand: ExpandConfig,

    /// Context packing settings
    #[serde(default)]
    pub pack: PackConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    /// Embedding API endpoint URL
    #[serde(default)]
    pub endpoint: String,

    /// Embedding model identifier
    #[serde(default)]
    pub model: String,

    /// Bearer token for the endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Vector width D. Changing this triggers a full reindex.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Upper bound on concurrent embedding requests
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Texts per API request
    #[serde(default = "default_api_batch")]
    pub api_batch: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RerankConfig {
    /// Rerank API endpoint URL; empty disables reranking
    #[serde(default)]
    pub endpoint: String,

    /// Rerank model identifier
    #[serde(default)]
    pub model: String,

    /// Bearer token for the endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Requested top-N from the reranker
    #[serde(default = "default_rerank_top_n")]
    pub top_n: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexingConfig {
    /// Extra exclude patterns appended to the baseline list
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Chunks longer than this are split along syntactic boundaries
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,

    /// Gap fragments separated by more blank lines than this do not coalesce
    #[serde(default = "default_gap_max_blank_lines")]
    pub gap_max_blank_lines: usize,

    /// Target chunk length for the line-based fallback splitter
    #[serde(default = "default_fallback_chunk_lines")]
    pub fallback_chunk_lines: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    /// Vector recall depth
    #[serde(default = "default_vector_top_k")]
    pub vector_top_k: usize,

    /// Best-scoring lexical chunks kept per file
    #[serde(default = "default_lex_chunks_per_file")]
    pub lex_chunks_per_file: usize,

    /// Total lexical recall cap
    #[serde(default = "default_lex_total_chunks")]
    pub lex_total_chunks: usize,

    /// Fused candidates forwarded to the reranker
    #[serde(default = "default_fused_top_m")]
    pub fused_top_m: usize,

    /// Passage truncation length for reranking
    #[serde(default = "default_max_rerank_chars")]
    pub max_rerank_chars: usize,

    /// RRF rank smoothing constant
    #[serde(default = "default_rrf_k0")]
    pub rrf_k0: f32,

    /// RRF weight of the vector list
    #[serde(default = "default_weight_vector")]
    pub weight_vector: f32,

    /// RRF weight of the lexical list
    #[serde(default = "default_weight_lexical")]
    pub weight_lexical: f32,

    /// Dynamic threshold as a fraction of the top score
    #[serde(default = "default_smart_top_score_ratio")]
    pub smart_top_score_ratio: f32,

    /// Absolute score floor
    #[serde(default = "default_smart_min_score")]
    pub smart_min_score: f32,

    /// Safe-harbor size: leading chunks exempt from the dynamic threshold
    #[serde(default = "default_smart_min_k")]
    pub smart_min_k: usize,

    /// Hard cap on seeds
    #[serde(default = "default_smart_max_k")]
    pub smart_max_k: usize,

    /// Outlier detection: if s2 < s1 * ratio, the threshold derives from s2
    #[serde(default = "default_delta_guard_ratio")]
    pub delta_guard_ratio: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExpandConfig {
    /// Same-file neighbors included on each side of a seed
    #[serde(default = "default_neighbor_hops")]
    pub neighbor_hops: usize,

    /// Breadcrumb siblings included per seed
    #[serde(default = "default_breadcrumb_expand_limit")]
    pub breadcrumb_expand_limit: usize,

    /// Import targets resolved per seed; 0 disables the import phase
    #[serde(default = "default_import_files_per_seed")]
    pub import_files_per_seed: usize,

    /// Chunks included per resolved import file
    #[serde(default = "default_chunks_per_import_file")]
    pub chunks_per_import_file: usize,

    /// Score decay per hop for inherited scores
    #[serde(default = "default_neighbor_decay")]
    pub neighbor_decay: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PackConfig {
    /// Character budget for the whole context pack
    #[serde(default = "default_max_total_chars")]
    pub max_total_chars: usize,

    /// Segment cap per file
    #[serde(default = "default_max_segments_per_file")]
    pub max_segments_per_file: usize,

    /// Token estimate per character
    #[serde(default = "default_tokens_per_char")]
    pub tokens_per_char: f32,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_false() -> bool {
    false
}
fn default_dimensions() -> usize {
    1024
}
fn default_max_concurrency() -> usize {
    10
}
fn default_api_batch() -> usize {
    64
}
fn default_timeout_secs() -> u64 {
    90
}
fn default_rerank_top_n() -> usize {
    20
}
fn default_max_chunk_chars() -> usize {
    2000
}
fn default_gap_max_blank_lines() -> usize {
    2
}
fn default_fallback_chunk_lines() -> usize {
    60
}
fn default_vector_top_k() -> usize {
    30
}
fn default_lex_chunks_per_file() -> usize {
    3
}
fn default_lex_total_chunks() -> usize {
    30
}
fn default_fused_top_m() -> usize {
    30
}
fn default_max_rerank_chars() -> usize {
    1600
}
fn default_rrf_k0() -> f32 {
    60.0
}
fn default_weight_vector() -> f32 {
    1.0
}
fn default_weight_lexical() -> f32 {
    0.5
}
fn default_smart_top_score_ratio() -> f32 {
    0.5
}
fn default_smart_min_score() -> f32 {
    0.25
}
fn default_smart_min_k() -> usize {
    2
}
fn default_smart_max_k() -> usize {
    15
}
fn default_delta_guard_ratio() -> f32 {
    0.4
}
fn default_neighbor_hops() -> usize {
    1
}
fn default_breadcrumb_expand_limit() -> usize {
    2
}
fn default_import_files_per_seed() -> usize {
    0
}
fn default_chunks_per_import_file() -> usize {
    1
}
fn default_neighbor_decay() -> f32 {
    0.8
}
fn default_max_total_chars() -> usize {
    48_000
}
fn default_max_segments_per_file() -> usize {
    3
}
fn default_tokens_per_char() -> f32 {
    0.28
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            data_dir: None,
            debug: false,
            embeddings: EmbeddingConfig::default(),
            rerank: RerankConfig::default(),
            indexing: IndexingConfig::default(),
            search: SearchConfig::default(),
            expand: ExpandConfig::default(),
            pack: PackConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            model: String::new(),
            api_key: None,
            dimensions: default_dimensions(),
            max_concurrency: default_max_concurrency(),
            api_batch: default_api_batch(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            model: String::new(),
            api_key: None,
            top_n: default_rerank_top_n(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: Vec::new(),
            max_chunk_chars: default_max_chunk_chars(),
            gap_max_blank_lines: default_gap_max_blank_lines(),
            fallback_chunk_lines: default_fallback_chunk_lines(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            vector_top_k: default_vector_top_k(),
            lex_chunks_per_file: default_lex_chunks_per_file(),
            lex_total_chunks: default_lex_total_chunks(),
            fused_top_m: default_fused_top_m(),
            max_rerank_chars: default_max_rerank_chars(),
            rrf_k0: default_rrf_k0(),
            weight_vector: default_weight_vector(),
            weight_lexical: default_weight_lexical(),
            smart_top_score_ratio: default_smart_top_score_ratio(),
            smart_min_score: default_smart_min_score(),
            smart_min_k: default_smart_min_k(),
            smart_max_k: default_smart_max_k(),
            delta_guard_ratio: default_delta_guard_ratio(),
        }
    }
}

impl Default for ExpandConfig {
    fn default() -> Self {
        Self {
            neighbor_hops: default_neighbor_hops(),
            breadcrumb_expand_limit: default_breadcrumb_expand_limit(),
            import_files_per_seed: default_import_files_per_seed(),
            chunks_per_import_file: default_chunks_per_import_file(),
            neighbor_decay: default_neighbor_decay(),
        }
    }
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            max_total_chars: default_max_total_chars(),
            max_segments_per_file: default_max_segments_per_file(),
            tokens_per_char: default_tokens_per_char(),
        }
    }
}

impl Settings {
    /// Load settings from defaults, `contextweaver.toml`, and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Toml::file("contextweaver.toml"))
    }

    /// Load with an explicit TOML provider (used by tests).
    fn load_from(toml: figment::providers::Data<figment::providers::Toml>) -> Result<Self, ConfigError> {
        let mut settings: Settings = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(toml)
            .merge(Env::prefixed("CW_").split("__"))
            .extract()
            .map_err(|e| ConfigError::Invalid {
                reason: e.to_string(),
            })?;

        settings.apply_flat_env();
        Ok(settings)
    }

    /// Honor the flat environment names used by tool integrations.
    fn apply_flat_env(&mut self) {
        if let Some(v) = env_usize("EMBEDDINGS_DIMENSIONS") {
            self.embeddings.dimensions = v;
        }
        if let Some(v) = env_usize("EMBEDDINGS_MAX_CONCURRENCY") {
            self.embeddings.max_concurrency = v;
        }
        if let Some(v) = env_usize("RERANK_TOP_N") {
            self.rerank.top_n = v;
        }
        if let Ok(raw) = std::env::var("IGNORE_PATTERNS") {
            self.indexing.ignore_patterns.extend(
                raw.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from),
            );
        }
    }

    /// Verify that everything a scan or query needs is present.
    ///
    /// Collects all missing keys so the user sees the full list at once.
    pub fn validate_for_remote(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        if self.embeddings.endpoint.is_empty() {
            missing.push("embeddings.endpoint".to_string());
        }
        if self.embeddings.model.is_empty() {
            missing.push("embeddings.model".to_string());
        }
        if self.embeddings.api_key.is_none() {
            missing.push("embeddings.api_key".to_string());
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingKeys { keys: missing })
        }
    }

    /// True when a rerank endpoint is configured.
    pub fn rerank_enabled(&self) -> bool {
        !self.rerank.endpoint.is_empty() && !self.rerank.model.is_empty()
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
