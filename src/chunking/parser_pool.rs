//! Bounded pool of reusable tree-sitter parsers.
//!
//! Parser construction (grammar loading) is the expensive part; parsing
//! itself reuses internal buffers. The pool keeps a small number of
//! parsers per language and hands them out with RAII return.

use super::languages::Language;
use crate::error::ChunkError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Parsers retained per language once returned.
const MAX_POOLED_PER_LANGUAGE: usize = 4;

/// Process-wide parser pool, shared by all chunkers.
#[derive(Default)]
pub struct ParserPool {
    idle: Mutex<HashMap<Language, Vec<tree_sitter::Parser>>>,
}

impl std::fmt::Debug for ParserPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserPool").finish_non_exhaustive()
    }
}

impl ParserPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check out a parser for `language`, creating one if the pool is empty.
    pub fn checkout(self: &Arc<Self>, language: Language) -> Result<PooledParser, ChunkError> {
        let existing = self.idle.lock().get_mut(&language).and_then(Vec::pop);
        let parser = match existing {
            Some(p) => p,
            None => {
                let mut p = tree_sitter::Parser::new();
                p.set_language(&language.grammar())
                    .map_err(|e| ChunkError::ParserInit {
                        language: language.tag().to_string(),
                        reason: e.to_string(),
                    })?;
                p
            }
        };
        Ok(PooledParser {
            parser: Some(parser),
            language,
            pool: Arc::clone(self),
        })
    }

    fn restore(&self, language: Language, parser: tree_sitter::Parser) {
        let mut idle = self.idle.lock();
        let slot = idle.entry(language).or_default();
        if slot.len() < MAX_POOLED_PER_LANGUAGE {
            slot.push(parser);
        }
    }

    /// Drop all pooled parsers. Invoked after a scan completes.
    pub fn shutdown(&self) {
        self.idle.lock().clear();
    }
}

/// RAII handle returning the parser to the pool on drop.
pub struct PooledParser {
    parser: Option<tree_sitter::Parser>,
    language: Language,
    pool: Arc<ParserPool>,
}

impl PooledParser {
    pub fn parse(
        &mut self,
        source: &str,
        old_tree: Option<&tree_sitter::Tree>,
    ) -> Option<tree_sitter::Tree> {
        self.parser
            .as_mut()
            .and_then(|p| p.parse(source, old_tree))
    }
}

impl Drop for PooledParser {
    fn drop(&mut self) {
        if let Some(parser) = self.parser.take() {
            self.pool.restore(self.language, parser);
        }
    }
}
