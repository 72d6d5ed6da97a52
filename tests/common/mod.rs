//! Shared harness for integration tests: a temp repository, isolated
//! state directory, and an indexer wired to the deterministic offline
//! embedder.
#![allow(dead_code)]

use contextweaver::chunking::ParserPool;
use contextweaver::embedding::{EmbeddingProvider, OfflineEmbeddings};
use contextweaver::indexing::{Indexer, ScanOptions, ScanStats};
use contextweaver::rerank::RerankProvider;
use contextweaver::search::SearchService;
use contextweaver::{Project, Settings};
use std::sync::Arc;
use tempfile::TempDir;

pub const DIM: usize = 64;

pub struct Harness {
    pub repo: TempDir,
    pub state: TempDir,
    pub settings: Arc<Settings>,
}

pub fn harness() -> Harness {
    harness_with_dimensions(DIM)
}

pub fn harness_with_dimensions(dimensions: usize) -> Harness {
    let mut settings = Settings::default();
    settings.embeddings.dimensions = dimensions;
    Harness {
        repo: TempDir::new().unwrap(),
        state: TempDir::new().unwrap(),
        settings: Arc::new(settings),
    }
}

impl Harness {
    pub fn write(&self, rel: &str, content: &str) {
        let path = self.repo.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    pub fn remove(&self, rel: &str) {
        std::fs::remove_file(self.repo.path().join(rel)).unwrap();
    }

    pub fn rename(&self, from: &str, to: &str) {
        std::fs::rename(
            self.repo.path().join(from),
            self.repo.path().join(to),
        )
        .unwrap();
    }

    pub fn embedder(&self) -> Arc<dyn EmbeddingProvider> {
        Arc::new(OfflineEmbeddings::new(self.settings.embeddings.dimensions))
    }

    /// Open a fresh indexer, as a new process invocation would.
    pub fn indexer(&self) -> Indexer {
        let project = Project::open(self.repo.path(), Some(self.state.path())).unwrap();
        Indexer::open(
            project,
            Arc::clone(&self.settings),
            self.embedder(),
            Arc::new(ParserPool::new()),
        )
        .unwrap()
    }

    pub async fn scan(&self) -> ScanStats {
        self.indexer().scan(ScanOptions::full()).await.unwrap()
    }

    pub fn service(
        &self,
        indexer: &Indexer,
        reranker: Option<Arc<dyn RerankProvider>>,
    ) -> SearchService {
        let project = Project::open(self.repo.path(), Some(self.state.path())).unwrap();
        SearchService::new(
            Arc::clone(&self.settings),
            project.repo_root,
            indexer.vectors(),
            indexer.fts(),
            self.embedder(),
            reranker,
        )
    }
}

/// Assert the repo-relative paths present in the vector store.
pub fn assert_store_paths(indexer: &Indexer, expected: &[&str]) {
    let mut paths = indexer.vectors().paths();
    paths.sort();
    let mut want: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
    want.sort();
    assert_eq!(paths, want);
}
