//! Command-line front-end: `scan` and `retrieve`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use contextweaver::chunking::ParserPool;
use contextweaver::embedding::{
    AdaptiveRateLimiter, EmbeddingProvider, HttpEmbeddingClient, OfflineEmbeddings,
};
use contextweaver::indexing::{Indexer, ScanOptions};
use contextweaver::rerank::{HttpReranker, RerankProvider};
use contextweaver::search::SearchService;
use contextweaver::{retrieve, Project, Settings};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "contextweaver",
    about = "Semantic code retrieval for AI assistants",
    version
)]
struct Cli {
    /// Use the deterministic offline embedder (no API required)
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index a repository (incremental by default)
    Scan {
        /// Repository root
        path: PathBuf,
        /// Drop all index state and rebuild
        #[arg(long)]
        force: bool,
        /// Skip the embedding and store-write phase
        #[arg(long)]
        no_vector_index: bool,
    },
    /// Query the index and print a context pack
    Retrieve {
        /// Repository root
        path: PathBuf,
        /// Natural-language information request
        query: String,
        /// Additional technical terms to recall on (comma-separated)
        #[arg(long, value_delimiter = ',')]
        terms: Vec<String>,
    },
}

fn build_embedder(
    settings: &Settings,
    offline: bool,
) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    if offline {
        return Ok(Arc::new(OfflineEmbeddings::new(
            settings.embeddings.dimensions,
        )));
    }
    settings.validate_for_remote()?;
    let limiter = Arc::new(AdaptiveRateLimiter::new(
        settings.embeddings.max_concurrency,
    ));
    Ok(Arc::new(HttpEmbeddingClient::new(
        &settings.embeddings,
        limiter,
    )))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Arc::new(Settings::load()?);

    match cli.command {
        Command::Scan {
            path,
            force,
            no_vector_index,
        } => {
            let project = Project::open(&path, settings.data_dir.as_deref())?;
            let embedder = build_embedder(&settings, cli.offline)?;
            let pool = Arc::new(ParserPool::new());
            let indexer = Indexer::open(project, Arc::clone(&settings), embedder, pool)
                .context("failed to open index stores")?;

            let (tx, mut rx) = tokio::sync::mpsc::channel::<contextweaver::embedding::EmbedProgress>(32);
            let reporter = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    eprintln!(
                        "Embedded batch {}/{}",
                        event.completed_batches, event.total_batches
                    );
                }
            });

            let stats = indexer
                .scan(ScanOptions {
                    force,
                    vector_index: !no_vector_index,
                    progress: Some(tx),
                })
                .await?;
            let _ = reporter.await;
            println!("{}", stats.display());
        }
        Command::Retrieve { path, query, terms } => {
            let project = Project::open(&path, settings.data_dir.as_deref())?;
            let embedder = build_embedder(&settings, cli.offline)?;
            let pool = Arc::new(ParserPool::new());
            let indexer = Indexer::open(
                project.clone(),
                Arc::clone(&settings),
                Arc::clone(&embedder),
                pool,
            )
            .context("failed to open index stores")?;

            let reranker: Option<Arc<dyn RerankProvider>> =
                if !cli.offline && settings.rerank_enabled() {
                    Some(Arc::new(HttpReranker::new(&settings.rerank)))
                } else {
                    None
                };
            let service = SearchService::new(
                Arc::clone(&settings),
                project.repo_root.clone(),
                indexer.vectors(),
                indexer.fts(),
                embedder,
                reranker,
            );

            let block = retrieve::retrieve(&service, &query, &terms).await?;
            println!("{block}");
        }
    }
    Ok(())
}
