//! Index path: crawl, detect changes, chunk, embed, and write the stores.

mod indexer;
mod progress;
mod scanner;
mod walker;

pub use indexer::{Indexer, ScanOptions};
pub use progress::{ScanStats, VectorIndexStats};
pub use scanner::{content_hash, ProcessResult, ProcessStatus, Scanner};
pub use walker::Walker;
