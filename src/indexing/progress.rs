//! Scan statistics and progress reporting.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Vector-index slice of the scan counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorIndexStats {
    /// Files whose chunks were written to both stores
    pub indexed: usize,
    /// Files whose rows were removed
    pub deleted: usize,
    /// Files not successfully written to both stores
    pub errors: usize,
}

/// Counts returned by `scan`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub added: usize,
    pub modified: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub errors: usize,
    pub vector_index: VectorIndexStats,
    /// Wall-clock scan duration, not part of the counts contract
    #[serde(skip)]
    pub elapsed: Duration,
}

impl ScanStats {
    /// Human-readable summary for the CLI.
    pub fn display(&self) -> String {
        let mut out = format!(
            "Scan complete: {} added, {} modified, {} unchanged, {} deleted, {} skipped, {} errors ({:.2}s)",
            self.added,
            self.modified,
            self.unchanged,
            self.deleted,
            self.skipped,
            self.errors,
            self.elapsed.as_secs_f64(),
        );
        out.push_str(&format!(
            "\nVector index: {} indexed, {} deleted, {} errors",
            self.vector_index.indexed, self.vector_index.deleted, self.vector_index.errors,
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_all_counters() {
        let stats = ScanStats {
            added: 2,
            modified: 1,
            unchanged: 3,
            deleted: 1,
            skipped: 0,
            errors: 0,
            vector_index: VectorIndexStats {
                indexed: 3,
                deleted: 1,
                errors: 0,
            },
            elapsed: Duration::from_millis(1500),
        };
        let text = stats.display();
        assert!(text.contains("2 added"));
        assert!(text.contains("3 indexed"));
    }

    #[test]
    fn serializes_counts_for_tooling() {
        let stats = ScanStats::default();
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["added"], 0);
        assert_eq!(json["vector_index"]["indexed"], 0);
    }
}
