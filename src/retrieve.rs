//! Tool surface: turn a context pack into the text block handed to
//! assistants.
//!
//! Output shape: a one-line summary followed by one block per segment with
//! its path, line range, breadcrumb, and a language-tagged code fence.

use crate::pack::ContextPack;
use crate::search::SearchService;
use crate::SearchError;
use std::fmt::Write;

/// Run the query path and format the result.
pub async fn retrieve(
    service: &SearchService,
    information_request: &str,
    technical_terms: &[String],
) -> Result<String, SearchError> {
    let pack = service
        .build_context_pack(information_request, technical_terms)
        .await?;
    Ok(format_context_pack(&pack))
}

/// Render a context pack as a self-contained text block.
pub fn format_context_pack(pack: &ContextPack) -> String {
    if pack.is_empty() {
        return "Found 0 relevant code blocks | Files: 0 | Total segments: 0".to_string();
    }

    let mut out = format!(
        "Found {} relevant code blocks | Files: {} | Total segments: {}\n",
        pack.seeds.len(),
        pack.files.len(),
        pack.total_segments(),
    );

    for file in &pack.files {
        for segment in &file.segments {
            let _ = write!(
                out,
                "\n{}:{}-{}",
                segment.relative_path, segment.start_line, segment.end_line
            );
            if !segment.breadcrumb.is_empty() {
                let _ = write!(out, " ({})", segment.breadcrumb);
            }
            if segment.truncated {
                out.push_str(" [truncated]");
            }
            let _ = write!(
                out,
                "\n```{}\n{}\n```\n",
                segment.language, segment.text
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::{FileSegments, Segment};

    fn segment(path: &str, breadcrumb: &str, text: &str) -> Segment {
        Segment {
            relative_path: path.to_string(),
            start_line: 3,
            end_line: 9,
            breadcrumb: breadcrumb.to_string(),
            language: "python".to_string(),
            text: text.to_string(),
            truncated: false,
            estimated_tokens: 10,
        }
    }

    #[test]
    fn empty_pack_formats_zero_summary() {
        let out = format_context_pack(&ContextPack::empty());
        assert_eq!(
            out,
            "Found 0 relevant code blocks | Files: 0 | Total segments: 0"
        );
    }

    #[test]
    fn segments_render_with_fence_and_breadcrumb() {
        let pack = ContextPack {
            seeds: vec![],
            expanded: vec![],
            files: vec![FileSegments {
                relative_path: "pay.py".to_string(),
                segments: vec![segment("pay.py", "Payment > refund", "def refund(): ...")],
            }],
            debug: None,
        };
        let out = format_context_pack(&pack);
        assert!(out.contains("pay.py:3-9 (Payment > refund)"));
        assert!(out.contains("```python\ndef refund(): ...\n```"));
        assert!(out.starts_with("Found 0 relevant code blocks | Files: 1 | Total segments: 1"));
    }

    #[test]
    fn truncated_segments_are_flagged() {
        let mut s = segment("a.py", "", "code");
        s.truncated = true;
        let pack = ContextPack {
            seeds: vec![],
            expanded: vec![],
            files: vec![FileSegments {
                relative_path: "a.py".to_string(),
                segments: vec![s],
            }],
            debug: None,
        };
        assert!(format_context_pack(&pack).contains("[truncated]"));
    }
}
