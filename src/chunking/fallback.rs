//! Line-based fallback splitter for unsupported or unparseable files.

use super::{ByteSpan, RawChunk};

/// Produce fixed-size, line-aligned chunks of roughly `target_lines` lines.
///
/// Chunks never split a line; the final chunk absorbs the remainder when it
/// would otherwise be tiny. Breadcrumbs are always empty on this path.
pub(crate) fn split_lines(source: &str, target_lines: usize) -> Vec<RawChunk> {
    let target = target_lines.max(1);
    let mut chunks = Vec::new();
    let mut line_count = 0;
    let mut chunk_start = 0;
    let mut offset = 0;

    for line in source.split_inclusive('\n') {
        offset += line.len();
        line_count += 1;
        if line_count == target {
            chunks.push(ByteSpan::new(chunk_start, offset));
            chunk_start = offset;
            line_count = 0;
        }
    }
    if chunk_start < source.len() {
        chunks.push(ByteSpan::new(chunk_start, source.len()));
    }

    chunks
        .into_iter()
        .map(|span| RawChunk {
            span,
            breadcrumb: String::new(),
        })
        .collect()
}
