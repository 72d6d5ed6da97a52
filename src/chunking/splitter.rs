//! Syntax-tree driven splitter.
//!
//! One chunk per chunkable node; container nodes (classes, impls, modules,
//! namespaces) contribute breadcrumb components and are descended into.
//! Source regions claimed by no chunkable node are covered by gap-aware
//! merging, so the union of chunks spans every interesting byte of the file.

use super::languages::{node_name, ChunkSpec};
use super::{ByteSpan, RawChunk};
use tree_sitter::{Node, Tree};

pub(crate) struct SyntaxSplitter<'a> {
    source: &'a str,
    spec: &'static ChunkSpec,
    max_chunk_chars: usize,
    gap_max_blank_lines: usize,
}

impl<'a> SyntaxSplitter<'a> {
    pub fn new(
        source: &'a str,
        spec: &'static ChunkSpec,
        max_chunk_chars: usize,
        gap_max_blank_lines: usize,
    ) -> Self {
        Self {
            source,
            spec,
            max_chunk_chars,
            gap_max_blank_lines,
        }
    }

    pub fn split(&self, tree: &Tree) -> Vec<RawChunk> {
        let mut claimed: Vec<RawChunk> = Vec::new();
        let mut contexts: Vec<(ByteSpan, String)> = Vec::new();
        let mut crumbs: Vec<String> = Vec::new();

        self.walk(tree.root_node(), &mut crumbs, &mut claimed, &mut contexts);
        claimed.sort_by_key(|c| c.span.start);

        let mut out = claimed.clone();
        for gap in self.uncovered_gaps(&claimed) {
            for block in self.gap_blocks(gap) {
                let breadcrumb = Self::enclosing_breadcrumb(&contexts, block);
                for span in self.split_oversize(block, &[]) {
                    out.push(RawChunk { span, breadcrumb: breadcrumb.clone() });
                }
            }
        }
        out
    }

    fn walk(
        &self,
        node: Node,
        crumbs: &mut Vec<String>,
        claimed: &mut Vec<RawChunk>,
        contexts: &mut Vec<(ByteSpan, String)>,
    ) {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        for child in children {
            let kind = child.kind();
            let span = ByteSpan::new(child.start_byte(), child.end_byte());

            if self.spec.is_chunkable(kind) && !self.is_splittable_container(child) {
                let breadcrumb = crumbs.join(" > ");
                let text = &self.source[span.start..span.end];
                if text.len() <= self.max_chunk_chars {
                    claimed.push(RawChunk { span, breadcrumb });
                } else {
                    // Oversize leaf: split along child boundaries, with the
                    // node's own name appended so pieces stay identifiable.
                    let piece_crumb = match node_name(child, self.source) {
                        Some(name) if breadcrumb.is_empty() => name,
                        Some(name) => format!("{breadcrumb} > {name}"),
                        None => breadcrumb,
                    };
                    let cuts = self.child_boundaries(child);
                    for piece in self.split_oversize(span, &cuts) {
                        claimed.push(RawChunk {
                            span: piece,
                            breadcrumb: piece_crumb.clone(),
                        });
                    }
                }
            } else if self.spec.is_context(kind) {
                let name =
                    node_name(child, self.source).unwrap_or_else(|| kind.to_string());
                crumbs.push(name);
                contexts.push((span, crumbs.join(" > ")));
                self.walk(child, crumbs, claimed, contexts);
                crumbs.pop();
            } else if self.has_chunkable_descendant(child) {
                // Wrapper nodes (export statements, decorated definitions,
                // class bodies) are transparent to chunking.
                self.walk(child, crumbs, claimed, contexts);
            }
        }
    }

    /// A node must be descended into (rather than emitted whole) when its
    /// subtree contains a context node that itself encloses chunkable nodes.
    fn is_splittable_container(&self, node: Node) -> bool {
        if self.spec.is_context(node.kind()) && self.has_chunkable_descendant(node) {
            return true;
        }
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        children.into_iter().any(|c| self.is_splittable_container(c))
    }

    /// True when any proper descendant of `node` is a chunkable kind.
    fn has_chunkable_descendant(&self, node: Node) -> bool {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        children
            .into_iter()
            .any(|c| self.spec.is_chunkable(c.kind()) || self.has_chunkable_descendant(c))
    }

    /// Byte offsets where an oversize node can be cut: the start offsets of
    /// its named children and grandchildren.
    fn child_boundaries(&self, node: Node) -> Vec<usize> {
        let mut cuts = Vec::new();
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            cuts.push(child.start_byte());
            let mut inner = child.walk();
            let grandchildren: Vec<Node> = child.named_children(&mut inner).collect();
            cuts.extend(grandchildren.iter().map(|g| g.start_byte()));
        }
        cuts.sort_unstable();
        cuts.dedup();
        cuts
    }

    /// Complement of the claimed spans within the file.
    fn uncovered_gaps(&self, claimed: &[RawChunk]) -> Vec<ByteSpan> {
        let mut gaps = Vec::new();
        let mut pos = 0;
        for c in claimed {
            if c.span.start > pos {
                gaps.push(ByteSpan::new(pos, c.span.start));
            }
            pos = pos.max(c.span.end);
        }
        if pos < self.source.len() {
            gaps.push(ByteSpan::new(pos, self.source.len()));
        }
        gaps
    }

    /// Split a gap into logical blocks: fragments separated by more than
    /// `gap_max_blank_lines` blank lines become separate chunks. Blocks are
    /// trimmed of surrounding blank lines; whitespace-only blocks vanish.
    fn gap_blocks(&self, gap: ByteSpan) -> Vec<ByteSpan> {
        let text = &self.source[gap.start..gap.end];
        let mut blocks = Vec::new();
        let mut block_start: Option<usize> = None;
        let mut content_end = 0usize;
        let mut blank_run = 0usize;

        let mut offset = 0;
        for line in text.split_inclusive('\n') {
            let is_blank = line.trim().is_empty();
            if is_blank {
                blank_run += 1;
            } else {
                if block_start.is_some() && blank_run > self.gap_max_blank_lines {
                    blocks.push(ByteSpan::new(
                        gap.start + block_start.take().unwrap(),
                        gap.start + content_end,
                    ));
                }
                if block_start.is_none() {
                    block_start = Some(offset);
                }
                content_end = offset + line.trim_end_matches('\n').len();
                blank_run = 0;
            }
            offset += line.len();
        }
        if let Some(start) = block_start {
            blocks.push(ByteSpan::new(gap.start + start, gap.start + content_end));
        }
        blocks.retain(|b| !b.is_empty());
        blocks
    }

    /// Breadcrumb of the innermost context region fully containing `span`.
    fn enclosing_breadcrumb(contexts: &[(ByteSpan, String)], span: ByteSpan) -> String {
        contexts
            .iter()
            .filter(|(ctx, _)| ctx.start <= span.start && span.end <= ctx.end)
            .max_by_key(|(ctx, _)| ctx.start)
            .map(|(_, crumb)| crumb.clone())
            .unwrap_or_default()
    }

    /// Cut a span into pieces no longer than `max_chunk_chars`, preferring
    /// the given syntactic boundaries, then line boundaries, then a raw cut
    /// at the nearest char boundary.
    fn split_oversize(&self, span: ByteSpan, boundaries: &[usize]) -> Vec<ByteSpan> {
        let max = self.max_chunk_chars;
        if span.len() <= max {
            return vec![span];
        }

        let mut pieces = Vec::new();
        let mut seg_start = span.start;
        while span.end - seg_start > max {
            let limit = seg_start + max;
            let syntactic = boundaries
                .iter()
                .copied()
                .filter(|&b| b > seg_start && b <= limit)
                .max();
            let cut = syntactic
                .or_else(|| self.last_line_break(seg_start, limit))
                .unwrap_or_else(|| self.floor_char_boundary(limit));
            if cut <= seg_start {
                break;
            }
            pieces.push(ByteSpan::new(seg_start, cut));
            seg_start = cut;
        }
        if seg_start < span.end {
            pieces.push(ByteSpan::new(seg_start, span.end));
        }
        pieces
    }

    /// Offset just past the last newline in `(start, limit]`, if any.
    fn last_line_break(&self, start: usize, limit: usize) -> Option<usize> {
        self.source[start..limit]
            .rfind('\n')
            .map(|i| start + i + 1)
            .filter(|&c| c > start)
    }

    fn floor_char_boundary(&self, mut idx: usize) -> usize {
        while idx > 0 && !self.source.is_char_boundary(idx) {
            idx -= 1;
        }
        idx
    }
}
