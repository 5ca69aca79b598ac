//! Layout positions and selections ⇄ canonical identifiers
//!
//! A layout position is a character index into the concatenated text of one
//! content document. It moves with nothing but the document itself, so the
//! conversion to and from CFIs is independent of pagination.

use serde::{Deserialize, Serialize};

use crate::cfi::{generate_cfi, generate_cfi_range, Cfi, TextNodeRef};
use crate::epub::{ContentDocument, TextNode};

/// A content document as the codec sees it
pub trait DocumentContext {
    fn spine_index(&self) -> usize;
    fn spine_id(&self) -> Option<&str>;
    /// Body text chunks in document order
    fn text_nodes(&self) -> &[TextNode];
}

impl DocumentContext for ContentDocument {
    fn spine_index(&self) -> usize {
        self.spine_index
    }

    fn spine_id(&self) -> Option<&str> {
        Some(self.idref.as_str())
    }

    fn text_nodes(&self) -> &[TextNode] {
        &self.nodes
    }
}

/// One end of a selection: a character offset inside a text chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPoint {
    pub node: TextNodeRef,
    pub offset: usize,
}

/// A user selection as reported by the engine; focus may precede anchor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: TextPoint,
    pub focus: TextPoint,
}

impl Selection {
    /// Selection of `[start, end)` inside a single text chunk
    pub fn within(node: TextNodeRef, start: usize, end: usize) -> Self {
        Self {
            anchor: TextPoint {
                node: node.clone(),
                offset: start,
            },
            focus: TextPoint { node, offset: end },
        }
    }
}

/// A resolved selection: its canonical range and the text it covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedRange {
    pub cfi: String,
    pub text: String,
}

/// Character index of the first character of every chunk
fn chunk_starts(nodes: &[TextNode]) -> (Vec<usize>, usize) {
    let mut starts = Vec::with_capacity(nodes.len());
    let mut total = 0;
    for node in nodes {
        starts.push(total);
        total += node.char_len();
    }
    (starts, total)
}

fn absolute(nodes: &[TextNode], starts: &[usize], point: &TextPoint) -> Option<usize> {
    let index = nodes.iter().position(|n| n.node == point.node)?;
    if point.offset > nodes[index].char_len() {
        return None;
    }
    Some(starts[index] + point.offset)
}

/// Chunk holding the character at `position`
fn chunk_containing(starts: &[usize], position: usize) -> usize {
    starts.partition_point(|&s| s <= position).saturating_sub(1)
}

/// Canonical point for a layout position
///
/// A position equal to the document length addresses the end of the last
/// chunk. Returns `None` for documents without text or out-of-range positions.
pub fn location_at(document: &dyn DocumentContext, position: usize) -> Option<Cfi> {
    let nodes = document.text_nodes();
    let (starts, total) = chunk_starts(nodes);
    if nodes.is_empty() || position > total {
        return None;
    }

    let index = if position == total {
        nodes.len() - 1
    } else {
        chunk_containing(&starts, position)
    };

    Some(generate_cfi(
        document.spine_index(),
        document.spine_id(),
        &nodes[index].node,
        (position - starts[index]) as u32,
    ))
}

/// Layout position of a canonical identifier's start point
///
/// A CFI that stops at an element resolves to the first chunk inside it.
/// Offsets past the end of a chunk are clamped, matching how browsers
/// resolve CFIs against slightly different whitespace.
pub fn position_of(document: &dyn DocumentContext, cfi: &Cfi) -> Option<usize> {
    if let Some(spine_index) = cfi.spine_index() {
        if spine_index != document.spine_index() {
            return None;
        }
    }

    let content = cfi.content_path()?;
    let nodes = document.text_nodes();
    let (starts, _) = chunk_starts(nodes);

    let index = match content.text_index {
        Some(text_index) => nodes.iter().position(|n| {
            n.node.element_path == content.element_path && n.node.text_index == text_index
        })?,
        None => nodes
            .iter()
            .position(|n| n.node.element_path.starts_with(&content.element_path))?,
    };

    let offset = (content.offset as usize).min(nodes[index].char_len());
    Some(starts[index] + offset)
}

/// Canonical range for a selection, trimmed of surrounding whitespace
///
/// Returns `None` when the selection is collapsed, references chunks that are
/// not in the document, or covers only whitespace.
pub fn range_from_selection(
    selection: &Selection,
    document: &dyn DocumentContext,
) -> Option<SelectedRange> {
    let nodes = document.text_nodes();
    let (starts, _) = chunk_starts(nodes);

    let anchor = absolute(nodes, &starts, &selection.anchor)?;
    let focus = absolute(nodes, &starts, &selection.focus)?;
    let (mut start, mut end) = if anchor <= focus {
        (anchor, focus)
    } else {
        (focus, anchor)
    };
    if start == end {
        return None;
    }

    let chars: Vec<char> = nodes
        .iter()
        .flat_map(|n| n.text.chars())
        .skip(start)
        .take(end - start)
        .collect();
    let leading = chars.iter().take_while(|c| c.is_whitespace()).count();
    if leading == chars.len() {
        return None;
    }
    let trailing = chars.iter().rev().take_while(|c| c.is_whitespace()).count();
    let text: String = chars[leading..chars.len() - trailing].iter().collect();
    start += leading;
    end -= trailing;

    // The end belongs to the chunk holding its last character
    let start_index = chunk_containing(&starts, start);
    let end_index = chunk_containing(&starts, end - 1);

    let cfi = generate_cfi_range(
        document.spine_index(),
        document.spine_id(),
        (&nodes[start_index].node, (start - starts[start_index]) as u32),
        (&nodes[end_index].node, (end - starts[end_index]) as u32),
    );

    Some(SelectedRange {
        cfi: cfi.to_string(),
        text,
    })
}
