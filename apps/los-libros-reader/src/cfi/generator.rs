//! CFI Generator
//!
//! Builds point and range CFIs from positions in a flattened content document.

use serde::{Deserialize, Serialize};

use super::types::*;

/// Address of a text chunk inside a content document
///
/// `element_path` holds 0-based element indices starting below the root
/// element (so a chunk directly inside `<body>` usually has path `[1]`).
/// `text_index` counts the element siblings that precede the chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextNodeRef {
    pub element_path: Vec<usize>,
    pub text_index: usize,
}

impl TextNodeRef {
    pub fn new(element_path: Vec<usize>, text_index: usize) -> Self {
        Self {
            element_path,
            text_index,
        }
    }
}

/// Builder for constructing CFIs programmatically
#[derive(Debug, Clone, Default)]
pub struct CfiBuilder {
    path: CfiPath,
}

impl CfiBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the package step (/6 is the spine)
    pub fn package_step(mut self) -> Self {
        self.path.push(CfiStep::element(6));
        self
    }

    /// Add a spine item step; index 0 -> /2, index 1 -> /4, ...
    pub fn spine_item(mut self, index: usize, idref: Option<&str>) -> Self {
        let step_index = element_step(index);
        self.path.push(match idref {
            Some(id) => CfiStep::element_with_id(step_index, id),
            None => CfiStep::element(step_index),
        });
        self
    }

    /// Step into the content document
    pub fn indirection(mut self) -> Self {
        self.path.push(CfiStep::indirection());
        self
    }

    /// Add an element step (0-based index among element siblings)
    pub fn element(mut self, index: usize) -> Self {
        self.path.push(CfiStep::element(element_step(index)));
        self
    }

    /// Add a text chunk step; chunks use odd numbering: /1, /3, /5...
    pub fn text_node(mut self, index: usize) -> Self {
        self.path.push(CfiStep::element((index * 2 + 1) as u32));
        self
    }

    pub fn character_offset(mut self, offset: u32) -> Self {
        self.path.set_character_offset(offset);
        self
    }

    pub fn build(self) -> Cfi {
        Cfi::new(self.path)
    }

    fn into_path(self) -> CfiPath {
        self.path
    }
}

fn element_step(index: usize) -> u32 {
    ((index + 1) * 2) as u32
}

fn document_prefix(spine_index: usize, idref: Option<&str>) -> CfiBuilder {
    CfiBuilder::new()
        .package_step()
        .spine_item(spine_index, idref)
        .indirection()
}

/// Generate a point CFI for a character position
///
/// # Example
/// ```ignore
/// let node = TextNodeRef::new(vec![1, 0], 0);
/// let cfi = generate_cfi(1, Some("ch2"), &node, 42);
/// // epubcfi(/6/4[ch2]!/4/2/1:42)
/// ```
pub fn generate_cfi(
    spine_index: usize,
    idref: Option<&str>,
    node: &TextNodeRef,
    char_offset: u32,
) -> Cfi {
    let mut builder = document_prefix(spine_index, idref);
    for &idx in &node.element_path {
        builder = builder.element(idx);
    }
    builder
        .text_node(node.text_index)
        .character_offset(char_offset)
        .build()
}

/// Generate a range CFI between two character positions of one document
///
/// The parent path is the deepest element shared by both ends; the start and
/// end paths are relative to it.
pub fn generate_cfi_range(
    spine_index: usize,
    idref: Option<&str>,
    start: (&TextNodeRef, u32),
    end: (&TextNodeRef, u32),
) -> Cfi {
    let (start_node, start_offset) = start;
    let (end_node, end_offset) = end;

    let common_len = start_node
        .element_path
        .iter()
        .zip(end_node.element_path.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parent = document_prefix(spine_index, idref);
    for &idx in &start_node.element_path[..common_len] {
        parent = parent.element(idx);
    }

    let relative = |node: &TextNodeRef, offset: u32| {
        let mut builder = CfiBuilder::new();
        for &idx in &node.element_path[common_len..] {
            builder = builder.element(idx);
        }
        builder
            .text_node(node.text_index)
            .character_offset(offset)
            .into_path()
    };

    Cfi::with_range(
        parent.into_path(),
        CfiRange {
            start: relative(start_node, start_offset),
            end: relative(end_node, end_offset),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cfi_builder_simple() {
        let cfi = CfiBuilder::new()
            .package_step()
            .spine_item(1, None)
            .indirection()
            .element(1)
            .element(0)
            .text_node(0)
            .character_offset(42)
            .build();

        assert_eq!(cfi.to_string(), "epubcfi(/6/4!/4/2/1:42)");
    }

    #[test]
    fn test_generate_cfi_with_idref() {
        let node = TextNodeRef::new(vec![1, 0, 1], 2);
        let cfi = generate_cfi(0, Some("intro"), &node, 100);
        assert_eq!(cfi.to_string(), "epubcfi(/6/2[intro]!/4/2/4/5:100)");
    }

    #[test]
    fn test_generate_cfi_range_same_text_node() {
        let node = TextNodeRef::new(vec![1, 3], 0);
        let cfi = generate_cfi_range(2, None, (&node, 4), (&node, 19));
        assert_eq!(cfi.to_string(), "epubcfi(/6/6!/4/8,/1:4,/1:19)");
    }

    #[test]
    fn test_generate_cfi_range_across_paragraphs() {
        let start = TextNodeRef::new(vec![1, 0], 0);
        let end = TextNodeRef::new(vec![1, 1], 0);
        let cfi = generate_cfi_range(0, None, (&start, 10), (&end, 20));
        assert_eq!(cfi.to_string(), "epubcfi(/6/2!/4,/2/1:10,/4/1:20)");
    }

    #[test]
    fn test_generated_point_resolves_back() {
        let node = TextNodeRef::new(vec![1, 4], 1);
        let cfi = generate_cfi(3, Some("c4"), &node, 7);
        let content = cfi.content_path().unwrap();

        assert_eq!(cfi.spine_index(), Some(3));
        assert_eq!(content.element_path, node.element_path);
        assert_eq!(content.text_index, Some(node.text_index));
        assert_eq!(content.offset, 7);
    }
}
