//! CFI (Canonical Fragment Identifier) types for EPUB
//!
//! Format: epubcfi(/6/4[chap01ref]!/4/2/3:268)
//! Range form: epubcfi(/6/4[chap01ref]!/4/2,/1:10,/3:5)
//!
//! Reference: <https://idpf.org/epub/linking/cfi/epub-cfi.html>

use serde::{Deserialize, Serialize};
use std::fmt;

/// Characters that must be escaped with `^` inside an assertion
const ASSERTION_SPECIALS: &[char] = &['^', '[', ']', '(', ')', ',', ';', '='];

/// A complete EPUB CFI
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cfi {
    /// The path components of this CFI (the common parent for ranges)
    pub path: CfiPath,
    /// Optional range (for selections)
    pub range: Option<CfiRange>,
}

/// A CFI path (sequence of steps)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CfiPath {
    /// Steps in this path
    pub steps: Vec<CfiStep>,
    /// Optional character offset at the end
    pub character_offset: Option<CharacterOffset>,
}

/// A CFI range, both ends relative to the parent path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CfiRange {
    pub start: CfiPath,
    pub end: CfiPath,
}

/// A single step in a CFI path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CfiStep {
    /// The step type (child index or indirection)
    pub step_type: StepType,
    /// Optional ID assertion [id]
    pub id_assertion: Option<String>,
}

/// Type of CFI step
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepType {
    /// Child step. Even indices are elements, odd indices are text chunks
    Element(u32),
    /// Indirection step (!) into the referenced content document
    Indirection,
}

/// Character offset within a text chunk
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacterOffset {
    /// The character index (0-based)
    pub offset: u32,
    /// Raw text assertion, kept verbatim for round-tripping
    pub assertion: Option<String>,
}

/// Where a point CFI lands inside its content document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentPath {
    /// 0-based element indices starting below the document root element
    pub element_path: Vec<usize>,
    /// Text chunk index inside the last element, if the CFI addresses text
    pub text_index: Option<usize>,
    /// Character offset inside the text chunk
    pub offset: u32,
}

impl Cfi {
    /// Create a new point CFI from a path
    pub fn new(path: CfiPath) -> Self {
        Self { path, range: None }
    }

    /// Create a new CFI with a range
    pub fn with_range(path: CfiPath, range: CfiRange) -> Self {
        Self {
            path,
            range: Some(range),
        }
    }

    /// Check if this CFI represents a range (text selection)
    pub fn is_range(&self) -> bool {
        self.range.is_some()
    }

    /// A range whose two ends address the same position
    pub fn is_collapsed(&self) -> bool {
        match self.range {
            Some(ref range) => range.start == range.end,
            None => true,
        }
    }

    /// Collapse to the first addressed position
    pub fn start_point(&self) -> Cfi {
        match self.range {
            Some(ref range) => Cfi::new(self.path.join(&range.start)),
            None => self.clone(),
        }
    }

    /// Collapse to the last addressed position
    pub fn end_point(&self) -> Cfi {
        match self.range {
            Some(ref range) => Cfi::new(self.path.join(&range.end)),
            None => self.clone(),
        }
    }

    /// 0-based spine index, from the `/6/N` package steps
    pub fn spine_index(&self) -> Option<usize> {
        let steps = &self.path.steps;
        if steps.len() < 2 {
            return None;
        }
        match (&steps[0].step_type, &steps[1].step_type) {
            // CFI uses even numbering for elements: /2, /4, /6...
            (StepType::Element(6), StepType::Element(n)) if n % 2 == 0 && *n >= 2 => {
                Some((*n / 2 - 1) as usize)
            }
            _ => None,
        }
    }

    /// ID assertion on the spine step (the itemref idref), if present
    pub fn spine_id(&self) -> Option<&str> {
        self.path
            .steps
            .get(1)
            .and_then(|step| step.id_assertion.as_deref())
    }

    /// Resolve the in-document part of the start point
    ///
    /// Returns `None` when there is no indirection step or when a step after
    /// the indirection cannot be interpreted (text chunk in the middle).
    pub fn content_path(&self) -> Option<ContentPath> {
        let point = self.start_point();
        let indirection = point.path.steps.iter().position(CfiStep::is_indirection)?;
        // Steps after the indirection start at the children of the root element
        let inner = point.path.steps[indirection + 1..].iter();

        let mut element_path = Vec::new();
        let mut text_index = None;
        for step in inner {
            if text_index.is_some() {
                return None;
            }
            let n = step.element_index()?;
            if n == 0 {
                return None;
            }
            if n % 2 == 0 {
                element_path.push((n / 2 - 1) as usize);
            } else {
                text_index = Some(((n - 1) / 2) as usize);
            }
        }

        Some(ContentPath {
            element_path,
            text_index,
            offset: point
                .path
                .character_offset
                .as_ref()
                .map(|o| o.offset)
                .unwrap_or(0),
        })
    }
}

impl CfiPath {
    /// Create an empty path
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            character_offset: None,
        }
    }

    /// Create a path with steps
    pub fn with_steps(steps: Vec<CfiStep>) -> Self {
        Self {
            steps,
            character_offset: None,
        }
    }

    /// Add a step to the path
    pub fn push(&mut self, step: CfiStep) {
        self.steps.push(step);
    }

    /// Set the character offset
    pub fn set_character_offset(&mut self, offset: u32) {
        self.character_offset = Some(CharacterOffset {
            offset,
            assertion: None,
        });
    }

    /// Append a relative path; the relative path's offset wins
    pub fn join(&self, relative: &CfiPath) -> CfiPath {
        let mut steps = self.steps.clone();
        steps.extend(relative.steps.iter().cloned());
        CfiPath {
            steps,
            character_offset: relative
                .character_offset
                .clone()
                .or_else(|| self.character_offset.clone()),
        }
    }
}

impl Default for CfiPath {
    fn default() -> Self {
        Self::new()
    }
}

impl CfiStep {
    /// Create an element step
    pub fn element(index: u32) -> Self {
        Self {
            step_type: StepType::Element(index),
            id_assertion: None,
        }
    }

    /// Create an element step with ID assertion
    pub fn element_with_id(index: u32, id: impl Into<String>) -> Self {
        Self {
            step_type: StepType::Element(index),
            id_assertion: Some(id.into()),
        }
    }

    /// Create an indirection step
    pub fn indirection() -> Self {
        Self {
            step_type: StepType::Indirection,
            id_assertion: None,
        }
    }

    /// Check if this is an indirection step
    pub fn is_indirection(&self) -> bool {
        matches!(self.step_type, StepType::Indirection)
    }

    /// Get the child index if this is an element step
    pub fn element_index(&self) -> Option<u32> {
        match self.step_type {
            StepType::Element(n) => Some(n),
            StepType::Indirection => None,
        }
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    for ch in value.chars() {
        if ASSERTION_SPECIALS.contains(&ch) {
            write!(f, "^")?;
        }
        write!(f, "{}", ch)?;
    }
    Ok(())
}

impl fmt::Display for Cfi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epubcfi({}", self.path)?;
        if let Some(ref range) = self.range {
            write!(f, ",{},{}", range.start, range.end)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for CfiPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            write!(f, "{}", step)?;
        }
        if let Some(ref offset) = self.character_offset {
            write!(f, ":{}", offset.offset)?;
            if let Some(ref assertion) = offset.assertion {
                write!(f, "[{}]", assertion)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for CfiStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.step_type {
            StepType::Element(n) => write!(f, "/{}", n)?,
            StepType::Indirection => write!(f, "!")?,
        }
        if let Some(ref id) = self.id_assertion {
            write!(f, "[")?;
            write_escaped(f, id)?;
            write!(f, "]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter_path() -> CfiPath {
        CfiPath::with_steps(vec![
            CfiStep::element(6),
            CfiStep::element_with_id(4, "chapter1"),
            CfiStep::indirection(),
            CfiStep::element(4),
            CfiStep::element(2),
        ])
    }

    #[test]
    fn test_simple_cfi_display() {
        let cfi = Cfi::new(chapter_path());
        assert_eq!(cfi.to_string(), "epubcfi(/6/4[chapter1]!/4/2)");
    }

    #[test]
    fn test_escaped_id_display() {
        let cfi = Cfi::new(CfiPath::with_steps(vec![
            CfiStep::element(6),
            CfiStep::element_with_id(2, "a]b"),
        ]));
        assert_eq!(cfi.to_string(), "epubcfi(/6/2[a^]b])");
    }

    #[test]
    fn test_range_collapse_to_points() {
        let mut start = CfiPath::with_steps(vec![CfiStep::element(1)]);
        start.set_character_offset(3);
        let mut end = CfiPath::with_steps(vec![CfiStep::element(3)]);
        end.set_character_offset(7);
        let cfi = Cfi::with_range(chapter_path(), CfiRange { start, end });

        assert!(cfi.is_range());
        assert!(!cfi.is_collapsed());
        assert_eq!(
            cfi.start_point().to_string(),
            "epubcfi(/6/4[chapter1]!/4/2/1:3)"
        );
        assert_eq!(
            cfi.end_point().to_string(),
            "epubcfi(/6/4[chapter1]!/4/2/3:7)"
        );
    }

    #[test]
    fn test_spine_index_and_id() {
        let cfi = Cfi::new(chapter_path());
        assert_eq!(cfi.spine_index(), Some(1));
        assert_eq!(cfi.spine_id(), Some("chapter1"));

        let no_spine = Cfi::new(CfiPath::with_steps(vec![CfiStep::element(4)]));
        assert_eq!(no_spine.spine_index(), None);
    }

    #[test]
    fn test_content_path() {
        let mut path = chapter_path();
        path.push(CfiStep::element(3));
        path.set_character_offset(12);
        let content = Cfi::new(path).content_path().unwrap();

        // /4 is the body (index 1), /2 its first child, /3 the text after it
        assert_eq!(content.element_path, vec![1, 0]);
        assert_eq!(content.text_index, Some(1));
        assert_eq!(content.offset, 12);
    }

    #[test]
    fn test_content_path_element_only() {
        let content = Cfi::new(chapter_path()).content_path().unwrap();
        assert_eq!(content.element_path, vec![1, 0]);
        assert_eq!(content.text_index, None);
        assert_eq!(content.offset, 0);
    }
}
