//! Types produced by the EPUB parser

use serde::{Deserialize, Serialize};

use crate::cfi::TextNodeRef;

/// Descriptive metadata read from the package document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub title: String,
    /// First listed creator
    pub author: String,
    pub identifier: Option<String>,
    pub language: Option<String>,
}

/// Cover image bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverImage {
    pub media_type: String,
    pub data: Vec<u8>,
}

/// Navigation (table of contents) entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub label: String,
    pub href: String,
    pub subitems: Vec<TocEntry>,
}

/// One text chunk of a content document, with its structural address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextNode {
    pub node: TextNodeRef,
    pub text: String,
}

impl TextNode {
    /// Length in characters (CFI offsets count characters)
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// A spine item flattened into its body text chunks, in document order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDocument {
    pub spine_index: usize,
    pub idref: String,
    pub href: String,
    pub nodes: Vec<TextNode>,
}

impl ContentDocument {
    /// Total characters across all text chunks
    pub fn char_len(&self) -> usize {
        self.nodes.iter().map(TextNode::char_len).sum()
    }

    /// Whether a TOC or link href points at this document
    pub fn matches_href(&self, href: &str) -> bool {
        let target = href.split('#').next().unwrap_or(href).trim_start_matches('/');
        if target.is_empty() {
            return false;
        }
        let own = self.href.trim_start_matches('/');
        own == target
            || own.ends_with(&format!("/{}", target))
            || target.ends_with(&format!("/{}", own))
    }
}
