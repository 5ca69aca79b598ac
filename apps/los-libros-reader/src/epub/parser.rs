//! EPUB parser using rbook
//!
//! Wraps the rbook crate to read metadata, cover, navigation and spine
//! content from the raw bytes of an imported book.

use std::io::Cursor;

use rbook::prelude::*;
use rbook::Epub;
use thiserror::Error;

use super::content::extract_text_nodes;
use super::types::{BookMetadata, ContentDocument, CoverImage, TocEntry as OurTocEntry};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to open EPUB: {0}")]
    OpenError(String),
    #[error("EPUB has no readable spine items")]
    EmptySpine,
    #[error("Failed to read content: {0}")]
    ContentError(String),
}

/// EPUB parser that keeps the archive open
pub struct EpubParser {
    epub: Epub,
}

impl EpubParser {
    /// Open an EPUB from its raw bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, ParseError> {
        // Lenient parsing: many real-world books miss optional metadata
        let epub = Epub::options()
            .strict(false)
            .read(Cursor::new(data.to_vec()))
            .map_err(|e| ParseError::OpenError(e.to_string()))?;

        Ok(Self { epub })
    }

    pub fn metadata(&self) -> BookMetadata {
        let meta = self.epub.metadata();

        BookMetadata {
            title: meta
                .title()
                .map(|t| t.value().trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "Unknown".to_string()),
            author: meta
                .creators()
                .next()
                .map(|c| c.value().trim().to_string())
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| "Unknown".to_string()),
            identifier: meta.identifier().map(|i| i.value().to_string()),
            language: meta.language().map(|l| l.value().to_string()),
        }
    }

    /// Cover image, from the `cover-image` manifest property or an image id
    /// containing "cover"
    pub fn cover(&self) -> Option<CoverImage> {
        let manifest = self.epub.manifest();
        let item = manifest.cover_image().or_else(|| {
            manifest
                .images()
                .find(|item| item.id().to_lowercase().contains("cover"))
        })?;

        match self.epub.read_resource_bytes(item.href()) {
            Ok(data) => Some(CoverImage {
                media_type: item.media_type().to_string(),
                data,
            }),
            Err(e) => {
                tracing::warn!("Cover image listed but unreadable: {}", e);
                None
            }
        }
    }

    pub fn toc(&self) -> Vec<OurTocEntry> {
        let toc = self.epub.toc();
        let Some(root) = toc.contents() else {
            return Vec::new();
        };

        fn convert_entry<'a>(entry: impl rbook::prelude::TocEntry<'a>) -> OurTocEntry {
            let href = entry
                .resource()
                .map(|r| {
                    use rbook::ebook::resource::ResourceKey;
                    match r.key() {
                        ResourceKey::Value(s) => s.to_string(),
                        ResourceKey::Position(pos) => pos.to_string(),
                    }
                })
                .unwrap_or_default();

            OurTocEntry {
                label: entry.label().trim().to_string(),
                href,
                subitems: entry.children().iter().map(convert_entry).collect(),
            }
        }

        root.children().iter().map(convert_entry).collect()
    }

    /// Every spine item, flattened into addressable text chunks
    pub fn content_documents(&self) -> Result<Vec<ContentDocument>, ParseError> {
        let spine = self.epub.spine();
        let manifest = self.epub.manifest();

        let mut documents = Vec::new();
        for (spine_index, item) in spine.entries().enumerate() {
            let idref = item.idref();
            let manifest_item = manifest.by_id(idref).ok_or_else(|| {
                ParseError::ContentError(format!("Manifest item {} not found", idref))
            })?;

            let xhtml = self
                .epub
                .read_resource_str(manifest_item.href())
                .map_err(|e| ParseError::ContentError(e.to_string()))?;

            documents.push(ContentDocument {
                spine_index,
                idref: idref.to_string(),
                href: manifest_item.href().to_string(),
                nodes: extract_text_nodes(&xhtml)?,
            });
        }

        if documents.is_empty() {
            return Err(ParseError::EmptySpine);
        }

        Ok(documents)
    }
}
