//! EPUB import

use chrono::Utc;
use uuid::Uuid;

use super::book::Book;
use crate::epub::EpubParser;
use crate::error::ImportError;

/// Validate EPUB bytes and build a fresh book record
///
/// Every spine item must be readable; nothing is returned for a book the
/// engine could not open later.
pub fn import_book(bytes: &[u8]) -> Result<Book, ImportError> {
    if bytes.is_empty() {
        return Err(ImportError::Empty);
    }

    let parser = EpubParser::from_bytes(bytes)?;
    let documents = parser.content_documents()?;
    let metadata = parser.metadata();
    let cover = parser.cover();

    tracing::debug!(
        "Parsed \"{}\" by {}: {} spine items, cover: {}",
        metadata.title,
        metadata.author,
        documents.len(),
        cover.is_some()
    );

    let now = Utc::now();
    Ok(Book {
        id: Uuid::new_v4().to_string(),
        title: metadata.title,
        author: metadata.author,
        content: bytes.into(),
        cover,
        last_location: None,
        progress: 0,
        location_count: None,
        highlights: Vec::new(),
        created_at: now,
        updated_at: now,
    })
}
