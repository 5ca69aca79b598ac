//! Book record

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::annotations::Highlight;
use crate::epub::CoverImage;

/// A stored book: immutable content plus reading state
#[derive(Clone, PartialEq)]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    /// EPUB bytes, never modified after import
    pub content: Arc<[u8]>,
    pub cover: Option<CoverImage>,
    pub last_location: Option<String>,
    /// Whole-number percentage, 0-100
    pub progress: u8,
    /// Break-point count of the last location index built for this book
    pub location_count: Option<usize>,
    /// In creation order
    pub highlights: Vec<Highlight>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Book")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("author", &self.author)
            .field("content_len", &self.content.len())
            .field("has_cover", &self.cover.is_some())
            .field("last_location", &self.last_location)
            .field("progress", &self.progress)
            .field("location_count", &self.location_count)
            .field("highlights", &self.highlights.len())
            .finish()
    }
}

impl Book {
    pub fn size(&self) -> usize {
        self.content.len()
    }
}
