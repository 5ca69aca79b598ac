//! Persistence gateway
//!
//! Durable storage of book records and the global settings record. The
//! session never waits on writes: they go through the `RecordWriter`, which
//! applies them in order on its own task.

mod memory;
mod sqlite;
mod writer;

pub use memory::MemoryGateway;
pub use sqlite::{create_pool, SqliteGateway};
pub use writer::RecordWriter;

use async_trait::async_trait;
use chrono::Utc;

use crate::annotations::Highlight;
use crate::error::StorageError;
use crate::library::Book;
use crate::settings::ReaderSettings;

pub type Result<T> = std::result::Result<T, StorageError>;

/// Reading position snapshot written on every relocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingPosition {
    pub location: String,
    pub progress: u8,
    /// Break-point count, once the location index has been built
    pub location_count: Option<usize>,
}

/// Book record storage keyed by canonical book id
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Insert or replace a book record
    async fn put(&self, book: &Book) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<Book>>;

    /// Every stored book, oldest import first
    async fn get_all(&self) -> Result<Vec<Book>>;

    /// Returns false if no record existed
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Update a record's reading position; false if the book is gone
    async fn save_position(&self, id: &str, position: &ReadingPosition) -> Result<bool> {
        let Some(mut book) = self.get(id).await? else {
            return Ok(false);
        };
        book.last_location = Some(position.location.clone());
        book.progress = position.progress;
        if position.location_count.is_some() {
            book.location_count = position.location_count;
        }
        book.updated_at = Utc::now();
        self.put(&book).await?;
        Ok(true)
    }

    /// Replace a record's highlights; false if the book is gone
    async fn save_highlights(&self, id: &str, highlights: &[Highlight]) -> Result<bool> {
        let Some(mut book) = self.get(id).await? else {
            return Ok(false);
        };
        book.highlights = highlights.to_vec();
        book.updated_at = Utc::now();
        self.put(&book).await?;
        Ok(true)
    }
}

/// The single global settings record
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load_settings(&self) -> Result<Option<ReaderSettings>>;

    async fn save_settings(&self, settings: &ReaderSettings) -> Result<()>;
}
