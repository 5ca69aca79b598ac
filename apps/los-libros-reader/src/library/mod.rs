//! Library module for book management
//!
//! Imports EPUB files into book records and exposes the stored collection and
//! the global reader settings.

mod book;
mod import;

pub use book::Book;
pub use import::import_book;

use std::sync::Arc;

use crate::error::{ReaderError, Result};
use crate::persistence::{PersistenceGateway, SettingsStore};
use crate::settings::ReaderSettings;

/// Stored books and settings
#[derive(Clone)]
pub struct Library {
    books: Arc<dyn PersistenceGateway>,
    settings: Arc<dyn SettingsStore>,
}

impl Library {
    pub fn new(books: Arc<dyn PersistenceGateway>, settings: Arc<dyn SettingsStore>) -> Self {
        Self { books, settings }
    }

    pub fn gateway(&self) -> Arc<dyn PersistenceGateway> {
        Arc::clone(&self.books)
    }

    /// Validate and store an EPUB; nothing is written if it is unreadable
    pub async fn import(&self, bytes: &[u8]) -> Result<Book> {
        let book = import_book(bytes)?;
        self.books.put(&book).await?;
        tracing::info!("Imported \"{}\" ({} bytes) as {}", book.title, book.size(), book.id);
        Ok(book)
    }

    pub async fn list(&self) -> Result<Vec<Book>> {
        Ok(self.books.get_all().await?)
    }

    pub async fn get(&self, id: &str) -> Result<Book> {
        self.books
            .get(id)
            .await?
            .ok_or_else(|| ReaderError::NotFound(format!("book {}", id)))
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        if !self.books.delete(id).await? {
            return Err(ReaderError::NotFound(format!("book {}", id)));
        }
        tracing::info!("Deleted book {}", id);
        Ok(())
    }

    /// Stored settings, or defaults when none have been saved
    pub async fn settings(&self) -> Result<ReaderSettings> {
        Ok(self
            .settings
            .load_settings()
            .await?
            .map(ReaderSettings::normalized)
            .unwrap_or_default())
    }

    pub async fn update_settings(&self, settings: ReaderSettings) -> Result<ReaderSettings> {
        let settings = settings.normalized();
        self.settings.save_settings(&settings).await?;
        Ok(settings)
    }
}

/// Minimal record for storage tests
#[cfg(test)]
pub(crate) fn test_book(id: &str) -> Book {
    let now = chrono::Utc::now();
    Book {
        id: id.to_string(),
        title: "The Long Road".to_string(),
        author: "A. Writer".to_string(),
        content: Arc::from(&b"epub bytes"[..]),
        cover: None,
        last_location: None,
        progress: 0,
        location_count: None,
        highlights: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}
