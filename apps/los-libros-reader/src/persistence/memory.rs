//! In-process gateway
//!
//! Keeps records in a map behind a lock; nothing outlives the process. The
//! driver binary always uses the SQLite gateway.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{PersistenceGateway, Result, SettingsStore};
use crate::error::StorageError;
use crate::library::Book;
use crate::settings::ReaderSettings;

#[derive(Default)]
pub struct MemoryGateway {
    books: RwLock<HashMap<String, Book>>,
    settings: RwLock<Option<ReaderSettings>>,
    fail_writes: AtomicBool,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail until switched off again
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn put(&self, book: &Book) -> Result<()> {
        self.check_writable()?;
        self.books.write().await.insert(book.id.clone(), book.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Book>> {
        Ok(self.books.read().await.get(id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Book>> {
        let mut books: Vec<Book> = self.books.read().await.values().cloned().collect();
        books.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(books)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        self.check_writable()?;
        Ok(self.books.write().await.remove(id).is_some())
    }
}

#[async_trait]
impl SettingsStore for MemoryGateway {
    async fn load_settings(&self) -> Result<Option<ReaderSettings>> {
        Ok(*self.settings.read().await)
    }

    async fn save_settings(&self, settings: &ReaderSettings) -> Result<()> {
        self.check_writable()?;
        *self.settings.write().await = Some(*settings);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::Highlight;
    use crate::library::test_book;
    use crate::persistence::ReadingPosition;

    #[tokio::test]
    async fn test_put_get_delete() {
        let gateway = MemoryGateway::new();
        let book = test_book("book-1");
        gateway.put(&book).await.unwrap();

        assert_eq!(gateway.get("book-1").await.unwrap(), Some(book));
        assert!(gateway.delete("book-1").await.unwrap());
        assert!(!gateway.delete("book-1").await.unwrap());
        assert!(gateway.get("book-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_partial_updates_use_stored_record() {
        let gateway = MemoryGateway::new();
        gateway.put(&test_book("book-1")).await.unwrap();

        let position = ReadingPosition {
            location: "epubcfi(/6/4!/4/2/1:0)".to_string(),
            progress: 12,
            location_count: Some(1000),
        };
        assert!(gateway.save_position("book-1", &position).await.unwrap());
        let highlights = vec![Highlight::new("epubcfi(/6/4!/4/2,/1:0,/1:4)", "#ffeb3b", "Once")];
        assert!(gateway.save_highlights("book-1", &highlights).await.unwrap());

        let stored = gateway.get("book-1").await.unwrap().unwrap();
        assert_eq!(stored.last_location.as_deref(), Some("epubcfi(/6/4!/4/2/1:0)"));
        assert_eq!(stored.progress, 12);
        assert_eq!(stored.location_count, Some(1000));
        assert_eq!(stored.highlights, highlights);

        assert!(!gateway.save_position("missing", &position).await.unwrap());
    }

    #[tokio::test]
    async fn test_failing_writes() {
        let gateway = MemoryGateway::new();
        gateway.set_fail_writes(true);
        assert!(matches!(
            gateway.put(&test_book("book-1")).await,
            Err(StorageError::Unavailable(_))
        ));
        gateway.set_fail_writes(false);
        gateway.put(&test_book("book-1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_settings_record() {
        let gateway = MemoryGateway::new();
        assert!(gateway.load_settings().await.unwrap().is_none());

        let settings = ReaderSettings::default().with_font_size(140);
        gateway.save_settings(&settings).await.unwrap();
        assert_eq!(gateway.load_settings().await.unwrap(), Some(settings));
    }
}
