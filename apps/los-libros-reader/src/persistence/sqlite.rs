//! SQLite gateway
//!
//! One row per book with the EPUB bytes inline; highlights are stored as a
//! JSON array on the book row. Settings live in a single-row table.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

use super::{PersistenceGateway, ReadingPosition, Result, SettingsStore};
use crate::annotations::Highlight;
use crate::epub::CoverImage;
use crate::error::StorageError;
use crate::library::Book;
use crate::settings::ReaderSettings;

/// Open (creating if needed) the database and ensure the schema exists
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    initialize_schema(&pool).await?;
    Ok(pool)
}

pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS books (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            author TEXT NOT NULL,
            content BLOB NOT NULL,
            cover_media_type TEXT,
            cover BLOB,
            last_location TEXT,
            progress INTEGER NOT NULL DEFAULT 0,
            location_count INTEGER,
            highlights_json TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_books_created ON books(created_at);

        CREATE TABLE IF NOT EXISTS settings (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            settings_json TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[derive(Clone)]
pub struct SqliteGateway {
    pool: SqlitePool,
}

impl SqliteGateway {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Arc<Self>> {
        let pool = create_pool(database_url).await?;
        tracing::info!("Opened library database at {}", database_url);
        Ok(Arc::new(Self::new(pool)))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct BookRow {
    id: String,
    title: String,
    author: String,
    content: Vec<u8>,
    cover_media_type: Option<String>,
    cover: Option<Vec<u8>>,
    last_location: Option<String>,
    progress: i64,
    location_count: Option<i64>,
    highlights_json: String,
    created_at: String,
    updated_at: String,
}

impl BookRow {
    fn into_book(self) -> Result<Book> {
        let corrupt = |reason: String| StorageError::Corrupt {
            id: self.id.clone(),
            reason,
        };

        let highlights: Vec<Highlight> = serde_json::from_str(&self.highlights_json)?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| corrupt(format!("created_at: {}", e)))?
            .with_timezone(&Utc);
        let updated_at = DateTime::parse_from_rfc3339(&self.updated_at)
            .map_err(|e| corrupt(format!("updated_at: {}", e)))?
            .with_timezone(&Utc);
        let cover = match (self.cover_media_type, self.cover) {
            (Some(media_type), Some(data)) => Some(CoverImage { media_type, data }),
            _ => None,
        };

        Ok(Book {
            id: self.id,
            title: self.title,
            author: self.author,
            content: self.content.into(),
            cover,
            last_location: self.last_location,
            progress: self.progress.clamp(0, 100) as u8,
            location_count: self.location_count.map(|n| n.max(0) as usize),
            highlights,
            created_at,
            updated_at,
        })
    }
}

const SELECT_BOOK: &str = r#"
    SELECT id, title, author, content, cover_media_type, cover, last_location,
           progress, location_count, highlights_json, created_at, updated_at
    FROM books
"#;

#[async_trait]
impl PersistenceGateway for SqliteGateway {
    async fn put(&self, book: &Book) -> Result<()> {
        let highlights_json = serde_json::to_string(&book.highlights)?;

        sqlx::query(
            r#"
            INSERT INTO books (
                id, title, author, content, cover_media_type, cover, last_location,
                progress, location_count, highlights_json, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                author = excluded.author,
                content = excluded.content,
                cover_media_type = excluded.cover_media_type,
                cover = excluded.cover,
                last_location = excluded.last_location,
                progress = excluded.progress,
                location_count = excluded.location_count,
                highlights_json = excluded.highlights_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&book.id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.content[..])
        .bind(book.cover.as_ref().map(|c| c.media_type.as_str()))
        .bind(book.cover.as_ref().map(|c| c.data.as_slice()))
        .bind(&book.last_location)
        .bind(book.progress as i64)
        .bind(book.location_count.map(|n| n as i64))
        .bind(&highlights_json)
        .bind(book.created_at.to_rfc3339())
        .bind(book.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Book>> {
        let row = sqlx::query_as::<_, BookRow>(&format!("{} WHERE id = ?", SELECT_BOOK))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(BookRow::into_book).transpose()
    }

    async fn get_all(&self) -> Result<Vec<Book>> {
        let rows = sqlx::query_as::<_, BookRow>(&format!("{} ORDER BY created_at, id", SELECT_BOOK))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(BookRow::into_book).collect()
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM books WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn save_position(&self, id: &str, position: &ReadingPosition) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE books
            SET last_location = ?, progress = ?,
                location_count = COALESCE(?, location_count), updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&position.location)
        .bind(position.progress as i64)
        .bind(position.location_count.map(|n| n as i64))
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn save_highlights(&self, id: &str, highlights: &[Highlight]) -> Result<bool> {
        let highlights_json = serde_json::to_string(highlights)?;
        let result =
            sqlx::query("UPDATE books SET highlights_json = ?, updated_at = ? WHERE id = ?")
                .bind(&highlights_json)
                .bind(Utc::now().to_rfc3339())
                .bind(id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SettingsStore for SqliteGateway {
    async fn load_settings(&self) -> Result<Option<ReaderSettings>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT settings_json FROM settings WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((json,)) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save_settings(&self, settings: &ReaderSettings) -> Result<()> {
        let json = serde_json::to_string(settings)?;
        sqlx::query(
            r#"
            INSERT INTO settings (id, settings_json, updated_at) VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                settings_json = excluded.settings_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::test_book;
    use crate::settings::Theme;

    async fn setup_test_db() -> SqliteGateway {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        initialize_schema(&pool).await.unwrap();
        SqliteGateway::new(pool)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let gateway = setup_test_db().await;
        let mut book = test_book("book-123");
        book.cover = Some(CoverImage {
            media_type: "image/png".to_string(),
            data: vec![1, 2, 3],
        });
        gateway.put(&book).await.unwrap();

        let loaded = gateway.get("book-123").await.unwrap().unwrap();
        assert_eq!(loaded.title, book.title);
        assert_eq!(&loaded.content[..], &book.content[..]);
        assert_eq!(loaded.cover, book.cover);
        assert_eq!(loaded.progress, 0);
        assert!(gateway.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_replaces_record() {
        let gateway = setup_test_db().await;
        let mut book = test_book("book-123");
        gateway.put(&book).await.unwrap();

        book.progress = 42;
        book.highlights.push(Highlight::new("epubcfi(/6/2!/4/2,/1:0,/1:3)", "#ffeb3b", "The"));
        gateway.put(&book).await.unwrap();

        let all = gateway.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].progress, 42);
        assert_eq!(all[0].highlights.len(), 1);
    }

    #[tokio::test]
    async fn test_targeted_updates() {
        let gateway = setup_test_db().await;
        gateway.put(&test_book("book-123")).await.unwrap();

        let position = ReadingPosition {
            location: "epubcfi(/6/4!/4/2/1:0)".to_string(),
            progress: 37,
            location_count: None,
        };
        assert!(gateway.save_position("book-123", &position).await.unwrap());
        assert!(!gateway.save_position("nope", &position).await.unwrap());

        let highlights = vec![Highlight::new("epubcfi(/6/4!/4/2,/1:0,/1:3)", "#ffeb3b", "Far")];
        assert!(gateway.save_highlights("book-123", &highlights).await.unwrap());

        let loaded = gateway.get("book-123").await.unwrap().unwrap();
        assert_eq!(loaded.last_location.as_deref(), Some("epubcfi(/6/4!/4/2/1:0)"));
        assert_eq!(loaded.progress, 37);
        assert_eq!(loaded.location_count, None);
        assert_eq!(loaded.highlights, highlights);
    }

    #[tokio::test]
    async fn test_delete() {
        let gateway = setup_test_db().await;
        gateway.put(&test_book("book-123")).await.unwrap();

        assert!(gateway.delete("book-123").await.unwrap());
        assert!(!gateway.delete("book-123").await.unwrap());
        assert!(gateway.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_highlights_surface_as_error() {
        let gateway = setup_test_db().await;
        gateway.put(&test_book("book-123")).await.unwrap();
        sqlx::query("UPDATE books SET highlights_json = 'not json'")
            .execute(gateway.pool())
            .await
            .unwrap();

        assert!(matches!(
            gateway.get("book-123").await,
            Err(StorageError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_settings_roundtrip() {
        let gateway = setup_test_db().await;
        assert!(gateway.load_settings().await.unwrap().is_none());

        let settings = ReaderSettings::default().with_theme(Theme::Night);
        gateway.save_settings(&settings).await.unwrap();
        gateway.save_settings(&settings.with_font_size(120)).await.unwrap();

        let loaded = gateway.load_settings().await.unwrap().unwrap();
        assert_eq!(loaded.theme, Theme::Night);
        assert_eq!(loaded.font_size, 120);
    }
}
