//! Error types for the Los Libros reader

use thiserror::Error;

use crate::cfi::CfiParseError;
use crate::engine::EngineError;
use crate::epub::ParseError;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, ReaderError>;

/// Reader error type
#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Import failed: {0}")]
    Import(#[from] ImportError),

    #[error("Rendering engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid location: {0}")]
    InvalidLocation(#[from] CfiParseError),

    #[error("Session is not ready (state: {0})")]
    NotReady(String),

    #[error("Session is closed")]
    SessionClosed,
}

/// Import failures: nothing is persisted when one of these is returned
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Unreadable EPUB: {0}")]
    Malformed(#[from] ParseError),

    #[error("Empty file")]
    Empty,
}

/// Persistence gateway errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}
