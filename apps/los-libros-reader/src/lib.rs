//! Los Libros Reader
//!
//! The reading core of Los Libros: stable CFI locations that survive reflow,
//! highlights painted as engine overlays, theme-driven pagination, and a
//! reading session that keeps the saved position current.
//!
//! # Modules
//!
//! - `cfi`: EPUB Canonical Fragment Identifiers
//! - `epub`: EPUB container and content document parsing
//! - `location`: Layout positions, selections and the location index
//! - `engine`: Rendering engine interface and a headless implementation
//! - `annotations`: Highlights and their overlays
//! - `controller`: Pagination and theme control over one engine
//! - `session`: The reading-session state machine
//! - `persistence`: Book and settings storage
//! - `library`: Importing and listing books

pub mod annotations;
pub mod cfi;
pub mod config;
pub mod controller;
pub mod engine;
pub mod epub;
pub mod error;
pub mod library;
pub mod location;
pub mod persistence;
pub mod session;
pub mod settings;

pub use config::Config;
pub use error::{ReaderError, Result};
pub use library::{Book, Library};
pub use session::{ReadingSession, SessionContext, SessionEvent, SessionNotice};
pub use settings::{FontFamily, ReaderSettings, Theme};
