//! EPUB parsing module
//!
//! Reads the container with the rbook crate and flattens spine XHTML into
//! text chunks that CFIs can address.

mod content;
mod parser;
mod types;

pub use content::extract_text_nodes;
pub use parser::{EpubParser, ParseError};
pub use types::{BookMetadata, ContentDocument, CoverImage, TextNode, TocEntry};
