//! CFI (Canonical Fragment Identifier) module for EPUB
//!
//! Parsing, generation, and ordering of EPUB CFI strings. A CFI addresses a
//! position by document structure (spine item, element path, text chunk,
//! character offset), so it survives font and theme reflow.
//!
//! # Example CFI
//!
//! ```text
//! epubcfi(/6/4[chapter1]!/4/2/1:42)
//!         │  │          │ │ │ │ └── character offset 42
//!         │  │          │ │ │ └──── text chunk (odd = text)
//!         │  │          │ │ └────── element index
//!         │  │          │ └──────── body
//!         │  │          └────────── indirection (into content doc)
//!         │  └───────────────────── spine item with ID
//!         └──────────────────────── spine element
//! ```

mod comparator;
mod generator;
mod parser;
mod types;

pub use types::{CharacterOffset, Cfi, CfiPath, CfiRange, CfiStep, ContentPath, StepType};

pub use parser::{parse, try_parse, CfiParseError};

pub use generator::{generate_cfi, generate_cfi_range, CfiBuilder, TextNodeRef};

pub use comparator::is_in_range;
