//! Highlight type

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A highlighted text range
///
/// Identified by its CFI range: a book holds at most one highlight per range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    #[serde(rename = "cfiRange")]
    pub cfi_range: String,
    /// CSS colour
    pub color: String,
    /// Text covered by the range when it was created
    pub text: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl Highlight {
    pub fn new(
        cfi_range: impl Into<String>,
        color: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            cfi_range: cfi_range.into(),
            color: color.into(),
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}
