//! Types exchanged with rendering engines

use serde::{Deserialize, Serialize};

/// Viewport the engine renders into; flow is always paginated, single page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountTarget {
    pub element_id: String,
    pub width: u32,
    pub height: u32,
}

impl MountTarget {
    pub fn new(element_id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            element_id: element_id.into(),
            width,
            height,
        }
    }
}

/// Visible range after a display, page turn, or reflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relocation {
    /// CFI of the first visible character
    pub start: String,
    /// CFI just past the last visible character
    pub end: String,
    pub spine_index: usize,
    /// 1-based page number across the whole book
    pub page: usize,
    pub total_pages: usize,
    pub at_start: bool,
    pub at_end: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Next,
    Previous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayKind {
    Highlight,
}

/// Paint parameters for an overlay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OverlayStyle {
    pub fill: String,
    pub fill_opacity: f32,
    pub mix_blend_mode: String,
}

impl OverlayStyle {
    pub const HIGHLIGHT_OPACITY: f32 = 0.3;

    /// Translucent multiply fill in the highlight's colour
    pub fn highlight(color: &str) -> Self {
        Self {
            fill: color.to_string(),
            fill_opacity: Self::HIGHLIGHT_OPACITY,
            mix_blend_mode: "multiply".to_string(),
        }
    }
}
