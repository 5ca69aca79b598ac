//! Rendering engine traits
//!
//! The reader drives a paginating renderer through these interfaces. Engines
//! are owned by a single session and need not be `Send`; the location
//! builder they hand out runs on its own task and must be.

use async_trait::async_trait;

use super::error::EngineError;
use super::types::{MountTarget, OverlayKind, OverlayStyle, Relocation};
use crate::epub::TocEntry;
use crate::location::DocumentContext;
use crate::session::EventSink;
use crate::settings::StyleDescriptor;

pub type Result<T> = std::result::Result<T, EngineError>;

/// A paginating renderer bound to one book
///
/// Spontaneous events (selections, mark clicks, content loads) are reported
/// through the `EventSink` given at mount time. Navigation calls return the
/// resulting relocation directly.
#[async_trait(?Send)]
pub trait RenderingEngine {
    /// Attach to a viewport
    async fn mount(&mut self, target: &MountTarget, events: EventSink) -> Result<()>;

    /// Show the page containing `target` (a CFI or an href), or the first page
    async fn display(&mut self, target: Option<&str>) -> Result<Relocation>;

    /// Turn forward; `None` on the last page
    async fn next(&mut self) -> Result<Option<Relocation>>;

    /// Turn back; `None` on the first page
    async fn prev(&mut self) -> Result<Option<Relocation>>;

    /// Visible range, if anything is displayed
    fn current_location(&self) -> Option<Relocation>;

    /// Register (or replace) a named style
    fn register_style(&mut self, name: &str, style: &StyleDescriptor);

    /// Activate a registered style and reflow
    ///
    /// Overlays painted before the reflow become stale. Returns the
    /// relocation of the reflowed view if anything is displayed.
    async fn select_style(&mut self, name: &str) -> Result<Option<Relocation>>;

    fn add_overlay(
        &mut self,
        kind: OverlayKind,
        cfi_range: &str,
        style: &OverlayStyle,
    ) -> Result<()>;

    fn remove_overlay(&mut self, kind: OverlayKind, cfi_range: &str) -> Result<()>;

    /// Overlays painted in the live layout
    fn rendered_overlays(&self) -> Vec<(OverlayKind, String)>;

    /// Builder for the location index, detached from the engine's lifetime
    fn location_builder(&self) -> Box<dyn LocationBuilder>;

    /// Navigation document entries
    fn navigation(&self) -> Vec<TocEntry>;

    fn content_document(&self, spine_index: usize) -> Option<&dyn DocumentContext>;

    fn clear_selection(&mut self);

    /// Release the viewport; every later call fails with `Destroyed`
    async fn destroy(&mut self);
}

/// Generates evenly spaced break-point CFIs across the book
#[async_trait]
pub trait LocationBuilder: Send {
    async fn generate(&mut self, break_points: usize) -> Result<Vec<String>>;
}

/// Creates engines from book bytes
pub trait EngineFactory: Send + Sync {
    fn create(&self, content: &[u8]) -> Result<Box<dyn RenderingEngine>>;
}
