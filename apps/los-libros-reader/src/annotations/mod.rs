//! Annotation store
//!
//! Highlights for a book: an ordered, durable collection plus the overlays
//! painted for them by the rendering engine. Overlays are re-applied from the
//! collection whenever the engine reflows.

mod overlay;
mod store;
mod types;

pub use overlay::{OverlayLayer, OverlayRemovalPolicy, ReconcileReport};
pub use store::AnnotationStore;
pub use types::Highlight;
