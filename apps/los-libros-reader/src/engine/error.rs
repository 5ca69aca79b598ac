//! Rendering engine error types

use thiserror::Error;

/// Errors reported by a rendering engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Book bytes could not be opened by the engine
    #[error("Invalid content: {0}")]
    InvalidContent(String),

    /// Operation needs a mounted engine
    #[error("Engine is not mounted")]
    NotMounted,

    /// A location or href does not resolve in this book
    #[error("Unresolved location: {0}")]
    Unresolved(String),

    /// No overlay is registered for this range
    #[error("Overlay not found: {0}")]
    OverlayNotFound(String),

    /// The overlay belongs to a layout that has since been reflowed
    #[error("Stale overlay reference: {0}")]
    StaleOverlay(String),

    /// Style name was never registered
    #[error("Unknown style: {0}")]
    UnknownStyle(String),

    #[error("Engine has been destroyed")]
    Destroyed,

    #[error("Engine failure: {0}")]
    Fatal(String),
}

impl EngineError {
    /// Whether the engine can no longer be used after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Fatal(_) | EngineError::Destroyed)
    }
}
