//! Rendering engine abstraction
//!
//! The paginating renderer is an external collaborator. This module defines
//! the interface the reader drives it through, plus a headless in-memory
//! implementation.

mod error;
mod memory;
mod traits;
mod types;

pub use error::EngineError;
pub use memory::{MemoryEngine, MemoryEngineFactory};
pub use traits::{EngineFactory, LocationBuilder, RenderingEngine};
pub use types::{Direction, MountTarget, OverlayKind, OverlayStyle, Relocation};
