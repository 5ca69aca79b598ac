//! Session events and notices

use tokio::sync::mpsc;

use crate::annotations::Highlight;
use crate::engine::Relocation;
use crate::location::Selection;

/// Everything the session reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The visible range changed
    Relocated(Relocation),
    /// A spine item finished loading
    ContentReady { spine_index: usize },
    /// The user selected text
    Selected {
        spine_index: usize,
        selection: Selection,
    },
    /// The user clicked a painted highlight; carries its range or a point in it
    MarkClicked { cfi_range: String },
    /// A click anywhere else in the content area
    Click,
    /// The location index finished building
    IndexReady { break_points: usize },
}

/// An event stamped with the session generation that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEnvelope {
    pub generation: u64,
    pub event: SessionEvent,
}

/// Sending half of a session's event queue
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<EventEnvelope>,
}

impl EventSink {
    pub fn channel(generation: u64) -> (Self, mpsc::UnboundedReceiver<EventEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { generation, tx }, rx)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue an event; returns false once the session has gone away
    pub fn emit(&self, event: SessionEvent) -> bool {
        self.tx
            .send(EventEnvelope {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// What the session tells the surrounding UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    ProgressChanged {
        location: String,
        progress: u8,
        page: usize,
        total_pages: usize,
    },
    IndexReady {
        progress: u8,
    },
    HighlightCreated(Highlight),
    /// Ask the user whether to delete this highlight
    ConfirmDelete {
        cfi_range: String,
        text: String,
    },
    HighlightRemoved {
        cfi_range: String,
    },
    ChromeToggled {
        visible: bool,
    },
}
