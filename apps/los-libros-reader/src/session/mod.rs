//! Reading session
//!
//! One open book. Every event, whether it comes from the engine, the user or
//! the background index build, goes through `dispatch`, which keys on the
//! event kind and drops anything stamped with another session's generation.

mod events;

pub use events::{EventEnvelope, EventSink, SessionEvent, SessionNotice};

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::annotations::{AnnotationStore, Highlight};
use crate::config::ReaderConfig;
use crate::controller::{PaginationController, RelocationCause, SessionState};
use crate::engine::{Direction, EngineFactory, MountTarget, Relocation};
use crate::epub::TocEntry;
use crate::error::{ReaderError, Result};
use crate::library::Book;
use crate::location::{percentage, range_from_selection, DocumentContext, Selection};
use crate::persistence::{PersistenceGateway, ReadingPosition, RecordWriter};
use crate::settings::ReaderSettings;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Collaborators shared by every session
#[derive(Clone)]
pub struct SessionContext {
    pub gateway: Arc<dyn PersistenceGateway>,
    pub writer: RecordWriter,
    pub engines: Arc<dyn EngineFactory>,
    pub config: ReaderConfig,
}

impl SessionContext {
    /// Context with its own record writer over `gateway`
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        engines: Arc<dyn EngineFactory>,
        config: ReaderConfig,
    ) -> Self {
        Self {
            writer: RecordWriter::spawn(Arc::clone(&gateway)),
            gateway,
            engines,
            config,
        }
    }
}

pub struct ReadingSession {
    generation: u64,
    /// Transient copy of the stored record; highlights live in `annotations`
    book: Book,
    controller: PaginationController,
    annotations: AnnotationStore,
    writer: RecordWriter,
    config: ReaderConfig,
    sink: EventSink,
    events: mpsc::UnboundedReceiver<EventEnvelope>,
    highlight_mode: bool,
    pending_delete: Option<String>,
    chrome_visible: bool,
    /// Mark clicks before this instant are ignored
    marks_suppressed_until: Option<Instant>,
    /// Generic clicks before this instant belong to a selection or mark click
    clicks_captured_until: Option<Instant>,
    loaded: BTreeSet<usize>,
}

impl ReadingSession {
    /// Load a book, bring its engine up and display the saved position
    pub async fn open(
        book_id: &str,
        mount: MountTarget,
        settings: ReaderSettings,
        context: &SessionContext,
    ) -> Result<Self> {
        let mut book = context
            .gateway
            .get(book_id)
            .await?
            .ok_or_else(|| ReaderError::NotFound(format!("book {}", book_id)))?;

        let generation = NEXT_GENERATION.fetch_add(1, Ordering::SeqCst);
        let (sink, events) = EventSink::channel(generation);
        let config = context.config.clone();

        let mut controller = PaginationController::new(
            config.location_break_points,
            config.settle_delay(),
            config.overlay_removal_policy,
        );
        let highlights = std::mem::take(&mut book.highlights);
        let relocation = controller
            .initialize(
                context.engines.as_ref(),
                &book.content[..],
                mount,
                book.last_location.as_deref(),
                settings,
                &highlights,
                sink.clone(),
            )
            .await?;

        let mut annotations = AnnotationStore::new(context.writer.clone());
        annotations.load(&book.id, highlights);

        tracing::info!(
            "Opened \"{}\" at page {} of {} (generation {})",
            book.title,
            relocation.page,
            relocation.total_pages,
            generation
        );

        let mut session = Self {
            generation,
            book,
            controller,
            annotations,
            writer: context.writer.clone(),
            config,
            sink,
            events,
            highlight_mode: false,
            pending_delete: None,
            chrome_visible: true,
            marks_suppressed_until: None,
            clicks_captured_until: None,
            loaded: BTreeSet::new(),
        };
        session.dispatch_own(SessionEvent::Relocated(relocation));
        Ok(session)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn book(&self) -> &Book {
        &self.book
    }

    pub fn state(&self) -> SessionState {
        self.controller.state()
    }

    /// Saved canonical location
    pub fn location(&self) -> Option<&str> {
        self.book.last_location.as_deref()
    }

    pub fn progress(&self) -> u8 {
        self.book.progress
    }

    /// What the engine is showing right now
    pub fn current_page(&self) -> Option<Relocation> {
        self.controller.current_location()
    }

    pub fn highlights(&self) -> &[Highlight] {
        self.annotations.highlights(&self.book.id)
    }

    /// Highlight ranges painted in the live layout
    pub fn painted(&self) -> Vec<String> {
        self.controller.painted()
    }

    pub fn toc(&self) -> Vec<TocEntry> {
        self.controller.navigation()
    }

    pub fn document(&self, spine_index: usize) -> Option<&dyn DocumentContext> {
        self.controller.content_document(spine_index)
    }

    pub fn settings(&self) -> ReaderSettings {
        self.controller.settings()
    }

    pub fn is_index_ready(&self) -> bool {
        self.controller.index().is_ready()
    }

    pub fn loaded_spine_items(&self) -> impl Iterator<Item = usize> + '_ {
        self.loaded.iter().copied()
    }

    pub fn chrome_visible(&self) -> bool {
        self.chrome_visible
    }

    pub fn highlight_mode(&self) -> bool {
        self.highlight_mode
    }

    /// While on, text selections become highlights
    pub fn set_highlight_mode(&mut self, enabled: bool) {
        self.highlight_mode = enabled;
    }

    pub fn pending_delete(&self) -> Option<&str> {
        self.pending_delete.as_deref()
    }

    /// Handle for anything that reports into this session
    pub fn sink(&self) -> EventSink {
        self.sink.clone()
    }

    /// Route one event; events from other generations or after close are dropped
    pub fn dispatch(&mut self, envelope: EventEnvelope) -> Option<SessionNotice> {
        if envelope.generation != self.generation {
            tracing::debug!(
                "Dropping {:?} from generation {} (current {})",
                envelope.event,
                envelope.generation,
                self.generation
            );
            return None;
        }
        if self.controller.state() == SessionState::Closed {
            tracing::debug!("Dropping {:?} after close", envelope.event);
            return None;
        }

        match envelope.event {
            SessionEvent::Relocated(relocation) => self.on_relocated(relocation),
            SessionEvent::ContentReady { spine_index } => {
                tracing::debug!("Spine item {} ready", spine_index);
                self.loaded.insert(spine_index);
                None
            }
            SessionEvent::Selected {
                spine_index,
                selection,
            } => self.on_selected(spine_index, &selection),
            SessionEvent::MarkClicked { cfi_range } => self.on_mark_clicked(cfi_range),
            SessionEvent::Click => self.on_click(),
            SessionEvent::IndexReady { break_points } => self.on_index_ready(break_points),
        }
    }

    fn dispatch_own(&mut self, event: SessionEvent) -> Option<SessionNotice> {
        let generation = self.generation;
        self.dispatch(EventEnvelope { generation, event })
    }

    /// Wait for the next queued event that produces a notice
    pub async fn next_notice(&mut self) -> Option<SessionNotice> {
        while let Some(envelope) = self.events.recv().await {
            if let Some(notice) = self.dispatch(envelope) {
                return Some(notice);
            }
        }
        None
    }

    /// Dispatch everything already queued without waiting
    pub fn process_pending(&mut self) -> Vec<SessionNotice> {
        let mut notices = Vec::new();
        while let Ok(envelope) = self.events.try_recv() {
            notices.extend(self.dispatch(envelope));
        }
        notices
    }

    fn on_relocated(&mut self, relocation: Relocation) -> Option<SessionNotice> {
        let cause = match self.controller.state() {
            SessionState::Relocating(cause) => cause,
            _ => RelocationCause::Navigation,
        };
        self.controller.settle();

        if cause == RelocationCause::Reflow {
            tracing::debug!("Reflowed to page {}; keeping saved location", relocation.page);
            return None;
        }

        let index = self.controller.index();
        let progress = if relocation.at_end {
            100
        } else if index.is_ready() {
            percentage(&index, &relocation.start)
        } else {
            self.book.progress
        };

        self.book.last_location = Some(relocation.start.clone());
        self.book.progress = progress;
        self.persist_position();

        Some(SessionNotice::ProgressChanged {
            location: relocation.start,
            progress,
            page: relocation.page,
            total_pages: relocation.total_pages,
        })
    }

    fn on_index_ready(&mut self, break_points: usize) -> Option<SessionNotice> {
        self.book.location_count = Some(break_points);

        let at_end = self
            .controller
            .current_location()
            .map(|r| r.at_end)
            .unwrap_or(false);
        if let Some(location) = self.book.last_location.as_deref() {
            self.book.progress = if at_end {
                100
            } else {
                percentage(&self.controller.index(), location)
            };
        }
        self.persist_position();

        Some(SessionNotice::IndexReady {
            progress: self.book.progress,
        })
    }

    fn persist_position(&self) {
        let Some(location) = self.book.last_location.clone() else {
            return;
        };
        self.writer.save_position(
            &self.book.id,
            ReadingPosition {
                location,
                progress: self.book.progress,
                location_count: self.book.location_count,
            },
        );
    }

    fn on_selected(&mut self, spine_index: usize, selection: &Selection) -> Option<SessionNotice> {
        if !self.highlight_mode {
            return None;
        }

        let document = self.controller.content_document(spine_index)?;
        let Some(range) = range_from_selection(selection, document) else {
            tracing::debug!("Ignoring empty selection in spine item {}", spine_index);
            return None;
        };

        let highlight = Highlight::new(range.cfi, self.config.highlight_color.clone(), range.text);
        self.annotations.add(&self.book.id, highlight.clone());
        if let Err(e) = self.controller.show_highlight(&highlight) {
            tracing::warn!("Highlight saved but not painted: {}", e);
        }
        self.controller.clear_selection();

        let until = Instant::now() + self.config.suppression_window();
        self.marks_suppressed_until = Some(until);
        self.clicks_captured_until = Some(until);

        tracing::debug!("Created highlight {}", highlight.cfi_range);
        Some(SessionNotice::HighlightCreated(highlight))
    }

    fn on_mark_clicked(&mut self, target: String) -> Option<SessionNotice> {
        let now = Instant::now();
        if self.marks_suppressed_until.is_some_and(|until| now < until) {
            tracing::debug!("Ignoring mark click right after highlight creation");
            return None;
        }
        self.clicks_captured_until = Some(now + self.config.suppression_window());

        let highlight = self.annotations.at(&self.book.id, &target)?;
        let (cfi_range, text) = (highlight.cfi_range.clone(), highlight.text.clone());
        self.pending_delete = Some(cfi_range.clone());
        Some(SessionNotice::ConfirmDelete { cfi_range, text })
    }

    fn on_click(&mut self) -> Option<SessionNotice> {
        if self
            .clicks_captured_until
            .is_some_and(|until| Instant::now() < until)
        {
            return None;
        }
        self.chrome_visible = !self.chrome_visible;
        Some(SessionNotice::ChromeToggled {
            visible: self.chrome_visible,
        })
    }

    /// Delete the highlight awaiting confirmation
    pub fn confirm_delete(&mut self) -> Option<SessionNotice> {
        let cfi_range = self.pending_delete.take()?;
        self.annotations.remove(&self.book.id, &cfi_range)?;
        if let Err(e) = self.controller.hide_highlight(&cfi_range) {
            tracing::warn!("Highlight deleted but overlay not cleared: {}", e);
        }
        tracing::debug!("Deleted highlight {}", cfi_range);
        Some(SessionNotice::HighlightRemoved { cfi_range })
    }

    pub fn cancel_delete(&mut self) {
        self.pending_delete = None;
    }

    pub async fn navigate(&mut self, direction: Direction) -> Result<Option<SessionNotice>> {
        match self.controller.navigate(direction).await? {
            Some(relocation) => Ok(self.dispatch_own(SessionEvent::Relocated(relocation))),
            None => Ok(None),
        }
    }

    pub async fn next_page(&mut self) -> Result<Option<SessionNotice>> {
        self.navigate(Direction::Next).await
    }

    pub async fn prev_page(&mut self) -> Result<Option<SessionNotice>> {
        self.navigate(Direction::Previous).await
    }

    /// Go to a CFI or a navigation href
    pub async fn jump_to(&mut self, target: &str) -> Result<Option<SessionNotice>> {
        let relocation = self.controller.jump_to(target).await?;
        Ok(self.dispatch_own(SessionEvent::Relocated(relocation)))
    }

    /// Restyle the engine; the saved location and progress are unchanged
    pub async fn apply_settings(&mut self, settings: ReaderSettings) -> Result<()> {
        let highlights = self.annotations.highlights(&self.book.id);
        let result = self.controller.apply_theme(settings, highlights).await;
        match result {
            Ok(Some(relocation)) => {
                self.dispatch_own(SessionEvent::Relocated(relocation));
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                self.controller.settle();
                Err(e)
            }
        }
    }

    /// Tear down the engine, drop queued events and flush pending writes
    ///
    /// Calling it again is a no-op.
    pub async fn close(&mut self) {
        if self.controller.state() == SessionState::Closed {
            return;
        }
        self.controller.close().await;
        self.annotations.unload(&self.book.id);
        self.pending_delete = None;
        self.events.close();
        while self.events.try_recv().is_ok() {}
        self.writer.flush().await;
        tracing::info!("Closed \"{}\" at {}%", self.book.title, self.book.progress);
    }
}
