//! Pagination and theme controller
//!
//! Owns the live engine for one session: creation and mounting, style
//! application, page turns and jumps, the location index build, and the
//! overlays painted for highlights.

use std::fmt;
use std::time::Duration;

use crate::annotations::{Highlight, OverlayLayer, OverlayRemovalPolicy, ReconcileReport};
use crate::engine::{
    Direction, EngineError, EngineFactory, MountTarget, Relocation, RenderingEngine,
};
use crate::epub::TocEntry;
use crate::error::{ReaderError, Result};
use crate::location::{DocumentContext, IndexHandle, LocationCodec};
use crate::session::EventSink;
use crate::settings::ReaderSettings;

/// Why the view is moving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationCause {
    /// Page turn or jump: the reading position changes
    Navigation,
    /// Style change: same position, new layout
    Reflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Displaying,
    Ready,
    Relocating(RelocationCause),
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Uninitialized => write!(f, "uninitialized"),
            SessionState::Displaying => write!(f, "displaying"),
            SessionState::Ready => write!(f, "ready"),
            SessionState::Relocating(RelocationCause::Navigation) => write!(f, "relocating"),
            SessionState::Relocating(RelocationCause::Reflow) => write!(f, "reflowing"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

pub struct PaginationController {
    engine: Option<Box<dyn RenderingEngine>>,
    mount: Option<MountTarget>,
    state: SessionState,
    settings: ReaderSettings,
    settle_delay: Duration,
    codec: LocationCodec,
    overlays: OverlayLayer,
    /// Reading position a reflow returns to; only navigation moves it
    anchor: Option<String>,
}

impl PaginationController {
    pub fn new(break_points: usize, settle_delay: Duration, policy: OverlayRemovalPolicy) -> Self {
        Self {
            engine: None,
            mount: None,
            state: SessionState::Uninitialized,
            settings: ReaderSettings::default(),
            settle_delay,
            codec: LocationCodec::new(break_points),
            overlays: OverlayLayer::new(policy),
            anchor: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn settings(&self) -> ReaderSettings {
        self.settings
    }

    pub fn index(&self) -> IndexHandle {
        self.codec.handle()
    }

    pub fn mount_target(&self) -> Option<&MountTarget> {
        self.mount.as_ref()
    }

    /// Create, mount and display the engine, then style it and start the
    /// location index
    ///
    /// A saved location that no longer resolves falls back to the start of
    /// the book. On failure the engine is released and the controller is
    /// closed.
    pub async fn initialize(
        &mut self,
        factory: &dyn EngineFactory,
        content: &[u8],
        mount: MountTarget,
        last_location: Option<&str>,
        settings: ReaderSettings,
        highlights: &[Highlight],
        events: EventSink,
    ) -> Result<Relocation> {
        if self.state != SessionState::Uninitialized {
            return Err(ReaderError::NotReady(self.state.to_string()));
        }
        self.state = SessionState::Displaying;

        let mut engine = match factory.create(content) {
            Ok(engine) => engine,
            Err(e) => {
                self.state = SessionState::Closed;
                return Err(e.into());
            }
        };

        let displayed =
            Self::mount_and_display(engine.as_mut(), &mount, last_location, events.clone()).await;
        match displayed {
            Ok((relocation, anchor)) => {
                tracing::debug!("Displayed page {} of {}", relocation.page, relocation.total_pages);
                self.engine = Some(engine);
                self.mount = Some(mount);
                self.anchor = Some(anchor);
            }
            Err(e) => {
                tracing::error!("Engine initialization failed: {}", e);
                engine.destroy().await;
                self.state = SessionState::Closed;
                return Err(e.into());
            }
        }

        self.state = SessionState::Ready;
        if let Err(e) = self.apply_theme(settings, highlights).await {
            tracing::warn!("Initial theme could not be applied: {}", e);
        }
        self.settle();

        if let Some(engine) = self.engine.as_ref() {
            self.codec.build_index(engine.location_builder(), events);
        }

        self.current_location()
            .ok_or_else(|| ReaderError::NotReady(self.state.to_string()))
    }

    /// Display the saved location, or the start; returns the reading anchor
    async fn mount_and_display(
        engine: &mut dyn RenderingEngine,
        mount: &MountTarget,
        last_location: Option<&str>,
        events: EventSink,
    ) -> std::result::Result<(Relocation, String), EngineError> {
        engine.mount(mount, events).await?;
        if let Some(location) = last_location {
            match engine.display(Some(location)).await {
                Ok(relocation) => return Ok((relocation, location.to_string())),
                Err(EngineError::Unresolved(_)) => {
                    tracing::warn!(
                        "Saved location {} no longer resolves; opening at start",
                        location
                    );
                }
                Err(e) => return Err(e),
            }
        }
        let relocation = engine.display(None).await?;
        let anchor = relocation.start.clone();
        Ok((relocation, anchor))
    }

    fn engine_mut(&mut self) -> Result<&mut (dyn RenderingEngine + 'static)> {
        live_engine(self.state, &mut self.engine)
    }

    /// Register and select the style for `settings`, wait for the layout to
    /// settle, return to the reading anchor and repaint highlights
    ///
    /// Leaves the controller in `Relocating(Reflow)` when a relocation is
    /// returned; `settle` ends it.
    pub async fn apply_theme(
        &mut self,
        settings: ReaderSettings,
        highlights: &[Highlight],
    ) -> Result<Option<Relocation>> {
        let settle_delay = self.settle_delay;
        let settings = settings.normalized();
        let saved = self.anchor.clone();
        let engine = self.engine_mut()?;

        let anchor = saved.or_else(|| engine.current_location().map(|r| r.start));
        let name = settings.style_name();
        engine.register_style(&name, &settings.style());
        let mut relocation = engine.select_style(&name).await?;
        self.settings = settings;
        self.state = SessionState::Relocating(RelocationCause::Reflow);

        tokio::time::sleep(settle_delay).await;

        let engine = self.engine_mut()?;
        if let Some(anchor) = anchor {
            match engine.display(Some(&anchor)).await {
                Ok(r) => relocation = Some(r),
                Err(e) => tracing::warn!("Could not return to {} after reflow: {}", anchor, e),
            }
        }

        let report = self.reconcile(highlights)?;
        if !report.failed.is_empty() {
            tracing::warn!("{} highlights could not be repainted", report.failed.len());
        }

        if relocation.is_none() {
            self.settle();
        }
        tracing::debug!("Applied style {}", name);
        Ok(relocation)
    }

    /// One page forward or back; `None` at the boundary
    pub async fn navigate(&mut self, direction: Direction) -> Result<Option<Relocation>> {
        let engine = self.engine_mut()?;
        let relocation = match direction {
            Direction::Next => engine.next().await?,
            Direction::Previous => engine.prev().await?,
        };

        self.state = match &relocation {
            Some(r) => {
                self.anchor = Some(r.start.clone());
                SessionState::Relocating(RelocationCause::Navigation)
            }
            None => SessionState::Ready,
        };
        Ok(relocation)
    }

    /// Show the page holding a CFI or a navigation href
    pub async fn jump_to(&mut self, target: &str) -> Result<Relocation> {
        let engine = self.engine_mut()?;
        let relocation = engine.display(Some(target)).await?;
        self.anchor = Some(relocation.start.clone());
        self.state = SessionState::Relocating(RelocationCause::Navigation);
        Ok(relocation)
    }

    /// End a relocation once its event has been handled
    pub fn settle(&mut self) {
        if let SessionState::Relocating(_) = self.state {
            self.state = SessionState::Ready;
        }
    }

    pub fn current_location(&self) -> Option<Relocation> {
        self.engine.as_ref().and_then(|e| e.current_location())
    }

    pub fn navigation(&self) -> Vec<TocEntry> {
        self.engine
            .as_ref()
            .map(|e| e.navigation())
            .unwrap_or_default()
    }

    pub fn content_document(&self, spine_index: usize) -> Option<&dyn DocumentContext> {
        self.engine.as_ref()?.content_document(spine_index)
    }

    pub fn reconcile(&mut self, highlights: &[Highlight]) -> Result<ReconcileReport> {
        let engine = self
            .engine
            .as_deref_mut()
            .ok_or(ReaderError::SessionClosed)?;
        Ok(self.overlays.reconcile(engine, highlights)?)
    }

    pub fn show_highlight(&mut self, highlight: &Highlight) -> Result<()> {
        let engine = live_engine(self.state, &mut self.engine)?;
        self.overlays.show(engine, highlight)?;
        Ok(())
    }

    pub fn hide_highlight(&mut self, cfi_range: &str) -> Result<()> {
        let engine = live_engine(self.state, &mut self.engine)?;
        self.overlays.hide(engine, cfi_range)?;
        Ok(())
    }

    /// Ranges currently painted
    pub fn painted(&self) -> Vec<String> {
        self.engine
            .as_ref()
            .map(|e| e.rendered_overlays().into_iter().map(|(_, r)| r).collect())
            .unwrap_or_default()
    }

    pub fn clear_selection(&mut self) {
        if let Some(engine) = self.engine.as_deref_mut() {
            engine.clear_selection();
        }
    }

    /// Cancel the index build and release the engine and mount; idempotent
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.codec.cancel();
        if let Some(mut engine) = self.engine.take() {
            engine.destroy().await;
        }
        self.mount = None;
        self.anchor = None;
        self.overlays.clear();
        self.state = SessionState::Closed;
        tracing::debug!("Controller closed");
    }
}

/// The engine, if the session has one that can take commands
fn live_engine(
    state: SessionState,
    engine: &mut Option<Box<dyn RenderingEngine>>,
) -> Result<&mut (dyn RenderingEngine + 'static)> {
    match state {
        SessionState::Closed => Err(ReaderError::SessionClosed),
        SessionState::Uninitialized | SessionState::Displaying => {
            Err(ReaderError::NotReady(state.to_string()))
        }
        _ => engine.as_deref_mut().ok_or(ReaderError::SessionClosed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfi::parse;
    use crate::engine::MemoryEngineFactory;
    use crate::epub::fixtures::sample_book;
    use crate::session::{EventEnvelope, SessionEvent};
    use crate::settings::Theme;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn controller() -> PaginationController {
        PaginationController::new(100, Duration::from_millis(50), OverlayRemovalPolicy::Tolerate)
    }

    async fn ready(
        chapters: usize,
        last_location: Option<&str>,
    ) -> (PaginationController, UnboundedReceiver<EventEnvelope>, Relocation) {
        let mut controller = controller();
        let (sink, rx) = EventSink::channel(7);
        let relocation = controller
            .initialize(
                &MemoryEngineFactory,
                &sample_book(chapters),
                MountTarget::new("viewer", 300, 200),
                last_location,
                ReaderSettings::default(),
                &[],
                sink,
            )
            .await
            .unwrap();
        (controller, rx, relocation)
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_reaches_ready_and_builds_index() {
        let (controller, mut rx, relocation) = ready(2, None).await;
        assert_eq!(controller.state(), SessionState::Ready);
        assert!(relocation.at_start);
        assert!(controller.mount_target().is_some());

        loop {
            let envelope = rx.recv().await.unwrap();
            if let SessionEvent::IndexReady { break_points } = envelope.event {
                assert_eq!(break_points, 100);
                break;
            }
        }
        assert!(controller.index().is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_resumes_saved_location() {
        let (mut controller, _rx, _) = ready(2, None).await;
        for _ in 0..5 {
            controller.navigate(Direction::Next).await.unwrap();
            controller.settle();
        }
        let saved = controller.current_location().unwrap();

        let (_, _rx, resumed) = ready(2, Some(&saved.start)).await;
        assert_eq!(resumed.page, saved.page);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresolvable_location_opens_at_start() {
        let (controller, _rx, relocation) = ready(2, Some("epubcfi(/6/98!/4/2/1:0)")).await;
        assert_eq!(controller.state(), SessionState::Ready);
        assert!(relocation.at_start);
    }

    #[tokio::test]
    async fn test_failed_engine_never_reaches_ready() {
        let mut controller = controller();
        let (sink, _rx) = EventSink::channel(1);
        let result = controller
            .initialize(
                &MemoryEngineFactory,
                b"broken",
                MountTarget::new("viewer", 300, 200),
                None,
                ReaderSettings::default(),
                &[],
                sink,
            )
            .await;

        assert!(matches!(result, Err(ReaderError::Engine(_))));
        assert_eq!(controller.state(), SessionState::Closed);
        assert!(matches!(
            controller.navigate(Direction::Next).await,
            Err(ReaderError::SessionClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_stops_at_boundaries() {
        let (mut controller, _rx, _) = ready(1, None).await;
        assert_eq!(controller.navigate(Direction::Previous).await.unwrap(), None);
        assert_eq!(controller.state(), SessionState::Ready);

        let mut pages = 1;
        while let Some(relocation) = controller.navigate(Direction::Next).await.unwrap() {
            assert_eq!(
                controller.state(),
                SessionState::Relocating(RelocationCause::Navigation)
            );
            controller.settle();
            pages = relocation.page;
        }
        assert_eq!(pages, controller.current_location().unwrap().total_pages);
        assert_eq!(controller.navigate(Direction::Next).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_theme_keeps_position_and_repaints() {
        let (mut controller, _rx, _) = ready(2, None).await;
        for _ in 0..6 {
            controller.navigate(Direction::Next).await.unwrap();
            controller.settle();
        }
        let before = controller.current_location().unwrap();
        let highlight = Highlight::new("epubcfi(/6/2[ch0]!/4/4,/1:0,/1:9)", "#ffeb3b", "Paragraph");
        controller.show_highlight(&highlight).unwrap();

        let night = ReaderSettings::default().with_theme(Theme::Night).with_font_size(150);
        let relocation = controller
            .apply_theme(night, std::slice::from_ref(&highlight))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(controller.state(), SessionState::Relocating(RelocationCause::Reflow));
        assert_eq!(relocation.spine_index, before.spine_index);
        assert_eq!(controller.settings().theme, Theme::Night);
        assert_eq!(controller.painted(), vec![highlight.cfi_range.clone()]);
        controller.settle();
        assert_eq!(controller.state(), SessionState::Ready);
    }

    /// Whether `cfi` lies on the page `relocation` describes
    fn shows(relocation: &Relocation, cfi: &str) -> bool {
        let start = parse(&relocation.start).unwrap();
        let end = parse(&relocation.end).unwrap();
        let point = parse(cfi).unwrap();
        start <= point && (point < end || relocation.at_end)
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_reflows_return_to_reading_anchor() {
        let (mut controller, _rx, _) = ready(3, None).await;
        let mut reading = None;
        for _ in 0..10 {
            reading = controller.navigate(Direction::Next).await.unwrap();
            controller.settle();
        }
        let reading = reading.unwrap();

        for size in [130, 100, 170, 100, 190, 100] {
            let settings = ReaderSettings::default().with_font_size(size);
            let relocation = controller.apply_theme(settings, &[]).await.unwrap().unwrap();
            controller.settle();
            assert!(shows(&relocation, &reading.start), "lost position at {}%", size);
        }

        assert_eq!(controller.current_location().unwrap().page, reading.page);
        let next = controller.navigate(Direction::Next).await.unwrap().unwrap();
        assert_eq!(next.page, reading.page + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_jump_to_toc_entry() {
        let (mut controller, _rx, _) = ready(3, None).await;
        let toc = controller.navigation();
        assert_eq!(toc.len(), 3);

        let relocation = controller.jump_to(&toc[2].href).await.unwrap();
        assert_eq!(relocation.spine_index, 2);
        assert!(matches!(
            controller.jump_to("nowhere.xhtml").await,
            Err(ReaderError::Engine(EngineError::Unresolved(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent() {
        let (mut controller, _rx, _) = ready(1, None).await;
        let index = controller.index();
        controller.close().await;
        controller.close().await;

        assert_eq!(controller.state(), SessionState::Closed);
        assert!(controller.mount_target().is_none());
        assert!(index.is_cancelled());
        assert!(controller.current_location().is_none());
    }
}
