//! Headless paginating engine
//!
//! Lays the book's text out into fixed-capacity pages derived from the
//! viewport and the active style's font settings. Pages never span two spine
//! items. Used by the command-line driver and by tests; a browser-backed
//! engine implements the same traits.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::error::EngineError;
use super::traits::{EngineFactory, LocationBuilder, RenderingEngine, Result};
use super::types::{MountTarget, OverlayKind, OverlayStyle, Relocation};
use crate::cfi::{parse, CfiBuilder};
use crate::epub::{ContentDocument, EpubParser, TocEntry};
use crate::location::{location_at, position_of, DocumentContext, Selection};
use crate::session::{EventSink, SessionEvent};
use crate::settings::StyleDescriptor;

/// Average glyph advance at 100% in a serif face, in pixels
const GLYPH_WIDTH: u64 = 9;
const LINE_HEIGHT: u64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Page {
    spine_index: usize,
    /// Character range `[start, end)` within the spine item
    start: usize,
    end: usize,
}

#[derive(Debug, Clone)]
struct Overlay {
    kind: OverlayKind,
    cfi_range: String,
    style: OverlayStyle,
    layout: u64,
}

/// Creates `MemoryEngine`s
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryEngineFactory;

impl EngineFactory for MemoryEngineFactory {
    fn create(&self, content: &[u8]) -> Result<Box<dyn RenderingEngine>> {
        Ok(Box::new(MemoryEngine::from_bytes(content)?))
    }
}

pub struct MemoryEngine {
    documents: Arc<[ContentDocument]>,
    toc: Vec<TocEntry>,
    viewport: Option<MountTarget>,
    events: Option<EventSink>,
    styles: HashMap<String, StyleDescriptor>,
    active_style: Option<String>,
    pages: Vec<Page>,
    current: Option<usize>,
    /// Bumped on every reflow; overlays from older layouts are stale
    layout: u64,
    overlays: Vec<Overlay>,
    selection: Option<Selection>,
    fail_overlay_removal: bool,
    destroyed: bool,
}

impl MemoryEngine {
    pub fn from_bytes(content: &[u8]) -> Result<Self> {
        let parser = EpubParser::from_bytes(content)
            .map_err(|e| EngineError::InvalidContent(e.to_string()))?;
        let documents = parser
            .content_documents()
            .map_err(|e| EngineError::InvalidContent(e.to_string()))?;

        Ok(Self {
            documents: documents.into(),
            toc: parser.toc(),
            viewport: None,
            events: None,
            styles: HashMap::new(),
            active_style: None,
            pages: Vec::new(),
            current: None,
            layout: 0,
            overlays: Vec::new(),
            selection: None,
            fail_overlay_removal: false,
            destroyed: false,
        })
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Record a user selection and report it to the session
    pub fn select(&mut self, selection: Selection) {
        let spine_index = self
            .current
            .map(|i| self.pages[i].spine_index)
            .unwrap_or_default();
        self.selection = Some(selection.clone());
        self.emit(SessionEvent::Selected {
            spine_index,
            selection,
        });
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    /// Paint parameters of a live overlay
    pub fn overlay_style(&self, kind: OverlayKind, cfi_range: &str) -> Option<&OverlayStyle> {
        self.overlays
            .iter()
            .find(|o| o.layout == self.layout && o.kind == kind && o.cfi_range == cfi_range)
            .map(|o| &o.style)
    }

    /// Make every overlay removal fail as if the renderer had crashed
    pub fn inject_removal_failure(&mut self, enabled: bool) {
        self.fail_overlay_removal = enabled;
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.destroyed {
            return Err(EngineError::Destroyed);
        }
        if self.viewport.is_none() {
            return Err(EngineError::NotMounted);
        }
        Ok(())
    }

    fn chars_per_page(&self) -> usize {
        let Some(viewport) = &self.viewport else {
            return 1;
        };
        let style = self.active_style.as_ref().and_then(|name| self.styles.get(name));
        let font_size = style
            .and_then(|s| s.get("body", "font-size"))
            .and_then(|v| v.split('%').next())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(100)
            .max(1);
        let width_factor = match style.and_then(|s| s.get("body", "font-family")) {
            Some(family) if family.contains("sans-serif") => 11,
            _ => 10,
        };

        let glyph = (GLYPH_WIDTH * font_size * width_factor / 1000).max(1);
        let line = (LINE_HEIGHT * font_size / 100).max(1);
        let columns = (viewport.width as u64 / glyph).max(1);
        let lines = (viewport.height as u64 / line).max(1);
        (columns * lines) as usize
    }

    fn paginate(&mut self) {
        let capacity = self.chars_per_page();
        self.pages = self
            .documents
            .iter()
            .flat_map(|doc| {
                let len = doc.char_len();
                let spine_index = doc.spine_index;
                let count = len.div_ceil(capacity).max(1);
                (0..count).map(move |i| Page {
                    spine_index,
                    start: i * capacity,
                    end: ((i + 1) * capacity).min(len),
                })
            })
            .collect();
        tracing::debug!(pages = self.pages.len(), capacity, "Paginated");
    }

    fn page_containing(&self, spine_index: usize, position: usize) -> Option<usize> {
        self.pages
            .iter()
            .rposition(|p| p.spine_index == spine_index && p.start <= position)
    }

    fn point(&self, spine_index: usize, position: usize) -> String {
        let doc = &self.documents[spine_index];
        match location_at(doc, position) {
            Some(cfi) => cfi.to_string(),
            None => CfiBuilder::new()
                .package_step()
                .spine_item(spine_index, Some(&doc.idref))
                .build()
                .to_string(),
        }
    }

    fn relocation(&self, index: usize) -> Relocation {
        let page = self.pages[index];
        Relocation {
            start: self.point(page.spine_index, page.start),
            end: self.point(page.spine_index, page.end),
            spine_index: page.spine_index,
            page: index + 1,
            total_pages: self.pages.len(),
            at_start: index == 0,
            at_end: index + 1 == self.pages.len(),
        }
    }

    /// Spine item and character position addressed by a CFI or href
    fn resolve(&self, target: &str) -> Result<(usize, usize)> {
        let unresolved = || EngineError::Unresolved(target.to_string());

        if target.starts_with("epubcfi(") {
            let cfi = parse(target).map_err(|_| unresolved())?;
            let spine_index = cfi
                .spine_index()
                .filter(|&i| i < self.documents.len())
                .ok_or_else(unresolved)?;
            let doc = &self.documents[spine_index];
            if doc.nodes.is_empty() || cfi.content_path().is_none() {
                return Ok((spine_index, 0));
            }
            let position = position_of(doc, &cfi).ok_or_else(unresolved)?;
            return Ok((spine_index, position));
        }

        self.documents
            .iter()
            .find(|doc| doc.matches_href(target))
            .map(|doc| (doc.spine_index, 0))
            .ok_or_else(unresolved)
    }

    fn show(&mut self, index: usize) -> Relocation {
        let previous = self.current.map(|i| self.pages[i].spine_index);
        self.current = Some(index);
        let spine_index = self.pages[index].spine_index;
        if previous != Some(spine_index) {
            self.selection = None;
            self.emit(SessionEvent::ContentReady { spine_index });
        }
        self.relocation(index)
    }
}

#[async_trait(?Send)]
impl RenderingEngine for MemoryEngine {
    async fn mount(&mut self, target: &MountTarget, events: EventSink) -> Result<()> {
        if self.destroyed {
            return Err(EngineError::Destroyed);
        }
        self.viewport = Some(target.clone());
        self.events = Some(events);
        self.paginate();
        Ok(())
    }

    async fn display(&mut self, target: Option<&str>) -> Result<Relocation> {
        self.ensure_live()?;
        let index = match target {
            None => 0,
            Some(target) => {
                let (spine_index, position) = self.resolve(target)?;
                self.page_containing(spine_index, position)
                    .ok_or_else(|| EngineError::Unresolved(target.to_string()))?
            }
        };
        Ok(self.show(index))
    }

    async fn next(&mut self) -> Result<Option<Relocation>> {
        self.ensure_live()?;
        let current = self
            .current
            .ok_or_else(|| EngineError::Unresolved("no page displayed".to_string()))?;
        if current + 1 >= self.pages.len() {
            return Ok(None);
        }
        Ok(Some(self.show(current + 1)))
    }

    async fn prev(&mut self) -> Result<Option<Relocation>> {
        self.ensure_live()?;
        let current = self
            .current
            .ok_or_else(|| EngineError::Unresolved("no page displayed".to_string()))?;
        if current == 0 {
            return Ok(None);
        }
        Ok(Some(self.show(current - 1)))
    }

    fn current_location(&self) -> Option<Relocation> {
        self.current.map(|i| self.relocation(i))
    }

    fn register_style(&mut self, name: &str, style: &StyleDescriptor) {
        self.styles.insert(name.to_string(), style.clone());
    }

    async fn select_style(&mut self, name: &str) -> Result<Option<Relocation>> {
        self.ensure_live()?;
        if !self.styles.contains_key(name) {
            return Err(EngineError::UnknownStyle(name.to_string()));
        }

        let anchor = self.current.map(|i| {
            let page = self.pages[i];
            (page.spine_index, page.start)
        });
        self.active_style = Some(name.to_string());
        self.paginate();
        self.layout += 1;

        let Some((spine_index, position)) = anchor else {
            return Ok(None);
        };
        let index = self.page_containing(spine_index, position).unwrap_or_default();
        self.current = Some(index);
        Ok(Some(self.relocation(index)))
    }

    fn add_overlay(
        &mut self,
        kind: OverlayKind,
        cfi_range: &str,
        style: &OverlayStyle,
    ) -> Result<()> {
        self.ensure_live()?;
        let unresolved = || EngineError::Unresolved(cfi_range.to_string());

        let cfi = parse(cfi_range).map_err(|_| unresolved())?;
        if !cfi.is_range() {
            return Err(unresolved());
        }
        let doc = cfi
            .spine_index()
            .and_then(|i| self.documents.get(i))
            .ok_or_else(unresolved)?;
        position_of(doc, &cfi.start_point()).ok_or_else(unresolved)?;
        position_of(doc, &cfi.end_point()).ok_or_else(unresolved)?;

        self.overlays
            .retain(|o| !(o.kind == kind && o.cfi_range == cfi_range));
        self.overlays.push(Overlay {
            kind,
            cfi_range: cfi_range.to_string(),
            style: style.clone(),
            layout: self.layout,
        });
        Ok(())
    }

    fn remove_overlay(&mut self, kind: OverlayKind, cfi_range: &str) -> Result<()> {
        if self.destroyed {
            return Err(EngineError::Destroyed);
        }
        if self.fail_overlay_removal {
            return Err(EngineError::Fatal("overlay layer unavailable".to_string()));
        }

        let index = self
            .overlays
            .iter()
            .position(|o| o.kind == kind && o.cfi_range == cfi_range)
            .ok_or_else(|| EngineError::OverlayNotFound(cfi_range.to_string()))?;
        let overlay = self.overlays.remove(index);
        if overlay.layout != self.layout {
            return Err(EngineError::StaleOverlay(cfi_range.to_string()));
        }
        Ok(())
    }

    fn rendered_overlays(&self) -> Vec<(OverlayKind, String)> {
        self.overlays
            .iter()
            .filter(|o| o.layout == self.layout)
            .map(|o| (o.kind, o.cfi_range.clone()))
            .collect()
    }

    fn location_builder(&self) -> Box<dyn LocationBuilder> {
        Box::new(MemoryLocationBuilder {
            documents: Arc::clone(&self.documents),
        })
    }

    fn navigation(&self) -> Vec<TocEntry> {
        self.toc.clone()
    }

    fn content_document(&self, spine_index: usize) -> Option<&dyn DocumentContext> {
        self.documents
            .get(spine_index)
            .map(|doc| doc as &dyn DocumentContext)
    }

    fn clear_selection(&mut self) {
        self.selection = None;
    }

    async fn destroy(&mut self) {
        self.destroyed = true;
        self.viewport = None;
        self.events = None;
        self.overlays.clear();
        self.current = None;
        self.selection = None;
    }
}

/// Spreads break-points evenly over the book's characters
struct MemoryLocationBuilder {
    documents: Arc<[ContentDocument]>,
}

#[async_trait]
impl LocationBuilder for MemoryLocationBuilder {
    async fn generate(&mut self, break_points: usize) -> Result<Vec<String>> {
        let lengths: Vec<usize> = self.documents.iter().map(ContentDocument::char_len).collect();
        let total: usize = lengths.iter().sum();
        if total == 0 {
            return Ok(Vec::new());
        }

        let mut locations = Vec::with_capacity(break_points);
        let mut doc = 0;
        let mut doc_start = 0;
        for i in 0..break_points {
            let position = i * total / break_points;
            while position >= doc_start + lengths[doc] {
                doc_start += lengths[doc];
                doc += 1;
            }
            if let Some(cfi) = location_at(&self.documents[doc], position - doc_start) {
                locations.push(cfi.to_string());
            }
            if i % 100 == 99 {
                tokio::task::yield_now().await;
            }
        }
        Ok(locations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    use crate::epub::fixtures::sample_book;
    use crate::session::EventEnvelope;
    use crate::settings::{FontFamily, ReaderSettings};

    async fn mounted(chapters: usize) -> (MemoryEngine, UnboundedReceiver<EventEnvelope>) {
        let mut engine = MemoryEngine::from_bytes(&sample_book(chapters)).unwrap();
        let (sink, rx) = EventSink::channel(1);
        engine
            .mount(&MountTarget::new("viewer", 300, 200), sink)
            .await
            .unwrap();
        (engine, rx)
    }

    fn apply(engine: &mut MemoryEngine, settings: &ReaderSettings) -> String {
        let name = settings.style_name();
        engine.register_style(&name, &settings.style());
        name
    }

    #[test]
    fn test_rejects_invalid_bytes() {
        assert!(matches!(
            MemoryEngine::from_bytes(b"nope"),
            Err(EngineError::InvalidContent(_))
        ));
    }

    #[tokio::test]
    async fn test_display_requires_mount() {
        let mut engine = MemoryEngine::from_bytes(&sample_book(1)).unwrap();
        assert!(matches!(engine.display(None).await, Err(EngineError::NotMounted)));
    }

    #[tokio::test]
    async fn test_pages_never_span_spine_items() {
        let (engine, _rx) = mounted(3).await;
        assert!(engine.page_count() > 3);
        for pair in engine.pages.windows(2) {
            if pair[0].spine_index == pair[1].spine_index {
                assert_eq!(pair[0].end, pair[1].start);
            } else {
                assert_eq!(pair[1].start, 0);
            }
        }
    }

    #[tokio::test]
    async fn test_turning_pages_stops_at_both_ends() {
        let (mut engine, _rx) = mounted(1).await;
        let first = engine.display(None).await.unwrap();
        assert!(first.at_start);
        assert_eq!(engine.prev().await.unwrap(), None);

        let mut last = first;
        while let Some(relocation) = engine.next().await.unwrap() {
            assert_eq!(relocation.page, last.page + 1);
            last = relocation;
        }
        assert!(last.at_end);
        assert_eq!(last.page, engine.page_count());
        assert_eq!(engine.current_location(), Some(last));
    }

    #[tokio::test]
    async fn test_display_resolves_cfi_and_href() {
        let (mut engine, mut rx) = mounted(3).await;
        engine.display(None).await.unwrap();
        for _ in 0..4 {
            engine.next().await.unwrap();
        }
        let here = engine.current_location().unwrap();

        let back = engine.display(Some(&here.start)).await.unwrap();
        assert_eq!(back, here);

        let chapter = engine.display(Some("text/ch2.xhtml#top")).await.unwrap();
        assert_eq!(chapter.spine_index, 2);

        let mut loaded = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            if let SessionEvent::ContentReady { spine_index } = envelope.event {
                loaded.push(spine_index);
            }
        }
        assert_eq!(loaded.first(), Some(&0));
        assert_eq!(loaded.last(), Some(&2));

        assert!(matches!(
            engine.display(Some("epubcfi(/6/40!/4/2/1:0)")).await,
            Err(EngineError::Unresolved(_))
        ));
        assert!(matches!(
            engine.display(Some("missing.xhtml")).await,
            Err(EngineError::Unresolved(_))
        ));
    }

    #[tokio::test]
    async fn test_larger_font_means_more_pages() {
        let (mut engine, _rx) = mounted(2).await;
        let base = apply(&mut engine, &ReaderSettings::default());
        engine.select_style(&base).await.unwrap();
        let normal = engine.page_count();

        let large = apply(
            &mut engine,
            &ReaderSettings::default()
                .with_font_size(200)
                .with_font_family(FontFamily::Sans),
        );
        engine.select_style(&large).await.unwrap();
        assert!(engine.page_count() > normal);

        assert!(matches!(
            engine.select_style("unregistered").await,
            Err(EngineError::UnknownStyle(_))
        ));
    }

    #[tokio::test]
    async fn test_reflow_keeps_reading_position() {
        let (mut engine, _rx) = mounted(2).await;
        engine.display(None).await.unwrap();
        for _ in 0..7 {
            engine.next().await.unwrap();
        }
        let before = engine.current_location().unwrap();

        let large = apply(&mut engine, &ReaderSettings::default().with_font_size(180));
        let after = engine.select_style(&large).await.unwrap().unwrap();

        let doc = &engine.documents[before.spine_index];
        let old_start = position_of(doc, &parse(&before.start).unwrap()).unwrap();
        let new_start = position_of(doc, &parse(&after.start).unwrap()).unwrap();
        let new_end = position_of(doc, &parse(&after.end).unwrap()).unwrap();
        assert_eq!(after.spine_index, before.spine_index);
        assert!(new_start <= old_start && old_start < new_end);
    }

    #[tokio::test]
    async fn test_overlays_go_stale_after_reflow() {
        let (mut engine, _rx) = mounted(1).await;
        engine.display(None).await.unwrap();
        let range = "epubcfi(/6/2[ch0]!/4/4,/1:0,/1:9)";
        let style = OverlayStyle::highlight("#ffeb3b");

        engine.add_overlay(OverlayKind::Highlight, range, &style).unwrap();
        engine.add_overlay(OverlayKind::Highlight, range, &style).unwrap();
        assert_eq!(engine.rendered_overlays().len(), 1);
        assert_eq!(
            engine.overlay_style(OverlayKind::Highlight, range).map(|s| s.fill_opacity),
            Some(0.3)
        );

        let name = apply(&mut engine, &ReaderSettings::default());
        engine.select_style(&name).await.unwrap();
        assert!(engine.rendered_overlays().is_empty());
        assert!(matches!(
            engine.remove_overlay(OverlayKind::Highlight, range),
            Err(EngineError::StaleOverlay(_))
        ));
        assert!(matches!(
            engine.remove_overlay(OverlayKind::Highlight, range),
            Err(EngineError::OverlayNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_add_overlay_rejects_unresolvable_ranges() {
        let (mut engine, _rx) = mounted(1).await;
        let style = OverlayStyle::highlight("#ffeb3b");
        for bad in [
            "epubcfi(/6/2[ch0]!/4/4/1:3)",
            "epubcfi(/6/30!/4/4,/1:0,/1:2)",
            "epubcfi(/6/2[ch0]!/4/400,/1:0,/1:2)",
            "garbage",
        ] {
            assert!(
                matches!(
                    engine.add_overlay(OverlayKind::Highlight, bad, &style),
                    Err(EngineError::Unresolved(_))
                ),
                "{}",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_selection_is_reported_and_cleared() {
        let (mut engine, mut rx) = mounted(1).await;
        engine.display(None).await.unwrap();
        while rx.try_recv().is_ok() {}

        let node = engine.documents[0].nodes[1].node.clone();
        engine.select(Selection::within(node, 0, 5));
        assert!(matches!(
            rx.try_recv().unwrap().event,
            SessionEvent::Selected { spine_index: 0, .. }
        ));

        engine.clear_selection();
        assert!(engine.selection().is_none());
    }

    #[tokio::test]
    async fn test_location_builder_spreads_break_points() {
        let (engine, _rx) = mounted(4).await;
        let mut builder = engine.location_builder();
        let locations = builder.generate(1000).await.unwrap();
        assert_eq!(locations.len(), 1000);

        let parsed: Vec<_> = locations.iter().map(|l| parse(l).unwrap()).collect();
        assert!(parsed.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(parsed[0].spine_index(), Some(0));
        assert_eq!(parsed[999].spine_index(), Some(3));
    }

    #[tokio::test]
    async fn test_destroyed_engine_refuses_work() {
        let (mut engine, _rx) = mounted(1).await;
        engine.display(None).await.unwrap();
        engine.destroy().await;

        assert!(matches!(engine.next().await, Err(EngineError::Destroyed)));
        assert!(engine.current_location().is_none());
        assert!(engine.rendered_overlays().is_empty());
    }
}
