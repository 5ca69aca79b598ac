//! Location codec
//!
//! Converts between layout positions and CFIs, turns selections into
//! canonical ranges, and maintains the location index that percentages are
//! computed from.

mod index;
mod selection;

pub use index::{IndexHandle, LocationIndex};
pub use selection::{
    location_at, position_of, range_from_selection, DocumentContext, SelectedRange, Selection,
    TextPoint,
};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cfi::try_parse;
use crate::engine::LocationBuilder;
use crate::session::{EventSink, SessionEvent};

/// Owns the per-session location index and the task that builds it
#[derive(Debug)]
pub struct LocationCodec {
    break_points: usize,
    handle: IndexHandle,
    task: Option<JoinHandle<()>>,
}

impl LocationCodec {
    pub fn new(break_points: usize) -> Self {
        Self {
            break_points: break_points.max(1),
            handle: IndexHandle::new(),
            task: None,
        }
    }

    pub fn handle(&self) -> IndexHandle {
        self.handle.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.handle.is_ready()
    }

    /// Start building the index in the background
    ///
    /// Idempotent: a second call while a build is running or after it has
    /// finished returns the same handle. Completion is announced with
    /// `SessionEvent::IndexReady` on `sink`.
    pub fn build_index(
        &mut self,
        mut builder: Box<dyn LocationBuilder>,
        sink: EventSink,
    ) -> IndexHandle {
        if self.task.is_some() || self.handle.is_ready() || self.handle.is_cancelled() {
            return self.handle.clone();
        }

        let handle = self.handle.clone();
        let break_points = self.break_points;
        debug!(break_points, "Building location index");

        self.task = Some(tokio::spawn(async move {
            match builder.generate(break_points).await {
                Ok(locations) => {
                    let index = LocationIndex::from_locations(locations);
                    let count = index.len();
                    if handle.publish(index) {
                        info!(break_points = count, "Location index ready");
                        sink.emit(SessionEvent::IndexReady { break_points: count });
                    } else {
                        debug!("Discarding location index for a closed session");
                    }
                }
                Err(e) => warn!("Location index build failed: {}", e),
            }
        }));

        self.handle.clone()
    }

    /// Percentage through the book for `canonical_id`, 0 until the index is ready
    pub fn percentage(&self, canonical_id: &str) -> u8 {
        percentage(&self.handle, canonical_id)
    }

    /// Stop any running build; the index will never publish afterwards
    pub fn cancel(&mut self) {
        self.handle.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Percentage for `canonical_id` against `handle`
///
/// Returns 0 when the index has not been published or the identifier does
/// not parse.
pub fn percentage(handle: &IndexHandle, canonical_id: &str) -> u8 {
    match (handle.get(), try_parse(canonical_id)) {
        (Some(index), Some(cfi)) => index.percentage(&cfi),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::engine::EngineError;

    struct FixedBuilder {
        delay: Duration,
    }

    #[async_trait]
    impl LocationBuilder for FixedBuilder {
        async fn generate(&mut self, break_points: usize) -> Result<Vec<String>, EngineError> {
            tokio::time::sleep(self.delay).await;
            Ok((0..break_points)
                .map(|i| format!("epubcfi(/6/2[ch0]!/4/2/1:{})", i))
                .collect())
        }
    }

    struct FailingBuilder;

    #[async_trait]
    impl LocationBuilder for FailingBuilder {
        async fn generate(&mut self, _break_points: usize) -> Result<Vec<String>, EngineError> {
            Err(EngineError::Fatal("renderer crashed".to_string()))
        }
    }

    #[tokio::test]
    async fn test_percentage_before_and_after_build() {
        let (sink, mut rx) = EventSink::channel(1);
        let mut codec = LocationCodec::new(100);
        assert_eq!(codec.percentage("epubcfi(/6/2[ch0]!/4/2/1:50)"), 0);

        codec.build_index(Box::new(FixedBuilder { delay: Duration::ZERO }), sink);
        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.generation, 1);
        assert!(matches!(envelope.event, SessionEvent::IndexReady { break_points: 100 }));

        assert!(codec.is_ready());
        assert_eq!(codec.percentage("epubcfi(/6/2[ch0]!/4/2/1:50)"), 50);
        assert_eq!(codec.percentage("not a cfi"), 0);
    }

    #[tokio::test]
    async fn test_build_is_idempotent() {
        let (sink, mut rx) = EventSink::channel(1);
        let mut codec = LocationCodec::new(10);
        let instant = || Box::new(FixedBuilder { delay: Duration::ZERO });
        let first = codec.build_index(instant(), sink.clone());
        let second = codec.build_index(instant(), sink);

        rx.recv().await.unwrap();
        assert!(first.is_ready() && second.is_ready());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_build_never_publishes() {
        let (sink, mut rx) = EventSink::channel(1);
        let mut codec = LocationCodec::new(10);
        let handle = codec.build_index(
            Box::new(FixedBuilder {
                delay: Duration::from_secs(5),
            }),
            sink,
        );
        codec.cancel();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!handle.is_ready());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_build_leaves_index_unready() {
        let (sink, mut rx) = EventSink::channel(1);
        let mut codec = LocationCodec::new(10);
        codec.build_index(Box::new(FailingBuilder), sink);

        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert!(!codec.is_ready());
        assert!(rx.try_recv().is_err());
    }
}
