//! Visual side of the annotation store
//!
//! Tracks which highlight ranges have been painted by the engine so they can
//! be cleared and re-applied after a reflow.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::types::Highlight;
use crate::engine::{EngineError, OverlayKind, OverlayStyle, RenderingEngine};

/// What to do when the engine fails hard while clearing overlays
///
/// Stale or missing overlays are always tolerated; this only governs fatal
/// engine errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayRemovalPolicy {
    /// Log and keep going
    #[default]
    Tolerate,
    /// Stop reconciliation and return the error
    Abort,
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub removed: usize,
    /// Removals the engine rejected (stale, missing, or tolerated failures)
    pub rejected: usize,
    pub applied: usize,
    /// Ranges the engine could not paint
    pub failed: Vec<String>,
}

/// Overlays currently painted for one session
#[derive(Debug, Default)]
pub struct OverlayLayer {
    rendered: BTreeSet<String>,
    policy: OverlayRemovalPolicy,
}

impl OverlayLayer {
    pub fn new(policy: OverlayRemovalPolicy) -> Self {
        Self {
            rendered: BTreeSet::new(),
            policy,
        }
    }

    pub fn rendered(&self) -> impl Iterator<Item = &str> {
        self.rendered.iter().map(String::as_str)
    }

    /// Paint one highlight
    pub fn show(
        &mut self,
        engine: &mut dyn RenderingEngine,
        highlight: &Highlight,
    ) -> Result<(), EngineError> {
        engine.add_overlay(
            OverlayKind::Highlight,
            &highlight.cfi_range,
            &OverlayStyle::highlight(&highlight.color),
        )?;
        self.rendered.insert(highlight.cfi_range.clone());
        Ok(())
    }

    /// Remove one highlight's paint; a stale or missing overlay counts as removed
    ///
    /// A fatal engine error leaves the range tracked so the next
    /// reconciliation retries it.
    pub fn hide(
        &mut self,
        engine: &mut dyn RenderingEngine,
        cfi_range: &str,
    ) -> Result<(), EngineError> {
        match engine.remove_overlay(OverlayKind::Highlight, cfi_range) {
            Ok(()) => {}
            Err(e) if !e.is_fatal() => {
                tracing::debug!("Overlay {} already gone: {}", cfi_range, e)
            }
            Err(e) => return Err(e),
        }
        self.rendered.remove(cfi_range);
        Ok(())
    }

    /// Clear every painted overlay and every highlight's overlay, then paint
    /// `highlights`
    ///
    /// Running it twice with the same highlights leaves the same overlays.
    pub fn reconcile(
        &mut self,
        engine: &mut dyn RenderingEngine,
        highlights: &[Highlight],
    ) -> Result<ReconcileReport, EngineError> {
        let mut report = ReconcileReport::default();

        let tracked = std::mem::take(&mut self.rendered);
        let mut targets = tracked.clone();
        targets.extend(highlights.iter().map(|h| h.cfi_range.clone()));
        let targets: Vec<String> = targets.into_iter().collect();

        for (i, cfi_range) in targets.iter().enumerate() {
            match engine.remove_overlay(OverlayKind::Highlight, cfi_range) {
                Ok(()) => report.removed += 1,
                Err(e) if !e.is_fatal() => {
                    tracing::debug!("Skipping overlay {}: {}", cfi_range, e);
                    report.rejected += 1;
                }
                Err(e) => match self.policy {
                    OverlayRemovalPolicy::Tolerate => {
                        tracing::warn!("Failed to remove overlay {}: {}", cfi_range, e);
                        report.rejected += 1;
                        if tracked.contains(cfi_range) {
                            self.rendered.insert(cfi_range.clone());
                        }
                    }
                    OverlayRemovalPolicy::Abort => {
                        self.rendered
                            .extend(targets[i..].iter().filter(|r| tracked.contains(*r)).cloned());
                        return Err(e);
                    }
                },
            }
        }

        for highlight in highlights {
            match self.show(engine, highlight) {
                Ok(()) => report.applied += 1,
                Err(e) if e.is_fatal() && self.policy == OverlayRemovalPolicy::Abort => {
                    return Err(e)
                }
                Err(e) => {
                    tracing::warn!("Failed to paint highlight {}: {}", highlight.cfi_range, e);
                    report.failed.push(highlight.cfi_range.clone());
                }
            }
        }

        tracing::debug!(
            removed = report.removed,
            rejected = report.rejected,
            applied = report.applied,
            "Reconciled overlays"
        );
        Ok(report)
    }

    /// Forget painted overlays without touching the engine
    pub fn clear(&mut self) {
        self.rendered.clear();
    }
}
