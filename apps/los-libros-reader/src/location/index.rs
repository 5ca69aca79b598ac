//! Location index: evenly spaced break-points over the whole book
//!
//! Built once per session in the background. Percentages are read against it
//! only after it is published; a cancelled handle never publishes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::cfi::{try_parse, Cfi};

/// Ordered break-points
#[derive(Debug, Clone, Default)]
pub struct LocationIndex {
    break_points: Vec<Cfi>,
}

impl LocationIndex {
    /// Build from engine-generated locations, dropping any that do not parse
    pub fn from_locations<I, S>(locations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut break_points: Vec<Cfi> = locations
            .into_iter()
            .filter_map(|loc| try_parse(loc.as_ref()))
            .collect();
        break_points.sort();
        Self { break_points }
    }

    pub fn len(&self) -> usize {
        self.break_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.break_points.is_empty()
    }

    /// Index of the nearest break-point at or before `cfi`
    pub fn locate(&self, cfi: &Cfi) -> usize {
        let point = cfi.start_point();
        self.break_points
            .partition_point(|bp| *bp <= point)
            .saturating_sub(1)
    }

    /// Whole-number percentage through the book: floor(i / N * 100)
    pub fn percentage(&self, cfi: &Cfi) -> u8 {
        if self.break_points.is_empty() {
            return 0;
        }
        let i = self.locate(cfi);
        (i * 100 / self.break_points.len()) as u8
    }
}

#[derive(Debug, Default)]
struct Slot {
    index: OnceLock<LocationIndex>,
    cancelled: AtomicBool,
}

/// Shared view of an index that may still be under construction
#[derive(Debug, Clone, Default)]
pub struct IndexHandle {
    slot: Arc<Slot>,
}

impl IndexHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.slot.index.get().is_some()
    }

    pub fn get(&self) -> Option<&LocationIndex> {
        self.slot.index.get()
    }

    /// Install a finished index. Returns false if the handle was cancelled or
    /// already holds an index.
    pub fn publish(&self, index: LocationIndex) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.slot.index.set(index).is_ok()
    }

    pub fn cancel(&self) {
        self.slot.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.slot.cancelled.load(Ordering::SeqCst)
    }
}
