//! Durable side of the annotation store
//!
//! Holds each open book's highlights in creation order and queues a write of
//! the full collection after every change.

use std::collections::HashMap;

use super::types::Highlight;
use crate::cfi::{is_in_range, try_parse};
use crate::persistence::RecordWriter;

pub struct AnnotationStore {
    collections: HashMap<String, Vec<Highlight>>,
    writer: RecordWriter,
}

impl AnnotationStore {
    pub fn new(writer: RecordWriter) -> Self {
        Self {
            collections: HashMap::new(),
            writer,
        }
    }

    /// Seed a book's collection from its stored record
    pub fn load(&mut self, book_id: &str, highlights: Vec<Highlight>) {
        self.collections.insert(book_id.to_string(), highlights);
    }

    pub fn highlights(&self, book_id: &str) -> &[Highlight] {
        self.collections
            .get(book_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn find(&self, book_id: &str, cfi_range: &str) -> Option<&Highlight> {
        self.highlights(book_id)
            .iter()
            .find(|h| h.cfi_range == cfi_range)
    }

    /// The highlight a mark click lands on
    ///
    /// `target` is either a highlight's own range or a point inside one; for
    /// overlapping ranges the most recent highlight wins.
    pub fn at(&self, book_id: &str, target: &str) -> Option<&Highlight> {
        if let Some(highlight) = self.find(book_id, target) {
            return Some(highlight);
        }
        let point = try_parse(target)?;
        self.highlights(book_id).iter().rev().find(|h| {
            try_parse(&h.cfi_range)
                .is_some_and(|range| range.is_range() && is_in_range(&point, &range))
        })
    }

    /// Append a highlight and persist
    ///
    /// A highlight with the same range replaces the earlier one, which is
    /// returned.
    pub fn add(&mut self, book_id: &str, highlight: Highlight) -> Option<Highlight> {
        let collection = self.collections.entry(book_id.to_string()).or_default();
        let replaced = collection
            .iter()
            .position(|h| h.cfi_range == highlight.cfi_range)
            .map(|i| collection.remove(i));
        collection.push(highlight);

        self.writer.save_highlights(book_id, collection.clone());
        replaced
    }

    /// Remove the highlight with this range and persist; no-op if absent
    pub fn remove(&mut self, book_id: &str, cfi_range: &str) -> Option<Highlight> {
        let collection = self.collections.get_mut(book_id)?;
        let index = collection.iter().position(|h| h.cfi_range == cfi_range)?;
        let removed = collection.remove(index);

        self.writer.save_highlights(book_id, collection.clone());
        Some(removed)
    }

    /// Drop a book's collection from memory; stored data is untouched
    pub fn unload(&mut self, book_id: &str) {
        self.collections.remove(book_id);
    }
}
