//! CFI Comparison and Ordering
//!
//! Document-order comparison, used to sort highlights and to place a
//! position among the break-points of a location index.

use std::cmp::Ordering;

use super::types::*;

impl Ord for Cfi {
    /// Ranges are ordered by their start point, then by their end point
    ///
    /// Identifiers that address the same position are ordered by structure
    /// and assertions, so `Equal` only holds for identical values.
    fn cmp(&self, other: &Self) -> Ordering {
        let (start, other_start) = (self.start_point(), other.start_point());
        let (end, other_end) = (self.end_point(), other.end_point());
        document_order(&start.path, &other_start.path)
            .then_with(|| document_order(&end.path, &other_end.path))
            .then_with(|| self.range.is_some().cmp(&other.range.is_some()))
            .then_with(|| self.path.cmp(&other.path))
            .then_with(|| self.range.cmp(&other.range))
    }
}

impl PartialOrd for Cfi {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CfiPath {
    fn cmp(&self, other: &Self) -> Ordering {
        document_order(self, other)
            .then_with(|| {
                let ids = |path: &CfiPath| {
                    path.steps
                        .iter()
                        .map(|s| s.id_assertion.clone())
                        .collect::<Vec<_>>()
                };
                ids(self).cmp(&ids(other))
            })
            .then_with(|| {
                let assertion =
                    |path: &CfiPath| path.character_offset.as_ref().map(|o| o.assertion.clone());
                assertion(self).cmp(&assertion(other))
            })
    }
}

impl PartialOrd for CfiPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CfiRange {
    fn cmp(&self, other: &Self) -> Ordering {
        self.start
            .cmp(&other.start)
            .then_with(|| self.end.cmp(&other.end))
    }
}

impl PartialOrd for CfiRange {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CfiStep {
    fn cmp(&self, other: &Self) -> Ordering {
        step_position(self, other).then_with(|| self.id_assertion.cmp(&other.id_assertion))
    }
}

impl PartialOrd for CfiStep {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn step_position(a: &CfiStep, b: &CfiStep) -> Ordering {
    match (&a.step_type, &b.step_type) {
        // Indirections only mark document boundaries
        (StepType::Indirection, StepType::Indirection) => Ordering::Equal,
        (StepType::Element(a), StepType::Element(b)) => a.cmp(b),
        (StepType::Indirection, StepType::Element(_)) => Ordering::Less,
        (StepType::Element(_), StepType::Indirection) => Ordering::Greater,
    }
}

/// Reading order of two paths, ignoring assertions
fn document_order(a: &CfiPath, b: &CfiPath) -> Ordering {
    for (step_a, step_b) in a.steps.iter().zip(b.steps.iter()) {
        let cmp = step_position(step_a, step_b);
        if cmp != Ordering::Equal {
            return cmp;
        }
    }

    // A shorter path addresses an ancestor, which comes first
    let offset = |path: &CfiPath| path.character_offset.as_ref().map(|o| o.offset);
    a.steps
        .len()
        .cmp(&b.steps.len())
        .then_with(|| offset(a).cmp(&offset(b)))
}

/// Whether a point falls within a range CFI (inclusive on both ends)
pub fn is_in_range(cfi: &Cfi, range: &Cfi) -> bool {
    let point = cfi.start_point();
    document_order(&point.path, &range.start_point().path) != Ordering::Less
        && document_order(&point.path, &range.end_point().path) != Ordering::Greater
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfi::parser::parse;

    #[test]
    fn test_cfi_ordering_same_chapter() {
        let a = parse("epubcfi(/6/4!/4/2/1:10)").unwrap();
        let b = parse("epubcfi(/6/4!/4/2/1:20)").unwrap();

        assert!(a < b);
    }

    #[test]
    fn test_cfi_ordering_different_chapters() {
        let a = parse("epubcfi(/6/4[ch1]!/4/200/1:99)").unwrap();
        let b = parse("epubcfi(/6/6[ch2]!/4/2/1:0)").unwrap();

        assert!(a < b);
    }

    #[test]
    fn test_cfi_ordering_nested_depth() {
        let a = parse("epubcfi(/6/4!/4/2)").unwrap();
        let b = parse("epubcfi(/6/4!/4/2/1)").unwrap();

        assert!(a < b);
    }

    #[test]
    fn test_range_orders_by_start() {
        let range = parse("epubcfi(/6/4!/4/2,/1:5,/3:2)").unwrap();
        let before = parse("epubcfi(/6/4!/4/2/1:4)").unwrap();
        let after = parse("epubcfi(/6/4!/4/2/1:6)").unwrap();

        assert!(before < range);
        assert!(range < after);
    }

    #[test]
    fn test_cfi_in_range() {
        let range = parse("epubcfi(/6/4!/4/2,/1:0,/1:100)").unwrap();
        let middle = parse("epubcfi(/6/4!/4/2/1:50)").unwrap();
        let outside = parse("epubcfi(/6/4!/4/2/1:150)").unwrap();

        assert!(is_in_range(&middle, &range));
        assert!(!is_in_range(&outside, &range));
    }

    #[test]
    fn test_sort_cfis() {
        let mut cfis = vec![
            parse("epubcfi(/6/8!/4/2/1:50)").unwrap(),
            parse("epubcfi(/6/4!/4/2/1:10)").unwrap(),
            parse("epubcfi(/6/6!/4/2/1:30)").unwrap(),
            parse("epubcfi(/6/4!/4/2/1:5)").unwrap(),
        ];

        cfis.sort();

        assert_eq!(cfis[0].to_string(), "epubcfi(/6/4!/4/2/1:5)");
        assert_eq!(cfis[1].to_string(), "epubcfi(/6/4!/4/2/1:10)");
        assert_eq!(cfis[2].to_string(), "epubcfi(/6/6!/4/2/1:30)");
        assert_eq!(cfis[3].to_string(), "epubcfi(/6/8!/4/2/1:50)");
    }

    #[test]
    fn test_assertions_break_ties_only() {
        let asserted = parse("epubcfi(/6/2[ch0]!/4/2/1:0)").unwrap();
        let bare = parse("epubcfi(/6/2!/4/2/1:0)").unwrap();
        assert_ne!(asserted, bare);
        assert_ne!(asserted.cmp(&bare), Ordering::Equal);
        assert_eq!(asserted.cmp(&asserted.clone()), Ordering::Equal);

        // Position still decides before any assertion
        let later = parse("epubcfi(/6/2!/4/2/1:50)").unwrap();
        assert!(asserted < later);

        let set: std::collections::BTreeSet<Cfi> = [asserted, bare].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_collapsed_range_differs_from_point() {
        let range = parse("epubcfi(/6/4!/4/2,/1:5,/1:5)").unwrap();
        let point = parse("epubcfi(/6/4!/4/2/1:5)").unwrap();
        assert_ne!(range.cmp(&point), Ordering::Equal);
        assert!(is_in_range(&point, &range));
    }
}
