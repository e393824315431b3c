//! Mapping positions and spans through edits.

use serde::{Deserialize, Serialize};

use crate::transaction::Step;

/// Which side of a pure insertion a position sticks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bias {
    /// Stay before text inserted exactly at the position.
    Before,
    /// Move past text inserted exactly at the position.
    After,
}

/// Map `offset` through `step`.
///
/// Positions before the edit are unchanged, positions inside the replaced
/// span collapse to the end of the inserted text, positions after it shift
/// by the length difference.
pub fn map_offset(offset: usize, step: &Step, bias: Bias) -> usize {
    let deleted = step.deleted_len();
    let inserted = step.inserted_len();
    if deleted == 0 && offset == step.from {
        return match bias {
            Bias::Before => offset,
            Bias::After => offset + inserted,
        };
    }
    if offset <= step.from {
        offset
    } else if offset <= step.from + deleted {
        step.from + inserted
    } else {
        offset - deleted + inserted
    }
}

/// A `[from, to)` character range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub from: usize,
    pub to: usize,
}

impl Span {
    pub fn new(from: usize, to: usize) -> Self {
        Self { from, to }
    }

    /// A span starting at `from` covering `len` characters.
    pub fn at(from: usize, len: usize) -> Self {
        Self::new(from, from + len)
    }

    pub fn len(&self) -> usize {
        self.to.saturating_sub(self.from)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Map through `step`. Text inserted at either boundary stays outside.
    pub fn map(&self, step: &Step) -> Self {
        let from = map_offset(self.from, step, Bias::After);
        let to = map_offset(self.to, step, Bias::Before).max(from);
        Self { from, to }
    }

    /// Whether `step` touches this span. Shared boundaries count.
    pub fn touches(&self, step: &Step) -> bool {
        step.from <= self.to && step.to >= self.from
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.from, self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_offset() {
        let step = Step::replace(10, 15, "abc");
        // Before the edit.
        assert_eq!(map_offset(5, &step, Bias::After), 5);
        assert_eq!(map_offset(10, &step, Bias::After), 10);
        // Inside the deleted region.
        assert_eq!(map_offset(12, &step, Bias::Before), 13);
        assert_eq!(map_offset(15, &step, Bias::Before), 13);
        // After: shifted by inserted - deleted.
        assert_eq!(map_offset(20, &step, Bias::Before), 18);
    }

    #[test]
    fn test_map_offset_pure_insertion_bias() {
        let step = Step::insert(10, "xyz");
        assert_eq!(map_offset(10, &step, Bias::Before), 10);
        assert_eq!(map_offset(10, &step, Bias::After), 13);
        assert_eq!(map_offset(11, &step, Bias::Before), 14);
    }

    #[test]
    fn test_span_map() {
        let span = Span::new(10, 20);
        assert_eq!(span.map(&Step::insert(15, "ab")), Span::new(10, 22));
        assert_eq!(span.map(&Step::insert(10, "ab")), Span::new(12, 22));
        assert_eq!(span.map(&Step::insert(20, "ab")), Span::new(10, 20));
        assert_eq!(span.map(&Step::delete(0, 5)), Span::new(5, 15));
        assert_eq!(span.map(&Step::delete(5, 25)), Span::new(5, 5));
    }

    #[test]
    fn test_span_touches() {
        let span = Span::new(10, 20);
        assert!(span.touches(&Step::insert(15, "x")));
        assert!(span.touches(&Step::insert(10, "x")));
        assert!(span.touches(&Step::insert(20, "x")));
        assert!(span.touches(&Step::delete(0, 10)));
        assert!(!span.touches(&Step::delete(0, 9)));
        assert!(!span.touches(&Step::insert(21, "x")));
    }
}
