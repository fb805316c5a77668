//! Codepoint interval sets used on automaton transitions.
//!
//! A [`CharSet`] is a normalized (sorted, disjoint, merged) list of
//! half-open codepoint intervals `[start, end)`. All transition labels in
//! the NFA/DFA layer are interval sets, which keeps the alphabet small and
//! the set algebra cheap.

use crate::core::nodes::{CharClass, ClassItem};
use crate::core::tokens::ClassOpKind;
use serde::{Deserialize, Serialize};

/// Exclusive upper bound of the codepoint space.
pub const MAX_CODEPOINT: u32 = 0x10FFFF + 1;

/// A half-open codepoint interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CharRange {
    pub start: u32,
    pub end: u32,
}

impl CharRange {
    pub fn single(c: char) -> Self {
        CharRange {
            start: c as u32,
            end: c as u32 + 1,
        }
    }

    pub fn inclusive(lo: char, hi: char) -> Self {
        CharRange {
            start: lo as u32,
            end: hi as u32 + 1,
        }
    }
}

/// A normalized union of disjoint codepoint intervals.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CharSet {
    ranges: Vec<CharRange>,
}

impl CharSet {
    pub fn empty() -> Self {
        CharSet { ranges: Vec::new() }
    }

    pub fn full() -> Self {
        CharSet {
            ranges: vec![CharRange {
                start: 0,
                end: MAX_CODEPOINT,
            }],
        }
    }

    pub fn single(c: char) -> Self {
        CharSet {
            ranges: vec![CharRange::single(c)],
        }
    }

    pub fn inclusive(lo: char, hi: char) -> Self {
        if lo > hi {
            return CharSet::empty();
        }
        CharSet {
            ranges: vec![CharRange::inclusive(lo, hi)],
        }
    }

    pub fn from_ranges(ranges: impl IntoIterator<Item = CharRange>) -> Self {
        let mut set = CharSet {
            ranges: ranges.into_iter().filter(|r| r.start < r.end).collect(),
        };
        set.normalize();
        set
    }

    fn normalize(&mut self) {
        self.ranges.sort_by_key(|r| r.start);
        let mut out: Vec<CharRange> = Vec::with_capacity(self.ranges.len());
        for r in self.ranges.drain(..) {
            match out.last_mut() {
                Some(last) if r.start <= last.end => {
                    last.end = last.end.max(r.end);
                }
                _ => out.push(r),
            }
        }
        self.ranges = out;
    }

    pub fn ranges(&self) -> &[CharRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn contains(&self, cp: u32) -> bool {
        self.ranges
            .binary_search_by(|r| {
                if cp < r.start {
                    std::cmp::Ordering::Greater
                } else if cp >= r.end {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    /// Smallest codepoint in the set; drives deterministic witnesses.
    pub fn min_codepoint(&self) -> Option<u32> {
        self.ranges.first().map(|r| r.start)
    }

    /// Number of codepoints covered.
    pub fn len(&self) -> u64 {
        self.ranges.iter().map(|r| (r.end - r.start) as u64).sum()
    }

    pub fn union(&self, other: &CharSet) -> CharSet {
        CharSet::from_ranges(self.ranges.iter().chain(other.ranges.iter()).copied())
    }

    pub fn negate(&self) -> CharSet {
        let mut out = Vec::new();
        let mut cursor = 0;
        for r in &self.ranges {
            if r.start > cursor {
                out.push(CharRange {
                    start: cursor,
                    end: r.start,
                });
            }
            cursor = r.end;
        }
        if cursor < MAX_CODEPOINT {
            out.push(CharRange {
                start: cursor,
                end: MAX_CODEPOINT,
            });
        }
        CharSet { ranges: out }
    }

    pub fn intersect(&self, other: &CharSet) -> CharSet {
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.ranges.len() && j < other.ranges.len() {
            let a = self.ranges[i];
            let b = other.ranges[j];
            let start = a.start.max(b.start);
            let end = a.end.min(b.end);
            if start < end {
                out.push(CharRange { start, end });
            }
            if a.end <= b.end {
                i += 1;
            } else {
                j += 1;
            }
        }
        CharSet { ranges: out }
    }

    pub fn difference(&self, other: &CharSet) -> CharSet {
        self.intersect(&other.negate())
    }

    pub fn symmetric_difference(&self, other: &CharSet) -> CharSet {
        self.difference(other).union(&other.difference(self))
    }

    pub fn overlaps(&self, other: &CharSet) -> bool {
        !self.intersect(other).is_empty()
    }

    /// Extend the set with ASCII case counterparts of its members, for
    /// case-insensitive matching.
    pub fn case_fold_ascii(&self) -> CharSet {
        let mut extra = Vec::new();
        for r in &self.ranges {
            for (lo, hi, delta) in [('A', 'Z', 32i64), ('a', 'z', -32i64)] {
                let start = r.start.max(lo as u32);
                let end = r.end.min(hi as u32 + 1);
                if start < end {
                    extra.push(CharRange {
                        start: (start as i64 + delta) as u32,
                        end: (end as i64 + delta) as u32,
                    });
                }
            }
        }
        CharSet::from_ranges(self.ranges.iter().copied().chain(extra))
    }
}

// ---- Shorthand type sets ----

/// `[0-9]`
pub fn digit_set() -> CharSet {
    CharSet::inclusive('0', '9')
}

/// `[0-9A-Za-z_]`
pub fn word_set() -> CharSet {
    CharSet::from_ranges([
        CharRange::inclusive('0', '9'),
        CharRange::inclusive('A', 'Z'),
        CharRange::inclusive('a', 'z'),
        CharRange::single('_'),
    ])
}

/// `[\t\n\x0B\f\r ]`
pub fn space_set() -> CharSet {
    CharSet::from_ranges([
        CharRange::inclusive('\t', '\r'),
        CharRange::single(' '),
    ])
}

/// Horizontal whitespace (`\h`)
pub fn horizontal_space_set() -> CharSet {
    CharSet::from_ranges([
        CharRange::single('\t'),
        CharRange::single(' '),
        CharRange::single('\u{00A0}'),
    ])
}

/// Vertical whitespace (`\v`)
pub fn vertical_space_set() -> CharSet {
    CharSet::from_ranges([
        CharRange::inclusive('\n', '\r'),
        CharRange::single('\u{0085}'),
        CharRange::inclusive('\u{2028}', '\u{2029}'),
    ])
}

/// The single characters matched by `\R` (the `\r\n` pair is handled as an
/// alternation where `\R` is translated).
pub fn newline_set() -> CharSet {
    vertical_space_set()
}

/// The set for a shorthand type letter. Uppercase letters negate.
pub fn char_type_set(letter: char) -> Option<CharSet> {
    let set = match letter.to_ascii_lowercase() {
        'd' => digit_set(),
        'w' => word_set(),
        's' => space_set(),
        'h' => horizontal_space_set(),
        'v' => vertical_space_set(),
        // \N outside a class: any char but newline
        'n' => CharSet::single('\n').negate(),
        _ => return None,
    };
    if letter.is_ascii_uppercase() && letter != 'N' {
        Some(set.negate())
    } else {
        Some(set)
    }
}

/// The set matched by `.` under the given dotall flag.
pub fn dot_set(dot_all: bool) -> CharSet {
    if dot_all {
        CharSet::full()
    } else {
        CharSet::single('\n').negate()
    }
}

/// Compute the codepoint set of a class expression.
///
/// Returns `None` when the expression contains a construct with no
/// interval-set denotation here (unicode properties); callers either treat
/// that as unsupported (automata) or over-approximate (analysis).
pub fn class_set(class: &CharClass) -> Option<CharSet> {
    let inner = items_set(&class.items)?;
    Some(if class.negated { inner.negate() } else { inner })
}

fn items_set(items: &[ClassItem]) -> Option<CharSet> {
    let mut acc = CharSet::empty();
    for item in items {
        let set = match item {
            ClassItem::Char(c) => CharSet::single(c.ch),
            ClassItem::Range(r) => CharSet::inclusive(r.lo.ch, r.hi.ch),
            ClassItem::Type(t) => char_type_set(t.letter)?,
            ClassItem::Property(_) => return None,
            ClassItem::Nested(nested) => class_set(nested)?,
            ClassItem::Operation(op) => {
                let left = items_set(&op.left)?;
                let right = items_set(&op.right)?;
                match op.kind {
                    ClassOpKind::Union => left.union(&right),
                    ClassOpKind::Intersection => left.intersect(&right),
                    ClassOpKind::Difference => left.difference(&right),
                    ClassOpKind::SymmetricDifference => left.symmetric_difference(&right),
                }
            }
        };
        acc = acc.union(&set);
    }
    Some(acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_merges_touching() {
        let s = CharSet::from_ranges([CharRange::inclusive('a', 'm'), CharRange::inclusive('n', 'z')]);
        assert_eq!(s.ranges().len(), 1);
        assert_eq!(s.len(), 26);
    }

    #[test]
    fn test_contains() {
        let s = CharSet::inclusive('a', 'z');
        assert!(s.contains('m' as u32));
        assert!(!s.contains('A' as u32));
    }

    #[test]
    fn test_negate_round_trip() {
        let s = digit_set();
        assert_eq!(s.negate().negate(), s);
        assert!(!s.negate().contains('5' as u32));
        assert!(s.negate().contains('a' as u32));
    }

    #[test]
    fn test_intersect() {
        let a = CharSet::inclusive('a', 'm');
        let b = CharSet::inclusive('h', 'z');
        let i = a.intersect(&b);
        assert_eq!(i.min_codepoint(), Some('h' as u32));
        assert_eq!(i.len(), 6);
    }

    #[test]
    fn test_difference_and_symmetric() {
        let a = CharSet::inclusive('a', 'e');
        let b = CharSet::inclusive('d', 'g');
        assert_eq!(a.difference(&b).len(), 3); // a b c
        assert_eq!(a.symmetric_difference(&b).len(), 5); // a b c f g
    }

    #[test]
    fn test_word_set() {
        let w = word_set();
        assert!(w.contains('_' as u32));
        assert!(w.contains('Q' as u32));
        assert!(!w.contains('-' as u32));
    }

    #[test]
    fn test_uppercase_letter_negates() {
        let d = char_type_set('D').unwrap();
        assert!(!d.contains('7' as u32));
        assert!(d.contains('x' as u32));
    }

    #[test]
    fn test_dot_set_excludes_newline() {
        assert!(!dot_set(false).contains('\n' as u32));
        assert!(dot_set(true).contains('\n' as u32));
    }

    #[test]
    fn test_case_fold_ascii() {
        let s = CharSet::inclusive('a', 'c').case_fold_ascii();
        assert!(s.contains('B' as u32));
        assert!(s.contains('b' as u32));
        assert!(!s.contains('d' as u32));
    }

    #[test]
    fn test_min_codepoint_deterministic() {
        let s = CharSet::from_ranges([CharRange::inclusive('x', 'z'), CharRange::inclusive('b', 'd')]);
        assert_eq!(s.min_codepoint(), Some('b' as u32));
    }
}
