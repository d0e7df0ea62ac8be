//! Ordered codepoint range lists
//!
//! Character classes and Unicode tables are represented as lists of inclusive
//! codepoint ranges. After normalization the list is sorted, non-overlapping,
//! and non-adjacent, which makes membership a binary search and complementing
//! a single linear sweep.
//!
//! Bounds are `u32` rather than `char` so that a complement can cover the
//! full `[0, 0x10FFFF]` space, surrogate gap included, even though any
//! codepoint actually read from a subject is a valid `char`.

/// Highest valid codepoint value.
pub const MAX_CODEPOINT: u32 = 0x10FFFF;

/// An inclusive range of codepoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodepointRange {
    /// First codepoint of the range.
    pub first: u32,
    /// Last codepoint of the range, inclusive.
    pub last: u32,
}

impl CodepointRange {
    /// Create a range from inclusive bounds.
    pub fn new(first: u32, last: u32) -> Self {
        CodepointRange { first, last }
    }

    /// Create a single-codepoint range.
    pub fn single(cp: u32) -> Self {
        CodepointRange { first: cp, last: cp }
    }

    /// Whether the range contains the given codepoint.
    pub fn contains(&self, cp: u32) -> bool {
        self.first <= cp && cp <= self.last
    }

    /// Number of codepoints covered.
    pub fn len(&self) -> u32 {
        self.last - self.first + 1
    }

    /// Always false: a range covers at least one codepoint.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl From<char> for CodepointRange {
    fn from(c: char) -> Self {
        CodepointRange::single(c as u32)
    }
}

impl From<(u32, u32)> for CodepointRange {
    fn from((first, last): (u32, u32)) -> Self {
        CodepointRange { first, last }
    }
}

/// An ordered list of inclusive codepoint ranges.
///
/// The list is kept normalized: sorted by `first`, with no overlapping and no
/// adjacent ranges. Mutating constructors call [`sort_and_compact`] before
/// handing the value out; push-style builders must call it themselves once
/// construction is finished.
///
/// [`sort_and_compact`]: CodepointRanges::sort_and_compact
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodepointRanges {
    ranges: Vec<CodepointRange>,
}

impl CodepointRanges {
    /// Create an empty list.
    pub fn new() -> Self {
        CodepointRanges { ranges: Vec::new() }
    }

    /// Build a normalized list from any iterator of ranges.
    pub fn from_ranges<I, R>(iter: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<CodepointRange>,
    {
        let mut result = CodepointRanges {
            ranges: iter.into_iter().map(Into::into).collect(),
        };
        result.sort_and_compact();
        result
    }

    /// Build a normalized list from a static table of inclusive pairs.
    ///
    /// Tables are assumed to already be sorted and compact, so this is a
    /// plain copy.
    pub fn from_table(table: &[(u32, u32)]) -> Self {
        CodepointRanges {
            ranges: table.iter().map(|&(a, b)| CodepointRange::new(a, b)).collect(),
        }
    }

    /// Append a range without re-normalizing.
    pub fn push(&mut self, range: CodepointRange) {
        self.ranges.push(range);
    }

    /// Append every range of `other` without re-normalizing.
    pub fn extend(&mut self, other: &CodepointRanges) {
        self.ranges.extend_from_slice(&other.ranges);
    }

    /// The underlying ranges.
    pub fn ranges(&self) -> &[CodepointRange] {
        &self.ranges
    }

    /// Whether the list covers no codepoints at all.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Sort the ranges and merge overlapping or adjacent ones.
    pub fn sort_and_compact(&mut self) {
        if self.ranges.len() < 2 {
            return;
        }
        self.ranges.sort_by_key(|r| r.first);
        let mut compacted: Vec<CodepointRange> = Vec::with_capacity(self.ranges.len());
        for r in self.ranges.drain(..) {
            match compacted.last_mut() {
                // Merge when overlapping or directly adjacent.
                Some(prev) if u64::from(r.first) <= u64::from(prev.last) + 1 => {
                    prev.last = prev.last.max(r.last);
                }
                _ => compacted.push(r),
            }
        }
        self.ranges = compacted;
    }

    /// Whether the list contains the given codepoint. Binary search; the list
    /// must be normalized.
    pub fn contains(&self, cp: u32) -> bool {
        self.ranges
            .binary_search_by(|r| {
                if r.last < cp {
                    std::cmp::Ordering::Less
                } else if r.first > cp {
                    std::cmp::Ordering::Greater
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    /// The complement of this list over `[0, 0x10FFFF]`. The list must be
    /// normalized.
    pub fn negated(&self) -> CodepointRanges {
        let mut result = Vec::with_capacity(self.ranges.len() + 1);
        let mut next = 0u32;
        for r in &self.ranges {
            if r.first > next {
                result.push(CodepointRange::new(next, r.first - 1));
            }
            match r.last.checked_add(1) {
                Some(n) => next = n,
                None => return CodepointRanges { ranges: result },
            }
        }
        if next <= MAX_CODEPOINT {
            result.push(CodepointRange::new(next, MAX_CODEPOINT));
        }
        CodepointRanges { ranges: result }
    }
}

impl From<CodepointRange> for CodepointRanges {
    fn from(range: CodepointRange) -> Self {
        CodepointRanges { ranges: vec![range] }
    }
}

impl FromIterator<CodepointRange> for CodepointRanges {
    fn from_iter<I: IntoIterator<Item = CodepointRange>>(iter: I) -> Self {
        CodepointRanges::from_ranges(iter)
    }
}
