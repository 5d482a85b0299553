//! Index ranges identifying the slice of a global coefficient vector owned by each element.
//!
//! Two collections are provided. [`NonuniformRanges`] stores an arbitrary list of ranges and is
//! built incrementally. [`UniformRanges`] describes `count` consecutive blocks of identical size
//! by three numbers and computes each range on demand. Only the latter can be processed by the
//! batched kernels.
use crate::error::ElementwiseError;
use serde::{Deserialize, Serialize};
use std::iter::FusedIterator;
use std::ops::{Index, Range};

/// The half-open index interval `[start, end)` of a single element.
///
/// `start <= end` always holds. Deserialization rejects reversed ranges.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawElementRange")]
pub struct ElementRange {
    start: usize,
    end: usize,
}

#[derive(Deserialize)]
struct RawElementRange {
    start: usize,
    end: usize,
}

impl TryFrom<RawElementRange> for ElementRange {
    type Error = ElementwiseError;

    fn try_from(raw: RawElementRange) -> Result<Self, Self::Error> {
        Self::try_new(raw.start, raw.end)
    }
}

impl ElementRange {
    /// Creates a new range.
    ///
    /// # Panics
    ///
    /// Panics if `start > end`.
    pub fn new(start: usize, end: usize) -> Self {
        assert!(start <= end, "Range start must not exceed range end");
        Self { start, end }
    }

    /// Creates a new range, or returns an error if `start > end`.
    pub fn try_new(start: usize, end: usize) -> Result<Self, ElementwiseError> {
        if start <= end {
            Ok(Self { start, end })
        } else {
            Err(ElementwiseError::InvalidRange { start, end })
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn as_range(&self) -> Range<usize> {
        self.start..self.end
    }
}

impl From<ElementRange> for Range<usize> {
    fn from(range: ElementRange) -> Self {
        range.as_range()
    }
}

/// An ordered collection of element ranges.
///
/// Operations that take scale factors pair the `i`-th scale factor with the `i`-th range
/// reported by [`element_range`](Self::element_range). The pairing is purely positional:
/// reordering or filtering a collection without reordering the scale factors in the same way
/// silently changes which element receives which factor.
pub trait ElementRanges {
    fn num_elements(&self) -> usize;

    /// Returns the range of the element at the given position, or `None` if out of bounds.
    ///
    /// Once [`validate`](Self::validate) succeeds, this must return `Some` for every
    /// `index < self.num_elements()`.
    fn element_range(&self, index: usize) -> Option<ElementRange>;

    /// Checks that every range of the collection can be produced.
    ///
    /// Collections that store their ranges explicitly are always valid. Collections that compute
    /// ranges on access report ranges that cannot be represented, such as
    /// [`UniformRanges`] extending past `usize::MAX`.
    fn validate(&self) -> Result<(), ElementwiseError> {
        Ok(())
    }

    /// Returns the collection as uniform ranges, if it can be expressed as such.
    ///
    /// Used by the batched kernels to detect whether they are applicable.
    fn as_uniform(&self) -> Option<UniformRanges> {
        None
    }

    /// Iterates over all ranges in order.
    ///
    /// Iteration stops early at the first position for which
    /// [`element_range`](Self::element_range) returns `None`.
    fn ranges(&self) -> ElementRangeIter<'_, Self> {
        ElementRangeIter {
            ranges: self,
            index: 0,
            end: self.num_elements(),
        }
    }
}

/// Iterator over the ranges of any [`ElementRanges`] collection.
#[derive(Debug)]
pub struct ElementRangeIter<'a, R: ?Sized> {
    ranges: &'a R,
    index: usize,
    end: usize,
}

impl<'a, R> Iterator for ElementRangeIter<'a, R>
where
    R: ?Sized + ElementRanges,
{
    type Item = ElementRange;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index < self.end {
            let range = self.ranges.element_range(self.index);
            self.index = if range.is_some() { self.index + 1 } else { self.end };
            range
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end - self.index;
        (remaining, Some(remaining))
    }
}

impl<'a, R: ?Sized + ElementRanges> ExactSizeIterator for ElementRangeIter<'a, R> {}

impl<'a, R: ?Sized + ElementRanges> FusedIterator for ElementRangeIter<'a, R> {}

impl ElementRanges for [ElementRange] {
    fn num_elements(&self) -> usize {
        self.len()
    }

    fn element_range(&self, index: usize) -> Option<ElementRange> {
        self.get(index).copied()
    }

    fn as_uniform(&self) -> Option<UniformRanges> {
        detect_uniform(self)
    }
}

/// An arbitrary sequence of element ranges, stored explicitly.
///
/// Insertion order is preserved. No ordering or disjointness is enforced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonuniformRanges {
    ranges: Vec<ElementRange>,
}

impl NonuniformRanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ranges: Vec::with_capacity(capacity),
        }
    }

    /// Appends the range `[start, end)`.
    ///
    /// Returns an error and leaves the collection unchanged if `start > end`.
    pub fn append(&mut self, start: usize, end: usize) -> Result<(), ElementwiseError> {
        let range = ElementRange::try_new(start, end)?;
        self.ranges.push(range);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<ElementRange> {
        self.ranges.get(index).copied()
    }

    pub fn iter(&self) -> std::iter::Copied<std::slice::Iter<'_, ElementRange>> {
        self.ranges.iter().copied()
    }

    pub fn as_slice(&self) -> &[ElementRange] {
        &self.ranges
    }

    /// Returns equivalent uniform ranges if the stored ranges are consecutive blocks of equal
    /// length in increasing order.
    ///
    /// An empty collection yields uniform ranges with zero elements.
    pub fn to_uniform(&self) -> Option<UniformRanges> {
        detect_uniform(&self.ranges)
    }
}

fn detect_uniform(ranges: &[ElementRange]) -> Option<UniformRanges> {
    let first = match ranges.first() {
        Some(first) => *first,
        None => return Some(UniformRanges::new(0, 0, 0)),
    };
    let block_size = first.len();
    let is_uniform = ranges
        .windows(2)
        .all(|pair| pair[1].len() == block_size && pair[1].start == pair[0].end);
    is_uniform.then(|| UniformRanges::new(first.start, block_size, ranges.len()))
}

impl Index<usize> for NonuniformRanges {
    type Output = ElementRange;

    fn index(&self, index: usize) -> &Self::Output {
        &self.ranges[index]
    }
}

impl<'a> IntoIterator for &'a NonuniformRanges {
    type Item = ElementRange;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, ElementRange>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<ElementRange> for NonuniformRanges {
    fn from_iter<I: IntoIterator<Item = ElementRange>>(iter: I) -> Self {
        Self {
            ranges: iter.into_iter().collect(),
        }
    }
}

impl Extend<ElementRange> for NonuniformRanges {
    fn extend<I: IntoIterator<Item = ElementRange>>(&mut self, iter: I) {
        self.ranges.extend(iter)
    }
}

impl ElementRanges for NonuniformRanges {
    fn num_elements(&self) -> usize {
        self.len()
    }

    fn element_range(&self, index: usize) -> Option<ElementRange> {
        self.get(index)
    }

    fn as_uniform(&self) -> Option<UniformRanges> {
        self.to_uniform()
    }
}

/// `count` consecutive element ranges of identical size `block_size`, starting at `start`.
///
/// Range `i` is `[start + i * block_size, start + (i + 1) * block_size)`. The ranges are never
/// stored, they are computed on access.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniformRanges {
    start: usize,
    block_size: usize,
    count: usize,
}

impl UniformRanges {
    pub fn new(start: usize, block_size: usize, count: usize) -> Self {
        Self {
            start,
            block_size,
            count,
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns the range of the `index`-th element.
    ///
    /// Returns `None` if `index >= self.len()`, or if the range extends past `usize::MAX`.
    /// The latter never happens when [`span`](Self::span) is `Some`.
    pub fn get(&self, index: usize) -> Option<ElementRange> {
        if index >= self.count {
            return None;
        }
        let start = index
            .checked_mul(self.block_size)
            .and_then(|offset| self.start.checked_add(offset))?;
        let end = start.checked_add(self.block_size)?;
        Some(ElementRange { start, end })
    }

    /// The range `[start, start + count * block_size)` covered by all elements.
    ///
    /// Returns `None` if the end of the span cannot be represented.
    pub fn span(&self) -> Option<ElementRange> {
        self.span_with_block_size(self.block_size)
    }

    /// The span covered by `count` blocks of the given size starting at the same offset.
    ///
    /// The batched kernels write output blocks whose size may differ from the input block size,
    /// but which are laid out with the same start offset.
    pub fn span_with_block_size(&self, block_size: usize) -> Option<ElementRange> {
        let end = self
            .count
            .checked_mul(block_size)
            .and_then(|len| self.start.checked_add(len))?;
        Some(ElementRange { start: self.start, end })
    }

    pub fn iter(&self) -> UniformRangesIter {
        UniformRangesIter {
            ranges: *self,
            front: 0,
            back: self.count,
        }
    }
}

impl IntoIterator for UniformRanges {
    type Item = ElementRange;
    type IntoIter = UniformRangesIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a> IntoIterator for &'a UniformRanges {
    type Item = ElementRange;
    type IntoIter = UniformRangesIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl ElementRanges for UniformRanges {
    fn num_elements(&self) -> usize {
        self.count
    }

    fn element_range(&self, index: usize) -> Option<ElementRange> {
        self.get(index)
    }

    fn validate(&self) -> Result<(), ElementwiseError> {
        match self.span() {
            Some(_) => Ok(()),
            None => Err(ElementwiseError::SpanOverflow {
                start: self.start,
                block_size: self.block_size,
                count: self.count,
            }),
        }
    }

    fn as_uniform(&self) -> Option<UniformRanges> {
        Some(*self)
    }
}

/// Random-access iterator over [`UniformRanges`].
///
/// Jumping ahead with `nth` is O(1).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UniformRangesIter {
    ranges: UniformRanges,
    front: usize,
    back: usize,
}

impl UniformRangesIter {
    /// The position of the next element returned from the front.
    ///
    /// The signed distance between two iterators over the same ranges is the difference of
    /// their positions.
    pub fn position(&self) -> usize {
        self.front
    }
}

impl Iterator for UniformRangesIter {
    type Item = ElementRange;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front < self.back {
            let range = self.ranges.get(self.front);
            self.front = if range.is_some() { self.front + 1 } else { self.back };
            range
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back - self.front;
        (remaining, Some(remaining))
    }

    fn nth(&mut self, n: usize) -> Option<Self::Item> {
        self.front = self.front.saturating_add(n).min(self.back);
        self.next()
    }
}

impl DoubleEndedIterator for UniformRangesIter {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front < self.back {
            let range = self.ranges.get(self.back - 1);
            self.back = if range.is_some() { self.back - 1 } else { self.front };
            range
        } else {
            None
        }
    }

    fn nth_back(&mut self, n: usize) -> Option<Self::Item> {
        self.back = self.back.saturating_sub(n).max(self.front);
        self.next_back()
    }
}

impl ExactSizeIterator for UniformRangesIter {}

impl FusedIterator for UniformRangesIter {}
