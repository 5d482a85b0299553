//! Strategies for property-based testing of elementwise kernels.
use crate::ranges::{ElementRange, NonuniformRanges, UniformRanges};
use ::proptest::collection::vec;
use ::proptest::prelude::*;
use nalgebra::DMatrix;

/// Generates values in a small range, so that products and sums stay well-conditioned.
pub fn value() -> impl Strategy<Value = f64> {
    -10.0..10.0
}

/// Generates a dense matrix of the given shape.
pub fn matrix(nrows: usize, ncols: usize) -> impl Strategy<Value = DMatrix<f64>> {
    vec(value(), nrows * ncols).prop_map(move |data| DMatrix::from_vec(nrows, ncols, data))
}

/// Generates a vector of the given length.
pub fn values(len: usize) -> impl Strategy<Value = Vec<f64>> {
    vec(value(), len)
}

impl Arbitrary for UniformRanges {
    /// Upper bounds (exclusive) on start offset, block size and number of elements.
    type Parameters = (usize, usize, usize);
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with((max_start, max_block_size, max_count): Self::Parameters) -> Self::Strategy {
        // Default parameters are all zero, which would make the ranges empty
        let max_start = if max_start == 0 { 5 } else { max_start };
        let max_block_size = if max_block_size == 0 { 6 } else { max_block_size };
        let max_count = if max_count == 0 { 8 } else { max_count };
        (0..max_start, 0..max_block_size, 0..max_count)
            .prop_map(|(start, block_size, count)| UniformRanges::new(start, block_size, count))
            .boxed()
    }
}

/// Generates a problem consisting of uniform ranges, a square operator matching the block
/// size, per-element scale factors and an operand vector that covers all ranges.
///
/// The operand may extend past the last range, since elements need not cover the whole vector.
pub fn uniform_problem() -> impl Strategy<Value = (UniformRanges, DMatrix<f64>, Vec<f64>, Vec<f64>)> {
    (any::<UniformRanges>(), 0..4usize).prop_flat_map(|(ranges, padding)| {
        let l = ranges.block_size();
        let len = ranges.start() + l * ranges.len() + padding;
        (Just(ranges), matrix(l, l), values(ranges.len()), values(len))
    })
}

/// Generates arbitrary (possibly overlapping and unordered) ranges of identical size within a
/// vector of length `len`.
pub fn nonuniform_ranges(block_size: usize, len: usize, max_count: usize) -> impl Strategy<Value = NonuniformRanges> {
    assert!(block_size <= len, "Block size must not exceed vector length");
    vec(0..=(len - block_size), 0..max_count).prop_map(move |starts| {
        starts
            .into_iter()
            .map(|start| ElementRange::new(start, start + block_size))
            .collect()
    })
}
