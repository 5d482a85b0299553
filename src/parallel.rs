//! Block-parallel application of a local operator to uniform element ranges.
//!
//! With uniform ranges the output blocks of different elements are disjoint, so each element's
//! matrix-vector product can be computed independently on a separate thread.
use crate::apply::validate_scale_factors;
use crate::batched::validate_uniform;
use crate::error::ElementwiseError;
use crate::ranges::UniformRanges;
use crate::target::VectorAccess;
use crate::Real;
use nalgebra::{DMatrixView, DVectorView, DVectorViewMut};
use rayon::iter::{IndexedParallelIterator, ParallelIterator};
use rayon::slice::{ParallelSlice, ParallelSliceMut};

/// Scaled or unscaled application of `matrix` to every block, in parallel.
///
/// Output blocks are laid out as in [`apply_uniform`](crate::batched::apply_uniform).
pub fn par_apply_uniform<T>(
    ranges: &UniformRanges,
    scale_factors: Option<&[T]>,
    matrix: DMatrixView<T>,
    access: VectorAccess<T>,
) -> Result<(), ElementwiseError>
where
    T: Real + Send + Sync,
{
    let VectorAccess { operand, result } = access;
    if let Some(scale_factors) = scale_factors {
        validate_scale_factors(ranges.len(), scale_factors)?;
    }
    let (input_span, output_span) = validate_uniform(ranges, matrix.shape(), operand.len(), result.len())?;
    let (out_block_size, in_block_size) = matrix.shape();

    // Zero-sized blocks contribute nothing, and chunk iterators require a non-zero chunk size
    if ranges.is_empty() || in_block_size == 0 || out_block_size == 0 {
        return Ok(());
    }

    let operand_blocks = operand[input_span.as_range()].par_chunks_exact(in_block_size);
    let result_blocks = result[output_span.as_range()].par_chunks_exact_mut(out_block_size);
    result_blocks
        .zip(operand_blocks)
        .enumerate()
        .for_each(|(i, (y, x))| {
            let alpha = scale_factors.map(|factors| factors[i]).unwrap_or_else(T::one);
            let x = DVectorView::from_slice(x, in_block_size);
            let mut y = DVectorViewMut::from_slice(y, out_block_size);
            y.gemv(alpha, &matrix, &x, T::one());
        });
    Ok(())
}
