//! Batched application of a local operator to uniform element ranges.
//!
//! When every element owns a block of the same size `L`, and the blocks are laid out
//! back-to-back starting at offset `s`, the operand region `[s, s + N L)` is exactly the
//! column-major storage of an `L x N` matrix whose columns are the element blocks. Applying the
//! operator to every element is then a single matrix-matrix product
//!
//! ```text
//! result[s .. s + N L_out] += M * operand[s .. s + N L]     (viewed as L_out x N and L x N)
//! ```
//!
//! which lets the multiply routine block and vectorize across elements instead of paying the
//! overhead of `N` tiny matrix-vector products.
use crate::apply::{validate_in_bounds, validate_scale_factors};
use crate::error::{ElementwiseError, VectorRole};
use crate::ranges::{ElementRange, ElementRanges, UniformRanges};
use crate::target::VectorAccess;
use crate::Real;
use itertools::izip;
use log::debug;
use nalgebra::{DMatrixView, DMatrixViewMut};

/// A dense multiply over many equally sized blocks.
///
/// Given a `q x p` matrix and flat buffers holding `n` operand blocks of length `p` and `n`
/// result blocks of length `q`, both stored consecutively, computes
/// `result_j += alpha * matrix * operand_j` for every block `j`.
pub trait BatchedGemm<T: Real> {
    fn gemm_blocks(
        &self,
        alpha: T,
        matrix: DMatrixView<T>,
        operand: &[T],
        result: &mut [T],
    ) -> Result<(), ElementwiseError>;
}

/// Computes the number of blocks handled by a batched multiply, checking that the buffers are
/// consistent with the matrix shape.
pub fn batched_block_count<T>(
    matrix_shape: (usize, usize),
    operand: &[T],
    result: &[T],
) -> Result<usize, ElementwiseError> {
    let (q, p) = matrix_shape;
    let mismatch = || ElementwiseError::BatchedShapeMismatch {
        matrix_shape,
        operand_len: operand.len(),
        result_len: result.len(),
    };

    match (p, q) {
        (0, 0) if operand.is_empty() && result.is_empty() => Ok(0),
        (0, 0) => Err(mismatch()),
        (0, q) if operand.is_empty() && result.len() % q == 0 => Ok(result.len() / q),
        (p, 0) if result.is_empty() && operand.len() % p == 0 => Ok(operand.len() / p),
        (p, q) if p > 0 && q > 0 && operand.len() % p == 0 && result.len() == (operand.len() / p) * q => {
            Ok(operand.len() / p)
        }
        _ => Err(mismatch()),
    }
}

/// Batched multiply implemented with nalgebra's `gemm`.
///
/// The flat buffers are reinterpreted as column-major matrix views, so no data is copied.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct NalgebraGemm;

impl<T: Real> BatchedGemm<T> for NalgebraGemm {
    fn gemm_blocks(
        &self,
        alpha: T,
        matrix: DMatrixView<T>,
        operand: &[T],
        result: &mut [T],
    ) -> Result<(), ElementwiseError> {
        let n = batched_block_count(matrix.shape(), operand, result)?;
        let (q, p) = matrix.shape();
        let b = DMatrixView::from_slice(operand, p, n);
        let mut c = DMatrixViewMut::from_slice(result, q, n);
        c.gemm(alpha, &matrix, &b, T::one());
        Ok(())
    }
}

/// Checks that the operator fits the uniform ranges and that both the input span
/// `[s, s + N L)` and the output span `[s, s + N L_out)` lie within the target's vectors.
///
/// Returns the input and output spans.
pub(crate) fn validate_uniform(
    ranges: &UniformRanges,
    matrix_shape: (usize, usize),
    operand_len: usize,
    result_len: usize,
) -> Result<(ElementRange, ElementRange), ElementwiseError> {
    let (out_block_size, in_block_size) = matrix_shape;
    ranges.validate()?;
    let first = match ranges.get(0) {
        Some(first) => first,
        None => {
            let empty = ElementRange::new(ranges.start(), ranges.start());
            return Ok((empty, empty));
        }
    };

    if in_block_size != first.len() {
        return Err(ElementwiseError::BlockSizeMismatch {
            element: 0,
            input: first,
            output: ElementRange::new(first.start(), first.start().saturating_add(out_block_size)),
            matrix_shape,
        });
    }

    let overflow = |block_size| ElementwiseError::SpanOverflow {
        start: ranges.start(),
        block_size,
        count: ranges.len(),
    };
    let input_span = ranges.span().ok_or_else(|| overflow(in_block_size))?;
    let output_span = ranges
        .span_with_block_size(out_block_size)
        .ok_or_else(|| overflow(out_block_size))?;
    validate_in_bounds(VectorRole::Operand, input_span, operand_len)?;
    validate_in_bounds(VectorRole::Result, output_span, result_len)?;
    Ok((input_span, output_span))
}

/// Accumulates `matrix * operand_i` into output block `i` for uniform ranges with one batched
/// multiply.
///
/// Output block `i` is `[s + i L_out, s + (i + 1) L_out)` where `L_out = matrix.nrows()`. For a
/// square matrix this coincides with the input range, and the result equals that of
/// [`apply`](crate::apply::apply).
pub fn apply_uniform<T, G>(
    ranges: &UniformRanges,
    matrix: DMatrixView<T>,
    access: VectorAccess<T>,
    gemm: &G,
) -> Result<(), ElementwiseError>
where
    T: Real,
    G: ?Sized + BatchedGemm<T>,
{
    let VectorAccess { operand, result } = access;
    let (input_span, output_span) = validate_uniform(ranges, matrix.shape(), operand.len(), result.len())?;
    if ranges.is_empty() {
        return Ok(());
    }

    debug!(
        "Batched apply of {}x{} operator to {} elements",
        matrix.nrows(),
        matrix.ncols(),
        ranges.len()
    );
    gemm.gemm_blocks(
        T::one(),
        matrix,
        &operand[input_span.as_range()],
        &mut result[output_span.as_range()],
    )
}

/// Accumulates `scale_factors[i] * matrix * operand_i` into output block `i` for uniform
/// ranges with one batched multiply.
///
/// The scaled operand blocks are first gathered into a scratch vector of the same length as
/// the operand, which is then handed to the multiply as a single `L x N` matrix. Output blocks
/// are laid out as in [`apply_uniform`].
pub fn apply_scaled_uniform<T, G>(
    ranges: &UniformRanges,
    scale_factors: &[T],
    matrix: DMatrixView<T>,
    access: VectorAccess<T>,
    gemm: &G,
) -> Result<(), ElementwiseError>
where
    T: Real,
    G: ?Sized + BatchedGemm<T>,
{
    let VectorAccess { operand, result } = access;
    validate_scale_factors(ranges.len(), scale_factors)?;
    let (input_span, output_span) = validate_uniform(ranges, matrix.shape(), operand.len(), result.len())?;
    if ranges.is_empty() {
        return Ok(());
    }

    debug!(
        "Batched scaled apply of {}x{} operator to {} elements",
        matrix.nrows(),
        matrix.ncols(),
        ranges.len()
    );

    // Entries outside the span are never read
    let mut scratch = vec![T::zero(); operand.len()];
    for (range, scale) in izip!(ranges.iter(), scale_factors) {
        let r = range.as_range();
        for (s, x) in izip!(&mut scratch[r.clone()], &operand[r]) {
            *s = *scale * *x;
        }
    }

    gemm.gemm_blocks(
        T::one(),
        matrix,
        &scratch[input_span.as_range()],
        &mut result[output_span.as_range()],
    )
}
