//! Generic elementwise application of a local operator.
//!
//! These functions work with any [`ElementRanges`] collection and any [`OperatorTarget`]. Each
//! element is handed to the target individually, which makes this the baseline that the
//! batched and parallel kernels are compared against.
use crate::error::{ElementwiseError, VectorRole};
use crate::ranges::{ElementRange, ElementRanges};
use crate::target::OperatorTarget;
use nalgebra::{DMatrixView, Scalar};

/// Accumulates `matrix * operand[r]` into `result[r]` for every range `r`.
///
/// Input and output of each element occupy the same index range, so `matrix` must be square
/// with the size of every range. All ranges are validated before the target is touched.
pub fn apply<T, R, Target>(ranges: &R, matrix: DMatrixView<T>, target: Target) -> Result<(), ElementwiseError>
where
    T: Scalar,
    R: ?Sized + ElementRanges,
    Target: OperatorTarget<T>,
{
    apply_paired(ranges, ranges, matrix, target)
}

/// Accumulates `scale_factors[i] * matrix * operand[r_i]` into `result[r_i]` for every range.
///
/// The `i`-th scale factor belongs to the `i`-th range in iteration order.
pub fn apply_scaled<T, R, Target>(
    ranges: &R,
    scale_factors: &[T],
    matrix: DMatrixView<T>,
    target: Target,
) -> Result<(), ElementwiseError>
where
    T: Scalar + Copy,
    R: ?Sized + ElementRanges,
    Target: OperatorTarget<T>,
{
    apply_paired_scaled(ranges, ranges, scale_factors, matrix, target)
}

/// Accumulates `matrix * operand[input_i]` into `result[output_i]`, pairing input and output
/// ranges by position.
///
/// This allows operators whose output block differs in size or location from the input block,
/// such as lifting operators.
pub fn apply_paired<T, In, Out, Target>(
    input_ranges: &In,
    output_ranges: &Out,
    matrix: DMatrixView<T>,
    mut target: Target,
) -> Result<(), ElementwiseError>
where
    T: Scalar,
    In: ?Sized + ElementRanges,
    Out: ?Sized + ElementRanges,
    Target: OperatorTarget<T>,
{
    validate_paired(input_ranges, output_ranges, &matrix, &target)?;
    for (input, output) in input_ranges.ranges().zip(output_ranges.ranges()) {
        target.add_coefficients(input, output, matrix.clone());
    }
    Ok(())
}

/// Scaled version of [`apply_paired`].
pub fn apply_paired_scaled<T, In, Out, Target>(
    input_ranges: &In,
    output_ranges: &Out,
    scale_factors: &[T],
    matrix: DMatrixView<T>,
    mut target: Target,
) -> Result<(), ElementwiseError>
where
    T: Scalar + Copy,
    In: ?Sized + ElementRanges,
    Out: ?Sized + ElementRanges,
    Target: OperatorTarget<T>,
{
    validate_scale_factors(input_ranges.num_elements(), scale_factors)?;
    validate_paired(input_ranges, output_ranges, &matrix, &target)?;
    let pairs = input_ranges.ranges().zip(output_ranges.ranges());
    for ((input, output), scale) in pairs.zip(scale_factors) {
        target.add_scaled_coefficients(input, output, *scale, matrix.clone());
    }
    Ok(())
}

pub(crate) fn validate_scale_factors<T>(num_elements: usize, scale_factors: &[T]) -> Result<(), ElementwiseError> {
    if scale_factors.len() == num_elements {
        Ok(())
    } else {
        Err(ElementwiseError::ScaleFactorCountMismatch {
            num_elements,
            num_scale_factors: scale_factors.len(),
        })
    }
}

pub(crate) fn validate_in_bounds(vector: VectorRole, range: ElementRange, len: usize) -> Result<(), ElementwiseError> {
    if range.end() <= len {
        Ok(())
    } else {
        Err(ElementwiseError::OutOfBounds { vector, range, len })
    }
}

fn validate_paired<T, In, Out, Target>(
    input_ranges: &In,
    output_ranges: &Out,
    matrix: &DMatrixView<T>,
    target: &Target,
) -> Result<(), ElementwiseError>
where
    T: Scalar,
    In: ?Sized + ElementRanges,
    Out: ?Sized + ElementRanges,
    Target: OperatorTarget<T>,
{
    let num_input = input_ranges.num_elements();
    let num_output = output_ranges.num_elements();
    if num_input != num_output {
        return Err(ElementwiseError::RangeCountMismatch { num_input, num_output });
    }
    input_ranges.validate()?;
    output_ranges.validate()?;

    let operand_len = target.operand_len();
    let result_len = target.result_len();
    let pairs = input_ranges.ranges().zip(output_ranges.ranges());
    for (element, (input, output)) in pairs.enumerate() {
        if matrix.ncols() != input.len() || matrix.nrows() != output.len() {
            return Err(ElementwiseError::BlockSizeMismatch {
                element,
                input,
                output,
                matrix_shape: matrix.shape(),
            });
        }
        validate_in_bounds(VectorRole::Operand, input, operand_len)?;
        validate_in_bounds(VectorRole::Result, output, result_len)?;
    }
    Ok(())
}
