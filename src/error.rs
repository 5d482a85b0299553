//! Errors reported by elementwise operator application.
use crate::ranges::ElementRange;
use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};

/// Identifies one of the two vectors owned by an operator target.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VectorRole {
    Operand,
    Result,
}

impl Display for VectorRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operand => write!(f, "operand"),
            Self::Result => write!(f, "result"),
        }
    }
}

/// A capability that some code paths require from ranges, targets or the numeric backend.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Capability {
    /// The range collection must be expressible as [`UniformRanges`](crate::ranges::UniformRanges).
    UniformRanges,
    /// The target must expose its raw operand and result vectors.
    VectorAccess,
}

impl Display for Capability {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::UniformRanges => write!(f, "uniform element ranges"),
            Self::VectorAccess => write!(f, "raw vector access on the target"),
        }
    }
}

/// Library-wide error type.
///
/// Every variant indicates a programming error on the caller's side. The checks that produce
/// them run before the target is modified, so a failed call leaves the target untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ElementwiseError {
    /// A range was constructed with `start > end`.
    InvalidRange { start: usize, end: usize },
    /// The operator matrix does not fit the block of an element.
    BlockSizeMismatch {
        element: usize,
        input: ElementRange,
        output: ElementRange,
        matrix_shape: (usize, usize),
    },
    /// A kernel whose input and output ranges coincide was given a non-square operator.
    NonSquareOperator { matrix_shape: (usize, usize) },
    /// The number of scale factors differs from the number of elements.
    ScaleFactorCountMismatch { num_elements: usize, num_scale_factors: usize },
    /// Input and output range collections have different numbers of elements.
    RangeCountMismatch { num_input: usize, num_output: usize },
    /// A range reaches past the end of one of the target's vectors.
    OutOfBounds {
        vector: VectorRole,
        range: ElementRange,
        len: usize,
    },
    /// The span covered by uniform ranges cannot be represented as `usize`.
    SpanOverflow { start: usize, block_size: usize, count: usize },
    /// The flat buffers handed to a batched multiply do not match the matrix shape.
    BatchedShapeMismatch {
        matrix_shape: (usize, usize),
        operand_len: usize,
        result_len: usize,
    },
    /// The requested code path needs a capability that is not available.
    MissingCapability(Capability),
}

impl Display for ElementwiseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRange { start, end } => {
                write!(f, "Invalid element range [{}, {}): start exceeds end", start, end)
            }
            Self::BlockSizeMismatch {
                element,
                input,
                output,
                matrix_shape: (rows, cols),
            } => {
                write!(
                    f,
                    "Operator matrix of shape {}x{} does not fit element {} \
                     (input block of length {}, output block of length {})",
                    rows,
                    cols,
                    element,
                    input.len(),
                    output.len()
                )
            }
            Self::NonSquareOperator {
                matrix_shape: (rows, cols),
            } => {
                write!(
                    f,
                    "Operator matrix of shape {}x{} is not square, but input and output ranges coincide",
                    rows, cols
                )
            }
            Self::ScaleFactorCountMismatch {
                num_elements,
                num_scale_factors,
            } => {
                write!(
                    f,
                    "Got {} scale factors for {} elements",
                    num_scale_factors, num_elements
                )
            }
            Self::RangeCountMismatch { num_input, num_output } => {
                write!(
                    f,
                    "Input ranges have {} elements, but output ranges have {}",
                    num_input, num_output
                )
            }
            Self::OutOfBounds { vector, range, len } => {
                write!(
                    f,
                    "Range [{}, {}) is out of bounds for {} vector of length {}",
                    range.start(), range.end(), vector, len
                )
            }
            Self::SpanOverflow {
                start,
                block_size,
                count,
            } => {
                write!(
                    f,
                    "Span of {} blocks of size {} starting at {} overflows usize",
                    count, block_size, start
                )
            }
            Self::BatchedShapeMismatch {
                matrix_shape: (rows, cols),
                operand_len,
                result_len,
            } => {
                write!(
                    f,
                    "Batched multiply with matrix of shape {}x{} cannot map operand of length {} \
                     to result of length {}",
                    rows, cols, operand_len, result_len
                )
            }
            Self::MissingCapability(capability) => {
                write!(f, "Operation requires {}, which is not available", capability)
            }
        }
    }
}

impl Error for ElementwiseError {}
