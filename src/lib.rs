//! Elementwise application of local operators.
//!
//! In discontinuous discretizations every mesh element owns a contiguous slice of a global
//! coefficient vector, and many operators (differentiation, lifting, inverse mass) act on each
//! element's slice independently through a small dense matrix. This crate applies such a
//! matrix to all elements at once, optionally with a per-element scale factor, and
//! accumulates the result into an [`OperatorTarget`](target::OperatorTarget).
//!
//! # Matrix convention
//!
//! The operator is an nalgebra matrix of shape `out_block_size x in_block_size`, and element
//! `i` receives `result[output_i] += M * operand[input_i]`. Because nalgebra stores matrices
//! column-major, the same memory read row-major is `M^T`, which is the layout expected by
//! row-major BLAS-style routines computing `A^T * B`.
//!
//! # Kernels
//!
//! - [`apply::apply`] and [`apply::apply_scaled`] hand each element to the target and work with
//!   any [`ElementRanges`](ranges::ElementRanges) collection.
//! - [`batched::apply_scaled_uniform`] treats all elements of
//!   [`UniformRanges`](ranges::UniformRanges) as one `L x N` matrix and performs a single
//!   matrix-matrix product.
//! - [`strategy`] puts these (and a rayon-parallel kernel) behind a common trait.
pub mod apply;
pub mod batched;
pub mod error;
pub mod parallel;
pub mod ranges;
pub mod strategy;
pub mod target;

#[cfg(feature = "proptest")]
pub mod proptest;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

use nalgebra::RealField;

/// Scalar types supported by the kernels.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}
