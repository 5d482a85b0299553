//! Targets that receive the per-element matrix-vector products.
//!
//! A target owns (or borrows) the vectors that are read from and accumulated into. The
//! elementwise kernels only ever talk to a target through the [`OperatorTarget`] trait and never
//! own any vector storage themselves.
use crate::ranges::ElementRange;
use crate::Real;
use nalgebra::{DMatrixView, DVectorView, DVectorViewMut, Scalar};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// Raw access to the operand and result vectors of a target.
#[derive(Debug)]
pub struct VectorAccess<'a, T> {
    pub operand: &'a [T],
    pub result: &'a mut [T],
}

/// Receives `matrix * operand[input]` contributions to `result[output]`.
///
/// Implementations may panic if a range lies outside the target's vectors or if the matrix
/// shape does not match the ranges. The kernels in this crate validate all ranges against
/// [`operand_len`](Self::operand_len) and [`result_len`](Self::result_len) before the first
/// call, so that a failing operation never leaves a target partially updated.
pub trait OperatorTarget<T: Scalar> {
    /// The length of the vector that input ranges index into.
    fn operand_len(&self) -> usize;

    /// The length of the vector that output ranges index into.
    fn result_len(&self) -> usize;

    /// Accumulates `matrix * operand[input]` into `result[output]`.
    fn add_coefficients(&mut self, input: ElementRange, output: ElementRange, matrix: DMatrixView<T>);

    /// Accumulates `scale * matrix * operand[input]` into `result[output]`.
    fn add_scaled_coefficients(
        &mut self,
        input: ElementRange,
        output: ElementRange,
        scale: T,
        matrix: DMatrixView<T>,
    );

    /// Returns raw access to the underlying vectors, if the target is backed by flat vectors.
    fn vector_access(&mut self) -> Option<VectorAccess<'_, T>> {
        None
    }
}

impl<'b, T, Target> OperatorTarget<T> for &'b mut Target
where
    T: Scalar,
    Target: ?Sized + OperatorTarget<T>,
{
    fn operand_len(&self) -> usize {
        (**self).operand_len()
    }

    fn result_len(&self) -> usize {
        (**self).result_len()
    }

    fn add_coefficients(&mut self, input: ElementRange, output: ElementRange, matrix: DMatrixView<T>) {
        (**self).add_coefficients(input, output, matrix)
    }

    fn add_scaled_coefficients(
        &mut self,
        input: ElementRange,
        output: ElementRange,
        scale: T,
        matrix: DMatrixView<T>,
    ) {
        (**self).add_scaled_coefficients(input, output, scale, matrix)
    }

    fn vector_access(&mut self) -> Option<VectorAccess<'_, T>> {
        (**self).vector_access()
    }
}

/// A target that reads from a borrowed operand vector and accumulates into a borrowed
/// result vector.
///
/// The two vectors may have different lengths.
#[derive(Debug)]
pub struct VectorTarget<'a, T> {
    operand: &'a [T],
    result: &'a mut [T],
}

impl<'a, T: Real> VectorTarget<'a, T> {
    pub fn new(operand: &'a [T], result: &'a mut [T]) -> Self {
        Self { operand, result }
    }

    pub fn operand(&self) -> &[T] {
        self.operand
    }

    pub fn result(&self) -> &[T] {
        &*self.result
    }

    fn accumulate(&mut self, input: ElementRange, output: ElementRange, alpha: T, matrix: DMatrixView<T>) {
        let x = DVectorView::from_slice(&self.operand[input.as_range()], input.len());
        let mut y = DVectorViewMut::from_slice(&mut self.result[output.as_range()], output.len());
        y.gemv(alpha, &matrix, &x, T::one());
    }
}

impl<'a, T: Real> OperatorTarget<T> for VectorTarget<'a, T> {
    fn operand_len(&self) -> usize {
        self.operand.len()
    }

    fn result_len(&self) -> usize {
        self.result.len()
    }

    fn add_coefficients(&mut self, input: ElementRange, output: ElementRange, matrix: DMatrixView<T>) {
        self.accumulate(input, output, T::one(), matrix)
    }

    fn add_scaled_coefficients(
        &mut self,
        input: ElementRange,
        output: ElementRange,
        scale: T,
        matrix: DMatrixView<T>,
    ) {
        self.accumulate(input, output, scale, matrix)
    }

    fn vector_access(&mut self) -> Option<VectorAccess<'_, T>> {
        Some(VectorAccess {
            operand: self.operand,
            result: &mut *self.result,
        })
    }
}

/// A target that records the global operator instead of applying it.
///
/// Each contribution pushes the (scaled) element matrix as a block of a sparse matrix with
/// `result_len` rows and `operand_len` columns. Duplicate entries are summed when converting to
/// CSR, so applying the assembled matrix to an operand vector gives the same result as applying
/// the elementwise operator through a [`VectorTarget`].
#[derive(Debug, Clone)]
pub struct CooTarget<T> {
    matrix: CooMatrix<T>,
}

impl<T: Real> CooTarget<T> {
    pub fn new(result_len: usize, operand_len: usize) -> Self {
        Self {
            matrix: CooMatrix::new(result_len, operand_len),
        }
    }

    pub fn coo(&self) -> &CooMatrix<T> {
        &self.matrix
    }

    pub fn into_coo(self) -> CooMatrix<T> {
        self.matrix
    }

    pub fn into_csr(self) -> CsrMatrix<T> {
        CsrMatrix::from(&self.matrix)
    }

    fn push_block(&mut self, input: ElementRange, output: ElementRange, scale: T, matrix: DMatrixView<T>) {
        assert_eq!(matrix.nrows(), output.len(), "Matrix rows must match output range length");
        assert_eq!(matrix.ncols(), input.len(), "Matrix columns must match input range length");
        for j in 0..matrix.ncols() {
            for i in 0..matrix.nrows() {
                self.matrix
                    .push(output.start() + i, input.start() + j, scale * matrix[(i, j)]);
            }
        }
    }
}

impl<T: Real> OperatorTarget<T> for CooTarget<T> {
    fn operand_len(&self) -> usize {
        self.matrix.ncols()
    }

    fn result_len(&self) -> usize {
        self.matrix.nrows()
    }

    fn add_coefficients(&mut self, input: ElementRange, output: ElementRange, matrix: DMatrixView<T>) {
        self.push_block(input, output, T::one(), matrix)
    }

    fn add_scaled_coefficients(
        &mut self,
        input: ElementRange,
        output: ElementRange,
        scale: T,
        matrix: DMatrixView<T>,
    ) {
        self.push_block(input, output, scale, matrix)
    }
}
