//! Interchangeable kernels behind a single interface.
//!
//! [`Elementwise`] works with every range collection and every target. [`Batched`] and
//! [`ParallelBlocks`] only work with ranges that are expressible as
//! [`UniformRanges`](crate::ranges::UniformRanges) and targets that expose their vectors
//! through [`OperatorTarget::vector_access`]. They report
//! [`ElementwiseError::MissingCapability`] otherwise instead of quietly taking another path.
//! [`ApplyStrategy`] selects a kernel from configuration.
use crate::apply;
use crate::batched::{apply_scaled_uniform, apply_uniform, BatchedGemm, NalgebraGemm};
use crate::error::{Capability, ElementwiseError};
use crate::parallel::par_apply_uniform;
use crate::ranges::{ElementRanges, UniformRanges};
use crate::target::{OperatorTarget, VectorAccess};
use crate::Real;
use log::debug;
use nalgebra::DMatrixView;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Applies a local operator to every element of a range collection.
///
/// Input and output of each element occupy the same range, see [`apply::apply`].
pub trait ElementwiseKernel<T: Real> {
    fn apply<R, Target>(&self, ranges: &R, matrix: DMatrixView<T>, target: Target) -> Result<(), ElementwiseError>
    where
        R: ?Sized + ElementRanges,
        Target: OperatorTarget<T>;

    fn apply_scaled<R, Target>(
        &self,
        ranges: &R,
        scale_factors: &[T],
        matrix: DMatrixView<T>,
        target: Target,
    ) -> Result<(), ElementwiseError>
    where
        R: ?Sized + ElementRanges,
        Target: OperatorTarget<T>;
}

/// The per-element kernel. Always available.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Elementwise;

impl<T: Real> ElementwiseKernel<T> for Elementwise {
    fn apply<R, Target>(&self, ranges: &R, matrix: DMatrixView<T>, target: Target) -> Result<(), ElementwiseError>
    where
        R: ?Sized + ElementRanges,
        Target: OperatorTarget<T>,
    {
        apply::apply(ranges, matrix, target)
    }

    fn apply_scaled<R, Target>(
        &self,
        ranges: &R,
        scale_factors: &[T],
        matrix: DMatrixView<T>,
        target: Target,
    ) -> Result<(), ElementwiseError>
    where
        R: ?Sized + ElementRanges,
        Target: OperatorTarget<T>,
    {
        apply::apply_scaled(ranges, scale_factors, matrix, target)
    }
}

fn require_uniform<R: ?Sized + ElementRanges>(ranges: &R) -> Result<UniformRanges, ElementwiseError> {
    ranges
        .as_uniform()
        .ok_or(ElementwiseError::MissingCapability(Capability::UniformRanges))
}

fn require_vector_access<T, Target>(target: &mut Target) -> Result<VectorAccess<'_, T>, ElementwiseError>
where
    T: Real,
    Target: OperatorTarget<T>,
{
    target
        .vector_access()
        .ok_or(ElementwiseError::MissingCapability(Capability::VectorAccess))
}

/// The batched kernel, which performs a single dense multiply across all elements.
///
/// The operator matrix must be square, since input and output ranges coincide.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Batched<G = NalgebraGemm> {
    gemm: G,
}

impl<G> Batched<G> {
    pub fn new(gemm: G) -> Self {
        Self { gemm }
    }

    pub fn gemm(&self) -> &G {
        &self.gemm
    }
}

fn require_square<T: Real>(matrix: &DMatrixView<T>, uniform: &UniformRanges) -> Result<(), ElementwiseError> {
    if uniform.is_empty() || matrix.is_square() {
        Ok(())
    } else {
        Err(ElementwiseError::NonSquareOperator {
            matrix_shape: matrix.shape(),
        })
    }
}

impl<T, G> ElementwiseKernel<T> for Batched<G>
where
    T: Real,
    G: BatchedGemm<T>,
{
    fn apply<R, Target>(&self, ranges: &R, matrix: DMatrixView<T>, mut target: Target) -> Result<(), ElementwiseError>
    where
        R: ?Sized + ElementRanges,
        Target: OperatorTarget<T>,
    {
        let uniform = require_uniform(ranges)?;
        require_square(&matrix, &uniform)?;
        let access = require_vector_access(&mut target)?;
        apply_uniform(&uniform, matrix, access, &self.gemm)
    }

    fn apply_scaled<R, Target>(
        &self,
        ranges: &R,
        scale_factors: &[T],
        matrix: DMatrixView<T>,
        mut target: Target,
    ) -> Result<(), ElementwiseError>
    where
        R: ?Sized + ElementRanges,
        Target: OperatorTarget<T>,
    {
        let uniform = require_uniform(ranges)?;
        require_square(&matrix, &uniform)?;
        let access = require_vector_access(&mut target)?;
        apply_scaled_uniform(&uniform, scale_factors, matrix, access, &self.gemm)
    }
}

/// A kernel that processes the disjoint blocks of uniform ranges in parallel with rayon.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ParallelBlocks;

impl<T> ElementwiseKernel<T> for ParallelBlocks
where
    T: Real + Send + Sync,
{
    fn apply<R, Target>(&self, ranges: &R, matrix: DMatrixView<T>, mut target: Target) -> Result<(), ElementwiseError>
    where
        R: ?Sized + ElementRanges,
        Target: OperatorTarget<T>,
    {
        let uniform = require_uniform(ranges)?;
        require_square(&matrix, &uniform)?;
        let access = require_vector_access(&mut target)?;
        par_apply_uniform(&uniform, None, matrix, access)
    }

    fn apply_scaled<R, Target>(
        &self,
        ranges: &R,
        scale_factors: &[T],
        matrix: DMatrixView<T>,
        mut target: Target,
    ) -> Result<(), ElementwiseError>
    where
        R: ?Sized + ElementRanges,
        Target: OperatorTarget<T>,
    {
        let uniform = require_uniform(ranges)?;
        require_square(&matrix, &uniform)?;
        let access = require_vector_access(&mut target)?;
        par_apply_uniform(&uniform, Some(scale_factors), matrix, access)
    }
}

/// Kernel selection, typically read from a solver configuration.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyStrategy {
    /// Always use [`Elementwise`].
    #[default]
    Elementwise,
    /// Always use [`Batched`] with [`NalgebraGemm`]. Fails if it is not applicable.
    Batched,
    /// Always use [`ParallelBlocks`]. Fails if it is not applicable.
    Parallel,
    /// Use [`Batched`] when the ranges are uniform and the target exposes its vectors,
    /// and [`Elementwise`] otherwise.
    Auto,
}

impl ApplyStrategy {
    /// Resolves [`ApplyStrategy::Auto`] for the given ranges and target.
    ///
    /// Other strategies are returned unchanged.
    pub fn resolve<T, R, Target>(&self, ranges: &R, matrix: &DMatrixView<T>, target: &mut Target) -> ApplyStrategy
    where
        T: Real,
        R: ?Sized + ElementRanges,
        Target: OperatorTarget<T>,
    {
        match self {
            Self::Auto => {
                let uniform = ranges.as_uniform().is_some();
                let has_access = target.vector_access().is_some();
                let resolved = if uniform && has_access && matrix.is_square() {
                    Self::Batched
                } else {
                    Self::Elementwise
                };
                debug!(
                    "Resolved automatic strategy to {} (uniform ranges: {}, vector access: {})",
                    resolved, uniform, has_access
                );
                resolved
            }
            other => *other,
        }
    }

    pub fn apply<T, R, Target>(&self, ranges: &R, matrix: DMatrixView<T>, mut target: Target) -> Result<(), ElementwiseError>
    where
        T: Real + Send + Sync,
        R: ?Sized + ElementRanges,
        Target: OperatorTarget<T>,
    {
        match self.resolve(ranges, &matrix, &mut target) {
            Self::Batched => Batched::<NalgebraGemm>::default().apply(ranges, matrix, target),
            Self::Parallel => ParallelBlocks.apply(ranges, matrix, target),
            _ => Elementwise.apply(ranges, matrix, target),
        }
    }

    pub fn apply_scaled<T, R, Target>(
        &self,
        ranges: &R,
        scale_factors: &[T],
        matrix: DMatrixView<T>,
        mut target: Target,
    ) -> Result<(), ElementwiseError>
    where
        T: Real + Send + Sync,
        R: ?Sized + ElementRanges,
        Target: OperatorTarget<T>,
    {
        match self.resolve(ranges, &matrix, &mut target) {
            Self::Batched => Batched::<NalgebraGemm>::default().apply_scaled(ranges, scale_factors, matrix, target),
            Self::Parallel => ParallelBlocks.apply_scaled(ranges, scale_factors, matrix, target),
            _ => Elementwise.apply_scaled(ranges, scale_factors, matrix, target),
        }
    }
}

impl fmt::Display for ApplyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Elementwise => "elementwise",
            Self::Batched => "batched",
            Self::Parallel => "parallel",
            Self::Auto => "auto",
        };
        write!(f, "{}", name)
    }
}

/// Error returned when parsing an unknown strategy name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStrategyError(pub String);

impl fmt::Display for UnknownStrategyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unknown strategy \"{}\", expected one of: elementwise, batched, parallel, auto",
            self.0
        )
    }
}

impl std::error::Error for UnknownStrategyError {}

impl FromStr for ApplyStrategy {
    type Err = UnknownStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "elementwise" => Ok(Self::Elementwise),
            "batched" => Ok(Self::Batched),
            "parallel" => Ok(Self::Parallel),
            "auto" => Ok(Self::Auto),
            other => Err(UnknownStrategyError(other.to_string())),
        }
    }
}
