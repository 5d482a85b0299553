use elwise::batched::NalgebraGemm;
use elwise::error::{Capability, ElementwiseError};
use elwise::nalgebra::{DMatrix, DVector};
use elwise::ranges::{ElementRange, NonuniformRanges, UniformRanges};
use elwise::strategy::{ApplyStrategy, Batched, Elementwise, ElementwiseKernel, ParallelBlocks};
use elwise::target::{CooTarget, VectorTarget};
use matrixcompare::assert_matrix_eq;
use proptest::prelude::*;

#[test]
fn kernels_agree_on_concrete_example() {
    let ranges = UniformRanges::new(0, 2, 3);
    let operand = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    let factors = [1.0, 2.0, 3.0];
    let matrix = DMatrix::<f64>::identity(2, 2);
    let expected = vec![1.0, 2.0, 6.0, 8.0, 15.0, 18.0];

    let mut result = vec![0.0; 6];
    Elementwise
        .apply_scaled(&ranges, &factors, matrix.as_view(), VectorTarget::new(&operand, &mut result))
        .unwrap();
    assert_eq!(result, expected);

    let mut result = vec![0.0; 6];
    Batched::new(NalgebraGemm)
        .apply_scaled(&ranges, &factors, matrix.as_view(), VectorTarget::new(&operand, &mut result))
        .unwrap();
    assert_eq!(result, expected);

    let mut result = vec![0.0; 6];
    ParallelBlocks
        .apply_scaled(&ranges, &factors, matrix.as_view(), VectorTarget::new(&operand, &mut result))
        .unwrap();
    assert_eq!(result, expected);
}

#[test]
fn batched_kernel_accepts_nonuniform_collection_with_uniform_layout() {
    let ranges: NonuniformRanges = UniformRanges::new(1, 2, 2).iter().collect();
    let operand = vec![0.0, 1.0, 2.0, 3.0, 4.0];
    let matrix = DMatrix::<f64>::from_element(2, 2, 1.0);
    let mut result = vec![0.0; 5];
    Batched::new(NalgebraGemm)
        .apply(&ranges, matrix.as_view(), VectorTarget::new(&operand, &mut result))
        .unwrap();
    assert_eq!(result, vec![0.0, 3.0, 3.0, 7.0, 7.0]);
}

#[test]
fn batched_kernel_requires_uniform_ranges() {
    let ranges: NonuniformRanges = vec![ElementRange::new(0, 2), ElementRange::new(3, 5)]
        .into_iter()
        .collect();
    let operand = vec![1.0; 5];
    let matrix = DMatrix::<f64>::identity(2, 2);
    let mut result = vec![0.0; 5];
    let err = Batched::new(NalgebraGemm)
        .apply_scaled(&ranges, &[1.0, 1.0], matrix.as_view(), VectorTarget::new(&operand, &mut result))
        .unwrap_err();
    assert_eq!(err, ElementwiseError::MissingCapability(Capability::UniformRanges));
    assert!(result.iter().all(|&x| x == 0.0));
}

#[test]
fn batched_kernel_requires_vector_access() {
    let ranges = UniformRanges::new(0, 2, 2);
    let matrix = DMatrix::<f64>::identity(2, 2);
    let mut target = CooTarget::new(4, 4);
    let err = Batched::new(NalgebraGemm)
        .apply(&ranges, matrix.as_view(), &mut target)
        .unwrap_err();
    assert_eq!(err, ElementwiseError::MissingCapability(Capability::VectorAccess));
    assert_eq!(target.coo().nnz(), 0);

    let err = ParallelBlocks
        .apply(&ranges, matrix.as_view(), &mut target)
        .unwrap_err();
    assert_eq!(err, ElementwiseError::MissingCapability(Capability::VectorAccess));
}

#[test]
fn batched_kernel_rejects_non_square_operator() {
    let ranges = UniformRanges::new(0, 2, 2);
    let matrix = DMatrix::<f64>::zeros(3, 2);
    let operand = vec![1.0; 6];
    let mut result = vec![0.0; 6];
    let err = Batched::new(NalgebraGemm)
        .apply(&ranges, matrix.as_view(), VectorTarget::new(&operand, &mut result))
        .unwrap_err();
    assert_eq!(err, ElementwiseError::NonSquareOperator { matrix_shape: (3, 2) });
    insta::assert_snapshot!(err.to_string(), @"Operator matrix of shape 3x2 is not square, but input and output ranges coincide");

    let err = ParallelBlocks
        .apply(&ranges, matrix.as_view(), VectorTarget::new(&operand, &mut result))
        .unwrap_err();
    assert_eq!(err, ElementwiseError::NonSquareOperator { matrix_shape: (3, 2) });
    assert!(result.iter().all(|&x| x == 0.0));
}

#[test]
fn uniform_kernels_report_overflowing_first_block() {
    let ranges = UniformRanges::new(usize::MAX - 1, 4, 1);
    let matrix = DMatrix::<f64>::identity(4, 4);
    let operand = vec![1.0; 4];
    let mut result = vec![0.0; 4];
    let expected = ElementwiseError::SpanOverflow {
        start: usize::MAX - 1,
        block_size: 4,
        count: 1,
    };
    for strategy in [
        ApplyStrategy::Elementwise,
        ApplyStrategy::Batched,
        ApplyStrategy::Parallel,
        ApplyStrategy::Auto,
    ] {
        let err = strategy
            .apply_scaled(&ranges, &[2.0], matrix.as_view(), VectorTarget::new(&operand, &mut result))
            .unwrap_err();
        assert_eq!(err, expected);
    }
    assert!(result.iter().all(|&x| x == 0.0));
}

#[test]
fn auto_strategy_resolution() {
    let uniform = UniformRanges::new(0, 2, 2);
    let nonuniform: NonuniformRanges = vec![ElementRange::new(2, 4), ElementRange::new(0, 2)]
        .into_iter()
        .collect();
    let square = DMatrix::<f64>::identity(2, 2);
    let operand = vec![1.0; 4];
    let mut result = vec![0.0; 4];

    let mut vector_target = VectorTarget::new(&operand, &mut result);
    let mut coo_target = CooTarget::<f64>::new(4, 4);

    let auto = ApplyStrategy::Auto;
    assert_eq!(
        auto.resolve(&uniform, &square.as_view(), &mut vector_target),
        ApplyStrategy::Batched
    );
    assert_eq!(
        auto.resolve(&nonuniform, &square.as_view(), &mut vector_target),
        ApplyStrategy::Elementwise
    );
    assert_eq!(
        auto.resolve(&uniform, &square.as_view(), &mut coo_target),
        ApplyStrategy::Elementwise
    );
    assert_eq!(
        ApplyStrategy::Parallel.resolve(&nonuniform, &square.as_view(), &mut coo_target),
        ApplyStrategy::Parallel
    );
}

#[test]
fn auto_strategy_falls_back_to_elementwise_for_matrix_targets() {
    let ranges = UniformRanges::new(0, 2, 2);
    let matrix = DMatrix::<f64>::from_element(2, 2, 1.0);
    let mut target = CooTarget::new(4, 4);
    ApplyStrategy::Auto
        .apply_scaled(&ranges, &[1.0, 2.0], matrix.as_view(), &mut target)
        .unwrap();
    assert_eq!(target.coo().nnz(), 8);
}

#[test]
fn explicit_strategies_do_not_fall_back() {
    let ranges: NonuniformRanges = vec![ElementRange::new(2, 4), ElementRange::new(0, 2)]
        .into_iter()
        .collect();
    let matrix = DMatrix::<f64>::identity(2, 2);
    let operand = vec![1.0; 4];
    let mut result = vec![0.0; 4];
    for strategy in [ApplyStrategy::Batched, ApplyStrategy::Parallel] {
        let err = strategy
            .apply(&ranges, matrix.as_view(), VectorTarget::new(&operand, &mut result))
            .unwrap_err();
        assert_eq!(err, ElementwiseError::MissingCapability(Capability::UniformRanges));
    }
}

#[test]
fn strategy_is_configurable_from_json_and_strings() {
    #[derive(Debug, serde::Deserialize)]
    struct SolverConfig {
        #[serde(default)]
        strategy: ApplyStrategy,
    }

    let config: SolverConfig = serde_json::from_str(r#"{ "strategy": "batched" }"#).unwrap();
    assert_eq!(config.strategy, ApplyStrategy::Batched);
    let config: SolverConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config.strategy, ApplyStrategy::Elementwise);
    assert!(serde_json::from_str::<SolverConfig>(r#"{ "strategy": "blas" }"#).is_err());

    assert_eq!("auto".parse::<ApplyStrategy>(), Ok(ApplyStrategy::Auto));
    assert_eq!(ApplyStrategy::Parallel.to_string(), "parallel");
    let err = "fast".parse::<ApplyStrategy>().unwrap_err();
    insta::assert_snapshot!(err.to_string(), @r###"Unknown strategy "fast", expected one of: elementwise, batched, parallel, auto"###);
}

proptest! {
    #[test]
    fn every_strategy_agrees_with_elementwise(
        (ranges, matrix, factors, operand) in elwise::proptest::uniform_problem(),
        strategy in prop_oneof![
            Just(ApplyStrategy::Elementwise),
            Just(ApplyStrategy::Batched),
            Just(ApplyStrategy::Parallel),
            Just(ApplyStrategy::Auto)
        ]
    ) {
        let len = operand.len();
        let mut expected = vec![0.0; len];
        Elementwise
            .apply_scaled(&ranges, &factors, matrix.as_view(), VectorTarget::new(&operand, &mut expected))
            .unwrap();

        let mut result = vec![0.0; len];
        strategy
            .apply_scaled(&ranges, &factors, matrix.as_view(), VectorTarget::new(&operand, &mut result))
            .unwrap();

        assert_matrix_eq!(DVector::from_vec(result), DVector::from_vec(expected), comp = abs, tol = 1e-9);
    }
}
