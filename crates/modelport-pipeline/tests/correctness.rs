use std::collections::VecDeque;
use std::time::Duration;

use anyhow::Result;
use modelport_core::{IOName, Runner, Sample, Shape, Tensor, TensorMetadata, TensorSpec};
use modelport_pipeline::{run_correctness, CorrectnessError, NonFiniteKind};

fn t(values: &[f32]) -> Tensor {
    Tensor::from_f32s(Shape::from_slice(&[values.len()]), values).unwrap()
}

fn output_sample(values: &[f32]) -> Sample {
    Sample::from_iter([(IOName::new("out"), t(values))])
}

fn output_metadata() -> TensorMetadata {
    TensorMetadata(vec![TensorSpec {
        name: IOName::new("out"),
        dtype: modelport_core::DType::F32,
        dims: vec![Some(2)],
    }])
}

/// Replays scripted outputs and records lifecycle calls.
struct ScriptedRunner {
    outputs: VecDeque<Sample>,
    active: bool,
    infer_calls: usize,
    deactivations: usize,
}

impl ScriptedRunner {
    fn new(outputs: impl IntoIterator<Item = Sample>) -> Self {
        Self {
            outputs: outputs.into_iter().collect(),
            active: false,
            infer_calls: 0,
            deactivations: 0,
        }
    }
}

impl Runner for ScriptedRunner {
    fn name(&self) -> &str {
        "scripted"
    }
    fn activate(&mut self) -> Result<()> {
        self.active = true;
        Ok(())
    }
    fn deactivate(&mut self) -> Result<()> {
        self.active = false;
        self.deactivations += 1;
        Ok(())
    }
    fn infer(&mut self, _sample: &Sample) -> Result<Sample> {
        anyhow::ensure!(self.active, "infer on inactive runner");
        self.infer_calls += 1;
        self.outputs
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("no scripted output left"))
    }
    fn last_inference_time(&self) -> Option<Duration> {
        None
    }
}

#[test]
fn perfect_match_writes_zero_tolerances() {
    let inputs = vec![output_sample(&[1.0, 2.0]), output_sample(&[3.0, 4.0])];
    let references = vec![output_sample(&[0.5, 1.5]), output_sample(&[2.5, 3.5])];
    let mut runner =
        ScriptedRunner::new([output_sample(&[0.5, 1.5]), output_sample(&[2.5, 3.5])]);

    let dir = tempfile::tempdir().unwrap();
    let results_path = dir.path().join("results.json");

    let results = run_correctness(
        &inputs,
        &references,
        &output_metadata(),
        &mut runner,
        &results_path,
    )
    .unwrap();

    assert_eq!(results["out"].atol, 0.0);
    assert_eq!(results["out"].rtol, 0.0);
    assert!(results_path.is_file());
    assert_eq!(runner.infer_calls, 2);
    assert_eq!(runner.deactivations, 1);
}

#[test]
fn deviation_is_tracked_across_samples() {
    let inputs = vec![output_sample(&[0.0, 0.0]), output_sample(&[0.0, 0.0])];
    let references = vec![output_sample(&[1.0, 2.0]), output_sample(&[1.0, 2.0])];
    // Second sample deviates more; the final tolerance must reflect it.
    let mut runner =
        ScriptedRunner::new([output_sample(&[1.0, 2.0]), output_sample(&[2.0, 2.0])]);

    let dir = tempfile::tempdir().unwrap();
    let results_path = dir.path().join("results.json");

    let results = run_correctness(
        &inputs,
        &references,
        &output_metadata(),
        &mut runner,
        &results_path,
    )
    .unwrap();

    assert!((results["out"].atol - 1.0).abs() < 1e-12);
    assert!((results["out"].rtol - 0.5).abs() < 1e-12);
}

#[test]
fn nan_output_aborts_before_remaining_samples() {
    let inputs = vec![
        output_sample(&[0.0, 0.0]),
        output_sample(&[0.0, 0.0]),
        output_sample(&[0.0, 0.0]),
    ];
    let references = vec![
        output_sample(&[1.0, 2.0]),
        output_sample(&[1.0, 2.0]),
        output_sample(&[1.0, 2.0]),
    ];
    let mut runner = ScriptedRunner::new([
        output_sample(&[1.0, 2.0]),
        output_sample(&[f32::NAN, 2.0]),
        output_sample(&[1.0, 2.0]),
    ]);

    let dir = tempfile::tempdir().unwrap();
    let results_path = dir.path().join("results.json");

    let err = run_correctness(
        &inputs,
        &references,
        &output_metadata(),
        &mut runner,
        &results_path,
    )
    .unwrap_err();

    match err {
        CorrectnessError::NonFiniteOutput { sample, kind, .. } => {
            assert_eq!(sample, 1);
            assert_eq!(kind, NonFiniteKind::Nan);
        }
        other => panic!("unexpected error: {other}"),
    }
    // Aborted mid-run: the third sample was never inferred and no
    // result file claims a successful completion.
    assert_eq!(runner.infer_calls, 2);
    assert!(!results_path.exists());
    // The scoped activation still released the runner.
    assert_eq!(runner.deactivations, 1);
    assert!(!runner.active);
}

#[test]
fn inf_output_is_fatal() {
    let inputs = vec![output_sample(&[0.0, 0.0])];
    let references = vec![output_sample(&[1.0, 2.0])];
    let mut runner = ScriptedRunner::new([output_sample(&[f32::INFINITY, 2.0])]);

    let dir = tempfile::tempdir().unwrap();
    let err = run_correctness(
        &inputs,
        &references,
        &output_metadata(),
        &mut runner,
        &dir.path().join("results.json"),
    )
    .unwrap_err();

    assert!(matches!(
        err,
        CorrectnessError::NonFiniteOutput {
            kind: NonFiniteKind::Inf,
            ..
        }
    ));
}

#[test]
fn output_count_mismatch_is_fatal() {
    let inputs = vec![output_sample(&[0.0, 0.0])];
    let references = vec![output_sample(&[1.0, 2.0])];
    // Runner returns two outputs where the reference has one.
    let extra = Sample::from_iter([
        (IOName::new("out"), t(&[1.0, 2.0])),
        (IOName::new("extra"), t(&[0.0])),
    ]);
    let mut runner = ScriptedRunner::new([extra]);

    let dir = tempfile::tempdir().unwrap();
    let err = run_correctness(
        &inputs,
        &references,
        &output_metadata(),
        &mut runner,
        &dir.path().join("results.json"),
    )
    .unwrap_err();

    assert!(matches!(
        err,
        CorrectnessError::OutputCountMismatch {
            sample: 0,
            expected: 1,
            actual: 2,
        }
    ));
}

#[test]
fn runner_errors_propagate() {
    // One scripted output for two samples: the second infer fails and
    // the error must surface to the caller.
    let inputs = vec![output_sample(&[0.0, 0.0]), output_sample(&[0.0, 0.0])];
    let references = vec![output_sample(&[1.0, 2.0]), output_sample(&[1.0, 2.0])];
    let mut runner = ScriptedRunner::new([output_sample(&[1.0, 2.0])]);

    let dir = tempfile::tempdir().unwrap();
    let err = run_correctness(
        &inputs,
        &references,
        &output_metadata(),
        &mut runner,
        &dir.path().join("results.json"),
    )
    .unwrap_err();

    assert!(matches!(err, CorrectnessError::Runner(_)));
    assert_eq!(runner.deactivations, 1);
}
