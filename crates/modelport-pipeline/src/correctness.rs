use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use modelport_core::{ActiveRunner, Runner, Sample, TensorMetadata};
use thiserror::Error;
use tracing::{debug, info};

use crate::tolerance::{write_tolerance_results, Tolerance, ToleranceTracker};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NonFiniteKind {
    Nan,
    Inf,
}

impl std::fmt::Display for NonFiniteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NonFiniteKind::Nan => f.write_str("NaN"),
            NonFiniteKind::Inf => f.write_str("inf"),
        }
    }
}

/// Fatal conditions that abort a correctness run. These terminate the
/// whole command; remaining samples are not processed and no result
/// file is written. Runner errors pass through the `Runner` variant
/// untouched so the caller decides how to report them.
#[derive(Debug, Error)]
pub enum CorrectnessError {
    #[error(
        "sample {sample}: reference output has {expected} tensors but runner returned {actual}"
    )]
    OutputCountMismatch {
        sample: usize,
        expected: usize,
        actual: usize,
    },

    #[error("sample {sample}: comparison output `{output}` contains {kind}")]
    NonFiniteOutput {
        sample: usize,
        output: String,
        kind: NonFiniteKind,
    },

    #[error("sample {sample}: runner produced no output named `{output}`")]
    MissingOutput { sample: usize, output: String },

    #[error("sample count mismatch: {inputs} inputs but {references} reference outputs")]
    SampleCountMismatch { inputs: usize, references: usize },

    #[error("failed to write results to {path}")]
    WriteResults {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Runner(#[from] anyhow::Error),
}

/// Replays paired (input, reference-output) samples through `runner`
/// and tracks worst-case per-output deviation.
///
/// The runner is activated for the duration of the replay and released
/// on every exit path. On success the final tolerances are written to
/// `results_path` and returned.
pub fn run_correctness(
    inputs: &[Sample],
    references: &[Sample],
    output_metadata: &TensorMetadata,
    runner: &mut dyn Runner,
    results_path: &Path,
) -> Result<BTreeMap<String, Tolerance>, CorrectnessError> {
    if inputs.len() != references.len() {
        return Err(CorrectnessError::SampleCountMismatch {
            inputs: inputs.len(),
            references: references.len(),
        });
    }

    let mut tracker = ToleranceTracker::new(output_metadata.names().cloned());

    {
        let mut active = ActiveRunner::activate(runner)?;
        for (idx, (input, reference)) in inputs.iter().zip(references).enumerate() {
            let comparison = active.infer(input)?;

            if comparison.len() != reference.len() {
                return Err(CorrectnessError::OutputCountMismatch {
                    sample: idx,
                    expected: reference.len(),
                    actual: comparison.len(),
                });
            }

            for name in output_metadata.names() {
                let comp = comparison.get(name).ok_or_else(|| {
                    CorrectnessError::MissingOutput {
                        sample: idx,
                        output: name.0.clone(),
                    }
                })?;
                let reference = reference.get(name).ok_or_else(|| {
                    CorrectnessError::MissingOutput {
                        sample: idx,
                        output: name.0.clone(),
                    }
                })?;

                if let Some(kind) = non_finite_kind(comp)? {
                    return Err(CorrectnessError::NonFiniteOutput {
                        sample: idx,
                        output: name.0.clone(),
                        kind,
                    });
                }

                tracker.update(name, reference, comp)?;
            }
            debug!(sample = idx, "compared sample");
        }
    }

    let results = tracker.to_results();
    write_tolerance_results(results_path, &results).map_err(|source| {
        CorrectnessError::WriteResults {
            path: results_path.to_path_buf(),
            source,
        }
    })?;
    info!(
        samples = inputs.len(),
        results = %results_path.display(),
        "correctness run finished"
    );
    Ok(results)
}

fn non_finite_kind(tensor: &modelport_core::Tensor) -> Result<Option<NonFiniteKind>, anyhow::Error> {
    let values = tensor.to_f64_vec()?;
    if values.iter().any(|v| v.is_nan()) {
        return Ok(Some(NonFiniteKind::Nan));
    }
    if values.iter().any(|v| v.is_infinite()) {
        return Ok(Some(NonFiniteKind::Inf));
    }
    Ok(None)
}
