use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};
use modelport_core::{IOName, Tensor};
use serde::{Deserialize, Serialize};

/// Worst-case absolute/relative deviation observed for one output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    pub atol: f64,
    pub rtol: f64,
}

/// Per-output running maximum of absolute and relative error between a
/// reference run and a comparison run.
///
/// Relative error divides by the comparison value without a zero
/// guard. A zero comparison element with a nonzero difference yields
/// an infinite relative deviation that dominates the tracked maximum;
/// two exactly-equal zeros yield NaN, which the max-reduction discards
/// (`f64::max` returns the other operand for NaN), leaving `rtol`
/// untouched. That mirrors the reference tooling; callers that expect
/// exact-zero outputs should rely on `atol` only.
#[derive(Clone, Debug)]
pub struct ToleranceTracker {
    per_output: Vec<(IOName, Tolerance)>,
}

impl ToleranceTracker {
    /// All tolerances start at zero and only ratchet upward.
    pub fn new(output_names: impl IntoIterator<Item = IOName>) -> Self {
        Self {
            per_output: output_names
                .into_iter()
                .map(|name| (name, Tolerance::default()))
                .collect(),
        }
    }

    pub fn update(&mut self, name: &IOName, reference: &Tensor, comparison: &Tensor) -> Result<()> {
        let slot = self
            .per_output
            .iter_mut()
            .find_map(|(n, tol)| (n == name).then_some(tol))
            .with_context(|| format!("output `{name}` is not tracked"))?;

        let reference = reference.to_f64_vec()?;
        let comparison = comparison.to_f64_vec()?;
        anyhow::ensure!(
            reference.len() == comparison.len(),
            "output `{name}` element count mismatch: reference {}, comparison {}",
            reference.len(),
            comparison.len(),
        );

        let mut max_absdiff = 0.0f64;
        let mut max_reldiff = 0.0f64;
        for (r, c) in reference.iter().zip(&comparison) {
            let absdiff = (r - c).abs();
            let reldiff = absdiff / c.abs();
            max_absdiff = max_absdiff.max(absdiff);
            max_reldiff = max_reldiff.max(reldiff);
        }

        if max_absdiff > slot.atol {
            slot.atol = max_absdiff;
        }
        if max_reldiff > slot.rtol {
            slot.rtol = max_reldiff;
        }
        Ok(())
    }

    pub fn get(&self, name: &IOName) -> Option<Tolerance> {
        self.per_output
            .iter()
            .find_map(|(n, tol)| (n == name).then_some(*tol))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IOName, Tolerance)> {
        self.per_output.iter().map(|(n, t)| (n, *t))
    }

    /// Final mapping in result-file form.
    pub fn to_results(&self) -> BTreeMap<String, Tolerance> {
        self.per_output
            .iter()
            .map(|(n, t)| (n.0.clone(), *t))
            .collect()
    }
}

/// Writes the result file: a JSON object mapping output name to
/// `{atol, rtol}`.
pub fn write_tolerance_results(path: &Path, results: &BTreeMap<String, Tolerance>) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create results file {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), results)
        .with_context(|| format!("failed to write results to {}", path.display()))?;
    Ok(())
}

pub fn read_tolerance_results(path: &Path) -> Result<BTreeMap<String, Tolerance>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open results file {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse results from {}", path.display()))
}
