use anyhow::{Context, Result};
use modelport_core::{ActiveRunner, Runner, Sample};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::telemetry::GpuTelemetry;

/// Warmup-and-measure iterations per batch size. Median across them is
/// reported, which is robust to the occasional outlier in a way the
/// mean is not.
pub const MEASUREMENT_ITERATIONS: usize = 10;

/// One measured data point: latency and derived throughput for a
/// single batch size.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub batch_size: usize,
    pub latency_ms: f64,
    pub throughput: f64,
}

/// Measured records plus the hardware state observed while they were
/// being taken.
#[derive(Clone, Debug)]
pub struct PerformanceMeasurement {
    pub records: Vec<PerformanceRecord>,
    /// Mean of the GPU clock readings sampled between measurement
    /// iterations, while the runner session was still live. `None`
    /// when no telemetry was supplied, telemetry is unavailable, or
    /// no GPU was busy during the run.
    pub gpu_clock_mhz: Option<f64>,
}

/// Repeats every tensor in `sample` `n` times along `batch_dim`.
pub fn expand_sample(sample: &Sample, batch_dim: usize, n: usize) -> Result<Sample> {
    sample
        .iter()
        .map(|(name, tensor)| {
            let expanded = tensor
                .repeat(batch_dim, n)
                .with_context(|| format!("failed to expand tensor `{name}`"))?;
            Ok((name.clone(), expanded))
        })
        .collect()
}

/// Measures batch-1 and batch-N latency over the profiling sample and
/// derives throughput from the median.
///
/// Returns one record per distinct tested batch size, in insertion
/// order {1, max_batch_size}. When `batch_dim` is unset the sample is
/// used as-is for every batch size. When `telemetry` is supplied the
/// GPU clock is sampled between iterations, while the runner session
/// is still holding its device context; sampling it after the scoped
/// activation ends would only ever observe idle GPUs.
pub fn measure_performance(
    profiling_sample: &Sample,
    batch_dim: Option<usize>,
    max_batch_size: usize,
    runner: &mut dyn Runner,
    telemetry: Option<&GpuTelemetry>,
) -> Result<PerformanceMeasurement> {
    anyhow::ensure!(max_batch_size >= 1, "max batch size must be at least 1");

    let expanded_sample = match batch_dim {
        Some(axis) if max_batch_size > 1 => expand_sample(profiling_sample, axis, max_batch_size)?,
        _ => profiling_sample.clone(),
    };

    let mut tested: Vec<(usize, Sample, Vec<f64>)> = vec![(1, profiling_sample.clone(), Vec::new())];
    if max_batch_size > 1 {
        tested.push((max_batch_size, expanded_sample, Vec::new()));
    }

    let mut clock_samples = Vec::new();
    {
        let mut active = ActiveRunner::activate(runner)?;
        for iteration in 0..MEASUREMENT_ITERATIONS {
            for (batch_size, sample, measurements) in &mut tested {
                active.infer(sample)?;
                let elapsed = active
                    .last_inference_time()
                    .context("runner did not report an inference time")?;
                debug!(iteration, batch_size = *batch_size, ?elapsed, "measured");
                measurements.push(elapsed.as_secs_f64());
            }
            if let Some(clock) = telemetry.and_then(GpuTelemetry::gpu_clock) {
                clock_samples.push(clock);
            }
        }
    }

    let gpu_clock_mhz = if clock_samples.is_empty() {
        None
    } else {
        Some(clock_samples.iter().sum::<f64>() / clock_samples.len() as f64)
    };

    let records = tested
        .into_iter()
        .map(|(batch_size, _, measurements)| {
            let latency_secs = median(&measurements);
            PerformanceRecord {
                batch_size,
                latency_ms: latency_secs * 1000.0,
                throughput: 1.0 / latency_secs,
            }
        })
        .collect::<Vec<_>>();

    for record in &records {
        info!(
            batch_size = record.batch_size,
            latency_ms = record.latency_ms,
            throughput = record.throughput,
            "performance"
        );
    }
    Ok(PerformanceMeasurement {
        records,
        gpu_clock_mhz,
    })
}

fn median(data: &[f64]) -> f64 {
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n.is_multiple_of(2) {
        f64::midpoint(sorted[n / 2 - 1], sorted[n / 2])
    } else {
        sorted[n / 2]
    }
}
