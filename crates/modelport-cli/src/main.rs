mod cli;
mod registry;

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use modelport_core::{Device, IOName, ModelArtifact, Sample, TensorMetadata, TensorSpec};
use modelport_pipeline::{
    measure_performance, run_correctness, ConvertOnnxToTrt, ConvertOutcome, GpuTelemetry,
    PerformanceRecord, SampleStore, TrtShapeProfile, CORRECTNESS_SAMPLES,
    CORRECTNESS_SAMPLES_OUTPUT, PROFILING_SAMPLE,
};
use registry::{default_registry, RunnerRegistry};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    std::env::set_var("RUST_LOG", &cli.log);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let registry = default_registry();
    if let Err(err) = run(cli.command, &registry) {
        tracing::error!("{err:#}");
        std::process::exit(1);
    }
}

fn run(command: Command, registry: &RunnerRegistry) -> Result<()> {
    match command {
        Command::Convert {
            workspace,
            model,
            precision,
            max_workspace_size,
            input_metadata,
            shape_profile,
        } => cmd_convert(
            &workspace,
            &model,
            precision.into(),
            max_workspace_size,
            input_metadata.as_deref(),
            shape_profile.as_deref(),
        ),
        Command::Correctness {
            workspace,
            model,
            runner,
            device,
            output_metadata,
            results,
        } => cmd_correctness(
            registry,
            &workspace,
            &model,
            &runner,
            &device,
            output_metadata.as_deref(),
            &results,
        ),
        Command::Profile {
            workspace,
            model,
            runner,
            device,
            batch_dim,
            max_batch_size,
            results,
        } => cmd_profile(
            registry,
            &workspace,
            &model,
            &runner,
            &device,
            batch_dim,
            max_batch_size,
            &results,
        ),
    }
}

fn cmd_convert(
    workspace: &Path,
    model: &Path,
    precision: modelport_pipeline::TensorRtPrecision,
    max_workspace_size: Option<u64>,
    input_metadata: Option<&Path>,
    shape_profile: Option<&Path>,
) -> Result<()> {
    let metadata = match input_metadata {
        Some(path) => read_json::<TensorMetadata>(path)?,
        None => TensorMetadata::default(),
    };

    let mut step = ConvertOnnxToTrt::new(precision);
    if let Some(bytes) = max_workspace_size {
        step = step.with_max_workspace_size(bytes);
    }
    if let Some(path) = shape_profile {
        anyhow::ensure!(
            input_metadata.is_some(),
            "--shape-profile requires --input-metadata"
        );
        step = step.with_shape_profile(read_json::<TrtShapeProfile>(path)?);
    }

    match step.run(workspace, model, &metadata)? {
        ConvertOutcome::Converted(artifact) => {
            tracing::info!(artifact = %artifact.display(), "converted");
        }
        ConvertOutcome::Skipped => {
            tracing::info!("already converted, nothing to do");
        }
    }
    Ok(())
}

fn cmd_correctness(
    registry: &RunnerRegistry,
    workspace: &Path,
    model: &Path,
    runner_name: &str,
    device: &str,
    output_metadata: Option<&Path>,
    results: &Path,
) -> Result<()> {
    let device = parse_device(device)?;
    let store = SampleStore::new(workspace);

    let inputs = store.load(CORRECTNESS_SAMPLES)?.samples()?;
    let references = store.load(CORRECTNESS_SAMPLES_OUTPUT)?.samples()?;

    let metadata = match output_metadata {
        Some(path) => read_json::<TensorMetadata>(path)?,
        None => {
            let first = references
                .first()
                .context("reference sample file is empty")?;
            metadata_from_sample(first)
        }
    };

    let artifact = ModelArtifact::OnnxPath(workspace.join(model));
    let mut runner = registry.create(runner_name, artifact, device)?;

    let results_path = workspace.join(results);
    let tolerances = run_correctness(
        &inputs,
        &references,
        &metadata,
        runner.as_mut(),
        &results_path,
    )?;

    for (name, tolerance) in &tolerances {
        tracing::info!(output = %name, atol = tolerance.atol, rtol = tolerance.rtol, "tolerance");
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct ProfileReport {
    records: Vec<PerformanceRecord>,
    gpu_count: usize,
    gpu_clock_mhz: Option<f64>,
}

#[allow(clippy::too_many_arguments)]
fn cmd_profile(
    registry: &RunnerRegistry,
    workspace: &Path,
    model: &Path,
    runner_name: &str,
    device: &str,
    batch_dim: Option<usize>,
    max_batch_size: usize,
    results: &Path,
) -> Result<()> {
    let device = parse_device(device)?;
    let store = SampleStore::new(workspace);

    let sample_file = store.load(PROFILING_SAMPLE)?;
    let batch_dim = batch_dim.or(sample_file.batch_dim);
    let sample = sample_file
        .samples()?
        .into_iter()
        .next()
        .context("profiling sample file is empty")?;

    let artifact = ModelArtifact::OnnxPath(workspace.join(model));
    let mut runner = registry.create(runner_name, artifact, device)?;

    // Telemetry is advisory; a missing driver must not fail profiling.
    let telemetry = GpuTelemetry::init();

    // The clock is sampled inside the measurement loop, while the runner
    // session is still active and the device is actually busy.
    let measurement = measure_performance(
        &sample,
        batch_dim,
        max_batch_size,
        runner.as_mut(),
        Some(&telemetry),
    )?;

    let report = ProfileReport {
        records: measurement.records,
        gpu_count: telemetry.gpu_count(),
        gpu_clock_mhz: measurement.gpu_clock_mhz,
    };

    let report_path = workspace.join(results);
    let file = File::create(&report_path)
        .with_context(|| format!("failed to create report file {}", report_path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &report)
        .with_context(|| format!("failed to write report to {}", report_path.display()))?;
    tracing::info!(report = %report_path.display(), "profile finished");
    Ok(())
}

fn metadata_from_sample(sample: &Sample) -> TensorMetadata {
    sample
        .iter()
        .map(|(name, tensor)| TensorSpec {
            name: IOName::new(name.as_str()),
            dtype: tensor.dtype,
            dims: tensor.shape.0.iter().map(|d| Some(*d)).collect(),
        })
        .collect()
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("failed to parse {}", path.display()))
}

fn parse_device(raw: &str) -> Result<Device> {
    if raw.eq_ignore_ascii_case("cpu") {
        return Ok(Device::Cpu);
    }

    if let Some(rest) = raw.strip_prefix("cuda:") {
        let device_id: u32 = rest.parse().context("invalid cuda device id")?;
        return Ok(Device::Cuda { device_id });
    }

    anyhow::bail!("unsupported device: {raw} (expected cpu or cuda:N)");
}
