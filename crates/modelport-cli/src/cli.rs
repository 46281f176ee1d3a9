use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use modelport_pipeline::TensorRtPrecision;

#[derive(Parser, Debug)]
#[command(name = "modelport", version, about = "Model optimization and deployment preparation")]
pub struct Cli {
    /// Log level (RUST_LOG)
    #[arg(long, default_value = "info", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Convert an exported ONNX model to a TensorRT plan
    Convert {
        /// Workspace directory holding models, samples and artifacts
        #[arg(long, default_value = ".")]
        workspace: PathBuf,

        /// Workspace-relative path to the exported ONNX model
        #[arg(long)]
        model: PathBuf,

        /// Target TensorRT precision
        #[arg(long, value_enum, default_value_t = PrecisionArg::Fp32)]
        precision: PrecisionArg,

        /// Cap on TensorRT builder workspace memory, in bytes
        #[arg(long)]
        max_workspace_size: Option<u64>,

        /// JSON file with input tensor metadata (name, dtype, dims)
        #[arg(long)]
        input_metadata: Option<PathBuf>,

        /// JSON file with per-input dynamic-axis (min, opt, max) ranges
        #[arg(long)]
        shape_profile: Option<PathBuf>,
    },

    /// Replay correctness samples and record worst-case tolerances
    Correctness {
        #[arg(long, default_value = ".")]
        workspace: PathBuf,

        /// Workspace-relative path to the model under test
        #[arg(long)]
        model: PathBuf,

        /// Registered runner to execute the model with
        #[arg(long, default_value = "onnxruntime")]
        runner: String,

        /// Device for inference (cpu or cuda:N)
        #[arg(long, default_value = "cpu")]
        device: String,

        /// JSON file with output tensor metadata; derived from the
        /// reference samples when omitted
        #[arg(long)]
        output_metadata: Option<PathBuf>,

        /// Workspace-relative path of the tolerance result file
        #[arg(long, default_value = "correctness_results.json")]
        results: PathBuf,
    },

    /// Measure batch-1 and batch-N latency and throughput
    Profile {
        #[arg(long, default_value = ".")]
        workspace: PathBuf,

        /// Workspace-relative path to the model under test
        #[arg(long)]
        model: PathBuf,

        /// Registered runner to execute the model with
        #[arg(long, default_value = "onnxruntime")]
        runner: String,

        /// Device for inference (cpu or cuda:N)
        #[arg(long, default_value = "cpu")]
        device: String,

        /// Batch axis; overrides the profiling sample's recorded one
        #[arg(long)]
        batch_dim: Option<usize>,

        /// Largest batch size to measure
        #[arg(long, default_value_t = 1)]
        max_batch_size: usize,

        /// Workspace-relative path of the profile report
        #[arg(long, default_value = "profile_results.json")]
        results: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum PrecisionArg {
    Fp32,
    Tf32,
    Fp16,
    Int8,
}

impl From<PrecisionArg> for TensorRtPrecision {
    fn from(arg: PrecisionArg) -> Self {
        match arg {
            PrecisionArg::Fp32 => TensorRtPrecision::Fp32,
            PrecisionArg::Tf32 => TensorRtPrecision::Tf32,
            PrecisionArg::Fp16 => TensorRtPrecision::Fp16,
            PrecisionArg::Int8 => TensorRtPrecision::Int8,
        }
    }
}
