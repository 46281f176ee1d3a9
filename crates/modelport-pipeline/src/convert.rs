use std::path::{Path, PathBuf};
use std::process::Command;

use modelport_core::TensorMetadata;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Default external converter binary.
pub const DEFAULT_CONVERTER: &str = "polygraphy";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorRtPrecision {
    Fp32,
    Tf32,
    Fp16,
    Int8,
}

impl TensorRtPrecision {
    /// Converter flag for this precision; FP32 is the converter default
    /// and needs no flag.
    pub fn flag(self) -> Option<&'static str> {
        match self {
            TensorRtPrecision::Fp32 => None,
            TensorRtPrecision::Tf32 => Some("--tf32"),
            TensorRtPrecision::Fp16 => Some("--fp16"),
            TensorRtPrecision::Int8 => Some("--int8"),
        }
    }
}

impl std::fmt::Display for TensorRtPrecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TensorRtPrecision::Fp32 => "fp32",
            TensorRtPrecision::Tf32 => "tf32",
            TensorRtPrecision::Fp16 => "fp16",
            TensorRtPrecision::Int8 => "int8",
        };
        f.write_str(name)
    }
}

/// (min, opt, max) extent of one dynamic axis across the three
/// TensorRT optimization profiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeRange {
    pub min: usize,
    pub opt: usize,
    pub max: usize,
}

impl ShapeRange {
    fn select(&self, profile: ShapeProfileKind) -> usize {
        match profile {
            ShapeProfileKind::Min => self.min,
            ShapeProfileKind::Opt => self.opt,
            ShapeProfileKind::Max => self.max,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum ShapeProfileKind {
    Min,
    Opt,
    Max,
}

impl ShapeProfileKind {
    const ALL: [(ShapeProfileKind, &'static str); 3] = [
        (ShapeProfileKind::Min, "--trt-min-shapes"),
        (ShapeProfileKind::Opt, "--trt-opt-shapes"),
        (ShapeProfileKind::Max, "--trt-max-shapes"),
    ];
}

/// Per-input dynamic-axis table: input name -> [(axis, range)].
/// Axes not listed keep the static extent from the input metadata.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrtShapeProfile(pub Vec<(String, Vec<(usize, ShapeRange)>)>);

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("input `{input}` axis {axis} is dynamic but has no (min, opt, max) override")]
    UnresolvedDynamicAxis { input: String, axis: usize },

    #[error("failed to create artifact directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn converter `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("converter exited with {status}")]
    ConverterFailed { status: std::process::ExitStatus },
}

/// Outcome of a conversion step.
#[derive(Debug, PartialEq, Eq)]
pub enum ConvertOutcome {
    /// Artifact produced at this workspace-relative path.
    Converted(PathBuf),
    /// Target already existed; the converter was not invoked.
    Skipped,
}

/// Invokes the external ONNX -> TensorRT converter.
///
/// The step is idempotent on the artifact path: if the target already
/// exists (file or directory) it returns [`ConvertOutcome::Skipped`]
/// without spawning anything.
#[derive(Clone, Debug)]
pub struct ConvertOnnxToTrt {
    pub precision: TensorRtPrecision,
    pub max_workspace_size: Option<u64>,
    pub shape_profile: Option<TrtShapeProfile>,
    converter: String,
}

impl ConvertOnnxToTrt {
    pub fn new(precision: TensorRtPrecision) -> Self {
        Self {
            precision,
            max_workspace_size: None,
            shape_profile: None,
            converter: DEFAULT_CONVERTER.to_string(),
        }
    }

    pub fn with_max_workspace_size(mut self, bytes: u64) -> Self {
        self.max_workspace_size = Some(bytes);
        self
    }

    pub fn with_shape_profile(mut self, profile: TrtShapeProfile) -> Self {
        self.shape_profile = Some(profile);
        self
    }

    /// Overrides the converter binary. Used by tests to substitute the
    /// real tool.
    pub fn with_converter(mut self, program: impl Into<String>) -> Self {
        self.converter = program.into();
        self
    }

    /// Workspace-relative path of the produced artifact.
    pub fn output_relative_path(&self) -> PathBuf {
        PathBuf::from(format!("trt-{}", self.precision)).join("model.plan")
    }

    /// Runs the conversion. `source` is the workspace-relative path of
    /// the exported ONNX model.
    pub fn run(
        &self,
        workspace: &Path,
        source: &Path,
        input_metadata: &TensorMetadata,
    ) -> Result<ConvertOutcome, ConvertError> {
        let target_rel = self.output_relative_path();
        let target = workspace.join(&target_rel);
        if target.is_file() || target.is_dir() {
            info!(target = %target.display(), "conversion target exists, skipping");
            return Ok(ConvertOutcome::Skipped);
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConvertError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let args = self.command_args(&workspace.join(source), &target, input_metadata)?;
        debug!(converter = %self.converter, ?args, "invoking converter");
        let status = Command::new(&self.converter)
            .args(&args)
            .status()
            .map_err(|source| ConvertError::Spawn {
                program: self.converter.clone(),
                source,
            })?;
        if !status.success() {
            return Err(ConvertError::ConverterFailed { status });
        }

        info!(artifact = %target_rel.display(), "conversion finished");
        Ok(ConvertOutcome::Converted(target_rel))
    }

    /// Builds the converter argument list. Split out so tests can
    /// assert on the exact invocation without spawning a process.
    pub fn command_args(
        &self,
        source: &Path,
        target: &Path,
        input_metadata: &TensorMetadata,
    ) -> Result<Vec<String>, ConvertError> {
        let mut args = vec![
            "convert".to_string(),
            source.display().to_string(),
            "--convert-to".to_string(),
            "trt".to_string(),
            "-o".to_string(),
            target.display().to_string(),
        ];

        if let Some(profile) = &self.shape_profile {
            for (kind, flag) in ShapeProfileKind::ALL {
                args.push(flag.to_string());
                for spec in input_metadata.iter() {
                    args.push(shape_arg(spec, profile, kind)?);
                }
            }
        }

        if let Some(flag) = self.precision.flag() {
            args.push(flag.to_string());
        }

        if let Some(bytes) = self.max_workspace_size {
            args.push(format!("--workspace={bytes}"));
        }

        Ok(args)
    }
}

fn shape_arg(
    spec: &modelport_core::TensorSpec,
    profile: &TrtShapeProfile,
    kind: ShapeProfileKind,
) -> Result<String, ConvertError> {
    let overrides = profile
        .0
        .iter()
        .find_map(|(name, axes)| (name == spec.name.as_str()).then_some(axes.as_slice()))
        .unwrap_or(&[]);

    let mut dims = Vec::with_capacity(spec.rank());
    for (axis, dim) in spec.dims.iter().enumerate() {
        let range = overrides
            .iter()
            .find_map(|(a, range)| (*a == axis).then_some(range));
        let extent = match (range, dim) {
            (Some(range), _) => range.select(kind),
            (None, Some(extent)) => *extent,
            (None, None) => {
                return Err(ConvertError::UnresolvedDynamicAxis {
                    input: spec.name.0.clone(),
                    axis,
                })
            }
        };
        dims.push(extent.to_string());
    }

    Ok(format!("{}:[{}]", spec.name, dims.join(",")))
}
