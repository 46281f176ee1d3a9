use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use modelport_core::{DType, IOName, Sample, Shape, Tensor};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Workspace roles under which sample files are stored.
pub const CORRECTNESS_SAMPLES: &str = "correctness_samples";
pub const CORRECTNESS_SAMPLES_OUTPUT: &str = "correctness_samples_output";
pub const PROFILING_SAMPLE: &str = "profiling_sample";

#[derive(Debug, Serialize, Deserialize)]
struct TensorRecord {
    name: IOName,
    dtype: DType,
    shape: Vec<usize>,
    data: Vec<f64>,
}

/// On-disk form of a sample sequence: batch-dimension metadata plus an
/// ordered list of name -> tensor mappings.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SampleFile {
    pub batch_dim: Option<usize>,
    samples: Vec<Vec<TensorRecord>>,
}

impl SampleFile {
    pub fn new(batch_dim: Option<usize>, samples: &[Sample]) -> Result<Self> {
        let samples = samples
            .iter()
            .map(|sample| {
                sample
                    .iter()
                    .map(|(name, tensor)| {
                        Ok(TensorRecord {
                            name: name.clone(),
                            dtype: tensor.dtype,
                            shape: tensor.shape.0.to_vec(),
                            data: tensor.to_f64_vec()?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { batch_dim, samples })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Decodes the stored records back into samples, preserving order.
    pub fn samples(&self) -> Result<Vec<Sample>> {
        self.samples
            .iter()
            .map(|records| {
                records
                    .iter()
                    .map(|record| {
                        let tensor = Tensor::from_f64s(
                            record.dtype,
                            Shape::from_slice(&record.shape),
                            &record.data,
                        )
                        .with_context(|| format!("invalid tensor record `{}`", record.name))?;
                        Ok((record.name.clone(), tensor))
                    })
                    .collect::<Result<Sample>>()
            })
            .collect()
    }
}

/// Loads and saves serialized tensor samples from a workspace
/// directory, addressed by logical role rather than raw path.
#[derive(Clone, Debug)]
pub struct SampleStore {
    workspace: PathBuf,
}

impl SampleStore {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn path_for(&self, role: &str) -> PathBuf {
        self.workspace.join(format!("{role}.json"))
    }

    pub fn load(&self, role: &str) -> Result<SampleFile> {
        let path = self.path_for(role);
        debug!(role, path = %path.display(), "loading samples");
        let file = File::open(&path)
            .with_context(|| format!("failed to open sample file {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("failed to parse sample file {}", path.display()))
    }

    pub fn save(&self, role: &str, samples: &SampleFile) -> Result<()> {
        let path = self.path_for(role);
        debug!(role, path = %path.display(), count = samples.len(), "saving samples");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create workspace dir {}", parent.display()))?;
        }
        let file = File::create(&path)
            .with_context(|| format!("failed to create sample file {}", path.display()))?;
        serde_json::to_writer(BufWriter::new(file), samples)
            .with_context(|| format!("failed to write sample file {}", path.display()))?;
        Ok(())
    }
}
