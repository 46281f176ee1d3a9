use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub enum ModelArtifact {
    OnnxPath(PathBuf),
    TensorRtPlanPath(PathBuf),
    TorchScriptPath(PathBuf),
    TfSavedModelDir(PathBuf),
}

impl ModelArtifact {
    pub fn path(&self) -> &Path {
        match self {
            ModelArtifact::OnnxPath(p)
            | ModelArtifact::TensorRtPlanPath(p)
            | ModelArtifact::TorchScriptPath(p)
            | ModelArtifact::TfSavedModelDir(p) => p,
        }
    }
}
