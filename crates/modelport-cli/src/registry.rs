use std::collections::HashMap;

use anyhow::{Context, Result};
use modelport_core::{Device, ModelArtifact, Runner};
use modelport_runner_ort::OrtRunner;

pub type RunnerFactory = fn(ModelArtifact, Device) -> Result<Box<dyn Runner>>;

/// Explicit name -> factory map for runner lookup. Built once in
/// `main` and passed by reference into commands; there is no global
/// registry.
#[derive(Default)]
pub struct RunnerRegistry {
    factories: HashMap<String, RunnerFactory>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: &str, factory: RunnerFactory) {
        self.factories.insert(name.to_string(), factory);
    }

    pub fn create(
        &self,
        name: &str,
        artifact: ModelArtifact,
        device: Device,
    ) -> Result<Box<dyn Runner>> {
        let factory = self
            .factories
            .get(name)
            .with_context(|| format!("no runner registered under `{name}`"))?;
        factory(artifact, device)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

/// Registry with the built-in runners.
pub fn default_registry() -> RunnerRegistry {
    let mut registry = RunnerRegistry::new();
    registry.register("onnxruntime", |artifact, device| {
        Ok(Box::new(OrtRunner::new(artifact, device)))
    });
    registry
}
