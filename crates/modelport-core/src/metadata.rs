use serde::{Deserialize, Serialize};

use crate::DType;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IOName(pub String);

impl IOName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IOName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Expected structure of one model input or output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TensorSpec {
    pub name: IOName,
    pub dtype: DType,
    pub dims: Vec<Option<usize>>, // None = dynamic
}

impl TensorSpec {
    pub fn rank(&self) -> usize {
        self.dims.len()
    }
}

/// Ordered name -> (shape, dtype) table describing one side of a
/// model's IO boundary. Built once from model introspection or a
/// config file, read-only afterwards.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TensorMetadata(pub Vec<TensorSpec>);

impl TensorMetadata {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &IOName) -> Option<&TensorSpec> {
        self.0.iter().find(|spec| &spec.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &IOName> {
        self.0.iter().map(|spec| &spec.name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TensorSpec> {
        self.0.iter()
    }
}

impl FromIterator<TensorSpec> for TensorMetadata {
    fn from_iter<I: IntoIterator<Item = TensorSpec>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
