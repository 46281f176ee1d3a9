use crate::{IOName, Tensor};

/// One input (or output) instance: an ordered mapping from tensor name
/// to tensor. Order is significant and preserved through load, infer
/// and save.
#[derive(Clone, Debug, Default)]
pub struct Sample(pub Vec<(IOName, Tensor)>);

impl Sample {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, name: IOName, tensor: Tensor) {
        self.0.push((name, tensor));
    }

    pub fn get(&self, name: &IOName) -> Option<&Tensor> {
        self.0
            .iter()
            .find_map(|(n, t)| (n == name).then_some(t))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (IOName, Tensor)> {
        self.0.iter()
    }
}

impl FromIterator<(IOName, Tensor)> for Sample {
    fn from_iter<I: IntoIterator<Item = (IOName, Tensor)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
