use std::ops::{Deref, DerefMut};
use std::time::Duration;

use anyhow::Result;

use crate::Sample;

/// A model-execution backend.
///
/// Sessions are scarce (device memory, driver handles), so runners have
/// an explicit acquire/release lifecycle: `activate` may allocate an
/// interpreter or device session, `deactivate` must free it and must be
/// safe to call more than once.
pub trait Runner {
    fn name(&self) -> &str;

    fn activate(&mut self) -> Result<()>;

    fn deactivate(&mut self) -> Result<()>;

    /// Runs one inference. Inputs and outputs are name -> tensor
    /// mappings; output order follows the model's output order.
    fn infer(&mut self, sample: &Sample) -> Result<Sample>;

    /// Wall-clock duration of the most recent `infer` call, if any.
    fn last_inference_time(&self) -> Option<Duration>;
}

/// Scoped activation: activates on construction, deactivates on drop,
/// so the release runs on every exit path including early `?` returns.
pub struct ActiveRunner<'a, R: Runner + ?Sized> {
    runner: &'a mut R,
}

impl<'a, R: Runner + ?Sized> ActiveRunner<'a, R> {
    pub fn activate(runner: &'a mut R) -> Result<Self> {
        runner.activate()?;
        Ok(Self { runner })
    }
}

impl<R: Runner + ?Sized> Deref for ActiveRunner<'_, R> {
    type Target = R;
    fn deref(&self) -> &R {
        self.runner
    }
}

impl<R: Runner + ?Sized> DerefMut for ActiveRunner<'_, R> {
    fn deref_mut(&mut self) -> &mut R {
        self.runner
    }
}

impl<R: Runner + ?Sized> Drop for ActiveRunner<'_, R> {
    fn drop(&mut self) {
        let _ = self.runner.deactivate();
    }
}
