use std::collections::HashSet;
use std::process::Command;

use tracing::debug;

/// Default vendor telemetry tool.
pub const NVIDIA_SMI: &str = "nvidia-smi";

/// Best-effort GPU telemetry over the vendor CLI.
///
/// Telemetry is advisory only: if the probe at acquisition fails (no
/// driver, no tool on PATH), every later query reports "unavailable"
/// instead of erroring, and the measurement pipeline proceeds without
/// hardware annotations.
#[derive(Debug)]
pub struct GpuTelemetry {
    program: String,
    available: bool,
    device_count: usize,
}

impl GpuTelemetry {
    pub fn init() -> Self {
        Self::with_command(NVIDIA_SMI)
    }

    /// Probes `program` as the telemetry tool. Used by tests to point
    /// at a binary that does not exist. The device count is taken from
    /// the probe output, so counting later never spawns another
    /// process.
    pub fn with_command(program: impl Into<String>) -> Self {
        let program = program.into();
        let probe = query(&program, &["--query-gpu=index", "--format=csv,noheader"]);
        if probe.is_none() {
            debug!(program = %program, "gpu telemetry unavailable");
        }
        let device_count = probe
            .as_deref()
            .map_or(0, |out| out.lines().filter(|l| !l.trim().is_empty()).count());
        Self {
            available: probe.is_some(),
            program,
            device_count,
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Number of visible GPUs; 0 when telemetry is unavailable.
    pub fn gpu_count(&self) -> usize {
        if !self.available {
            return 0;
        }
        self.device_count
    }

    /// Average graphics clock (MHz) over GPUs that currently have at
    /// least one running compute process. `None` when telemetry is
    /// unavailable or every GPU is idle.
    pub fn gpu_clock(&self) -> Option<f64> {
        if !self.available {
            return None;
        }

        let busy = query(
            &self.program,
            &["--query-compute-apps=gpu_uuid", "--format=csv,noheader"],
        )?;
        let busy: HashSet<&str> = busy
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();

        let clocks = query(
            &self.program,
            &["--query-gpu=uuid,clocks.gr", "--format=csv,noheader,nounits"],
        )?;

        let mut running = 0usize;
        let mut clock_sum = 0.0f64;
        for line in clocks.lines() {
            let mut fields = line.split(',').map(str::trim);
            let (Some(uuid), Some(clock)) = (fields.next(), fields.next()) else {
                continue;
            };
            if !busy.contains(uuid) {
                continue;
            }
            if let Ok(mhz) = clock.parse::<f64>() {
                running += 1;
                clock_sum += mhz;
            }
        }

        if running == 0 {
            return None;
        }
        Some(clock_sum / running as f64)
    }

    /// Releases the telemetry handle. Safe to call more than once; all
    /// queries afterwards report unavailable.
    pub fn shutdown(&mut self) {
        self.available = false;
    }
}

impl Drop for GpuTelemetry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn query(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout).ok()
}
