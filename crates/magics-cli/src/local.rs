//! In-process execution for local mode.

use std::collections::BTreeSet;

use magics_core::{ArgValue, DeviceRef, JobKind, JobRequest};
use thiserror::Error;
use uuid::Uuid;

/// Result of a job run by a [`LocalEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LocalRun {
    pub(crate) run_uid: String,
    pub(crate) points: u64,
}

/// Failures reported by a [`LocalEngine`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum LocalError {
    #[error("device '{name}' is not connected to the local engine")]
    UnknownDevice { name: String },
    #[error("{plan} needs a positive number of points")]
    NoPoints { plan: String },
}

/// Runs translated jobs synchronously inside the console process.
pub(crate) trait LocalEngine: Send {
    fn run(&mut self, request: &JobRequest) -> Result<LocalRun, LocalError>;
}

/// Engine backed by the simulated devices.
///
/// Jobs complete instantly; the engine only checks that every referenced
/// device is one it owns and counts the points a real run would take.
pub(crate) struct SimulatedEngine {
    devices: BTreeSet<String>,
}

impl SimulatedEngine {
    pub(crate) fn new(devices: &[DeviceRef]) -> Self {
        Self {
            devices: devices.iter().map(|device| device.name().to_owned()).collect(),
        }
    }
}

impl LocalEngine for SimulatedEngine {
    fn run(&mut self, request: &JobRequest) -> Result<LocalRun, LocalError> {
        if let Some(missing) = request
            .devices()
            .into_iter()
            .find(|device| !self.devices.contains(device.name()))
        {
            return Err(LocalError::UnknownDevice {
                name: missing.name().to_owned(),
            });
        }

        let points = points_for(request);
        if points == 0 {
            return Err(LocalError::NoPoints {
                plan: request.descriptor().name().to_owned(),
            });
        }

        Ok(LocalRun {
            run_uid: Uuid::new_v4().to_string(),
            points,
        })
    }
}

fn points_for(request: &JobRequest) -> u64 {
    let num = match request.kwargs().get("num") {
        Some(ArgValue::Int(value)) => u64::try_from(*value).unwrap_or(0),
        _ => 1,
    };
    match request.descriptor().kind() {
        JobKind::Count | JobKind::Scan => num,
        JobKind::GridScan => grid_points(request.args()),
        JobKind::Move | JobKind::ReadMany | JobKind::AdaptiveScan => 1,
    }
}

// Quadruplets end with the per-axis point count; the mesh size is their
// product.
fn grid_points(args: &[ArgValue]) -> u64 {
    let counts: Vec<u64> = args
        .iter()
        .filter_map(|arg| match arg {
            ArgValue::Int(value) => u64::try_from(*value).ok(),
            _ => None,
        })
        .collect();
    if counts.is_empty() {
        return 0;
    }
    counts.iter().fold(1u64, |total, count| total.saturating_mul(*count))
}
