//! Descriptors of the jobs known to the console.

use crate::registry::{JobDescriptor, JobKind};
use crate::shape::{DeviceGroup, DeviceRole, FieldKind, OptionKind, OptionSpec, ParameterShape, Packing};

/// `mov motor position [motor position ...]`
#[must_use]
pub fn mv() -> JobDescriptor {
    let pairs = DeviceGroup::new(
        "motor/position pairs",
        vec![FieldKind::Device(DeviceRole::Motor), FieldKind::Float],
    );
    JobDescriptor::new("mv", "mov", JobKind::Move, ParameterShape::new(vec![pairs], vec![]))
        .with_summary("Move motors to absolute positions.")
}

/// `read_many device [device ...]`
#[must_use]
pub fn read_many() -> JobDescriptor {
    let devices = DeviceGroup::new("devices", vec![FieldKind::Device(DeviceRole::Detector)])
        .with_packing(Packing::List);
    JobDescriptor::new(
        "read_many",
        "read_many",
        JobKind::ReadMany,
        ParameterShape::new(vec![devices], vec![]),
    )
    .with_summary("Read a set of devices once.")
}

/// `count [-d] detector ... [-n num] [--delay seconds]`
#[must_use]
pub fn count() -> JobDescriptor {
    let options = vec![
        OptionSpec::new("num", OptionKind::Int).with_flags(["-n", "--num"]),
        OptionSpec::new("delay", OptionKind::Float),
    ];
    JobDescriptor::new(
        "count",
        "count",
        JobKind::Count,
        ParameterShape::new(vec![DeviceGroup::detectors()], options),
    )
    .with_summary("Read detectors a number of times.")
}

/// `scan [-d] detector ... -m motor start stop [...] -n num`
#[must_use]
pub fn scan() -> JobDescriptor {
    let motors = DeviceGroup::new(
        "motor triplets",
        vec![
            FieldKind::Device(DeviceRole::Motor),
            FieldKind::Float,
            FieldKind::Float,
        ],
    )
    .with_flags(["-m", "--motors"]);
    let options = vec![OptionSpec::new("num", OptionKind::Int)
        .with_flags(["-n", "--num"])
        .required()];
    JobDescriptor::new(
        "scan",
        "scan",
        JobKind::Scan,
        ParameterShape::new(vec![DeviceGroup::detectors(), motors], options),
    )
    .with_summary("Scan motors linearly between start and stop.")
}

/// `grid_scan [-d] detector ... -m motor start stop num [...] [-s]`
#[must_use]
pub fn grid_scan() -> JobDescriptor {
    let motors = DeviceGroup::new(
        "motor quadruplets",
        vec![
            FieldKind::Device(DeviceRole::Motor),
            FieldKind::Float,
            FieldKind::Float,
            FieldKind::Int,
        ],
    )
    .with_flags(["-m", "--motors"]);
    let options =
        vec![OptionSpec::new("snake_axes", OptionKind::Switch).with_flags(["-s", "--snake_axes"])];
    JobDescriptor::new(
        "grid_scan",
        "grid_scan",
        JobKind::GridScan,
        ParameterShape::new(vec![DeviceGroup::detectors(), motors], options),
    )
    .with_summary("Scan motors over a mesh of points.")
}

/// `adaptive_scan [-d] detector ... -t field -m motor --start --stop ...`
#[must_use]
pub fn adaptive_scan() -> JobDescriptor {
    let options = vec![
        OptionSpec::new("target_field", OptionKind::Text)
            .with_flags(["-t", "--target_field"])
            .required(),
        OptionSpec::new("motor", OptionKind::Device(DeviceRole::Motor))
            .with_flags(["-m", "--motor"])
            .required(),
        OptionSpec::new("start", OptionKind::Float).required(),
        OptionSpec::new("stop", OptionKind::Float).required(),
        OptionSpec::new("min_step", OptionKind::Float).required(),
        OptionSpec::new("max_step", OptionKind::Float).required(),
        OptionSpec::new("target_delta", OptionKind::Float).required(),
        OptionSpec::new("backstep", OptionKind::Switch).with_flags(["-b", "--backstep"]),
        OptionSpec::new("threshold", OptionKind::Float),
    ];
    JobDescriptor::new(
        "adaptive_scan",
        "adaptive_scan",
        JobKind::AdaptiveScan,
        ParameterShape::new(vec![DeviceGroup::detectors()], options),
    )
    .with_summary("Scan one motor with a step adapted to the signal.")
}
