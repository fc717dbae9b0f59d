//! Symbolic references to instrument devices.

use serde::{Deserialize, Serialize};

/// Broad capability class of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// A readable device that cannot be moved, such as a detector.
    Detector,
    /// A movable device such as a motor or positioner.
    Motor,
    /// A device that exposes neither capability explicitly.
    Readable,
}

impl DeviceKind {
    /// Classifies a device from the capability flags reported by the server.
    #[must_use]
    pub const fn from_capabilities(is_movable: bool, is_readable: bool) -> Self {
        match (is_movable, is_readable) {
            (true, _) => Self::Motor,
            (false, true) => Self::Detector,
            (false, false) => Self::Readable,
        }
    }

    /// Returns `true` when the device can be positioned.
    #[must_use]
    pub const fn is_movable(self) -> bool {
        matches!(self, Self::Motor)
    }
}

/// A named device visible to commands through the namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceRef {
    name: String,
    kind: DeviceKind,
}

impl DeviceRef {
    /// Creates a device reference.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: DeviceKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Returns the device name as known to the execution engine.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the device's capability class.
    #[must_use]
    pub const fn kind(&self) -> DeviceKind {
        self.kind
    }
}

/// Devices available in local and test modes.
#[must_use]
pub fn simulated_devices() -> Vec<DeviceRef> {
    vec![
        DeviceRef::new("SIM_det", DeviceKind::Detector),
        DeviceRef::new("SIM_det1", DeviceKind::Detector),
        DeviceRef::new("SIM_det2", DeviceKind::Detector),
        DeviceRef::new("SIM_motor", DeviceKind::Motor),
        DeviceRef::new("SIM_motor1", DeviceKind::Motor),
        DeviceRef::new("SIM_motor2", DeviceKind::Motor),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(true, true, DeviceKind::Motor)]
    #[case(true, false, DeviceKind::Motor)]
    #[case(false, true, DeviceKind::Detector)]
    #[case(false, false, DeviceKind::Readable)]
    fn classifies_server_capabilities(
        #[case] movable: bool,
        #[case] readable: bool,
        #[case] expected: DeviceKind,
    ) {
        assert_eq!(DeviceKind::from_capabilities(movable, readable), expected);
    }
}
