//! Shared name-to-object registry visible to every command.
//!
//! The [`Namespace`] is cloned into each component that needs lookups; clones
//! share one map. Entries are never mutated in place. A write replaces the
//! whole entry, so readers holding an earlier [`Arc`] keep a consistent value
//! while background monitors and the foreground translator read concurrently.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::device::{DeviceKind, DeviceRef};
use crate::error::NamespaceError;

/// Well-known namespace keys written by the console.
pub mod keys {
    /// Plan names the server currently allows.
    pub const ALLOWED_PLANS: &str = "ALLOWED_PLANS";
    /// Device names the server currently allows.
    pub const ALLOWED_DEVICES: &str = "ALLOWED_DEVICES";
    /// Ticket of the most recently submitted job.
    pub const LAST_JOB: &str = "LAST_JOB";
    /// Wire form of the last request translated in test mode.
    pub const TEST_DATA: &str = "TEST_DATA";
}

/// A value stored in the namespace.
#[derive(Debug, Clone, PartialEq)]
pub enum NamespaceValue {
    /// A device usable in job arguments.
    Device(DeviceRef),
    /// A set of names, such as the allowed plans.
    Names(BTreeSet<String>),
    /// Free-form text.
    Text(String),
    /// Structured data, such as a recorded request.
    Json(serde_json::Value),
}

impl NamespaceValue {
    /// Returns the device when the entry holds one.
    #[must_use]
    pub const fn as_device(&self) -> Option<&DeviceRef> {
        match self {
            Self::Device(device) => Some(device),
            Self::Names(_) | Self::Text(_) | Self::Json(_) => None,
        }
    }
}

/// Shared key/value store of live objects.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    entries: Arc<RwLock<HashMap<String, Arc<NamespaceValue>>>>,
}

impl Namespace {
    /// Creates an empty namespace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a namespace holding the given devices.
    #[must_use]
    pub fn with_devices(devices: impl IntoIterator<Item = DeviceRef>) -> Self {
        let namespace = Self::new();
        namespace.replace_devices(devices);
        namespace
    }

    /// Stores `value` under `name`, replacing any previous entry.
    pub fn add_to_namespace(&self, name: impl Into<String>, value: NamespaceValue) {
        self.write().insert(name.into(), Arc::new(value));
    }

    /// Fetches the entry stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`NamespaceError::NameNotFound`] when no entry exists.
    pub fn get_from_namespace(&self, name: &str) -> Result<Arc<NamespaceValue>, NamespaceError> {
        self.read()
            .get(name)
            .cloned()
            .ok_or_else(|| NamespaceError::NameNotFound {
                name: name.to_owned(),
            })
    }

    /// Removes the entry stored under `name`, returning it when present.
    pub fn remove_from_namespace(&self, name: &str) -> Option<Arc<NamespaceValue>> {
        self.write().remove(name)
    }

    /// Returns `true` when an entry exists under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Reports the kind of the device stored under `name` without resolving it
    /// into a job argument.
    #[must_use]
    pub fn device_kind(&self, name: &str) -> Option<DeviceKind> {
        self.read()
            .get(name)
            .and_then(|value| value.as_device().map(DeviceRef::kind))
    }

    /// Replaces every device entry with `devices` under a single write lock.
    ///
    /// Non-device entries are left untouched.
    pub fn replace_devices(&self, devices: impl IntoIterator<Item = DeviceRef>) {
        let mut entries = self.write();
        entries.retain(|_, value| value.as_device().is_none());
        for device in devices {
            entries.insert(
                device.name().to_owned(),
                Arc::new(NamespaceValue::Device(device)),
            );
        }
    }

    /// Lists the devices currently stored, sorted by name.
    #[must_use]
    pub fn devices(&self) -> Vec<DeviceRef> {
        let mut devices: Vec<DeviceRef> = self
            .read()
            .values()
            .filter_map(|value| value.as_device().cloned())
            .collect();
        devices.sort_by(|left, right| left.name().cmp(right.name()));
        devices
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns `true` when the namespace has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<NamespaceValue>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<NamespaceValue>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}
