//! Structured job requests produced by the translator.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::device::DeviceRef;
use crate::registry::JobDescriptor;

/// Client-generated identifier matching a request to its status updates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Returns the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// A resolved argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    /// A device resolved from the namespace.
    Device(DeviceRef),
    /// A floating-point literal.
    Float(f64),
    /// An integer literal.
    Int(i64),
    /// A text literal.
    Text(String),
    /// A boolean switch.
    Bool(bool),
    /// A packed list of values.
    List(Vec<ArgValue>),
    /// Metadata pairs.
    Map(BTreeMap<String, String>),
}

impl ArgValue {
    /// Converts the value to its wire form; devices are sent by name.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        match self {
            Self::Device(device) => Value::String(device.name().to_owned()),
            Self::Float(value) => Value::from(*value),
            Self::Int(value) => Value::from(*value),
            Self::Text(value) => Value::String(value.clone()),
            Self::Bool(value) => Value::Bool(*value),
            Self::List(values) => Value::Array(values.iter().map(Self::to_wire).collect()),
            Self::Map(pairs) => Value::Object(
                pairs
                    .iter()
                    .map(|(key, value)| (key.clone(), Value::String(value.clone())))
                    .collect(),
            ),
        }
    }

    /// Collects the devices referenced by this value.
    pub fn devices<'a>(&'a self, found: &mut Vec<&'a DeviceRef>) {
        match self {
            Self::Device(device) => found.push(device),
            Self::List(values) => values.iter().for_each(|value| value.devices(found)),
            Self::Float(_) | Self::Int(_) | Self::Text(_) | Self::Bool(_) | Self::Map(_) => {}
        }
    }
}

/// A translated invocation ready for submission or local execution.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    descriptor: Arc<JobDescriptor>,
    args: Vec<ArgValue>,
    kwargs: BTreeMap<String, ArgValue>,
    correlation_id: CorrelationId,
}

impl JobRequest {
    /// Builds a request with a freshly generated correlation id.
    #[must_use]
    pub fn new(
        descriptor: Arc<JobDescriptor>,
        args: Vec<ArgValue>,
        kwargs: BTreeMap<String, ArgValue>,
    ) -> Self {
        Self {
            descriptor,
            args,
            kwargs,
            correlation_id: CorrelationId::generate(),
        }
    }

    /// Descriptor the request was translated against.
    #[must_use]
    pub fn descriptor(&self) -> &JobDescriptor {
        &self.descriptor
    }

    /// Positional arguments.
    #[must_use]
    pub fn args(&self) -> &[ArgValue] {
        &self.args
    }

    /// Keyword arguments that were explicitly supplied.
    #[must_use]
    pub const fn kwargs(&self) -> &BTreeMap<String, ArgValue> {
        &self.kwargs
    }

    /// Identifier correlating this request with its status.
    #[must_use]
    pub const fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Every device referenced by the positional and keyword arguments.
    #[must_use]
    pub fn devices(&self) -> Vec<&DeviceRef> {
        let mut found = Vec::new();
        self.args.iter().for_each(|arg| arg.devices(&mut found));
        self.kwargs.values().for_each(|arg| arg.devices(&mut found));
        found
    }

    /// Builds the queue item submitted to the server.
    #[must_use]
    pub fn plan_item(&self) -> PlanItem {
        PlanItem {
            item_type: String::from("plan"),
            name: self.descriptor.name().to_owned(),
            args: self.args.iter().map(ArgValue::to_wire).collect(),
            kwargs: self
                .kwargs
                .iter()
                .map(|(key, value)| (key.clone(), value.to_wire()))
                .collect(),
        }
    }
}

/// Wire form of a plan queued on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanItem {
    /// Item type; always `plan` for translated jobs.
    pub item_type: String,
    /// Canonical plan name.
    pub name: String,
    /// Positional arguments.
    pub args: Vec<Value>,
    /// Keyword arguments.
    pub kwargs: Map<String, Value>,
}
