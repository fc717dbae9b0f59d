//! Job registry enforcing a deployment's whitelist.
//!
//! A [`JobRegistry`] maps user-facing aliases to immutable
//! [`JobDescriptor`]s. Each deployment builds its own registry once at load
//! time; afterwards it is only read. Narrowing a registry to the plans the
//! server allows produces a new instance rather than mutating the old one.

pub mod catalog;
mod deployments;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::error::RegistryError;
use crate::shape::ParameterShape;

pub use deployments::{DEPLOYMENTS, build_deployment};

/// Behaviour tag telling executors which procedure a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Move motors to absolute positions.
    Move,
    /// Read a set of devices once.
    ReadMany,
    /// Read detectors repeatedly without moving anything.
    Count,
    /// Step motors linearly between bounds.
    Scan,
    /// Step motors over a multi-dimensional mesh.
    GridScan,
    /// Step a motor with a step size adapted to the measured signal.
    AdaptiveScan,
}

/// Immutable description of a submittable job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    name: String,
    alias: String,
    kind: JobKind,
    shape: ParameterShape,
    has_detectors: bool,
    summary: String,
}

impl JobDescriptor {
    /// Creates a descriptor.
    ///
    /// `has_detectors` follows the shape: a job accepts detectors exactly
    /// when one of its device groups is a detector slot.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        alias: impl Into<String>,
        kind: JobKind,
        shape: ParameterShape,
    ) -> Self {
        let has_detectors = shape.accepts_detectors();
        Self {
            name: name.into(),
            alias: alias.into(),
            kind,
            shape,
            has_detectors,
            summary: String::new(),
        }
    }

    /// Attaches a one-line summary shown by the help command.
    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Canonical name used by the execution engine.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// User-facing command name.
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Behaviour tag.
    #[must_use]
    pub const fn kind(&self) -> JobKind {
        self.kind
    }

    /// Declared parameter shape.
    #[must_use]
    pub const fn shape(&self) -> &ParameterShape {
        &self.shape
    }

    /// Whether the job accepts detector arguments at all.
    #[must_use]
    pub const fn has_detectors(&self) -> bool {
        self.has_detectors
    }

    /// One-line summary.
    #[must_use]
    pub fn summary(&self) -> &str {
        &self.summary
    }
}

/// Whitelist of jobs a deployment may submit.
///
/// # Example
///
/// ```
/// use magics_core::{JobRegistry, catalog};
///
/// let mut registry = JobRegistry::new("beamline");
/// registry.register(catalog::count()).expect("registration succeeds");
/// assert!(registry.resolve("count").is_ok());
/// assert!(registry.resolve("scan").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    deployment: String,
    descriptors: HashMap<String, Arc<JobDescriptor>>,
}

impl JobRegistry {
    /// Creates an empty registry for the named deployment.
    #[must_use]
    pub fn new(deployment: impl Into<String>) -> Self {
        Self {
            deployment: deployment.into(),
            descriptors: HashMap::new(),
        }
    }

    /// Registers a descriptor under its alias.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateAlias`] if the alias is taken.
    pub fn register(&mut self, descriptor: JobDescriptor) -> Result<(), RegistryError> {
        let alias = descriptor.alias().to_owned();
        if self.descriptors.contains_key(&alias) {
            return Err(RegistryError::DuplicateAlias { alias });
        }
        self.descriptors.insert(alias, Arc::new(descriptor));
        Ok(())
    }

    /// Looks up the descriptor registered under `alias`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownCommand`] when the alias is not part
    /// of this deployment's whitelist.
    pub fn resolve(&self, alias: &str) -> Result<Arc<JobDescriptor>, RegistryError> {
        self.descriptors
            .get(alias)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownCommand {
                alias: alias.to_owned(),
                deployment: self.deployment.clone(),
            })
    }

    /// Returns `true` when `alias` is registered.
    #[must_use]
    pub fn contains(&self, alias: &str) -> bool {
        self.descriptors.contains_key(alias)
    }

    /// Builds a new registry holding only jobs whose canonical name is in
    /// `allowed`.
    #[must_use]
    pub fn restrict_to(&self, allowed: &BTreeSet<String>) -> Self {
        Self {
            deployment: self.deployment.clone(),
            descriptors: self
                .descriptors
                .iter()
                .filter(|(_, descriptor)| allowed.contains(descriptor.name()))
                .map(|(alias, descriptor)| (alias.clone(), Arc::clone(descriptor)))
                .collect(),
        }
    }

    /// Name of the deployment this registry belongs to.
    #[must_use]
    pub fn deployment(&self) -> &str {
        &self.deployment
    }

    /// Registered descriptors sorted by alias.
    #[must_use]
    pub fn descriptors(&self) -> Vec<Arc<JobDescriptor>> {
        let mut descriptors: Vec<_> = self.descriptors.values().cloned().collect();
        descriptors.sort_by(|left, right| left.alias().cmp(right.alias()));
        descriptors
    }

    /// Returns the number of registered jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns `true` when no jobs are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
