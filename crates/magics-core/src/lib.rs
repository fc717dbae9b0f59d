//! Command translation core for the magics console.
//!
//! The crate turns short textual commands into structured job requests
//! without touching the network. It holds the pieces every execution mode
//! shares:
//!
//! - [`Namespace`], the shared store of devices and other live objects;
//! - [`JobRegistry`], the per-deployment whitelist of permitted jobs;
//! - [`Translator`], which validates input against a job's declared shape
//!   and produces a [`JobRequest`];
//! - [`MetadataStore`], session metadata merged into each request.
//!
//! # Example
//!
//! ```
//! use magics_core::{Namespace, Translator, build_deployment, simulated_devices};
//!
//! let namespace = Namespace::with_devices(simulated_devices());
//! let registry = build_deployment("common").expect("deployment builds");
//! let descriptor = registry.resolve("count").expect("count is whitelisted");
//!
//! let tokens = vec![String::from("SIM_det")];
//! let request = Translator::new(&namespace)
//!     .translate(&descriptor, &tokens)
//!     .expect("translation succeeds");
//! assert_eq!(request.args().len(), 1);
//! assert!(request.kwargs().is_empty());
//! ```

pub mod device;
pub mod error;
pub mod metadata;
pub mod namespace;
pub mod registry;
pub mod request;
pub mod shape;
pub mod translator;

#[cfg(test)]
mod tests;

pub use self::device::{DeviceKind, DeviceRef, simulated_devices};
pub use self::error::{NamespaceError, RegistryError, TranslateError};
pub use self::metadata::MetadataStore;
pub use self::namespace::{Namespace, NamespaceValue, keys};
pub use self::registry::{DEPLOYMENTS, JobDescriptor, JobKind, JobRegistry, build_deployment, catalog};
pub use self::request::{ArgValue, CorrelationId, JobRequest, PlanItem};
pub use self::translator::Translator;
