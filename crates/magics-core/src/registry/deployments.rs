use crate::error::RegistryError;
use crate::registry::{JobDescriptor, JobRegistry, catalog};

/// Names of the deployments with a built-in whitelist.
pub const DEPLOYMENTS: [&str; 2] = ["common", "test"];

/// Builds a fresh whitelist for the named deployment.
///
/// # Errors
///
/// Returns [`RegistryError::UnknownDeployment`] for unknown names and
/// [`RegistryError::DuplicateAlias`] if a whitelist repeats an alias.
pub fn build_deployment(name: &str) -> Result<JobRegistry, RegistryError> {
    let descriptors: Vec<JobDescriptor> = match name {
        "common" => vec![
            catalog::mv(),
            catalog::read_many(),
            catalog::count(),
            catalog::scan(),
            catalog::grid_scan(),
            catalog::adaptive_scan(),
        ],
        "test" => vec![catalog::count(), catalog::mv()],
        other => {
            return Err(RegistryError::UnknownDeployment {
                name: other.to_owned(),
            });
        }
    };

    let mut registry = JobRegistry::new(name);
    for descriptor in descriptors {
        registry.register(descriptor)?;
    }
    Ok(registry)
}
