//! Keeps ownership of extension resources unambiguous.
//!
//! Every `(kind, type)` pair may be claimed as primary by at most one ControllerRegistration.
//! Registrations declaring `primary: false` observe a resource without owning it and may share
//! it with the owner and with each other.

use fnv::FnvHashSet;
use kube::ResourceExt;
use tracing::debug;

use crate::catalog::Lister;
use crate::resources::controllerregistrations::ControllerRegistration;

pub mod webhook;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("another ControllerRegistration {other:?} already registers resource {kind}/{resource_type} as primary")]
    PrimaryConflict {
        other: String,
        kind: String,
        resource_type: String,
    },

    #[error("spec.resources[{kind}/{resource_type}].primary: field is immutable")]
    PrimaryImmutable { kind: String, resource_type: String },
}

/// Rejects changes of `primary` for a resource declared both before and after an update.
pub fn validate_primary_unchanged(
    new: &ControllerRegistration,
    old: &ControllerRegistration,
) -> Result<(), RegistrationError> {
    for resource in new.spec.resources() {
        let previous = old
            .spec
            .resources()
            .iter()
            .find(|r| r.kind == resource.kind && r.r#type == resource.r#type);
        if previous.is_some_and(|p| p.is_primary() != resource.is_primary()) {
            return Err(RegistrationError::PrimaryImmutable {
                kind: resource.kind.clone(),
                resource_type: resource.r#type.clone(),
            });
        }
    }
    Ok(())
}

/// Rejects `registration` if one of its primary resources is already owned by another
/// registration.
pub fn validate_unique_primary(
    registration: &ControllerRegistration,
    existing: &dyn Lister<ControllerRegistration>,
) -> Result<(), RegistrationError> {
    let wanted: FnvHashSet<(&str, &str)> = registration
        .spec
        .resources()
        .iter()
        .filter(|r| r.is_primary())
        .map(|r| (r.kind.as_str(), r.r#type.as_str()))
        .collect();
    if wanted.is_empty() {
        return Ok(());
    }

    let name = registration.name_any();
    for other in existing.list() {
        if other.name_any() == name {
            continue;
        }
        for resource in other.spec.resources().iter().filter(|r| r.is_primary()) {
            if wanted.contains(&(resource.kind.as_str(), resource.r#type.as_str())) {
                debug!(
                    registration = %name,
                    owner = %other.name_any(),
                    kind = %resource.kind,
                    resource_type = %resource.r#type,
                    "Primary resource already claimed"
                );
                return Err(RegistrationError::PrimaryConflict {
                    other: other.name_any(),
                    kind: resource.kind.clone(),
                    resource_type: resource.r#type.clone(),
                });
            }
        }
    }
    Ok(())
}
