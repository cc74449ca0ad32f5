use std::fmt;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::resources::cloudprofiles::{
    CloudProfileSpec, MachineImage, MachineImageVersion, ARCHITECTURE_CAPABILITY,
    DEFAULT_ARCHITECTURE,
};
use crate::resources::shoots::{ShootMachineImage, ShootSpec, Worker};

use super::kubernetes_version::{latest_eligible, ResolveError, VersionPrefix, VersionRequest};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MachineImageError {
    #[error("{field}: failed to determine latest machine image from cloud profile: no image has an eligible version supporting {requirements}")]
    NoDefaultImage {
        field: String,
        requirements: String,
    },
    #[error("{field}: failed to determine latest machine image from cloud profile: image {name:?} has no eligible version {prefix} supporting {requirements}")]
    NoSuitableVersion {
        field: String,
        name: String,
        prefix: VersionPrefix,
        requirements: String,
    },
    #[error("{field}: image is not supported: {name}:{version}")]
    NotSupported {
        field: String,
        name: String,
        version: String,
    },
    #[error("{field}: {reason}")]
    InvalidVersion { field: String, reason: ResolveError },
}

/// What a worker pool demands from its machine image version.
#[derive(Debug, Clone, Copy)]
pub struct ImageRequirements<'a> {
    pub architecture: &'a str,
    pub in_place_updates: bool,
    /// Architectures inherited by capability flavors that do not name one.
    pub default_architectures: Option<&'a [String]>,
}

impl ImageRequirements<'_> {
    pub fn admits(&self, version: &MachineImageVersion) -> bool {
        self.supports_architecture(version)
            && (!self.in_place_updates || version.supports_in_place_updates())
    }

    fn supports_architecture(&self, version: &MachineImageVersion) -> bool {
        let architecture = self.architecture;
        // capability flavors take precedence over the legacy architecture list
        match version.capability_flavors.as_deref() {
            Some(flavors) if !flavors.is_empty() => flavors.iter().any(|flavor| {
                match flavor.capabilities.get(ARCHITECTURE_CAPABILITY) {
                    Some(values) => values.iter().any(|v| v == architecture),
                    None => self
                        .default_architectures
                        .is_none_or(|values| values.iter().any(|v| v == architecture)),
                }
            }),
            _ => match version.architectures.as_deref() {
                Some(values) if !values.is_empty() => values.iter().any(|v| v == architecture),
                _ => architecture == DEFAULT_ARCHITECTURE,
            },
        }
    }

    fn latest<'i>(
        &self,
        image: &'i MachineImage,
        prefix: &VersionPrefix,
        now: DateTime<Utc>,
    ) -> Option<&'i MachineImageVersion> {
        latest_eligible(
            prefix,
            image.versions.iter().filter(|v| self.admits(v)),
            now,
        )
    }
}

impl fmt::Display for ImageRequirements<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "architecture {:?}", self.architecture)?;
        if self.in_place_updates {
            write!(f, " with in-place updates")?;
        }
        Ok(())
    }
}

/// Resolves architecture and machine image of every worker pool in place.
pub fn default_machine_images(
    spec: &mut ShootSpec,
    old: Option<&ShootSpec>,
    profile: &CloudProfileSpec,
    now: DateTime<Utc>,
) -> Result<(), MachineImageError> {
    for (i, worker) in spec.provider.workers.iter_mut().enumerate() {
        let old_worker = old.and_then(|o| o.worker(&worker.name));

        let architecture = worker_architecture(worker, old_worker, profile);
        worker.machine.architecture = Some(architecture.clone());

        let requirements = ImageRequirements {
            architecture: &architecture,
            in_place_updates: worker.update_strategy.is_some_and(|s| s.is_in_place()),
            default_architectures: profile.capability_values(ARCHITECTURE_CAPABILITY),
        };
        let field = format!("spec.provider.workers[{i}].machine.image");
        let old_image = old_worker.and_then(|w| w.machine.image.as_ref());

        let image = resolve_image(
            worker.machine.image.as_ref(),
            old_image,
            profile,
            &requirements,
            now,
            &field,
        )?;
        if worker.machine.image.as_ref() != Some(&image) {
            debug!(
                worker = %worker.name,
                image = %image.name,
                version = ?image.version,
                "Defaulted machine image"
            );
        }
        worker.machine.image = Some(image);
    }
    Ok(())
}

fn worker_architecture(
    worker: &Worker,
    old_worker: Option<&Worker>,
    profile: &CloudProfileSpec,
) -> String {
    worker
        .machine
        .architecture
        .clone()
        .or_else(|| old_worker.and_then(|w| w.machine.architecture.clone()))
        .or_else(|| {
            profile
                .machine_type(&worker.machine.r#type)
                .and_then(|t| t.architecture.clone())
        })
        .unwrap_or_else(|| DEFAULT_ARCHITECTURE.into())
}

fn resolve_image(
    image: Option<&ShootMachineImage>,
    old_image: Option<&ShootMachineImage>,
    profile: &CloudProfileSpec,
    requirements: &ImageRequirements<'_>,
    now: DateTime<Utc>,
    field: &str,
) -> Result<ShootMachineImage, MachineImageError> {
    let image = match (image, old_image) {
        // passive edits keep whatever image the pool already runs
        (None, Some(old)) => return Ok(old.clone()),
        (None, None) => return default_image(profile, requirements, now, field),
        (Some(image), _) => image,
    };

    let name = if !image.name.is_empty() {
        image.name.clone()
    } else if let Some(old) = old_image.filter(|o| !o.name.is_empty()) {
        old.name.clone()
    } else {
        default_image(profile, requirements, now, field)?.name
    };

    let requested = image.version.as_deref().unwrap_or_default();
    let not_supported = || MachineImageError::NotSupported {
        field: field.into(),
        name: name.clone(),
        version: requested.into(),
    };

    if requested.is_empty() {
        if let Some(version) = old_image
            .filter(|o| o.name == name)
            .and_then(|o| o.version.clone())
            .filter(|v| !v.is_empty())
        {
            return Ok(ShootMachineImage {
                name,
                version: Some(version),
            });
        }
    }

    let request = VersionRequest::parse(requested).map_err(|reason| {
        MachineImageError::InvalidVersion {
            field: field.into(),
            reason,
        }
    })?;

    match request {
        VersionRequest::Pinned(version) => {
            let unchanged = old_image
                .is_some_and(|o| o.name == name && o.version.as_deref() == Some(version));
            let offered = profile
                .machine_image(&name)
                .is_some_and(|i| i.versions.iter().any(|v| v.version() == version));
            if unchanged || offered {
                Ok(ShootMachineImage {
                    name,
                    version: Some(version.into()),
                })
            } else {
                Err(not_supported())
            }
        }
        VersionRequest::Prefix(prefix) => {
            let catalog_image = profile.machine_image(&name).ok_or_else(not_supported)?;
            let version = requirements
                .latest(catalog_image, &prefix, now)
                .ok_or_else(|| MachineImageError::NoSuitableVersion {
                    field: field.into(),
                    name: name.clone(),
                    prefix,
                    requirements: requirements.to_string(),
                })?;
            Ok(ShootMachineImage {
                name,
                version: Some(version.version().into()),
            })
        }
    }
}

/// The first catalog image, in declaration order, with a version satisfying the requirements.
fn default_image(
    profile: &CloudProfileSpec,
    requirements: &ImageRequirements<'_>,
    now: DateTime<Utc>,
    field: &str,
) -> Result<ShootMachineImage, MachineImageError> {
    profile
        .machine_images
        .iter()
        .find_map(|image| {
            requirements
                .latest(image, &VersionPrefix::default(), now)
                .map(|version| ShootMachineImage {
                    name: image.name.clone(),
                    version: Some(version.version().into()),
                })
        })
        .ok_or_else(|| MachineImageError::NoDefaultImage {
            field: field.into(),
            requirements: requirements.to_string(),
        })
}
