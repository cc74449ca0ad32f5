use std::fmt;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::resources::cloudprofiles::{CloudProfileSpec, ExpirableVersion, MachineImageVersion};
use crate::resources::shoots::ShootSpec;

/// Why a requested version could not be turned into a concrete one.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("invalid semantic version {version:?}: component {component:?} is not a number")]
    InvalidComponent { version: String, component: String },
    #[error("invalid semantic version {0:?}: expected at most three components")]
    TooManyComponents(String),
    #[error("couldn't find a suitable version for {0}. Suitable versions have a non-expired expiration date and are no 'preview' versions. 'Preview'-classified versions have to be selected explicitly.")]
    NoSuitableVersion(VersionPrefix),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {reason}")]
pub struct VersionError {
    pub field: String,
    pub reason: ResolveError,
}

/// The leading components of a version that has not been fully pinned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VersionPrefix {
    pub major: Option<u64>,
    pub minor: Option<u64>,
}

impl VersionPrefix {
    pub fn matches(&self, version: &semver::Version) -> bool {
        self.major.is_none_or(|major| major == version.major)
            && self.minor.is_none_or(|minor| minor == version.minor)
    }
}

impl fmt::Display for VersionPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.major, self.minor) {
            (Some(major), Some(minor)) => write!(f, "{major}.{minor}"),
            (Some(major), None) => write!(f, "{major}"),
            _ => write!(f, "*"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRequest<'a> {
    /// All three components are given; used as-is.
    Pinned(&'a str),
    Prefix(VersionPrefix),
}

impl<'a> VersionRequest<'a> {
    pub fn parse(requested: &'a str) -> Result<Self, ResolveError> {
        if requested.is_empty() {
            return Ok(VersionRequest::Prefix(VersionPrefix::default()));
        }

        let components: Vec<&str> = requested.split('.').collect();
        let parse = |component: &str| {
            component
                .parse::<u64>()
                .map_err(|_| ResolveError::InvalidComponent {
                    version: requested.into(),
                    component: component.into(),
                })
        };

        match components.as_slice() {
            [_, _, _] => Ok(VersionRequest::Pinned(requested)),
            [major] => Ok(VersionRequest::Prefix(VersionPrefix {
                major: Some(parse(*major)?),
                minor: None,
            })),
            [major, minor] => Ok(VersionRequest::Prefix(VersionPrefix {
                major: Some(parse(*major)?),
                minor: Some(parse(*minor)?),
            })),
            _ => Err(ResolveError::TooManyComponents(requested.into())),
        }
    }
}

/// Catalog entries carrying lifecycle metadata.
pub trait Versioned {
    fn expirable(&self) -> &ExpirableVersion;
}

impl Versioned for ExpirableVersion {
    fn expirable(&self) -> &ExpirableVersion {
        self
    }
}

impl Versioned for MachineImageVersion {
    fn expirable(&self) -> &ExpirableVersion {
        &self.expirable
    }
}

/// Greatest version among the candidates that is eligible for defaulting and matches `prefix`.
pub fn latest_eligible<'a, V: Versioned>(
    prefix: &VersionPrefix,
    candidates: impl IntoIterator<Item = &'a V>,
    now: DateTime<Utc>,
) -> Option<&'a V>
where
    V: 'a,
{
    candidates
        .into_iter()
        .filter(|c| c.expirable().is_eligible_for_defaulting(now))
        .filter_map(|c| match semver::Version::parse(&c.expirable().version) {
            Ok(version) => Some((version, c)),
            Err(e) => {
                debug!(
                    version = %c.expirable().version,
                    "Ignoring unparsable catalog version: {e}"
                );
                None
            }
        })
        .filter(|(version, _)| prefix.matches(version))
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, c)| c)
}

/// Resolve a possibly partial version against the catalog.
pub fn resolve_version(
    requested: &str,
    versions: &[ExpirableVersion],
    now: DateTime<Utc>,
) -> Result<String, ResolveError> {
    match VersionRequest::parse(requested)? {
        VersionRequest::Pinned(version) => Ok(version.to_string()),
        VersionRequest::Prefix(prefix) => latest_eligible(&prefix, versions, now)
            .map(|v| v.version.clone())
            .ok_or(ResolveError::NoSuitableVersion(prefix)),
    }
}

/// Resolves the control plane version and every partial worker version override in place.
pub fn default_kubernetes_versions(
    spec: &mut ShootSpec,
    profile: &CloudProfileSpec,
    now: DateTime<Utc>,
) -> Result<(), VersionError> {
    let versions = &profile.kubernetes.versions;

    let resolved = resolve_version(&spec.kubernetes.version, versions, now).map_err(|reason| {
        VersionError {
            field: "spec.kubernetes.version".into(),
            reason,
        }
    })?;
    if resolved != spec.kubernetes.version {
        debug!(
            requested = %spec.kubernetes.version,
            resolved = %resolved,
            "Defaulted control plane version"
        );
        spec.kubernetes.version = resolved;
    }

    for (i, worker) in spec.provider.workers.iter_mut().enumerate() {
        let Some(version) = worker
            .kubernetes
            .as_mut()
            .and_then(|k| k.version.as_mut())
            .filter(|v| !v.is_empty())
        else {
            continue;
        };

        *version = resolve_version(version.as_str(), versions, now).map_err(|reason| VersionError {
            field: format!("spec.provider.workers[{i}].kubernetes.version"),
            reason,
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::cloudprofiles::VersionClassification;
    use crate::resources::shoots::{Worker, WorkerKubernetes};
    use chrono::Duration;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    fn version(v: &str, classification: VersionClassification) -> ExpirableVersion {
        ExpirableVersion {
            version: v.into(),
            classification: Some(classification),
            expiration_date: None,
        }
    }

    fn expired(v: &str, classification: VersionClassification) -> ExpirableVersion {
        ExpirableVersion {
            expiration_date: Some(Time(Utc::now() - Duration::hours(1))),
            ..version(v, classification)
        }
    }

    fn catalog() -> Vec<ExpirableVersion> {
        vec![
            version("1.27.2", VersionClassification::Supported),
            version("1.27.3", VersionClassification::Supported),
            version("1.28.0", VersionClassification::Preview),
        ]
    }

    #[test]
    fn empty_version_resolves_to_latest_supported() {
        assert_eq!(
            resolve_version("", &catalog(), Utc::now()).unwrap(),
            "1.27.3"
        );
    }

    #[test]
    fn full_versions_are_taken_as_is() {
        let now = Utc::now();
        for pinned in ["1.28.0", "1.99.99", "1.24.12"] {
            assert_eq!(resolve_version(pinned, &catalog(), now).unwrap(), pinned);
        }
    }

    #[test]
    fn major_minor_resolves_to_latest_patch() {
        let mut versions = catalog();
        versions.push(version("1.26.9", VersionClassification::Deprecated));
        versions.push(version("1.26.10", VersionClassification::Deprecated));

        assert_eq!(
            resolve_version("1.26", &versions, Utc::now()).unwrap(),
            "1.26.10"
        );
        assert_eq!(
            resolve_version("1", &versions, Utc::now()).unwrap(),
            "1.27.3"
        );
    }

    #[test]
    fn resolution_is_idempotent() {
        let now = Utc::now();
        let first = resolve_version("1.27", &catalog(), now).unwrap();
        assert_eq!(resolve_version(&first, &catalog(), now).unwrap(), first);
    }

    #[test]
    fn only_expired_candidates_fail() {
        let versions = vec![expired("1.24.12", VersionClassification::Deprecated)];
        let err = resolve_version("1.24", &versions, Utc::now()).unwrap_err();

        assert!(err
            .to_string()
            .contains("couldn't find a suitable version for 1.24"));
        assert_eq!(
            resolve_version("1.24.12", &versions, Utc::now()).unwrap(),
            "1.24.12"
        );
    }

    #[test]
    fn only_preview_candidates_fail() {
        let err = resolve_version("1.28", &catalog(), Utc::now()).unwrap_err();
        assert_eq!(
            err,
            ResolveError::NoSuitableVersion(VersionPrefix {
                major: Some(1),
                minor: Some(28)
            })
        );
        assert!(err.to_string().contains("selected explicitly"));
    }

    #[test]
    fn non_numeric_components_are_rejected() {
        let err = resolve_version("1.x", &catalog(), Utc::now()).unwrap_err();
        assert_eq!(
            err,
            ResolveError::InvalidComponent {
                version: "1.x".into(),
                component: "x".into()
            }
        );
        assert!(err.to_string().contains("invalid semantic version"));

        assert!(matches!(
            resolve_version("1.27.3.4", &catalog(), Utc::now()),
            Err(ResolveError::TooManyComponents(_))
        ));
    }

    #[test]
    fn unparsable_catalog_entries_are_ignored() {
        let versions = vec![
            version("1.27", VersionClassification::Supported),
            version("1.27.1", VersionClassification::Supported),
        ];
        assert_eq!(
            resolve_version("1.27", &versions, Utc::now()).unwrap(),
            "1.27.1"
        );
    }

    fn worker(name: &str, version: Option<&str>) -> Worker {
        Worker {
            name: name.into(),
            kubernetes: version.map(|v| WorkerKubernetes {
                version: Some(v.into()),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_control_plane_and_partial_worker_overrides() {
        let profile = CloudProfileSpec {
            kubernetes: crate::resources::cloudprofiles::KubernetesSettings {
                versions: vec![
                    version("1.27.3", VersionClassification::Supported),
                    version("1.26.5", VersionClassification::Supported),
                    expired("1.25.9", VersionClassification::Deprecated),
                ],
            },
            ..Default::default()
        };
        let mut spec = ShootSpec::default();
        spec.kubernetes.version = "1.27".into();
        spec.provider.workers = vec![
            worker("partial", Some("1.26")),
            worker("pinned-expired", Some("1.25.9")),
            worker("inherit", None),
        ];

        default_kubernetes_versions(&mut spec, &profile, Utc::now()).unwrap();

        assert_eq!(spec.kubernetes.version, "1.27.3");
        assert_eq!(
            spec.provider.workers[0].kubernetes,
            Some(WorkerKubernetes {
                version: Some("1.26.5".into())
            })
        );
        assert_eq!(
            spec.provider.workers[1].kubernetes,
            Some(WorkerKubernetes {
                version: Some("1.25.9".into())
            })
        );
        assert_eq!(spec.provider.workers[2].kubernetes, None);
    }

    #[test]
    fn worker_failures_name_the_field() {
        let profile = CloudProfileSpec {
            kubernetes: crate::resources::cloudprofiles::KubernetesSettings {
                versions: vec![version("1.27.3", VersionClassification::Supported)],
            },
            ..Default::default()
        };
        let mut spec = ShootSpec::default();
        spec.provider.workers = vec![worker("a", Some("1.25"))];

        let err = default_kubernetes_versions(&mut spec, &profile, Utc::now()).unwrap_err();
        assert_eq!(err.field, "spec.provider.workers[0].kubernetes.version");
        // the control plane was resolved before the worker failed, but the caller drops the copy
        assert_eq!(spec.kubernetes.version, "1.27.3");
    }
}
