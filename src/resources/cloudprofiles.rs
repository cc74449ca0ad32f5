use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Capability name that carries the CPU architecture of a machine image flavor.
pub const ARCHITECTURE_CAPABILITY: &str = "architecture";

/// Architecture assumed for machine image versions that declare none.
pub const DEFAULT_ARCHITECTURE: &str = "amd64";

/// A CloudProfile is the catalog of Kubernetes versions, machine images and machine types
/// offered on one infrastructure.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    kind = "CloudProfile",
    group = "core.gardener.cloud",
    version = "v1beta1",
    printcolumn = r#"{"name":"Type", "type":"string", "jsonPath":".spec.type"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CloudProfileSpec {
    /// Type is the name of the infrastructure provider.
    #[serde(default)]
    pub r#type: String,
    /// Kubernetes versions offered for control planes and worker pools.
    pub kubernetes: KubernetesSettings,
    /// Machine images offered for worker pools, in declaration order.
    #[serde(default)]
    pub machine_images: Vec<MachineImage>,
    /// Machine types offered for worker pools.
    #[serde(default)]
    pub machine_types: Vec<MachineType>,
    /// Capability definitions; supply the values a flavor inherits when it omits a capability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Vec<CapabilityDefinition>>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
pub struct KubernetesSettings {
    #[serde(default)]
    pub versions: Vec<ExpirableVersion>,
}

/// Lifecycle stage of a catalog version.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VersionClassification {
    Preview,
    Supported,
    Deprecated,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExpirableVersion {
    pub version: String,
    /// Classification of the version. Versions without one are treated as supported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<VersionClassification>,
    /// After this date the version is no longer picked when defaulting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<Time>,
}

impl ExpirableVersion {
    pub fn classification(&self) -> VersionClassification {
        self.classification
            .unwrap_or(VersionClassification::Supported)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date
            .as_ref()
            .is_some_and(|expiration| expiration.0 <= now)
    }

    /// Whether the version may be chosen when a caller leaves the version (partially) unset.
    pub fn is_eligible_for_defaulting(&self, now: DateTime<Utc>) -> bool {
        self.classification() != VersionClassification::Preview && !self.is_expired(now)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
pub struct MachineImage {
    pub name: String,
    #[serde(default)]
    pub versions: Vec<MachineImageVersion>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineImageVersion {
    #[serde(flatten)]
    pub expirable: ExpirableVersion,
    /// Legacy architecture list, only consulted when no capability flavors are declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architectures: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability_flavors: Option<Vec<CapabilityFlavor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_place_updates: Option<InPlaceUpdates>,
}

impl MachineImageVersion {
    pub fn version(&self) -> &str {
        &self.expirable.version
    }

    pub fn supports_in_place_updates(&self) -> bool {
        self.in_place_updates
            .as_ref()
            .is_some_and(|in_place| in_place.supported)
    }
}

/// A set of capability values a machine image version satisfies, e.g. `architecture: [arm64]`.
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
pub struct CapabilityFlavor {
    #[serde(default)]
    pub capabilities: BTreeMap<String, Vec<String>>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InPlaceUpdates {
    pub supported: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_version_for_update: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
pub struct MachineType {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
pub struct CapabilityDefinition {
    pub name: String,
    #[serde(default)]
    pub values: Vec<String>,
}

impl CloudProfileSpec {
    pub fn machine_image(&self, name: &str) -> Option<&MachineImage> {
        self.machine_images.iter().find(|image| image.name == name)
    }

    pub fn machine_type(&self, name: &str) -> Option<&MachineType> {
        self.machine_types.iter().find(|t| t.name == name)
    }

    /// Values declared for a capability, if the profile defines it.
    pub fn capability_values(&self, name: &str) -> Option<&[String]> {
        self.capabilities
            .as_deref()?
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn unclassified_versions_are_supported() {
        let version = ExpirableVersion {
            version: "1.30.1".into(),
            ..Default::default()
        };
        assert_eq!(version.classification(), VersionClassification::Supported);
        assert!(version.is_eligible_for_defaulting(Utc::now()));
    }

    #[test]
    fn expired_and_preview_versions_are_not_eligible() {
        let now = Utc::now();
        let expired = ExpirableVersion {
            version: "1.24.12".into(),
            classification: Some(VersionClassification::Deprecated),
            expiration_date: Some(Time(now - Duration::days(1))),
        };
        let preview = ExpirableVersion {
            version: "1.31.0".into(),
            classification: Some(VersionClassification::Preview),
            expiration_date: None,
        };
        let expiring_later = ExpirableVersion {
            version: "1.29.4".into(),
            classification: Some(VersionClassification::Deprecated),
            expiration_date: Some(Time(now + Duration::days(30))),
        };

        assert!(!expired.is_eligible_for_defaulting(now));
        assert!(!preview.is_eligible_for_defaulting(now));
        assert!(expiring_later.is_eligible_for_defaulting(now));
    }

    #[test]
    fn machine_image_version_deserializes_flattened() {
        let version: MachineImageVersion = serde_json::from_value(serde_json::json!({
            "version": "1443.3.0",
            "classification": "supported",
            "architectures": ["amd64", "arm64"],
            "inPlaceUpdates": {"supported": true}
        }))
        .unwrap();

        assert_eq!(version.version(), "1443.3.0");
        assert_eq!(
            version.expirable.classification,
            Some(VersionClassification::Supported)
        );
        assert!(version.supports_in_place_updates());
    }
}
