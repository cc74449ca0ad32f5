use k8s_openapi::apimachinery::pkg::runtime::RawExtension;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Comma-separated list of reconciliation tasks the next Shoot reconciliation must run.
pub const SHOOT_TASKS_ANNOTATION: &str = "shoot.gardener.cloud/tasks";
/// Identity of the user that created the Shoot.
pub const CREATED_BY_ANNOTATION: &str = "gardener.cloud/created-by";
/// Marks a failed Shoot with confined spec rollout as needing another reconciliation.
pub const FAILED_SHOOT_NEEDS_RETRY_OPERATION_ANNOTATION: &str =
    "shoot.gardener.cloud/failed-shoot-needs-retry-operation";
pub const OPERATION_ANNOTATION: &str = "gardener.cloud/operation";
pub const MAINTENANCE_OPERATION_ANNOTATION: &str = "maintenance.gardener.cloud/operation";

pub const OPERATION_ROTATE_SSH_KEYPAIR: &str = "rotate-ssh-keypair";
pub const OPERATION_ROTATE_CREDENTIALS_START: &str = "rotate-credentials-start";
pub const OPERATION_ROTATE_CREDENTIALS_START_WITHOUT_WORKERS_ROLLOUT: &str =
    "rotate-credentials-start-without-workers-rollout";

/// A Shoot is the user-facing declaration of a managed Kubernetes cluster.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[kube(
    kind = "Shoot",
    group = "core.gardener.cloud",
    version = "v1beta1",
    namespaced,
    printcolumn = r#"{"name":"CloudProfile", "type":"string", "jsonPath":".spec.cloudProfileName"}"#,
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".spec.kubernetes.version"}"#,
    printcolumn = r#"{"name":"Seed", "type":"string", "jsonPath":".spec.seedName"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[kube(status = "ShootStatus")]
#[serde(rename_all = "camelCase")]
pub struct ShootSpec {
    /// Name of the CloudProfile providing versions and machine images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_profile_name: Option<String>,
    /// Name of the Seed hosting the control plane. Unset until the Shoot is scheduled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub kubernetes: Kubernetes,
    pub provider: Provider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub networking: Option<Networking>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<Dns>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hibernation: Option<Hibernation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance: Option<Maintenance>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
pub struct Kubernetes {
    /// Kubernetes version of the control plane. May be empty, `major` or `major.minor`, in which
    /// case it is resolved to the latest eligible patch version.
    #[serde(default)]
    pub version: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    #[serde(default)]
    pub r#type: String,
    /// Provider specific infrastructure configuration; opaque to admission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure_config: Option<RawExtension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workers: Vec<Worker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers_settings: Option<WorkersSettings>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    pub name: String,
    pub machine: Machine,
    /// Kubernetes settings overriding the control plane's for this pool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes: Option<WorkerKubernetes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_strategy: Option<MachineUpdateStrategy>,
    #[serde(default)]
    pub minimum: i32,
    #[serde(default)]
    pub maximum: i32,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    pub r#type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ShootMachineImage>,
    /// CPU architecture of the machines. Defaulted from the CloudProfile machine type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
pub struct ShootMachineImage {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
pub struct WorkerKubernetes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
pub enum MachineUpdateStrategy {
    AutoRollingUpdate,
    AutoInPlaceUpdate,
    ManualInPlaceUpdate,
}

impl MachineUpdateStrategy {
    pub fn is_in_place(self) -> bool {
        matches!(
            self,
            MachineUpdateStrategy::AutoInPlaceUpdate | MachineUpdateStrategy::ManualInPlaceUpdate
        )
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkersSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_access: Option<SshAccess>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
pub struct SshAccess {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
pub enum IpFamily {
    IPv4,
    IPv6,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Networking {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pods: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<String>,
    /// IP families of the cluster network. Defaults to `[IPv4]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_families: Option<Vec<IpFamily>>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
pub struct Dns {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub providers: Option<Vec<DnsProvider>>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DnsProvider {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
pub struct Hibernation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Maintenance {
    /// If set, spec changes are only rolled out during the maintenance time window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confine_spec_update_rollout: Option<bool>,
}

/// Status of the Shoot as recorded by the reconciliation flow.
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShootStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_operation: Option<LastOperation>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
pub struct LastOperation {
    pub r#type: String,
    pub state: LastOperationState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq)]
pub enum LastOperationState {
    #[default]
    Pending,
    Processing,
    Succeeded,
    Error,
    Failed,
    Aborted,
}

impl ShootSpec {
    /// A Shoot without worker pools has no nodes and therefore no pod network.
    pub fn is_workerless(&self) -> bool {
        self.provider.workers.is_empty()
    }

    pub fn is_hibernated(&self) -> bool {
        self.hibernation
            .as_ref()
            .and_then(|h| h.enabled)
            .unwrap_or(false)
    }

    pub fn ssh_access_enabled(&self) -> bool {
        self.provider
            .workers_settings
            .as_ref()
            .and_then(|s| s.ssh_access.as_ref())
            .and_then(|s| s.enabled)
            .unwrap_or(true)
    }

    pub fn confines_spec_update_rollout(&self) -> bool {
        self.maintenance
            .as_ref()
            .and_then(|m| m.confine_spec_update_rollout)
            .unwrap_or(false)
    }

    pub fn ip_families(&self) -> Vec<IpFamily> {
        match self
            .networking
            .as_ref()
            .and_then(|n| n.ip_families.as_deref())
        {
            Some(families) if !families.is_empty() => families.to_vec(),
            _ => vec![IpFamily::IPv4],
        }
    }

    pub fn worker(&self, name: &str) -> Option<&Worker> {
        self.provider.workers.iter().find(|w| w.name == name)
    }
}
