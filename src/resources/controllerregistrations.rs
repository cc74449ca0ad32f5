use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A ControllerRegistration announces an extension controller and the extension resources it
/// is responsible for.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    kind = "ControllerRegistration",
    group = "core.gardener.cloud",
    version = "v1beta1",
    printcolumn = r#"{"name":"Resources", "type":"string", "jsonPath":".spec.resources[*].kind"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ControllerRegistrationSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<ControllerResource>>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControllerResource {
    pub kind: String,
    pub r#type: String,
    /// Whether this controller owns status and lifecycle of the kind/type. Defaults to true.
    /// This field is immutable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_enable: Option<bool>,
}

impl ControllerResource {
    pub fn is_primary(&self) -> bool {
        self.primary.unwrap_or(true)
    }
}

impl ControllerRegistrationSpec {
    pub fn resources(&self) -> &[ControllerResource] {
        self.resources.as_deref().unwrap_or_default()
    }
}
