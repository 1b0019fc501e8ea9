//! `ManagedClusterView` and `ManagedClusterAction` custom resources.
//!
//! Both live in the hub namespace named after the managed cluster. The work
//! agent on that cluster fills in `status`; this crate only creates, reads and
//! deletes them.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

/// Condition type a view reports once the agent has fetched the resource.
pub const CONDITION_PROCESSING: &str = "Processing";

/// Condition type an action reports once the agent has applied it.
pub const CONDITION_COMPLETED: &str = "Completed";

/// Label marking views created by this crate.
pub const VIEW_LABEL: &str = "console.open-cluster-management.io/view";

/// Reads one resource on a managed cluster.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[kube(
    group = "view.open-cluster-management.io",
    version = "v1beta1",
    kind = "ManagedClusterView"
)]
#[kube(namespaced)]
#[kube(status = "ViewStatus")]
pub struct ManagedClusterViewSpec {
    pub scope: ViewScope,
}

/// The remote resource a view reads.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ViewScope {
    pub api_group: String,
    pub kind: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    pub name: String,
    pub namespace: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
pub struct ViewStatus {
    #[serde(default, deserialize_with = "null_as_default")]
    pub conditions: Vec<ResourceCondition>,
    /// The remote resource as fetched by the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl ViewStatus {
    /// Whether the agent has reported the view as processed.
    ///
    /// Only the type of the first condition is checked, not its status.
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.conditions
            .first()
            .is_some_and(|c| c.condition_type == CONDITION_PROCESSING)
    }
}

/// Applies a change to one resource on a managed cluster.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[kube(
    group = "action.open-cluster-management.io",
    version = "v1beta1",
    kind = "ManagedClusterAction"
)]
#[kube(namespaced)]
#[kube(status = "ActionStatus")]
pub struct ManagedClusterActionSpec {
    #[serde(rename = "actionType")]
    pub action_type: ActionType,
    pub kube: KubeWorkSpec,
}

/// What the agent does with the template.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
pub enum ActionType {
    Create,
    Update,
    Delete,
}

/// Target and desired content of an action.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
pub struct KubeWorkSpec {
    /// Resource plural, e.g. `clusterversions`.
    pub resource: String,
    pub name: String,
    pub namespace: String,
    pub template: serde_json::Value,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
pub struct ActionStatus {
    #[serde(default, deserialize_with = "null_as_default")]
    pub conditions: Vec<ResourceCondition>,
}

impl ActionStatus {
    /// The `Completed` condition, once the agent has reported one.
    #[must_use]
    pub fn completed(&self) -> Option<&ResourceCondition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == CONDITION_COMPLETED)
    }
}

/// Status condition reported by the work agent.
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCondition {
    /// Empty when the agent omitted it; matches no known condition type.
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub condition_type: String,

    /// "True", "False" or "Unknown".
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// Agents write partially filled status; read `null` like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Just the `status` of a polled resource; everything else is ignored.
#[derive(Deserialize, Debug)]
pub(crate) struct StatusEnvelope<S> {
    #[serde(default = "Option::default")]
    pub status: Option<S>,
}

/// The `reason` of a Kubernetes `Status` error body.
#[derive(Deserialize, Debug, Default)]
pub(crate) struct StatusReason {
    #[serde(default)]
    pub reason: Option<String>,
}
