//! Update a resource on a managed cluster through a `ManagedClusterAction`.

use serde::Serialize;
use tracing::info;

use crate::error::RemoteError;
use crate::naming::ephemeral_name;
use crate::orchestrator::Orchestrator;
use crate::poll::Verification;
use crate::resources::{
    ActionStatus, ActionType, KubeWorkSpec, ManagedClusterAction, ManagedClusterActionSpec,
    StatusEnvelope,
};
use crate::transport::{NamespacedName, RawResponse, ResourceCoordinates};

/// Message used when a failed action carries no message of its own.
pub const DEFAULT_ACTION_FAILURE: &str = "failed to apply resource update";

/// The remote object an action replaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionTarget {
    /// Resource plural, e.g. `clusterversions`.
    pub resource: String,
    pub name: String,
    /// Empty for cluster-scoped resources.
    pub namespace: String,
}

impl ActionTarget {
    pub fn new(
        resource: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            resource: resource.into(),
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

/// Build the action that replaces `target` on `cluster` with `template`.
#[must_use]
pub fn build_action(
    cluster: &str,
    target: &ActionTarget,
    template: serde_json::Value,
) -> ManagedClusterAction {
    let action_name = ephemeral_name(cluster, &target.resource, &target.namespace, &target.name);

    let mut action = ManagedClusterAction::new(
        &action_name,
        ManagedClusterActionSpec {
            action_type: ActionType::Update,
            kube: KubeWorkSpec {
                resource: target.resource.clone(),
                name: target.name.clone(),
                namespace: target.namespace.clone(),
                template,
            },
        },
    );
    action.metadata.namespace = Some(cluster.to_string());
    action
}

/// Decide whether a fetched action has been applied.
///
/// Keeps polling until a `Completed` condition shows up. Its status must be
/// "true" (any case) for success; otherwise the condition's message becomes
/// the failure.
pub fn verify_action(response: &RawResponse) -> Verification<()> {
    if !response.is_success() {
        return Verification::from_status(response);
    }

    let envelope: StatusEnvelope<ActionStatus> = match response.json() {
        Ok(envelope) => envelope,
        Err(e) => {
            return Verification::failed(
                500,
                format!("failed to decode ManagedClusterAction: {e}"),
            )
        }
    };

    let Some(completed) = envelope.status.as_ref().and_then(ActionStatus::completed) else {
        return Verification::Retry;
    };

    if completed.status.eq_ignore_ascii_case("true") {
        Verification::Valid(())
    } else {
        Verification::failed(
            500,
            completed
                .message
                .clone()
                .unwrap_or_else(|| DEFAULT_ACTION_FAILURE.to_string()),
        )
    }
}

/// Replace `target` on `cluster` with `desired` and wait until it is applied.
///
/// # Errors
/// Returns the orchestrator's error; a `Completed` condition that is not
/// "true" becomes a 500 [`RemoteError::Verification`].
pub async fn update_remote_resource<B: Serialize + ?Sized>(
    orchestrator: &Orchestrator,
    cluster: &str,
    target: &ActionTarget,
    desired: &B,
) -> Result<(), RemoteError> {
    let action = build_action(cluster, target, serde_json::to_value(desired)?);
    let action_target =
        NamespacedName::new(action.metadata.name.clone().unwrap_or_default(), cluster);

    info!(
        cluster = %cluster,
        resource = %target.resource,
        name = %target.name,
        namespace = %target.namespace,
        action = %action_target.name,
        "Updating remote resource"
    );

    orchestrator
        .run(
            &ResourceCoordinates::of::<ManagedClusterAction>(),
            &action_target,
            &action,
            &verify_action,
        )
        .await
}
