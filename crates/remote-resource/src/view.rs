//! Read a resource on a managed cluster through a `ManagedClusterView`.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use tracing::info;

use crate::error::RemoteError;
use crate::naming::ephemeral_name;
use crate::orchestrator::Orchestrator;
use crate::poll::Verification;
use crate::resources::{
    ManagedClusterView, ManagedClusterViewSpec, StatusEnvelope, ViewScope, ViewStatus, VIEW_LABEL,
};
use crate::transport::{NamespacedName, RawResponse, ResourceCoordinates};

/// A resource on a managed cluster, addressed by type and name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResourceRef {
    pub api_group: String,
    pub version: String,
    /// Resource plural, e.g. `deployments`.
    pub resource: String,
    pub kind: String,
    pub name: String,
    /// Empty for cluster-scoped resources.
    pub namespace: String,
}

impl RemoteResourceRef {
    pub fn namespaced(
        api_group: impl Into<String>,
        version: impl Into<String>,
        resource: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            api_group: api_group.into(),
            version: version.into(),
            resource: resource.into(),
            kind: kind.into(),
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn cluster_scoped(
        api_group: impl Into<String>,
        version: impl Into<String>,
        resource: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::namespaced(api_group, version, resource, kind, name, "")
    }
}

/// Build the view that reads `target` from `cluster`.
#[must_use]
pub fn build_view(cluster: &str, target: &RemoteResourceRef) -> ManagedClusterView {
    let view_name = ephemeral_name(cluster, &target.resource, &target.namespace, &target.name);

    let mut view = ManagedClusterView::new(
        &view_name,
        ManagedClusterViewSpec {
            scope: ViewScope {
                api_group: target.api_group.clone(),
                kind: target.kind.clone(),
                version: target.version.clone(),
                resource: Some(target.resource.clone()),
                name: target.name.clone(),
                namespace: target.namespace.clone(),
            },
        },
    );
    view.metadata.namespace = Some(cluster.to_string());
    view.metadata.labels = Some(BTreeMap::from([
        ("name".to_string(), view_name),
        (VIEW_LABEL.to_string(), "true".to_string()),
    ]));
    view
}

/// Decide whether a fetched view holds the remote resource yet.
///
/// A first condition of type `Processing` means done, whatever its status,
/// and `status.result` is decoded as `T`. Non-2xx responses fail with their
/// own status and body.
pub fn verify_view<T: DeserializeOwned>(response: &RawResponse) -> Verification<T> {
    if !response.is_success() {
        return Verification::from_status(response);
    }

    let envelope: StatusEnvelope<ViewStatus> = match response.json() {
        Ok(envelope) => envelope,
        Err(e) => {
            return Verification::failed(500, format!("failed to decode ManagedClusterView: {e}"))
        }
    };

    match envelope.status {
        Some(status) if status.is_processing() => {
            match serde_json::from_value(status.result.unwrap_or_default()) {
                Ok(data) => Verification::Valid(data),
                Err(e) => Verification::failed(500, format!("failed to decode view result: {e}")),
            }
        }
        _ => Verification::Retry,
    }
}

/// Fetch `target` from `cluster` and return it decoded as `T`.
///
/// # Errors
/// Returns the orchestrator's error: hub status errors, verification
/// failures, [`RemoteError::Exhausted`] when the agent never answers.
pub async fn get_remote_resource<T: DeserializeOwned>(
    orchestrator: &Orchestrator,
    cluster: &str,
    target: &RemoteResourceRef,
) -> Result<T, RemoteError> {
    let view = build_view(cluster, target);
    let view_target = NamespacedName::new(view.metadata.name.clone().unwrap_or_default(), cluster);

    info!(
        cluster = %cluster,
        kind = %target.kind,
        name = %target.name,
        namespace = %target.namespace,
        view = %view_target.name,
        "Reading remote resource"
    );

    orchestrator
        .run(
            &ResourceCoordinates::of::<ManagedClusterView>(),
            &view_target,
            &view,
            &verify_view::<T>,
        )
        .await
}
