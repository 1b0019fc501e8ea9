//! OpenShift cluster upgrades on managed clusters.
//!
//! Reads the remote `ClusterVersion` through a view, points
//! `spec.desiredUpdate` at one of its available updates, and writes it back
//! through an action.

use serde_json::{json, Value};
use tracing::info;

use crate::action::{update_remote_resource, ActionTarget};
use crate::error::RemoteError;
use crate::orchestrator::Orchestrator;
use crate::view::{get_remote_resource, RemoteResourceRef};

const CLUSTER_VERSION_GROUP: &str = "config.openshift.io";
const CLUSTER_VERSION_VERSION: &str = "v1";
const CLUSTER_VERSION_PLURAL: &str = "clusterversions";
const CLUSTER_VERSION_KIND: &str = "ClusterVersion";
const CLUSTER_VERSION_NAME: &str = "version";

fn cluster_version_ref() -> RemoteResourceRef {
    RemoteResourceRef::cluster_scoped(
        CLUSTER_VERSION_GROUP,
        CLUSTER_VERSION_VERSION,
        CLUSTER_VERSION_PLURAL,
        CLUSTER_VERSION_KIND,
        CLUSTER_VERSION_NAME,
    )
}

/// Produce the `ClusterVersion` document that requests `desired_version`.
///
/// The version must be listed in `status.availableUpdates`; its image is
/// copied into `spec.desiredUpdate`. Status and managed fields are dropped so
/// the document can be used as an update template.
///
/// # Errors
/// Returns [`RemoteError::InvalidRequest`] if the version is not available or
/// the document is not an object.
pub fn plan_upgrade(cluster_version: &Value, desired_version: &str) -> Result<Value, RemoteError> {
    let update = cluster_version
        .pointer("/status/availableUpdates")
        .and_then(Value::as_array)
        .and_then(|updates| {
            updates
                .iter()
                .find(|u| u.get("version").and_then(Value::as_str) == Some(desired_version))
        })
        .ok_or_else(|| {
            RemoteError::InvalidRequest(format!("version {desired_version} is not available"))
        })?;

    let mut planned = cluster_version.clone();
    let Some(document) = planned.as_object_mut() else {
        return Err(RemoteError::InvalidRequest(
            "ClusterVersion is not an object".to_string(),
        ));
    };

    document.remove("status");
    if let Some(metadata) = document.get_mut("metadata").and_then(Value::as_object_mut) {
        metadata.remove("managedFields");
    }

    let spec = document
        .entry("spec")
        .or_insert_with(|| json!({}));
    let Some(spec) = spec.as_object_mut() else {
        return Err(RemoteError::InvalidRequest(
            "ClusterVersion spec is not an object".to_string(),
        ));
    };

    let mut desired = json!({ "version": desired_version });
    if let Some(image) = update.get("image") {
        desired["image"] = image.clone();
    }
    spec.insert("desiredUpdate".to_string(), desired);

    Ok(planned)
}

/// Start upgrading `cluster` to `desired_version`.
///
/// Resolves once the agent on the managed cluster has applied the new
/// desired update; the upgrade itself then proceeds on the cluster.
///
/// # Errors
/// Returns the view or action workflow's error, or
/// [`RemoteError::InvalidRequest`] if the version is not available.
pub async fn initiate_upgrade(
    orchestrator: &Orchestrator,
    cluster: &str,
    desired_version: &str,
) -> Result<(), RemoteError> {
    let current: Value = get_remote_resource(orchestrator, cluster, &cluster_version_ref()).await?;
    let planned = plan_upgrade(&current, desired_version)?;

    info!(cluster = %cluster, version = %desired_version, "Requesting cluster upgrade");

    update_remote_resource(
        orchestrator,
        cluster,
        &ActionTarget::new(CLUSTER_VERSION_PLURAL, CLUSTER_VERSION_NAME, ""),
        &planned,
    )
    .await
}
