//! Deterministic names for ephemeral resources.
//!
//! Repeated requests for the same remote object map to the same ephemeral
//! resource name, so a retried request reuses the view or action left behind
//! by an earlier attempt instead of creating another one.

use sha1::{Digest, Sha1};

/// Longest name Kubernetes accepts for a DNS label.
pub const MAX_NAME_LEN: usize = 63;

/// Derive the ephemeral resource name for a remote object.
///
/// The four inputs are joined with `/`, which cannot occur in cluster names,
/// resource plurals, namespaces or object names, so distinct tuples never
/// hash the same input. The result is lowercase hex (40 characters).
#[must_use]
pub fn ephemeral_name(cluster: &str, resource_plural: &str, namespace: &str, name: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("{cluster}/{resource_plural}/{namespace}/{name}").as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(MAX_NAME_LEN);
    digest
}
