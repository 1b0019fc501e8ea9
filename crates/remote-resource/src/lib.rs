//! Read and update resources on managed clusters from the hub.
//!
//! Managed clusters are not reachable directly. Instead, this crate creates a
//! short-lived custom resource in the hub namespace named after the cluster,
//! waits for the cluster's work agent to fill in its status, and deletes it
//! again:
//!
//! ```text
//!  caller ──► view / action workflow
//!                   │
//!                   ▼
//!             Orchestrator ── GET ─► 404? ── POST ─► (409 AlreadyExists ok)
//!                   │
//!                   ▼
//!             PollSession ── GET every interval ─► Verifier
//!                   │                                 │
//!                   │◄──── Valid / Failed / Retry ────┘
//!                   ▼
//!             DELETE (always, result only logged)
//! ```
//!
//! - **`ManagedClusterView`** reads a remote resource; the result is its
//!   `status.result`.
//! - **`ManagedClusterAction`** replaces a remote resource; success is a
//!   `Completed` condition with status "true".
//!
//! Ephemeral resource names are a hash of the target, so a retried request
//! reuses whatever an earlier attempt left behind.
//!
//! ## Example
//!
//! ```ignore
//! use remote_resource::{
//!     get_remote_resource, ConnectionPolicy, HubClient, Orchestrator, PollSettings,
//!     RemoteResourceRef,
//! };
//!
//! let hub = HubClient::new("https://api.hub.example.com:6443", token, &ConnectionPolicy::default())?;
//! let orchestrator = Orchestrator::new(hub.shared(), PollSettings::from_millis(500, 20));
//!
//! let target = RemoteResourceRef::namespaced("apps", "v1", "deployments", "Deployment", "api", "payments");
//! let deployment: serde_json::Value = get_remote_resource(&orchestrator, "prod-east", &target).await?;
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod action;
pub mod config;
pub mod error;
pub mod naming;
pub mod orchestrator;
pub mod poll;
pub mod resources;
pub mod transport;
pub mod upgrade;
pub mod view;

#[cfg(test)]
pub(crate) mod testing;

pub use action::{build_action, update_remote_resource, verify_action, ActionTarget};
pub use config::{ConnectionPolicy, HubConfig, PollSettings};
pub use error::{RemoteError, RequestException};
pub use naming::ephemeral_name;
pub use orchestrator::Orchestrator;
pub use poll::{PollOutcome, PollPhase, PollSession, PollState, Verification, Verifier};
pub use resources::{ManagedClusterAction, ManagedClusterView};
pub use transport::{HubClient, NamespacedName, RawResponse, ResourceCoordinates, ResourceTransport};
pub use upgrade::{initiate_upgrade, plan_upgrade};
pub use view::{build_view, get_remote_resource, verify_view, RemoteResourceRef};
