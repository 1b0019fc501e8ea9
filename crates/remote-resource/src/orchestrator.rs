//! Create, poll, then delete an ephemeral hub resource.
//!
//! [`Orchestrator::run`] makes sure the ephemeral resource exists (creating it
//! when the GET answers 404 and accepting a 409 `AlreadyExists` from a racing
//! caller), polls it until the verifier is satisfied, and deletes it again.
//! Once the resource exists, deletion runs on every path out of the poll:
//! success, failure, exhaustion, cancellation, and the future being dropped.
//! A failed delete is logged and never changes the result.

use std::sync::Arc;

use reqwest::StatusCode;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PollSettings;
use crate::error::RemoteError;
use crate::poll::{PollSession, Verifier};
use crate::resources::StatusReason;
use crate::transport::{NamespacedName, ResourceCoordinates, ResourceTransport};

/// Reason the API server gives when a create loses a race.
const REASON_ALREADY_EXISTS: &str = "AlreadyExists";

/// Runs create-poll-delete workflows against one hub.
#[derive(Clone)]
pub struct Orchestrator {
    transport: Arc<dyn ResourceTransport>,
    settings: PollSettings,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Create an orchestrator polling with `settings`.
    pub fn new(transport: Arc<dyn ResourceTransport>, settings: PollSettings) -> Self {
        Self {
            transport,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Cancel every workflow started from this orchestrator when `token` fires.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    #[must_use]
    pub fn settings(&self) -> PollSettings {
        self.settings
    }

    #[must_use]
    pub fn transport(&self) -> Arc<dyn ResourceTransport> {
        self.transport.clone()
    }

    /// Ensure the resource exists, poll it with `verifier`, then delete it.
    ///
    /// # Errors
    /// Returns [`RemoteError::Status`] or [`RemoteError::Conflict`] when the
    /// resource can be neither found nor created, and otherwise whatever the
    /// poll session ended with.
    pub async fn run<B, T, V>(
        &self,
        coordinates: &ResourceCoordinates,
        target: &NamespacedName,
        desired: &B,
        verifier: &V,
    ) -> Result<T, RemoteError>
    where
        B: Serialize + ?Sized,
        V: Verifier<T> + ?Sized,
    {
        if self.cancel.is_cancelled() {
            return Err(RemoteError::Cancelled);
        }

        let body = serde_json::to_value(desired)?;
        let cleanup = self.ensure_exists(coordinates, target, &body).await?;

        let mut session = PollSession::new(
            self.transport.clone(),
            coordinates.clone(),
            target.clone(),
            self.settings,
        )
        .with_cancellation(self.cancel.child_token());
        let outcome = session.run(verifier).await;

        cleanup.release().await;
        outcome.into_result()
    }

    async fn ensure_exists(
        &self,
        coordinates: &ResourceCoordinates,
        target: &NamespacedName,
        body: &serde_json::Value,
    ) -> Result<CleanupGuard, RemoteError> {
        let existing = self.transport.get(coordinates, target).await?;

        if existing.status.is_success() {
            debug!(target_resource = %target, "Ephemeral resource already exists, reusing it");
            return Ok(CleanupGuard::arm(
                self.transport.clone(),
                coordinates.clone(),
                target.clone(),
            ));
        }
        if existing.status != StatusCode::NOT_FOUND {
            return Err(RemoteError::Status {
                code: existing.status.as_u16(),
                message: existing.body,
            });
        }

        // Armed before the POST is sent: a create the server accepted is
        // cleaned up even if this future is dropped while awaiting the reply.
        let cleanup = CleanupGuard::arm(self.transport.clone(), coordinates.clone(), target.clone());
        let created = match self.transport.create(coordinates, target, body).await {
            Ok(created) => created,
            Err(err) => {
                cleanup.disarm();
                return Err(err);
            }
        };

        if created.status == StatusCode::CONFLICT {
            let reason = created.json::<StatusReason>().unwrap_or_default().reason;
            if reason.as_deref() != Some(REASON_ALREADY_EXISTS) {
                debug!(target_resource = %target, reason = ?reason, "Unexpected conflict on create");
                cleanup.disarm();
                return Err(RemoteError::Conflict {
                    message: created.body,
                });
            }
            debug!(target_resource = %target, "Ephemeral resource created concurrently, continuing");
        } else if !created.status.is_success() {
            cleanup.disarm();
            return Err(RemoteError::Status {
                code: created.status.as_u16(),
                message: created.body,
            });
        } else {
            info!(
                target_resource = %target,
                plural = %coordinates.plural,
                "Created ephemeral resource"
            );
        }

        Ok(cleanup)
    }
}

/// Deletes the ephemeral resource exactly once per workflow.
///
/// [`CleanupGuard::release`] deletes inline. If the guard is dropped without
/// being released (the workflow future was dropped mid-poll), the delete is
/// spawned onto the current runtime instead.
struct CleanupGuard {
    transport: Arc<dyn ResourceTransport>,
    coordinates: ResourceCoordinates,
    target: NamespacedName,
    armed: bool,
}

impl CleanupGuard {
    fn arm(
        transport: Arc<dyn ResourceTransport>,
        coordinates: ResourceCoordinates,
        target: NamespacedName,
    ) -> Self {
        Self {
            transport,
            coordinates,
            target,
            armed: true,
        }
    }

    /// Forget the resource without deleting it.
    fn disarm(mut self) {
        self.armed = false;
    }

    async fn release(mut self) {
        self.armed = false;
        delete_quietly(self.transport.as_ref(), &self.coordinates, &self.target).await;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let transport = self.transport.clone();
        let coordinates = self.coordinates.clone();
        let target = self.target.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    delete_quietly(transport.as_ref(), &coordinates, &target).await;
                });
            }
            Err(_) => {
                warn!(target_resource = %target, "No runtime available, ephemeral resource left behind");
            }
        }
    }
}

async fn delete_quietly(
    transport: &dyn ResourceTransport,
    coordinates: &ResourceCoordinates,
    target: &NamespacedName,
) {
    match transport.delete(coordinates, target).await {
        Ok(response) if response.status.is_success() || response.status == StatusCode::NOT_FOUND => {
            debug!(target_resource = %target, "Deleted ephemeral resource");
        }
        Ok(response) => {
            warn!(
                target_resource = %target,
                status = response.status.as_u16(),
                body = %response.body,
                "Failed to delete ephemeral resource"
            );
        }
        Err(err) => {
            warn!(target_resource = %target, error = %err, "Failed to delete ephemeral resource");
        }
    }
}
