//! Bounded, cancellable polling of one resource.
//!
//! A [`PollSession`] fetches a resource on a fixed tick and hands every
//! response to a [`Verifier`]. It stops on the first `Valid` or `Failed`
//! verdict, on a transport error, when the attempt budget is used up, or when
//! its cancellation token fires.
//!
//! ```text
//! Idle ──run──► Polling ──Valid──────► Succeeded
//!                  │  ├──Failed/error─► Failed
//!                  │  └──budget spent─► Exhausted
//!                  └──token cancelled─► Cancelled
//! ```
//!
//! Ticks never overlap: the next tick is not taken until the previous fetch
//! and verification have finished, so a slow hub stretches the spacing rather
//! than piling up requests.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::PollSettings;
use crate::error::RemoteError;
use crate::transport::{NamespacedName, RawResponse, ResourceCoordinates, ResourceTransport};

/// A verifier's verdict on one fetched response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification<T> {
    /// The remote result is ready.
    Valid(T),
    /// Not ready yet, poll again.
    Retry,
    /// Terminal failure, do not poll again.
    Failed { code: u16, message: String },
}

impl<T> Verification<T> {
    /// Terminal failure with a code and message.
    pub fn failed(code: u16, message: impl Into<String>) -> Self {
        Self::Failed {
            code,
            message: message.into(),
        }
    }

    /// Failure carrying a non-2xx response's status and body.
    #[must_use]
    pub fn from_status(response: &RawResponse) -> Self {
        Self::failed(response.status.as_u16(), response.body.clone())
    }
}

/// Decides, per fetched response, whether polling is done.
pub trait Verifier<T>: Send + Sync {
    fn verify(&self, response: &RawResponse) -> Verification<T>;
}

impl<T, F> Verifier<T> for F
where
    F: Fn(&RawResponse) -> Verification<T> + Send + Sync,
{
    fn verify(&self, response: &RawResponse) -> Verification<T> {
        self(response)
    }
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    Idle,
    Polling,
    Succeeded,
    Failed,
    Exhausted,
    Cancelled,
}

impl PollPhase {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Idle | Self::Polling)
    }
}

/// How a session ended.
#[derive(Debug)]
pub enum PollOutcome<T> {
    Succeeded(T),
    Failed(RemoteError),
    Exhausted,
    Cancelled,
}

impl<T> PollOutcome<T> {
    fn phase(&self) -> PollPhase {
        match self {
            Self::Succeeded(_) => PollPhase::Succeeded,
            Self::Failed(_) => PollPhase::Failed,
            Self::Exhausted => PollPhase::Exhausted,
            Self::Cancelled => PollPhase::Cancelled,
        }
    }

    /// Collapse into a result, mapping exhaustion and cancellation to errors.
    ///
    /// # Errors
    /// Returns the failure, [`RemoteError::Exhausted`] or
    /// [`RemoteError::Cancelled`] for every outcome but success.
    pub fn into_result(self) -> Result<T, RemoteError> {
        match self {
            Self::Succeeded(data) => Ok(data),
            Self::Failed(err) => Err(err),
            Self::Exhausted => Err(RemoteError::Exhausted),
            Self::Cancelled => Err(RemoteError::Cancelled),
        }
    }
}

/// Attempt bookkeeping. `attempts_made` never exceeds `max_attempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollState {
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub interval: Duration,
}

/// Polls one resource until a verifier is satisfied.
pub struct PollSession {
    transport: Arc<dyn ResourceTransport>,
    coordinates: ResourceCoordinates,
    target: NamespacedName,
    state: PollState,
    phase: PollPhase,
    cancel: CancellationToken,
}

impl PollSession {
    /// Create an idle session.
    pub fn new(
        transport: Arc<dyn ResourceTransport>,
        coordinates: ResourceCoordinates,
        target: NamespacedName,
        settings: PollSettings,
    ) -> Self {
        Self {
            transport,
            coordinates,
            target,
            state: PollState {
                attempts_made: 0,
                max_attempts: settings.max_attempts(),
                interval: settings.interval(),
            },
            phase: PollPhase::Idle,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `token` to cancel this session.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels this session when triggered.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop polling. Safe to call at any time, including after the session ended.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn state(&self) -> PollState {
        self.state
    }

    #[must_use]
    pub fn phase(&self) -> PollPhase {
        self.phase
    }

    /// Poll until the verifier is satisfied, fails, the budget runs out, or
    /// the session is cancelled.
    ///
    /// A response that arrives after cancellation is dropped unverified.
    /// Running an already finished session returns `Cancelled` if it was
    /// cancelled and `Exhausted` otherwise.
    pub async fn run<T, V>(&mut self, verifier: &V) -> PollOutcome<T>
    where
        V: Verifier<T> + ?Sized,
    {
        if self.phase.is_terminal() {
            return if self.cancel.is_cancelled() {
                PollOutcome::Cancelled
            } else {
                PollOutcome::Exhausted
            };
        }
        self.phase = PollPhase::Polling;

        let mut ticker = tokio::time::interval(self.state.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break PollOutcome::Cancelled,
                _ = ticker.tick() => {}
            }

            self.state.attempts_made += 1;

            debug!(
                target_resource = %self.target,
                attempt = self.state.attempts_made,
                max_attempts = self.state.max_attempts,
                "Polling resource"
            );

            let fetched = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break PollOutcome::Cancelled,
                fetched = self.transport.get(&self.coordinates, &self.target) => fetched,
            };
            if self.cancel.is_cancelled() {
                break PollOutcome::Cancelled;
            }

            let response = match fetched {
                Ok(response) => response,
                Err(err) => break PollOutcome::Failed(err),
            };

            match verifier.verify(&response) {
                Verification::Valid(data) => break PollOutcome::Succeeded(data),
                Verification::Failed { code, message } => {
                    break PollOutcome::Failed(RemoteError::Verification { code, message })
                }
                Verification::Retry => {}
            }

            if self.state.attempts_made >= self.state.max_attempts {
                debug!(
                    target_resource = %self.target,
                    attempts = self.state.attempts_made,
                    "Poll attempts exhausted"
                );
                break PollOutcome::Exhausted;
            }
        };

        self.phase = outcome.phase();
        info!(
            target_resource = %self.target,
            phase = ?self.phase,
            attempts = self.state.attempts_made,
            "Poll session finished"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Reply, ScriptedTransport};

    fn coords() -> ResourceCoordinates {
        ResourceCoordinates::new("test.open-cluster-management.io", "v99", "testresources")
    }

    fn target() -> NamespacedName {
        NamespacedName::new("testname", "testnamespace")
    }

    fn session(transport: &Arc<ScriptedTransport>, interval_ms: u64, attempts: u32) -> PollSession {
        PollSession::new(
            transport.clone(),
            coords(),
            target(),
            PollSettings::from_millis(interval_ms, attempts),
        )
    }

    fn until_new(response: &RawResponse) -> Verification<String> {
        if response.body == "new" {
            Verification::Valid(response.body.clone())
        } else {
            Verification::Retry
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_fetch() {
        let transport = Arc::new(ScriptedTransport::new().on_get(vec![
            Reply::ok("old"),
            Reply::ok("old"),
            Reply::ok("new"),
        ]));
        let mut session = session(&transport, 50, 5);

        let outcome = session.run(&until_new).await;

        assert!(matches!(outcome, PollOutcome::Succeeded(ref s) if s == "new"));
        assert_eq!(transport.get_calls(), 3);
        assert_eq!(session.phase(), PollPhase::Succeeded);
        assert_eq!(session.state().attempts_made, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_retry_exhausts_after_max_attempts() {
        let transport = Arc::new(ScriptedTransport::new().on_get(vec![Reply::ok("old")]));
        let mut session = session(&transport, 50, 5);

        let outcome = session.run(&until_new).await;

        assert!(matches!(outcome, PollOutcome::Exhausted));
        assert_eq!(transport.get_calls(), 5);
        assert_eq!(session.state().attempts_made, 5);
        assert_eq!(session.phase(), PollPhase::Exhausted);
        assert!(matches!(
            outcome.into_result(),
            Err(RemoteError::Exhausted)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reported_without_extra_interval() {
        let transport = Arc::new(ScriptedTransport::new().on_get(vec![Reply::ok("old")]));
        let mut session = session(&transport, 50, 3);
        let started = tokio::time::Instant::now();

        let outcome = session.run(&until_new).await;

        assert!(matches!(outcome, PollOutcome::Exhausted));
        // fetches at 0, 50 and 100 ms; no wait for a 150 ms tick
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(started.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_bounded_for_any_budget() {
        for max in 1..=8 {
            let transport = Arc::new(ScriptedTransport::new().on_get(vec![Reply::ok("old")]));
            let mut session = session(&transport, 10, max);
            let outcome = session.run(&until_new).await;
            assert!(matches!(outcome, PollOutcome::Exhausted));
            assert_eq!(transport.get_calls(), max as usize);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_budget_still_polls_once() {
        let transport = Arc::new(ScriptedTransport::new().on_get(vec![Reply::ok("old")]));
        let mut session = session(&transport, 50, 0);

        let outcome = session.run(&until_new).await;

        assert!(matches!(outcome, PollOutcome::Exhausted));
        assert_eq!(transport.get_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new().on_get(vec![Reply::TransportError]));
        let mut session = session(&transport, 50, 5);

        let outcome = session.run(&until_new).await;

        assert!(matches!(outcome, PollOutcome::Failed(RemoteError::Transport(_))));
        assert_eq!(transport.get_calls(), 1);
        assert_eq!(session.phase(), PollPhase::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_verifier_failure_is_terminal() {
        let transport = Arc::new(ScriptedTransport::new().on_get(vec![Reply::status(500, "boom")]));
        let mut session = session(&transport, 50, 5);
        let reject_errors = |response: &RawResponse| -> Verification<String> {
            if response.is_success() {
                Verification::Retry
            } else {
                Verification::from_status(response)
            }
        };

        let outcome = session.run(&reject_errors).await;

        match outcome {
            PollOutcome::Failed(RemoteError::Verification { code, message }) => {
                assert_eq!(code, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(transport.get_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_run_issues_no_fetch() {
        let transport = Arc::new(ScriptedTransport::new().on_get(vec![Reply::ok("new")]));
        let mut session = session(&transport, 50, 5);
        session.cancel();

        let outcome = session.run(&until_new).await;

        assert!(matches!(outcome, PollOutcome::Cancelled));
        assert_eq!(transport.get_calls(), 0);
        assert_eq!(session.phase(), PollPhase::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_poll_stops_ticking() {
        let transport = Arc::new(ScriptedTransport::new().on_get(vec![Reply::ok("old")]));
        let mut session = session(&transport, 50, 100);
        let token = session.cancellation_token();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            token.cancel();
        });
        let outcome = session.run(&until_new).await;

        assert!(matches!(outcome, PollOutcome::Cancelled));
        // ticks at 0, 50 and 100 ms; cancellation lands before the 150 ms tick
        assert_eq!(transport.get_calls(), 3);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(transport.get_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_result_discarded_after_cancel() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .on_get(vec![Reply::ok("new")])
                .with_get_delay(Duration::from_millis(200)),
        );
        let mut session = session(&transport, 50, 5);
        let token = session.cancellation_token();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        });
        let outcome = session.run(&until_new).await;

        assert!(matches!(outcome, PollOutcome::Cancelled));
        assert_eq!(transport.get_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_delays_next_tick() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .on_get(vec![Reply::ok("old"), Reply::ok("new")])
                .with_get_delay(Duration::from_millis(120)),
        );
        let mut session = session(&transport, 50, 5);
        let started = tokio::time::Instant::now();

        let outcome = session.run(&until_new).await;

        assert!(matches!(outcome, PollOutcome::Succeeded(_)));
        assert_eq!(transport.get_calls(), 2);
        assert!(started.elapsed() >= Duration::from_millis(240));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_finish_is_noop() {
        let transport = Arc::new(ScriptedTransport::new().on_get(vec![Reply::ok("new")]));
        let mut session = session(&transport, 50, 5);

        let outcome = session.run(&until_new).await;
        session.cancel();

        assert!(matches!(outcome, PollOutcome::Succeeded(_)));
        assert_eq!(session.phase(), PollPhase::Succeeded);
        assert_eq!(transport.get_calls(), 1);
    }
}
