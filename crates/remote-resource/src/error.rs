//! Error types for remote resource operations.
//!
//! Every failure a workflow can end in is a [`RemoteError`] variant. Route
//! layers that need the flat `{code, message}` shape get it through
//! [`RemoteError::code`], [`RemoteError::message`] or
//! [`RemoteError::to_exception`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message reported when a poll session runs out of attempts.
pub const REQUEST_TIMEOUT_MESSAGE: &str = "request timeout";

/// Message reported when a workflow is cancelled before it resolves.
pub const REQUEST_CANCELLED_MESSAGE: &str = "request cancelled";

/// Status code reported for cancelled workflows (nginx "client closed request").
pub const CANCELLED_STATUS: u16 = 499;

const INTERNAL_ERROR: u16 = 500;

/// Errors that can occur while relaying a request to a managed cluster.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The HTTP round trip itself failed (connect, reset, timeout, DNS).
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The hub answered a GET or create with an unexpected status.
    #[error("API error: {code} - {message}")]
    Status { code: u16, message: String },

    /// Create returned 409 for a reason other than `AlreadyExists`.
    #[error("Conflict creating resource: {message}")]
    Conflict { message: String },

    /// A verifier rejected the polled resource.
    #[error("Verification failed: {code} - {message}")]
    Verification { code: u16, message: String },

    /// The poll session used its whole attempt budget.
    #[error("{}", REQUEST_TIMEOUT_MESSAGE)]
    Exhausted,

    /// The workflow was cancelled before it produced an outcome.
    #[error("{}", REQUEST_CANCELLED_MESSAGE)]
    Cancelled,

    /// The caller asked for something the remote state cannot satisfy.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl RemoteError {
    /// Status code a route layer should answer with.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            Self::Status { code, .. } | Self::Verification { code, .. } => *code,
            Self::Conflict { .. } => 409,
            Self::Cancelled => CANCELLED_STATUS,
            Self::InvalidRequest(_) => 400,
            Self::Transport(_) | Self::Exhausted | Self::Serialization(_) | Self::Config(_) => {
                INTERNAL_ERROR
            }
        }
    }

    /// Body a route layer should answer with.
    ///
    /// Status, conflict and verification failures carry the hub's (or the
    /// verifier's) text untouched.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Status { message, .. }
            | Self::Verification { message, .. }
            | Self::Conflict { message }
            | Self::InvalidRequest(message) => message.clone(),
            other => other.to_string(),
        }
    }

    /// Flatten into the wire shape handed back to HTTP clients.
    #[must_use]
    pub fn to_exception(&self) -> RequestException {
        RequestException {
            code: self.code(),
            message: self.message(),
        }
    }

    /// Whether this error came from an exhausted attempt budget.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Exhausted)
    }
}

/// The `{code, message}` pair a failed workflow resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestException {
    pub code: u16,
    pub message: String,
}

impl From<RemoteError> for RequestException {
    fn from(err: RemoteError) -> Self {
        err.to_exception()
    }
}
