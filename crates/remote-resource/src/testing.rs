//! Scripted in-memory transport for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::error::RemoteError;
use crate::transport::{NamespacedName, RawResponse, ResourceCoordinates, ResourceTransport};

/// One scripted answer.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Respond(u16, String),
    TransportError,
}

impl Reply {
    pub(crate) fn ok(body: impl Into<String>) -> Self {
        Self::Respond(200, body.into())
    }

    pub(crate) fn status(code: u16, body: impl Into<String>) -> Self {
        Self::Respond(code, body.into())
    }

    fn into_result(self) -> Result<RawResponse, RemoteError> {
        match self {
            Self::Respond(code, body) => Ok(RawResponse::new(
                StatusCode::from_u16(code).expect("valid status code"),
                body,
            )),
            Self::TransportError => Err(transport_error()),
        }
    }
}

/// A genuine `reqwest::Error`, built without touching the network.
pub(crate) fn transport_error() -> RemoteError {
    let err = reqwest::Client::new()
        .get("http://")
        .build()
        .expect_err("empty host is rejected");
    RemoteError::Transport(err)
}

/// Replies in order; the last reply repeats once the script runs out.
#[derive(Default)]
struct Script {
    replies: Vec<Reply>,
    calls: AtomicUsize,
}

impl Script {
    fn next(&self) -> Reply {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .get(index)
            .or_else(|| self.replies.last())
            .cloned()
            .unwrap_or_else(|| Reply::ok("{}"))
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub(crate) struct ScriptedTransport {
    gets: Script,
    creates: Script,
    deletes: Script,
    get_delay: Option<Duration>,
    create_delay: Option<Duration>,
    created_bodies: Mutex<Vec<serde_json::Value>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on_get(mut self, replies: Vec<Reply>) -> Self {
        self.gets.replies = replies;
        self
    }

    pub(crate) fn on_create(mut self, replies: Vec<Reply>) -> Self {
        self.creates.replies = replies;
        self
    }

    pub(crate) fn on_delete(mut self, replies: Vec<Reply>) -> Self {
        self.deletes.replies = replies;
        self
    }

    pub(crate) fn with_get_delay(mut self, delay: Duration) -> Self {
        self.get_delay = Some(delay);
        self
    }

    pub(crate) fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    pub(crate) fn get_calls(&self) -> usize {
        self.gets.calls()
    }

    pub(crate) fn create_calls(&self) -> usize {
        self.creates.calls()
    }

    pub(crate) fn delete_calls(&self) -> usize {
        self.deletes.calls()
    }

    pub(crate) fn created_bodies(&self) -> Vec<serde_json::Value> {
        self.created_bodies.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl ResourceTransport for ScriptedTransport {
    async fn get(
        &self,
        _coordinates: &ResourceCoordinates,
        _target: &NamespacedName,
    ) -> Result<RawResponse, RemoteError> {
        let reply = self.gets.next();
        if let Some(delay) = self.get_delay {
            tokio::time::sleep(delay).await;
        }
        reply.into_result()
    }

    async fn create(
        &self,
        _coordinates: &ResourceCoordinates,
        _target: &NamespacedName,
        body: &serde_json::Value,
    ) -> Result<RawResponse, RemoteError> {
        self.created_bodies
            .lock()
            .expect("lock poisoned")
            .push(body.clone());
        let reply = self.creates.next();
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        reply.into_result()
    }

    async fn delete(
        &self,
        _coordinates: &ResourceCoordinates,
        _target: &NamespacedName,
    ) -> Result<RawResponse, RemoteError> {
        self.deletes.next().into_result()
    }
}
