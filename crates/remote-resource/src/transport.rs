//! Single-shot GET/POST/DELETE calls against the hub API server.
//!
//! The transport never interprets status codes: a 404 or 500 from the hub is
//! returned as a [`RawResponse`], and only failures of the round trip itself
//! become errors.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use kube::Resource;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::ConnectionPolicy;
use crate::error::RemoteError;

/// Identifies a resource type on the hub (group, version, plural).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceCoordinates {
    pub api_group: String,
    pub version: String,
    pub plural: String,
}

impl ResourceCoordinates {
    pub fn new(
        api_group: impl Into<String>,
        version: impl Into<String>,
        plural: impl Into<String>,
    ) -> Self {
        Self {
            api_group: api_group.into(),
            version: version.into(),
            plural: plural.into(),
        }
    }

    /// Coordinates of a statically typed resource.
    #[must_use]
    pub fn of<K: Resource<DynamicType = ()>>() -> Self {
        Self::new(K::group(&()), K::version(&()), K::plural(&()))
    }

    fn api_root(&self) -> String {
        if self.api_group.is_empty() {
            format!("/api/{}", self.version)
        } else {
            format!("/apis/{}/{}", self.api_group, self.version)
        }
    }

    /// Path of the namespaced collection, used for create.
    #[must_use]
    pub fn collection_path(&self, namespace: &str) -> String {
        format!(
            "{}/namespaces/{namespace}/{}",
            self.api_root(),
            self.plural
        )
    }

    /// Path of a single named resource.
    #[must_use]
    pub fn item_path(&self, target: &NamespacedName) -> String {
        format!("{}/{}", self.collection_path(&target.namespace), target.name)
    }
}

/// Identifies one resource instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespacedName {
    pub name: String,
    pub namespace: String,
}

impl NamespacedName {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A hub response, status and body, as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    /// Returns error if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// One network round trip per call, no retries, no status interpretation.
#[async_trait]
pub trait ResourceTransport: Send + Sync {
    /// Fetch a resource.
    async fn get(
        &self,
        coordinates: &ResourceCoordinates,
        target: &NamespacedName,
    ) -> Result<RawResponse, RemoteError>;

    /// Create a resource from `body`.
    async fn create(
        &self,
        coordinates: &ResourceCoordinates,
        target: &NamespacedName,
        body: &serde_json::Value,
    ) -> Result<RawResponse, RemoteError>;

    /// Delete a resource.
    async fn delete(
        &self,
        coordinates: &ResourceCoordinates,
        target: &NamespacedName,
    ) -> Result<RawResponse, RemoteError>;
}

/// Hub API client authenticating with a bearer token.
#[derive(Clone)]
pub struct HubClient {
    /// HTTP client.
    client: Client,
    /// Hub API server base URL, without trailing slash.
    base_url: String,
    /// Bearer token for authentication.
    token: String,
}

impl fmt::Debug for HubClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HubClient {
    /// Create a new hub client.
    ///
    /// # Arguments
    /// * `base_url` - Hub API server URL, e.g. `https://api.hub.example.com:6443`
    /// * `token` - Bearer token presented on every request
    /// * `policy` - TLS trust and timeout settings
    ///
    /// # Errors
    /// Returns error if the URL has no http(s) scheme or the HTTP client
    /// cannot be created.
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        policy: &ConnectionPolicy,
    ) -> Result<Self, RemoteError> {
        let base_url = base_url.into();
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(RemoteError::Config(format!(
                "hub URL must start with http:// or https://, got {base_url}"
            )));
        }

        Ok(Self {
            client: policy.build_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// Share this client as a transport.
    #[must_use]
    pub fn shared(self) -> Arc<dyn ResourceTransport> {
        Arc::new(self)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn into_raw(response: reqwest::Response) -> Result<RawResponse, RemoteError> {
        let status = response.status();
        let body = response.text().await?;
        Ok(RawResponse { status, body })
    }
}

#[async_trait]
impl ResourceTransport for HubClient {
    async fn get(
        &self,
        coordinates: &ResourceCoordinates,
        target: &NamespacedName,
    ) -> Result<RawResponse, RemoteError> {
        let url = self.url(&coordinates.item_path(target));
        debug!(url = %url, "GET request");

        let response = self.client.get(&url).bearer_auth(&self.token).send().await?;

        Self::into_raw(response).await
    }

    async fn create(
        &self,
        coordinates: &ResourceCoordinates,
        target: &NamespacedName,
        body: &serde_json::Value,
    ) -> Result<RawResponse, RemoteError> {
        let url = self.url(&coordinates.collection_path(&target.namespace));
        debug!(url = %url, name = %target.name, "POST request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;

        Self::into_raw(response).await
    }

    async fn delete(
        &self,
        coordinates: &ResourceCoordinates,
        target: &NamespacedName,
    ) -> Result<RawResponse, RemoteError> {
        let url = self.url(&coordinates.item_path(target));
        debug!(url = %url, "DELETE request");

        let response = self
            .client
            .delete(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        Self::into_raw(response).await
    }
}
