//! Connection and polling configuration.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::{Certificate, Client};
use tracing::warn;

use crate::error::RemoteError;

/// Default timeout for a single hub request.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default spacing between polls of an ephemeral resource.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Default number of polls before a workflow gives up.
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 10;

/// How HTTP connections to the hub are made.
#[derive(Debug, Clone)]
pub struct ConnectionPolicy {
    /// Timeout applied to every request.
    pub request_timeout: Duration,
    /// Skip TLS certificate verification.
    pub accept_invalid_certs: bool,
    /// Extra PEM encoded root certificate to trust.
    pub ca_certificate_pem: Option<Vec<u8>>,
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            accept_invalid_certs: false,
            ca_certificate_pem: None,
        }
    }
}

impl ConnectionPolicy {
    /// Trust any certificate the hub presents.
    #[must_use]
    pub fn insecure() -> Self {
        Self {
            accept_invalid_certs: true,
            ..Self::default()
        }
    }

    /// Set the per-request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Trust an additional root certificate.
    #[must_use]
    pub fn with_ca_certificate(mut self, pem: Vec<u8>) -> Self {
        self.ca_certificate_pem = Some(pem);
        self
    }

    /// Build the HTTP client this policy describes.
    ///
    /// # Errors
    /// Returns error if the CA certificate cannot be parsed or the client
    /// cannot be created.
    pub fn build_client(&self) -> Result<Client, RemoteError> {
        let mut builder = Client::builder()
            .timeout(self.request_timeout)
            .danger_accept_invalid_certs(self.accept_invalid_certs);

        if let Some(pem) = &self.ca_certificate_pem {
            builder = builder.add_root_certificate(Certificate::from_pem(pem)?);
        }

        Ok(builder.build()?)
    }
}

/// Interval and attempt budget for one poll session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    interval: Duration,
    max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            DEFAULT_MAX_POLL_ATTEMPTS,
        )
    }
}

impl PollSettings {
    /// Create poll settings.
    ///
    /// `max_attempts` below one is raised to one and a zero interval to one
    /// millisecond, so every session polls at least once and the ticker
    /// always has a period.
    #[must_use]
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Create poll settings from a millisecond interval.
    #[must_use]
    pub fn from_millis(interval_ms: u64, max_attempts: u32) -> Self {
        Self::new(Duration::from_millis(interval_ms), max_attempts)
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Upper bound on the time spent polling, excluding request latency.
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

/// Hub connection settings resolved from the environment.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Base URL of the hub API server.
    pub api_url: String,
    /// Bearer token presented to the hub.
    pub token: String,
    /// Connection policy for hub requests.
    pub policy: ConnectionPolicy,
    /// Poll settings for view and action workflows.
    pub poll: PollSettings,
}

impl HubConfig {
    /// Create configuration from environment variables.
    ///
    /// # Required Environment Variables
    /// - `CLUSTER_API_URL`: hub API server URL
    ///
    /// # Optional Environment Variables
    /// - `HUB_TOKEN`: bearer token (default: empty)
    /// - `HUB_INSECURE_SKIP_TLS_VERIFY`: "true" or "1" to skip TLS verification
    /// - `HUB_CA_FILE`: PEM file with an extra root certificate
    /// - `HUB_REQUEST_TIMEOUT_SECS`: per-request timeout (default: 30)
    /// - `REMOTE_POLL_INTERVAL_MS`: poll interval (default: 1000)
    /// - `REMOTE_MAX_POLL_ATTEMPTS`: poll attempt budget (default: 10)
    ///
    /// # Errors
    /// Returns error if `CLUSTER_API_URL` is unset or the CA file cannot be read.
    pub fn from_env() -> Result<Self, RemoteError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`HubConfig::from_env`], but with the hub URL given explicitly.
    ///
    /// # Errors
    /// Returns error if the CA file cannot be read.
    pub fn from_env_with_url(api_url: impl Into<String>) -> Result<Self, RemoteError> {
        let api_url = api_url.into();
        Self::from_lookup(move |key| {
            if key == "CLUSTER_API_URL" {
                Some(api_url.clone())
            } else {
                std::env::var(key).ok()
            }
        })
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RemoteError> {
        let api_url = lookup("CLUSTER_API_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                RemoteError::Config("CLUSTER_API_URL environment variable not set".to_string())
            })?;

        let token = lookup("HUB_TOKEN").unwrap_or_default();

        let accept_invalid_certs = lookup("HUB_INSECURE_SKIP_TLS_VERIFY")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        let request_timeout = parse_or_default(
            lookup("HUB_REQUEST_TIMEOUT_SECS"),
            "HUB_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        );

        let ca_certificate_pem = lookup("HUB_CA_FILE")
            .map(PathBuf::from)
            .map(|path| {
                std::fs::read(&path).map_err(|e| {
                    RemoteError::Config(format!("failed to read {}: {e}", path.display()))
                })
            })
            .transpose()?;

        let interval_ms = parse_or_default(
            lookup("REMOTE_POLL_INTERVAL_MS"),
            "REMOTE_POLL_INTERVAL_MS",
            DEFAULT_POLL_INTERVAL_MS,
        );
        let max_attempts = parse_or_default(
            lookup("REMOTE_MAX_POLL_ATTEMPTS"),
            "REMOTE_MAX_POLL_ATTEMPTS",
            DEFAULT_MAX_POLL_ATTEMPTS,
        );

        Ok(Self {
            api_url,
            token,
            policy: ConnectionPolicy {
                request_timeout: Duration::from_secs(request_timeout),
                accept_invalid_certs,
                ca_certificate_pem,
            },
            poll: PollSettings::from_millis(interval_ms, max_attempts),
        })
    }
}

fn parse_or_default<T: std::str::FromStr>(raw: Option<String>, key: &str, default: T) -> T {
    match raw.map(|v| v.parse::<T>()) {
        Some(Ok(value)) => value,
        Some(Err(_)) => {
            warn!(key = %key, "Ignoring unparsable value, using default");
            default
        }
        None => default,
    }
}
