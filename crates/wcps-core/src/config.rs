//! Configuration structures for WCPS clients.
//!
//! A [`WcpsClientConfig`] names the service endpoint and the handful of HTTP
//! knobs a client exposes. It can be built in code or loaded from JSON.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;
use validator::Validate;

/// Configuration for a WCPS client instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct WcpsClientConfig {
    /// WCPS endpoint URL (e.g. `https://ows.rasdaman.org/rasdaman/ows`)
    #[validate(url)]
    pub endpoint: String,

    /// Whether to verify TLS certificates
    #[serde(default = "default_tls_verify")]
    pub tls_verify: bool,

    /// Request timeout in seconds; no timeout when unset
    #[validate(range(min = 1, max = 600))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,

    /// Optional override for the `User-Agent` header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

const fn default_tls_verify() -> bool {
    true
}

impl WcpsClientConfig {
    /// Create a new client configuration for the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a valid URL.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, Error> {
        let config = Self {
            endpoint: endpoint.into(),
            tls_verify: default_tls_verify(),
            request_timeout_secs: None,
            user_agent: None,
        };

        config
            .validate()
            .map_err(|e| Error::ConfigError(format!("Invalid configuration: {e}")))?;

        Ok(config)
    }

    /// Load a configuration from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be parsed or fails validation.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        debug!(endpoint = %config.endpoint, "loaded WCPS client configuration");
        Ok(config)
    }

    /// Set whether to verify TLS certificates.
    #[must_use]
    pub const fn with_tls_verify(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Set request timeout in seconds.
    #[must_use]
    pub const fn with_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout_secs = Some(seconds);
        self
    }

    /// Set the `User-Agent` header.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Get the request timeout as a Duration.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Parse and validate the endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed.
    pub fn parse_endpoint(&self) -> Result<Url, Error> {
        Url::parse(&self.endpoint)
            .map_err(|e| Error::InvalidEndpoint(format!("Invalid WCPS endpoint: {e}")))
    }
}
