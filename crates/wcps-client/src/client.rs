//! Asynchronous WCPS transport.
//!
//! A WCPS query is sent as a form-encoded POST with a single `query` field.
//! Only HTTP 200 counts as success; there are no retries.

use crate::Result;
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, StatusCode};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use wcps_core::config::WcpsClientConfig;
use wcps_core::Error;

const USER_AGENT: &str = concat!("wcps-client/", env!("CARGO_PKG_VERSION"));

/// Name of the form field carrying the query text.
pub const QUERY_FIELD: &str = "query";

/// Successful response returned by a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status (always 200 for responses produced by [`WcpsClient`])
    pub status: StatusCode,
    /// Undecoded response body
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Create a 200 response carrying `body`.
    #[must_use]
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: StatusCode::OK,
            body: body.into(),
        }
    }
}

/// Sends compiled query text to a WCPS service.
///
/// [`WcpsClient`] is the HTTP implementation; the trait exists so the query
/// builder can run against other transports.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `query` and return the raw response on HTTP 200.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryRejected`] for any other status and
    /// [`Error::TransportFailure`] when the exchange itself fails.
    async fn send(&self, query: &str) -> Result<RawResponse>;
}

/// Builder for [`WcpsClient`].
#[derive(Debug, Clone)]
pub struct WcpsClientBuilder {
    endpoint: String,
    timeout: Option<Duration>,
    tls_verify: bool,
    user_agent: String,
}

impl WcpsClientBuilder {
    /// Create a builder for the specified endpoint.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: None,
            tls_verify: true,
            user_agent: USER_AGENT.to_string(),
        }
    }

    /// Create a builder pre-populated from a [`WcpsClientConfig`].
    #[must_use]
    pub fn from_config(config: &WcpsClientConfig) -> Self {
        let mut builder = Self::new(config.endpoint.clone()).with_tls_verify(config.tls_verify);
        builder.timeout = config.timeout();
        if let Some(user_agent) = &config.user_agent {
            builder = builder.with_user_agent(user_agent.clone());
        }
        builder
    }

    /// Set a request timeout. Requests never time out by default.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set whether to verify TLS certificates.
    #[must_use]
    pub fn with_tls_verify(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Override the `User-Agent` header.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`] if the endpoint is not a valid URL
    /// and [`Error::ConfigError`] if the HTTP client cannot be created.
    pub fn build(self) -> Result<WcpsClient> {
        let endpoint = Url::parse(&self.endpoint).map_err(|err| {
            Error::InvalidEndpoint(format!("Invalid WCPS endpoint `{}`: {err}", self.endpoint))
        })?;

        let mut builder = ClientBuilder::new().user_agent(self.user_agent);

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        if !self.tls_verify {
            warn!(endpoint = %endpoint, "TLS verification disabled for WCPS client");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder.build().map_err(|err| {
            Error::ConfigError(format!("Failed to build WCPS HTTP client: {err}"))
        })?;

        Ok(WcpsClient { http, endpoint })
    }
}

/// Asynchronous WCPS client bound to one endpoint.
///
/// Cloning is cheap and clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct WcpsClient {
    http: Client,
    endpoint: Url,
}

impl WcpsClient {
    /// Construct a client directly from the endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a valid URL.
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        WcpsClientBuilder::new(endpoint).build()
    }

    /// Construct a client from a [`WcpsClientConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configured endpoint is invalid.
    pub fn from_config(config: &WcpsClientConfig) -> Result<Self> {
        WcpsClientBuilder::from_config(config).build()
    }

    /// Start a builder for the given endpoint.
    #[must_use]
    pub fn builder(endpoint: impl Into<String>) -> WcpsClientBuilder {
        WcpsClientBuilder::new(endpoint)
    }

    /// Return the endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for WcpsClient {
    async fn send(&self, query: &str) -> Result<RawResponse> {
        info!(endpoint = %self.endpoint, query_len = query.len(), "Sending WCPS query");
        debug!(%query, "WCPS query text");

        let response = self
            .http
            .post(self.endpoint.clone())
            .form(&[(QUERY_FIELD, query)])
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            warn!(status = status.as_u16(), "WCPS query rejected");
            return Err(Error::QueryRejected {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.bytes().await?;
        debug!(bytes = body.len(), "WCPS response received");

        Ok(RawResponse {
            status,
            body: body.to_vec(),
        })
    }
}
