//! Remote fetching of configurations
//!
//! `RemoteFetch` is the seam between the configuration manager and the
//! network. `HttpFetcher` implements it against the live update service with
//! reqwest; tests substitute their own implementations.

use std::collections::BTreeMap;
use std::fmt;

use futures::future::BoxFuture;
use reqwest::{Client, StatusCode, Url};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::trace;

use crate::request::{ConfigurationRequest, ALL_ID};

/// A single remote request for a configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Cache id the response will be stored under
    pub id: String,
    /// Remote target computed by `RemoteFetch::target`
    pub target: String,
    /// Query parameters; empty unless the request is parameter based
    pub params: BTreeMap<String, String>,
}

/// Body of a failed response
#[derive(Debug, Clone, PartialEq)]
pub enum FailureBody {
    /// Structured error document returned by the server
    Json(Value),
    /// Plain text returned by the server
    Text(String),
    /// No body; a description of what went wrong
    Message(String),
}

impl fmt::Display for FailureBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureBody::Json(value) => write!(f, "{}", value),
            FailureBody::Text(text) | FailureBody::Message(text) => f.write_str(text),
        }
    }
}

/// A failed attempt to obtain a configuration from the server
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Configuration request failed with status {status}: {error}")]
pub struct FetchFailure {
    /// HTTP status, or 0 if no response was received
    pub status: u16,
    pub error: FailureBody,
}

impl FetchFailure {
    pub fn new(status: u16, error: FailureBody) -> Self {
        Self { status, error }
    }

    /// Wraps a transport-level error
    pub fn transport(err: reqwest::Error) -> Self {
        Self {
            status: err.status().map(|status| status.as_u16()).unwrap_or(0),
            error: FailureBody::Message(err.to_string()),
        }
    }

    /// Builds a failure from a non-success response
    ///
    /// Prefers a JSON body, then a non-empty text body, then the reason phrase.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let error = if let Ok(value) = serde_json::from_str::<Value>(body) {
            FailureBody::Json(value)
        } else if !body.trim().is_empty() {
            FailureBody::Text(body.to_string())
        } else {
            FailureBody::Message(
                status
                    .canonical_reason()
                    .unwrap_or("Request failed")
                    .to_string(),
            )
        };
        Self::new(status.as_u16(), error)
    }

    /// Renders the failure as `{"status": <code>, "errorMsg": <body>}`
    pub fn to_json(&self) -> Value {
        let error = match &self.error {
            FailureBody::Json(value) => value.clone(),
            FailureBody::Text(text) | FailureBody::Message(text) => Value::String(text.clone()),
        };
        json!({ "status": self.status, "errorMsg": error })
    }
}

/// Capability to obtain raw configuration documents from the server
pub trait RemoteFetch: Send + Sync {
    /// Computes where `request` is sent
    fn target(&self, request: &ConfigurationRequest) -> String;

    /// Performs the request
    ///
    /// # Returns
    /// * `Ok(Some(document))` for a successful JSON response
    /// * `Ok(None)` for a successful response without a usable JSON body
    /// * `Err(FetchFailure)` if the request failed
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, Result<Option<Value>, FetchFailure>>;
}

/// Fetches configurations from the live update service over HTTP
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    /// HTTP client for making requests
    http_client: Client,
    /// Configuration endpoint, e.g. `https://host/mfpliveupdate/v1/<app>/configuration`
    service_url: Url,
    /// Bearer token sent with every request
    token: Option<String>,
}

impl HttpFetcher {
    /// Creates a fetcher with a default HTTP client
    pub fn new(service_url: Url) -> Self {
        Self::with_client(Client::new(), service_url)
    }

    /// Creates a fetcher with a preconfigured HTTP client
    pub fn with_client(http_client: Client, service_url: Url) -> Self {
        Self {
            http_client,
            service_url,
            token: None,
        }
    }

    /// Sends `token` as a bearer token with every request
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    fn with_segment(&self, segment: &str) -> Url {
        let mut url = self.service_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(segment);
        }
        url
    }

    async fn send(&self, request: FetchRequest) -> Result<Option<Value>, FetchFailure> {
        trace!(id = %request.id, target = %request.target, params = ?request.params, "sending configuration request");

        let mut builder = self.http_client.get(&request.target);
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        if let Some(ref token) = self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(FetchFailure::transport)?;
        let status = response.status();
        let body = response.text().await.map_err(FetchFailure::transport)?;

        if !status.is_success() {
            return Err(FetchFailure::from_response(status, &body));
        }

        Ok(serde_json::from_str::<Value>(&body).ok())
    }
}

impl RemoteFetch for HttpFetcher {
    fn target(&self, request: &ConfigurationRequest) -> String {
        match request {
            ConfigurationRequest::All => self.with_segment(ALL_ID).to_string(),
            ConfigurationRequest::Segment(segment_id) => self.with_segment(segment_id).to_string(),
            ConfigurationRequest::Params(_) => self.service_url.to_string(),
        }
    }

    fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, Result<Option<Value>, FetchFailure>> {
        Box::pin(self.send(request))
    }
}
