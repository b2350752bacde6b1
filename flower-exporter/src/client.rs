//! HTTP client for the Flower monitoring API.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde_json::Value;
use thiserror::Error;

/// How a failed poll affects the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Retry after the poll interval.
    Transient,
    /// The target is unreachable; stop polling it.
    Permanent,
}

/// Errors from a single upstream request.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The connection could not be established (DNS, refused, connect timeout).
    #[error("Connection to {url} failed: {message}")]
    Connect { url: String, message: String },

    /// The request did not complete within the request timeout.
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    /// The endpoint answered with something other than 200.
    #[error("{url} responded with HTTP {status}")]
    Status { url: String, status: u16 },

    /// The body of a 200 response is not JSON.
    #[error("Invalid JSON from {url}: {message}")]
    Decode { url: String, message: String },

    /// Any other transport error after the connection was made.
    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Connect { .. } => FailureKind::Permanent,
            FetchError::Timeout { .. }
            | FetchError::Status { .. }
            | FetchError::Decode { .. }
            | FetchError::Transport { .. } => FailureKind::Transient,
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.kind() == FailureKind::Permanent
    }

    fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        let url = url.to_string();
        if err.is_connect() || err.is_builder() {
            FetchError::Connect {
                url,
                message: err.to_string(),
            }
        } else if err.is_timeout() {
            FetchError::Timeout { url }
        } else {
            FetchError::Transport {
                url,
                message: err.to_string(),
            }
        }
    }
}

/// Client for Flower's JSON API.
///
/// Performs exactly one request per call; retry policy belongs to the poller.
#[derive(Debug, Clone)]
pub struct FlowerClient {
    http: reqwest::Client,
}

impl FlowerClient {
    /// Build a client bounded by the given timeouts.
    pub fn new(request_timeout: Duration, connect_timeout: Duration) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .user_agent(concat!("flower-exporter/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { http })
    }

    /// GET `target + path` and decode the JSON body of a 200 response.
    pub async fn fetch(&self, target: &str, path: &str) -> Result<Value, FetchError> {
        let url = format!("{}{}", target.trim_end_matches('/'), path);

        let response = self
            .http
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&url, e))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(&url, e))?;

        serde_json::from_slice(&body).map_err(|e| FetchError::Decode {
            url,
            message: e.to_string(),
        })
    }
}
