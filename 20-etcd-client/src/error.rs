//! Error taxonomy for key operations.
//!
//! Every call produces either a decoded envelope or exactly one of these
//! errors. Transient failures (network errors, HTTP 500, redirects) never
//! surface directly; they are retried inside the dispatch loop and only show
//! up here once the retry budget is spent.

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::TransportError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error envelope reported by the store itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub error_code: u64,
    pub message: String,
    #[serde(default)]
    pub cause: Option<String>,
    #[serde(default)]
    pub index: Option<u64>,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.error_code)?;
        if let Some(cause) = &self.cause {
            write!(f, ": {cause}")?;
        }
        if let Some(index) = self.index {
            write!(f, " [{index}]")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Option name not in the allow-list for this operation.
    #[error("invalid option `{name}` for {operation}")]
    InvalidOption {
        operation: &'static str,
        name: String,
    },

    #[error("option `{name}` expects a {expected} value")]
    InvalidOptionType {
        name: String,
        expected: &'static str,
    },

    #[error("{0}")]
    InvalidRequest(String),

    #[error("cluster requires at least one machine")]
    NoMachines,

    #[error("invalid endpoint `{endpoint}`: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// Retry budget exhausted. `retries` counts charged failures (network
    /// errors and 500s); redirects are not included.
    #[error("cannot reach servers after {retries} retries")]
    Unreachable { retries: usize },

    #[error("cannot get redirection location")]
    MissingRedirectLocation,

    #[error("gave up after {hops} redirects")]
    TooManyRedirects { hops: usize },

    /// The store answered and rejected the operation.
    #[error("store rejected request ({status}): {error}")]
    Api { status: StatusCode, error: ApiError },

    /// The store answered with a body the client could not decode.
    #[error("malformed server response ({status})")]
    MalformedResponse {
        status: StatusCode,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to build HTTP transport")]
    Transport(#[source] TransportError),

    #[error("failed to read response body")]
    Body(#[source] TransportError),

    #[error("request did not complete within {0:?}")]
    DeadlineExceeded(Duration),
}

impl Error {
    pub fn is_remote_rejected(&self) -> bool {
        matches!(self, Error::Api { .. })
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Error::MalformedResponse { .. })
    }

    /// Store error code, when the store itself rejected the request.
    pub fn error_code(&self) -> Option<u64> {
        match self {
            Error::Api { error, .. } => Some(error.error_code),
            _ => None,
        }
    }
}
