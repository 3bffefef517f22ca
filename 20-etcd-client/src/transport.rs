//! HTTP seam between the dispatch loop and the network.
//!
//! [`HttpTransport`] is the production implementation on top of reqwest.
//! Tests plug in scripted transports to drive the dispatch loop through
//! failures without real sockets.

use async_trait::async_trait;
use reqwest::{header, redirect, Method, StatusCode};
use thiserror::Error;

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; param=value";

/// Failure that produced no HTTP response at all, or a body that could not
/// be read.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self { message }
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<String>,
}

impl HttpRequest {
    /// Content type to send, if any: only requests with a body carry one.
    pub fn content_type(&self) -> Option<&'static str> {
        self.body.as_ref().map(|_| FORM_CONTENT_TYPE)
    }
}

#[derive(Debug)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub location: Option<String>,
    pub body: Result<Vec<u8>, TransportError>,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            location: None,
            body: Ok(body.into()),
        }
    }

    pub fn redirect(location: impl Into<String>) -> Self {
        Self {
            status: StatusCode::TEMPORARY_REDIRECT,
            location: Some(location.into()),
            body: Ok(Vec::new()),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs one request/response cycle.
    ///
    /// `Err` means no response was obtained (connection refused, reset,
    /// timeout). Any HTTP status, including 5xx, is an `Ok`.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        // Redirects are leader hints and must reach the dispatch loop.
        let client = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let content_type = request.content_type();
        let mut builder = self.client.request(request.method, &request.url);
        if let (Some(body), Some(content_type)) = (request.body, content_type) {
            builder = builder
                .header(header::CONTENT_TYPE, content_type)
                .body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(TransportError::from);

        Ok(HttpResponse {
            status,
            location,
            body,
        })
    }
}
