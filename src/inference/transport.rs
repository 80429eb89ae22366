//! HTTP transport seam.
//!
//! The client never talks to `reqwest` directly. It describes each call as an
//! [`HttpRequest`] and hands it to a [`Transport`], which returns the status
//! and raw body bytes. [`HttpTransport`] is the production implementation;
//! tests substitute a scripted one.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client as HttpClient;
use thiserror::Error;

use super::config::ClientConfig;
use super::errors::InferenceError;

// ─── Request / Response ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Transport-agnostic description of one HTTP call.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Multipart(Vec<MultipartPart>),
}

/// One named part of a multipart form.
#[derive(Debug, Clone, PartialEq)]
pub struct MultipartPart {
    pub name: String,
    pub contents: PartContents,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PartContents {
    File { file_name: String, data: Bytes },
    Text(String),
}

/// Fully buffered response.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Incrementally arriving response body.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Response whose body is read as it arrives.
pub struct StreamingResponse {
    pub status: u16,
    pub body: ByteStream,
}

/// Network-level failures. HTTP error statuses are not transport errors.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connection failed to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: String },

    #[error("failed to read response body: {reason}")]
    Read { reason: String },
}

impl From<TransportError> for InferenceError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Connect { endpoint, reason } => {
                InferenceError::ConnectionFailed { endpoint, reason }
            }
            TransportError::Timeout { endpoint } => InferenceError::ConnectionFailed {
                endpoint,
                reason: "request timed out".into(),
            },
            TransportError::Read { reason } => InferenceError::StreamError { reason },
        }
    }
}

// ─── Transport trait ─────────────────────────────────────────────────────────

/// Performs the actual network call.
///
/// Implementations must be safe to share between concurrently running
/// operations; the client holds one behind an `Arc`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and buffer the whole body.
    async fn send(&self, request: HttpRequest) -> Result<TransportResponse, TransportError>;

    /// Send a request and hand back the body as a byte stream.
    async fn send_streaming(&self, request: HttpRequest)
        -> Result<StreamingResponse, TransportError>;
}

// ─── reqwest implementation ──────────────────────────────────────────────────

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// Client for buffered requests.
    http: HttpClient,
    /// Client for streaming requests (longer total timeout).
    http_stream: HttpClient,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, InferenceError> {
        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);

        let http = HttpClient::builder()
            .connect_timeout(connect_timeout)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: config.api_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        let http_stream = HttpClient::builder()
            .connect_timeout(connect_timeout)
            .timeout(Duration::from_secs(config.stream_timeout_secs))
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: config.api_url.clone(),
                reason: format!("failed to build streaming HTTP client: {e}"),
            })?;

        Ok(Self { http, http_stream })
    }

    async fn dispatch(
        client: &HttpClient,
        request: HttpRequest,
    ) -> Result<reqwest::Response, TransportError> {
        let url = request.url.clone();
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };

        let mut builder = client.request(method, &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => {
                let body = serde_json::to_vec(&value).map_err(|e| TransportError::Connect {
                    endpoint: url.clone(),
                    reason: format!("failed to serialize request body: {e}"),
                })?;
                builder.body(body)
            }
            RequestBody::Multipart(parts) => builder.multipart(build_form(parts)),
        };

        builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout {
                    endpoint: url.clone(),
                }
            } else {
                TransportError::Connect {
                    endpoint: url.clone(),
                    reason: e.to_string(),
                }
            }
        })
    }
}

fn build_form(parts: Vec<MultipartPart>) -> reqwest::multipart::Form {
    parts
        .into_iter()
        .fold(reqwest::multipart::Form::new(), |form, part| match part.contents {
            PartContents::File { file_name, data } => form.part(
                part.name,
                reqwest::multipart::Part::bytes(data.to_vec()).file_name(file_name),
            ),
            PartContents::Text(text) => form.text(part.name, text),
        })
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<TransportResponse, TransportError> {
        let response = Self::dispatch(&self.http, request).await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();
        let body = response.bytes().await.map_err(|e| TransportError::Read {
            reason: e.to_string(),
        })?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }

    async fn send_streaming(
        &self,
        request: HttpRequest,
    ) -> Result<StreamingResponse, TransportError> {
        let response = Self::dispatch(&self.http_stream, request).await?;
        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map(|chunk| {
                chunk.map_err(|e| TransportError::Read {
                    reason: e.to_string(),
                })
            })
            .boxed();

        Ok(StreamingResponse { status, body })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
