//! Inference error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility. These types carry the context needed to
//! build meaningful log entries.

use thiserror::Error;

/// HTTP status the inference API uses while a model is still being loaded.
pub const MODEL_LOADING_STATUS: u16 = 503;

/// Errors that can occur during inference operations.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// TCP/HTTP connection to the inference endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed {
        endpoint: String,
        reason: String,
    },

    /// Non-2xx HTTP response from the inference endpoint.
    #[error("HTTP {status}: {body}")]
    HttpError {
        status: u16,
        body: String,
    },

    /// The response body was not the JSON we expected.
    #[error("failed to decode response: {reason}")]
    DecodeFailed {
        reason: String,
    },

    /// SSE stream read or frame-level error.
    #[error("stream error: {reason}")]
    StreamError {
        reason: String,
    },

    /// Caller input could not be turned into a request.
    #[error("invalid input: {reason}")]
    InvalidInput {
        reason: String,
    },

    /// Configuration loading or validation error.
    #[error("config error: {reason}")]
    ConfigError {
        reason: String,
    },

    /// A task call failed after the retry coordinator gave up.
    #[error("failed to make API request: {source}")]
    RequestFailed {
        status: Option<u16>,
        #[source]
        source: Box<InferenceError>,
    },

    /// The model listing endpoint failed.
    #[error("failed to retrieve model list: {source}")]
    ModelListFailed {
        status: Option<u16>,
        #[source]
        source: Box<InferenceError>,
    },

    /// An operation scheduled on a [`TaskPool`](super::pool::TaskPool) failed.
    #[error("async operation failed: {source}")]
    AsyncOperationFailed {
        #[source]
        source: Box<InferenceError>,
    },

    /// An operation scheduled on the pool panicked or was aborted.
    #[error("async operation panicked: {reason}")]
    TaskPanicked {
        reason: String,
    },
}

impl InferenceError {
    /// Wrap a terminal per-attempt error into [`InferenceError::RequestFailed`].
    pub fn request_failed(source: InferenceError) -> Self {
        InferenceError::RequestFailed {
            status: source.status(),
            source: Box::new(source),
        }
    }

    /// Check if this error is the "model is loading" signal (HTTP 503).
    pub fn is_model_loading(&self) -> bool {
        matches!(
            self,
            InferenceError::HttpError {
                status: MODEL_LOADING_STATUS,
                ..
            }
        )
    }

    /// The HTTP status carried by this error, looking through wrappers.
    pub fn status(&self) -> Option<u16> {
        match self {
            InferenceError::HttpError { status, .. } => Some(*status),
            InferenceError::RequestFailed { status, .. }
            | InferenceError::ModelListFailed { status, .. } => *status,
            InferenceError::AsyncOperationFailed { source } => source.status(),
            _ => None,
        }
    }

    /// Extract the error body text, if this is (or wraps) an `HttpError`.
    pub fn error_body(&self) -> Option<&str> {
        match self.root_cause() {
            InferenceError::HttpError { body, .. } => Some(body),
            _ => None,
        }
    }

    /// The innermost error once every wrapper variant is peeled off.
    pub fn root_cause(&self) -> &InferenceError {
        match self {
            InferenceError::RequestFailed { source, .. }
            | InferenceError::ModelListFailed { source, .. }
            | InferenceError::AsyncOperationFailed { source } => source.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_model_loading_true() {
        let err = InferenceError::HttpError {
            status: 503,
            body: r#"{"error":"Model gpt2 is currently loading","estimated_time":20.0}"#.to_string(),
        };
        assert!(err.is_model_loading());
    }

    #[test]
    fn test_is_model_loading_false_different_status() {
        let err = InferenceError::HttpError {
            status: 500,
            body: "internal server error".to_string(),
        };
        assert!(!err.is_model_loading());
    }

    #[test]
    fn test_is_model_loading_false_wrapped() {
        // Only the raw per-attempt error triggers a retry.
        let err = InferenceError::request_failed(InferenceError::HttpError {
            status: 503,
            body: String::new(),
        });
        assert!(!err.is_model_loading());
    }

    #[test]
    fn test_request_failed_carries_status_and_message() {
        let err = InferenceError::request_failed(InferenceError::HttpError {
            status: 401,
            body: "unauthorized".to_string(),
        });
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.to_string(), "failed to make API request: HTTP 401: unauthorized");
    }

    #[test]
    fn test_decode_failure_message() {
        let err = InferenceError::request_failed(InferenceError::DecodeFailed {
            reason: "expected value at line 1 column 1".to_string(),
        });
        assert!(err.status().is_none());
        assert!(err.to_string().contains("failed to decode response"));
    }

    #[test]
    fn test_error_body_through_wrappers() {
        let err = InferenceError::AsyncOperationFailed {
            source: Box::new(InferenceError::request_failed(InferenceError::HttpError {
                status: 500,
                body: "test body".to_string(),
            })),
        };
        assert_eq!(err.error_body(), Some("test body"));
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn test_error_body_non_http() {
        let err = InferenceError::StreamError {
            reason: "eof".to_string(),
        };
        assert!(err.error_body().is_none());
    }
}
