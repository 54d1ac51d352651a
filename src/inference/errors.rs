//! Inference error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility; these types carry the context needed to build
//! meaningful log entries.

use thiserror::Error;

/// Errors that can occur while talking to the inference endpoint.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Connection refused, connect timeout, or the connection dropped mid-stream.
    #[error("inference server unreachable at {endpoint}: {reason}")]
    UnreachableServer {
        endpoint: String,
        reason: String,
    },

    /// A response body or stream line could not be decoded.
    #[error("malformed response: {reason}")]
    MalformedResponse {
        reason: String,
    },

    /// Non-2xx HTTP response from the inference endpoint.
    #[error("HTTP {status}: {body}")]
    HttpError {
        status: u16,
        body: String,
    },

    /// The server reported an error object inside the stream.
    #[error("model server error: {message}")]
    ServerError {
        message: String,
    },

    /// Configuration loading or validation error.
    #[error("config error: {reason}")]
    ConfigError {
        reason: String,
    },
}

impl InferenceError {
    /// Whether the server could not be reached at all.
    ///
    /// The front end uses this to print the `ollama serve` hint instead of
    /// the raw error.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, InferenceError::UnreachableServer { .. })
    }

    /// Map a reqwest transport failure to `UnreachableServer`.
    pub(crate) fn from_transport(endpoint: &str, err: &reqwest::Error) -> Self {
        let reason = if err.is_timeout() {
            format!("timed out: {err}")
        } else {
            err.to_string()
        };
        InferenceError::UnreachableServer {
            endpoint: endpoint.to_string(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_unreachable() {
        let err = InferenceError::UnreachableServer {
            endpoint: "http://localhost:11434".into(),
            reason: "connection refused".into(),
        };
        assert!(err.is_unreachable());
        assert!(!InferenceError::MalformedResponse {
            reason: "bad json".into()
        }
        .is_unreachable());
    }

    #[test]
    fn test_display_http_error() {
        let err = InferenceError::HttpError {
            status: 404,
            body: r#"{"error":"model 'nope' not found"}"#.into(),
        };
        assert_eq!(err.to_string(), r#"HTTP 404: {"error":"model 'nope' not found"}"#);
    }

    #[test]
    fn test_display_unreachable_names_endpoint() {
        let err = InferenceError::UnreachableServer {
            endpoint: "http://localhost:11434/api/tags".into(),
            reason: "connection refused".into(),
        };
        assert!(err.to_string().contains("http://localhost:11434/api/tags"));
    }
}
