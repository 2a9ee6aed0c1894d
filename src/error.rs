use std::time::Duration;
use thiserror::Error;

use crate::types::GeneratedArtifact;

/// Keywords that mark an error message as a transient failure.
const TRANSIENT_KEYWORDS: [&str; 5] = ["network", "timeout", "interrupted", "abort", "connection"];

/// HTTP statuses that are worth another attempt.
const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Errors produced while generating, assembling, or persisting an artifact.
#[derive(Error, Debug)]
pub enum GenerationError {
    /// Low-level HTTP transport failure (connection refused, reset, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON parsing failed at the serde level.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// The provider sent an explicit `type: "error"` event mid-stream.
    #[error("Stream error ({kind}): {message}")]
    Stream {
        /// Provider error type (e.g. `overloaded_error`).
        kind: String,
        /// Provider error message.
        message: String,
    },

    /// The connection dropped or the body could not be read.
    #[error("Network error: {0}")]
    Network(String),

    /// The attempt exceeded its time budget and was aborted.
    #[error("Generation timeout after {0:?}")]
    Timeout(Duration),

    /// The caller cancelled the generation.
    #[error("Generation was cancelled")]
    Cancelled,

    /// HTTP error with status code, response body, and optional Retry-After hint.
    #[error("HTTP {status}: {body}")]
    HttpError {
        /// HTTP status code (e.g. 429, 500, 503).
        status: u16,
        /// Response body text.
        body: String,
        /// Parsed `Retry-After` header value, if present.
        retry_after: Option<Duration>,
    },

    /// Invalid configuration detected at build time.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The storage collaborator rejected a write or read.
    ///
    /// When generation itself succeeded, the finished artifact rides along so
    /// the caller can re-attempt persistence without generating again.
    #[error("Persistence failed: {message}")]
    Persistence {
        message: String,
        artifact: Option<Box<GeneratedArtifact>>,
    },

    /// Every attempt failed and no usable partial content was left.
    #[error("Generation failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<GenerationError>,
    },

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl GenerationError {
    /// Shorthand for a persistence error without an attached artifact.
    pub fn persistence(message: impl Into<String>) -> Self {
        GenerationError::Persistence {
            message: message.into(),
            artifact: None,
        }
    }

    /// Whether this failure should be retried.
    ///
    /// Transport failures, timeouts, retryable HTTP statuses, and any error
    /// whose message mentions a network-ish keyword are transient. User
    /// cancellation never is.
    pub fn is_transient(&self) -> bool {
        match self {
            GenerationError::Cancelled => false,
            GenerationError::Request(_)
            | GenerationError::Network(_)
            | GenerationError::Timeout(_) => true,
            GenerationError::HttpError { status, .. } if RETRYABLE_STATUSES.contains(status) => {
                true
            }
            GenerationError::RetriesExhausted { .. } => false,
            other => message_is_transient(&other.to_string()),
        }
    }
}

/// Keyword check used for errors that only carry a message.
pub fn message_is_transient(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_KEYWORDS.iter().any(|k| lower.contains(k))
}

impl From<anyhow::Error> for GenerationError {
    fn from(err: anyhow::Error) -> Self {
        GenerationError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GenerationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_classification() {
        assert!(message_is_transient("Network request failed"));
        assert!(message_is_transient("upstream TIMEOUT"));
        assert!(message_is_transient("stream interrupted"));
        assert!(message_is_transient("The operation was aborted"));
        assert!(message_is_transient("connection reset by peer"));
        assert!(!message_is_transient("invalid api key"));
    }

    #[test]
    fn test_variants_transient() {
        assert!(GenerationError::Network("eof".into()).is_transient());
        assert!(GenerationError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!GenerationError::Cancelled.is_transient());
        assert!(!GenerationError::InvalidConfig("x".into()).is_transient());
    }

    #[test]
    fn test_stream_error_uses_message_keywords() {
        let overloaded = GenerationError::Stream {
            kind: "overloaded_error".into(),
            message: "Overloaded".into(),
        };
        assert!(!overloaded.is_transient());

        let dropped = GenerationError::Stream {
            kind: "api_error".into(),
            message: "Connection to upstream lost".into(),
        };
        assert!(dropped.is_transient());
    }

    #[test]
    fn test_http_status_transient() {
        let err = GenerationError::HttpError {
            status: 503,
            body: "unavailable".into(),
            retry_after: None,
        };
        assert!(err.is_transient());

        let err = GenerationError::HttpError {
            status: 400,
            body: "bad request".into(),
            retry_after: None,
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn test_exhausted_is_final() {
        let err = GenerationError::RetriesExhausted {
            attempts: 3,
            last: Box::new(GenerationError::Network("down".into())),
        };
        assert!(!err.is_transient());
        assert!(err.to_string().contains("3 attempts"));
    }
}
