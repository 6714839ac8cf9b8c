//! Errors raised by LLM backends
//!
//! Every backend maps its provider-specific failures onto [`BackendError`] so the
//! orchestration layer can decide between "abort the run" (agentic mode) and
//! "fall back to a deterministic default" (context analysis, workflow checks).

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum BackendError {
    /// API request failed with the given message
    #[error("API error{}: {message}", status_code.map(|c| format!(" ({})", c)).unwrap_or_default())]
    ApiError {
        message: String,
        status_code: Option<u16>,
    },

    /// Request timed out after the specified duration (in seconds)
    #[error("Request timed out after {seconds} seconds")]
    TimeoutError { seconds: u64 },

    /// Rate limit exceeded, retry after the specified duration (in seconds)
    #[error("Rate limit exceeded{}", retry_after.map(|s| format!(", retry after {} seconds", s)).unwrap_or_default())]
    RateLimitError { retry_after: Option<u64> },

    /// Invalid or malformed response from the LLM
    #[error("Invalid response from LLM: {message}")]
    InvalidResponse {
        message: String,
        raw_response: Option<String>,
    },

    /// Missing API keys, unknown provider and similar setup problems
    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Error: {message}")]
    Other { message: String },
}

impl BackendError {
    /// Whether a retry after a short pause could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BackendError::TimeoutError { .. }
                | BackendError::RateLimitError { .. }
                | BackendError::NetworkError { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let with_code = BackendError::ApiError {
            message: "bad gateway".to_string(),
            status_code: Some(502),
        };
        assert_eq!(with_code.to_string(), "API error (502): bad gateway");

        let without_code = BackendError::ApiError {
            message: "bad gateway".to_string(),
            status_code: None,
        };
        assert_eq!(without_code.to_string(), "API error: bad gateway");
    }

    #[test]
    fn test_rate_limit_display() {
        let err = BackendError::RateLimitError {
            retry_after: Some(5),
        };
        assert_eq!(
            err.to_string(),
            "Rate limit exceeded, retry after 5 seconds"
        );
        assert_eq!(
            BackendError::RateLimitError { retry_after: None }.to_string(),
            "Rate limit exceeded"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(BackendError::TimeoutError { seconds: 30 }.is_transient());
        assert!(BackendError::NetworkError {
            message: "reset".to_string()
        }
        .is_transient());
        assert!(!BackendError::ConfigurationError {
            message: "no key".to_string()
        }
        .is_transient());
    }
}
