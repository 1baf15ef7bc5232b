//! Error types for the Sequoia client
//!
//! This module defines the error hierarchy for the entire crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.
//!
//! Four kinds make up the caller-facing surface of a logical operation:
//! [`Error::Authentication`], [`Error::RetryExhausted`],
//! [`Error::FatalRequest`] and [`Error::Cancelled`]. The remaining variants
//! describe configuration problems or the individual failures that the
//! executor wraps.

use serde_json::Value;
use thiserror::Error;

/// The main error type for the Sequoia client
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required config field: {field}")]
    MissingConfigField { field: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Operation outcomes
    // ============================================================================
    /// Credential or token exchange permanently failed
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Transient failures exceeded the attempt budget
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        last: Box<Error>,
    },

    /// Non-retryable response, carrying the server's diagnostic payload
    #[error("Request rejected with HTTP {status}: {payload}")]
    FatalRequest { status: u16, payload: Value },

    /// Caller-imposed cancellation or deadline fired mid-operation
    #[error("Operation cancelled: {reason}")]
    Cancelled { reason: String },

    // ============================================================================
    // HTTP Errors
    // ============================================================================
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Failed to decode response: {message}")]
    Decode { message: String },

    // ============================================================================
    // Service / Resource Errors
    // ============================================================================
    #[error("Service '{service}' not found in registry")]
    ServiceNotFound { service: String },

    #[error("Document cannot be updated: {message}")]
    NotMatchingVersion { message: String },

    #[error("Reference mismatch: {message}")]
    ReferenceMismatch { message: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    /// Create an invalid config value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an authentication error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Create an HTTP status error
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }

    /// Create a fatal request error
    pub fn fatal(status: u16, payload: Value) -> Self {
        Self::FatalRequest { status, payload }
    }

    /// Wrap the last observed failure once the attempt budget is spent
    pub fn retry_exhausted(attempts: u32, last: Error) -> Self {
        Self::RetryExhausted {
            attempts,
            last: Box::new(last),
        }
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// HTTP status attached to this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::HttpStatus { status, .. } | Error::FatalRequest { status, .. } => Some(*status),
            Error::RetryExhausted { last, .. } => last.status(),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Transport failures worth another attempt: timeouts, refused or reset
/// connections, and failures while streaming the body.
pub(crate) fn is_transient_transport(e: &reqwest::Error) -> bool {
    !e.is_builder() && (e.is_timeout() || e.is_connect() || e.is_request() || e.is_body())
}

/// Result type alias for the Sequoia client
pub type Result<T> = std::result::Result<T, Error>;
