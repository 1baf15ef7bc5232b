//! Response classification
//!
//! Decides, per status code, whether an attempt succeeded, should be retried,
//! should trigger a token refresh, or is final.

use serde::Deserialize;

/// Class of a response status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 2xx
    Success,
    /// Transient; retry after backoff
    Retryable,
    /// Token rejected; refresh then retry
    AuthRejected,
    /// No retry
    Fatal,
}

/// Configurable status classification
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StatusPolicy {
    /// Statuses meaning the token was rejected
    pub auth: Vec<u16>,
    /// Extra statuses retried on top of server errors
    pub retryable: Vec<u16>,
    /// Retry every 5xx
    pub retry_server_errors: bool,
}

impl Default for StatusPolicy {
    fn default() -> Self {
        Self {
            auth: vec![401, 403],
            retryable: vec![408, 429],
            retry_server_errors: true,
        }
    }
}

impl StatusPolicy {
    /// Classify a status code
    pub fn classify(&self, status: u16) -> StatusClass {
        if (200..300).contains(&status) {
            StatusClass::Success
        } else if self.auth.contains(&status) {
            StatusClass::AuthRejected
        } else if self.retryable.contains(&status)
            || (self.retry_server_errors && (500..600).contains(&status))
        {
            StatusClass::Retryable
        } else {
            StatusClass::Fatal
        }
    }
}
