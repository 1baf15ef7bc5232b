//! Auth types
//!
//! Credentials, the auth variant selecting the exchange flow, and the
//! token value object the [`TokenManager`](super::TokenManager) hands out.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Client identifier and secret
///
/// Supplied by the caller and never serialised; `Debug` redacts the secret.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    client_id: String,
    client_secret: String,
}

impl Credentials {
    /// Create credentials
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Client identifier
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub(crate) fn client_secret(&self) -> &str {
        &self.client_secret
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// How tokens are obtained
#[derive(Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthVariant {
    /// Client credentials sent with HTTP Basic, `grant_type=client_credentials`
    #[default]
    Direct,

    /// Credentials and a grant tag sent in the form body
    Grant {
        /// Value of the `grant_type` form field
        grant_type: String,
    },

    /// Caller-supplied token, used as is and never refreshed
    Bearer {
        /// The bearer token
        token: String,
    },

    /// No authentication
    None,
}

impl AuthVariant {
    /// Tag recorded on tokens obtained through this variant
    pub fn method(&self) -> AuthMethod {
        match self {
            AuthVariant::Direct => AuthMethod::Direct,
            AuthVariant::Grant { .. } => AuthMethod::Grant,
            AuthVariant::Bearer { .. } => AuthMethod::Bearer,
            AuthVariant::None => AuthMethod::None,
        }
    }

    /// Whether requests carry an Authorization header
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, AuthVariant::None)
    }
}

impl std::fmt::Debug for AuthVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthVariant::Direct => f.write_str("Direct"),
            AuthVariant::Grant { grant_type } => f
                .debug_struct("Grant")
                .field("grant_type", grant_type)
                .finish(),
            AuthVariant::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"<redacted>")
                .finish(),
            AuthVariant::None => f.write_str("None"),
        }
    }
}

/// Flow a token was obtained with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// Client credentials over HTTP Basic
    Direct,
    /// Credentials in the form body
    Grant,
    /// Caller-supplied
    Bearer,
    /// Unauthenticated
    None,
}

/// Access token with its absolute expiry
///
/// Replaced on refresh, never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    access_token: String,
    expires_at: Option<DateTime<Utc>>,
    method: AuthMethod,
}

impl Token {
    /// Create a token
    pub fn new(
        access_token: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
        method: AuthMethod,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
            method,
        }
    }

    /// Create a token that expires in N seconds from now
    ///
    /// A lifetime past the representable date range is treated as no expiry.
    pub fn expires_in(access_token: impl Into<String>, seconds: i64, method: AuthMethod) -> Self {
        let expires_at = chrono::Duration::try_seconds(seconds)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime));
        Self::new(access_token, expires_at, method)
    }

    /// The bearer value
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Absolute expiry, if the server reported one
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Flow the token came from
    pub fn method(&self) -> AuthMethod {
        self.method
    }

    /// Expired or expiring within `margin`; tokens without expiry never go stale
    pub fn is_stale(&self, margin: chrono::Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at.signed_duration_since(Utc::now()) <= margin,
            None => false,
        }
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("method", &self.method)
            .finish()
    }
}
