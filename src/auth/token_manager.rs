//! Token manager
//!
//! Owns the current access token and exchanges credentials for a new one
//! when it is missing, stale, or rejected by the server.
//!
//! Refreshes are single-flight: the refresh lock admits one exchange at a
//! time, and every caller that queued on the lock while an exchange ran
//! adopts that exchange's outcome (token or failure) instead of starting its
//! own. An epoch counter, bumped under the lock after every exchange, tells a
//! waiter whether an exchange completed since it looked at the cache.

use super::types::{AuthVariant, Credentials, Token};
use crate::backoff::BackoffConfig;
use crate::error::{is_transient_transport, Error, Result};
use crate::http::{StatusClass, StatusPolicy};
use reqwest::Client;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Outcome of the last exchange, shared with callers that waited on it
type RefreshOutcome = Option<std::result::Result<Token, String>>;

/// Owns the access token and its refresh
pub struct TokenManager {
    variant: AuthVariant,
    credentials: Option<Credentials>,
    token_url: String,
    http_client: Client,
    backoff: BackoffConfig,
    policy: StatusPolicy,
    request_timeout: Duration,
    margin: chrono::Duration,
    cached: RwLock<Option<Token>>,
    refresh: Mutex<RefreshOutcome>,
    epoch: AtomicU64,
}

impl TokenManager {
    /// Create a token manager exchanging at `token_url`
    pub fn new(
        variant: AuthVariant,
        credentials: Option<Credentials>,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            variant,
            credentials,
            token_url: token_url.into(),
            http_client: Client::new(),
            backoff: BackoffConfig::default(),
            policy: StatusPolicy::default(),
            request_timeout: Duration::from_secs(30),
            margin: chrono::Duration::seconds(30),
            cached: RwLock::new(None),
            refresh: Mutex::new(None),
            epoch: AtomicU64::new(0),
        }
    }

    /// Use a shared HTTP client for exchanges
    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.http_client = client;
        self
    }

    /// Retry budget for transient exchange failures
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Status classification for exchange responses
    #[must_use]
    pub fn with_policy(mut self, policy: StatusPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Timeout of a single exchange request
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Refresh tokens expiring within this margin
    #[must_use]
    pub fn with_expiry_margin(mut self, margin: Duration) -> Self {
        self.margin = chrono::Duration::from_std(margin).unwrap_or(chrono::Duration::seconds(30));
        self
    }

    /// The configured auth variant
    pub fn variant(&self) -> &AuthVariant {
        &self.variant
    }

    /// Token endpoint
    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Return a valid token, refreshing first if none is held or it is stale
    pub async fn get_token(&self) -> Result<Token> {
        let observed = self.epoch.load(Ordering::Acquire);

        if let Some(token) = self.fresh_token().await {
            return Ok(token);
        }

        let mut outcome = self.refresh.lock().await;

        // An exchange finished while we waited for the lock: share its result
        if self.epoch.load(Ordering::Acquire) != observed {
            if let Some(shared) = outcome.as_ref() {
                debug!("Adopting result of concurrent token refresh");
                return shared.clone().map_err(Error::auth);
            }
        }

        if let Some(token) = self.fresh_token().await {
            return Ok(token);
        }

        self.refresh_locked(&mut outcome).await
    }

    /// Exchange credentials for a new token unconditionally
    pub async fn force_refresh(&self) -> Result<Token> {
        if let AuthVariant::Bearer { .. } = self.variant {
            return Err(Error::auth(
                "server rejected the supplied bearer token and it cannot be refreshed",
            ));
        }

        let mut outcome = self.refresh.lock().await;
        self.refresh_locked(&mut outcome).await
    }

    /// Drop the held token without fetching a new one
    pub async fn invalidate(&self) {
        let mut cached = self.cached.write().await;
        *cached = None;
    }

    /// Snapshot of the held token, stale or not
    pub async fn current(&self) -> Option<Token> {
        self.cached.read().await.clone()
    }

    async fn fresh_token(&self) -> Option<Token> {
        let cached = self.cached.read().await;
        cached
            .as_ref()
            .filter(|token| !token.is_stale(self.margin))
            .cloned()
    }

    async fn refresh_locked(&self, outcome: &mut RefreshOutcome) -> Result<Token> {
        let result = self.exchange().await;

        {
            let mut cached = self.cached.write().await;
            *cached = result.as_ref().ok().cloned();
        }

        *outcome = Some(match &result {
            Ok(token) => Ok(token.clone()),
            Err(Error::Authentication { message }) => Err(message.clone()),
            Err(other) => Err(other.to_string()),
        });
        self.epoch.fetch_add(1, Ordering::Release);

        result
    }

    /// One exchange, retried with backoff on transient failures only
    async fn exchange(&self) -> Result<Token> {
        let mut backoff = self.backoff.start();

        loop {
            let failure = match self.request_token().await {
                Ok(token) => {
                    info!(
                        "Obtained access token from {} (expires at {:?})",
                        self.token_url,
                        token.expires_at()
                    );
                    return Ok(token);
                }
                Err(e) => e,
            };

            if !self.is_transient(&failure) {
                return Err(Error::auth(format!("token exchange rejected: {failure}")));
            }

            let step = backoff.next_delay();
            if step.exhausted {
                return Err(Error::auth(format!(
                    "token exchange failed after {} attempts: {failure}",
                    backoff.attempt()
                )));
            }

            warn!(
                "Token exchange failed ({}), attempt {}/{}, retrying in {:?}",
                failure,
                backoff.attempt(),
                backoff.max_attempts(),
                step.delay
            );
            tokio::time::sleep(step.delay).await;
        }
    }

    fn is_transient(&self, error: &Error) -> bool {
        match error {
            Error::Http(e) => is_transient_transport(e),
            Error::HttpStatus { status, .. } => {
                self.policy.classify(*status) == StatusClass::Retryable
            }
            _ => false,
        }
    }

    async fn request_token(&self) -> Result<Token> {
        let method = self.variant.method();

        let request = match &self.variant {
            AuthVariant::Bearer { token } => return Ok(Token::new(token.clone(), None, method)),
            AuthVariant::None => {
                return Err(Error::auth("no credentials configured for this client"))
            }
            AuthVariant::Direct => {
                let credentials = self.credentials()?;
                self.http_client
                    .post(&self.token_url)
                    .basic_auth(credentials.client_id(), Some(credentials.client_secret()))
                    .form(&[("grant_type", "client_credentials")])
            }
            AuthVariant::Grant { grant_type } => {
                let credentials = self.credentials()?;
                self.http_client.post(&self.token_url).form(&[
                    ("grant_type", grant_type.as_str()),
                    ("client_id", credentials.client_id()),
                    ("client_secret", credentials.client_secret()),
                ])
            }
        };

        debug!("Requesting access token from {}", self.token_url);
        let response = request
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(Error::Http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::http_status(status.as_u16(), body));
        }

        let token_response: TokenResponse = response.json().await.map_err(Error::Http)?;
        Ok(token_response.into_token(method))
    }

    fn credentials(&self) -> Result<&Credentials> {
        self.credentials
            .as_ref()
            .ok_or_else(|| Error::auth("credentials are required for this auth variant"))
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("variant", &self.variant)
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}

/// OAuth2 token response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_token(self, method: super::types::AuthMethod) -> Token {
        match self.expires_in {
            Some(secs) => Token::expires_in(self.access_token, secs, method),
            None => Token::new(self.access_token, None, method),
        }
    }
}
