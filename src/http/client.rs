//! Request executor
//!
//! Runs one logical request through its attempt loop:
//! - attaches the current token and correlation id
//! - retries transient failures (transport, 5xx, 429) with backoff
//! - forces a token refresh when the server rejects the token, charging the
//!   retry to the same backoff state
//! - surfaces anything else immediately
//!
//! Every logical call can be bounded by a deadline and aborted through a
//! cancellation token; both cut through network waits and backoff sleeps.

use super::policy::{StatusClass, StatusPolicy};
use crate::auth::{Token, TokenManager};
use crate::backoff::BackoffConfig;
use crate::config::DEFAULT_MEDIA_TYPE;
use crate::error::{is_transient_transport, Error, Result};
use crate::types::{Method, StringMap};
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// Header carrying the correlation id
pub const CORRELATION_HEADER: &str = "X-Correlation-ID";

/// Configuration for the request executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Base URL for relative paths
    pub base_url: Option<String>,
    /// Timeout of a single attempt
    pub timeout: Duration,
    /// Retry budget per logical call
    pub backoff: BackoffConfig,
    /// Status classification
    pub status_policy: StatusPolicy,
    /// Correlation id sent with every request
    pub correlation_id: Option<String>,
    /// Accept / Content-Type media type
    pub media_type: String,
    /// User agent string
    pub user_agent: String,
    /// Default headers for all requests
    pub default_headers: StringMap,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(30),
            backoff: BackoffConfig::default(),
            status_policy: StatusPolicy::default(),
            correlation_id: None,
            media_type: DEFAULT_MEDIA_TYPE.to_string(),
            user_agent: format!("sequoia-client/{}", env!("CARGO_PKG_VERSION")),
            default_headers: StringMap::new(),
        }
    }
}

impl ExecutorConfig {
    /// Create a new config builder
    pub fn builder() -> ExecutorConfigBuilder {
        ExecutorConfigBuilder::default()
    }
}

/// Builder for executor config
#[derive(Default)]
pub struct ExecutorConfigBuilder {
    config: ExecutorConfig,
}

impl ExecutorConfigBuilder {
    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    /// Set the per-attempt timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the backoff configuration
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.config.backoff = backoff;
        self
    }

    /// Set the status classification
    pub fn status_policy(mut self, policy: StatusPolicy) -> Self {
        self.config.status_policy = policy;
        self
    }

    /// Set the correlation id
    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.config.correlation_id = Some(id.into());
        self
    }

    /// Set the media type
    pub fn media_type(mut self, media_type: impl Into<String>) -> Self {
        self.config.media_type = media_type.into();
        self
    }

    /// Add a default header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.insert(key.into(), value.into());
        self
    }

    /// Set user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Build the config
    pub fn build(self) -> ExecutorConfig {
        self.config
    }
}

/// One logical request
#[derive(Debug, Clone, Default)]
pub struct RequestSpec {
    /// HTTP method
    pub method: Method,
    /// Path relative to the base URL, or an absolute URL
    pub path: String,
    /// Query parameters
    pub query: StringMap,
    /// Request headers
    pub headers: StringMap,
    /// JSON body
    pub body: Option<Value>,
    /// Correlation id overriding the client's
    pub correlation_id: Option<String>,
    /// Bound on the whole logical operation, retries included
    pub deadline: Option<Duration>,
    /// Caller-owned cancellation
    pub cancel: Option<CancellationToken>,
}

impl RequestSpec {
    /// Create a request spec
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            ..Default::default()
        }
    }

    /// GET request
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// POST request with a JSON body
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).json(body)
    }

    /// PUT request with a JSON body
    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).json(body)
    }

    /// DELETE request
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Add a query parameter
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set JSON body
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Override the correlation id for this call
    #[must_use]
    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Bound the whole call, retries included
    #[must_use]
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Abort the call when `token` is cancelled
    #[must_use]
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Successful response with its parsed payload
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// Status code
    pub status: u16,
    /// Final request URL
    pub url: Url,
    /// Response headers
    pub headers: HeaderMap,
    /// Parsed JSON payload (`Null` for an empty body)
    pub body: Value,
}

impl ApiResponse {
    /// Deserialize the payload
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.body.clone())?)
    }
}

/// Result of a single attempt
enum Attempt {
    Success(ApiResponse),
    Retryable(Error),
    AuthRejected { status: u16, payload: Value },
    Fatal { status: u16, payload: Value },
}

/// Executes logical requests with retry, backoff and token refresh
pub struct RequestExecutor {
    client: Client,
    config: ExecutorConfig,
    tokens: Option<Arc<TokenManager>>,
}

impl RequestExecutor {
    /// Create an executor; `tokens` is `None` for unauthenticated access
    pub fn new(client: Client, config: ExecutorConfig, tokens: Option<Arc<TokenManager>>) -> Self {
        Self {
            client,
            config,
            tokens,
        }
    }

    /// Create an unauthenticated executor with its own HTTP client
    pub fn with_config(config: ExecutorConfig) -> Result<Self> {
        let client = build_http_client(&config)?;
        Ok(Self::new(client, config, None))
    }

    /// The token manager, if requests are authenticated
    pub fn token_manager(&self) -> Option<&Arc<TokenManager>> {
        self.tokens.as_ref()
    }

    /// Executor settings
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute one logical request
    pub async fn execute(&self, spec: &RequestSpec) -> Result<ApiResponse> {
        let url = self.build_url(&spec.path)?;
        self.execute_url(url, spec).await
    }

    /// Execute and deserialize the payload
    pub async fn execute_json<T: DeserializeOwned>(&self, spec: &RequestSpec) -> Result<T> {
        self.execute(spec).await?.json()
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.execute(&RequestSpec::get(path)).await
    }

    /// Make a POST request
    pub async fn post(&self, path: &str, body: Value) -> Result<ApiResponse> {
        self.execute(&RequestSpec::post(path, body)).await
    }

    /// Execute against an already resolved URL
    pub(crate) async fn execute_url(&self, url: Url, spec: &RequestSpec) -> Result<ApiResponse> {
        let operation = self.run(url, spec);

        let bounded = async {
            match spec.deadline {
                Some(deadline) => match tokio::time::timeout(deadline, operation).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::cancelled(format!("deadline of {deadline:?} elapsed"))),
                },
                None => operation.await,
            }
        };

        match &spec.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    () = token.cancelled() => Err(Error::cancelled("cancelled by caller")),
                    result = bounded => result,
                }
            }
            None => bounded.await,
        }
    }

    /// The attempt loop; one backoff state for the whole logical call
    async fn run(&self, url: Url, spec: &RequestSpec) -> Result<ApiResponse> {
        let mut backoff = self.config.backoff.start();

        loop {
            let attempt = backoff.attempt() + 1;
            let token = match &self.tokens {
                Some(tokens) => Some(tokens.get_token().await?),
                None => None,
            };

            match self.attempt(&url, spec, token.as_ref()).await? {
                Attempt::Success(response) => {
                    debug!(
                        "{} {} succeeded with {} on attempt {}",
                        spec.method, url, response.status, attempt
                    );
                    return Ok(response);
                }

                Attempt::Fatal { status, payload } => {
                    debug!("{} {} failed with {} (not retried)", spec.method, url, status);
                    return Err(Error::fatal(status, payload));
                }

                Attempt::AuthRejected { status, payload } => {
                    let Some(tokens) = &self.tokens else {
                        return Err(Error::fatal(status, payload));
                    };

                    let step = backoff.next_delay();
                    if step.exhausted {
                        return Err(Error::auth(format!(
                            "token rejected with HTTP {status} on {} of {} attempts: {payload}",
                            backoff.attempt(),
                            backoff.max_attempts()
                        )));
                    }

                    warn!(
                        "Token rejected with {}, attempt {}/{}, refreshing and retrying in {:?}",
                        status,
                        attempt,
                        backoff.max_attempts(),
                        step.delay
                    );
                    tokens.force_refresh().await?;
                    tokio::time::sleep(step.delay).await;
                }

                Attempt::Retryable(failure) => {
                    let step = backoff.next_delay();
                    if step.exhausted {
                        warn!(
                            "{} {} giving up after {} attempts: {}",
                            spec.method,
                            url,
                            backoff.attempt(),
                            failure
                        );
                        return Err(Error::retry_exhausted(backoff.attempt(), failure));
                    }

                    warn!(
                        "Request failed ({}), attempt {}/{}, retrying in {:?}",
                        failure,
                        attempt,
                        backoff.max_attempts(),
                        step.delay
                    );
                    tokio::time::sleep(step.delay).await;
                }
            }
        }
    }

    /// Issue a single HTTP attempt and classify the outcome
    async fn attempt(&self, url: &Url, spec: &RequestSpec, token: Option<&Token>) -> Result<Attempt> {
        let mut req = self
            .client
            .request(spec.method.into(), url.clone())
            .timeout(self.config.timeout)
            .header(ACCEPT, self.config.media_type.as_str());

        for (key, value) in &self.config.default_headers {
            req = req.header(key.as_str(), value.as_str());
        }

        for (key, value) in &spec.headers {
            req = req.header(key.as_str(), value.as_str());
        }

        if let Some(id) = spec
            .correlation_id
            .as_ref()
            .or(self.config.correlation_id.as_ref())
        {
            req = req.header(CORRELATION_HEADER, id.as_str());
        }

        if !spec.query.is_empty() {
            req = req.query(&spec.query);
        }

        if let Some(body) = &spec.body {
            req = req
                .header(CONTENT_TYPE, self.config.media_type.as_str())
                .body(serde_json::to_vec(body)?);
        }

        if let Some(token) = token {
            req = req.bearer_auth(token.access_token());
        }

        let response = match req.send().await {
            Ok(response) => response,
            Err(e) if is_transient_transport(&e) => return Ok(Attempt::Retryable(Error::Http(e))),
            Err(e) => return Err(request_failure(e)),
        };

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let headers = response.headers().clone();

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) if is_transient_transport(&e) => return Ok(Attempt::Retryable(Error::Http(e))),
            Err(e) => return Err(request_failure(e)),
        };

        let outcome = match self.config.status_policy.classify(status) {
            StatusClass::Success => {
                let body = if bytes.iter().all(u8::is_ascii_whitespace) {
                    Value::Null
                } else {
                    serde_json::from_slice(&bytes).map_err(|e| {
                        Error::decode(format!("invalid JSON payload from {final_url}: {e}"))
                    })?
                };
                Attempt::Success(ApiResponse {
                    status,
                    url: final_url,
                    headers,
                    body,
                })
            }
            StatusClass::Retryable => Attempt::Retryable(Error::http_status(
                status,
                String::from_utf8_lossy(&bytes).into_owned(),
            )),
            StatusClass::AuthRejected => Attempt::AuthRejected {
                status,
                payload: diagnostic_payload(&bytes),
            },
            StatusClass::Fatal => Attempt::Fatal {
                status,
                payload: diagnostic_payload(&bytes),
            },
        };

        Ok(outcome)
    }

    /// Build full URL from path
    pub fn build_url(&self, path: &str) -> Result<Url> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Ok(Url::parse(path)?);
        }

        let full = match &self.config.base_url {
            Some(base) => {
                let base = base.trim_end_matches('/');
                let path = path.trim_start_matches('/');
                format!("{base}/{path}")
            }
            None => path.to_string(),
        };
        Ok(Url::parse(&full)?)
    }
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("config", &self.config)
            .field("authenticated", &self.tokens.is_some())
            .finish_non_exhaustive()
    }
}

/// Redirects followed before a request fails
const MAX_REDIRECTS: usize = 10;

/// Build the shared reqwest client
///
/// Redirects are re-issued with the same headers while they stay on the
/// same host.
pub(crate) fn build_http_client(config: &ExecutorConfig) -> Result<Client> {
    Client::builder()
        .timeout(config.timeout)
        .user_agent(&config.user_agent)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .build()
        .map_err(Error::Http)
}

/// Non-transient transport failure as a caller-facing error
///
/// A request that could not be built is a configuration problem. Anything
/// else (redirect loops, undecodable bodies) is fatal; status 0 means no
/// response was received.
fn request_failure(e: reqwest::Error) -> Error {
    if e.is_builder() {
        return Error::config(format!("invalid request: {e}"));
    }
    let status = e.status().map_or(0, |s| s.as_u16());
    Error::fatal(status, Value::String(e.to_string()))
}

/// Server diagnostic: the JSON body when there is one, else the raw text
fn diagnostic_payload(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
