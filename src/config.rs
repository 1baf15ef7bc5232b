//! Client configuration
//!
//! `ClientConfig` is the single configuration set a [`Client`](crate::Client)
//! is built from. It deserialises from YAML or JSON; durations are written as
//! `*_ms` / `*_secs` integers in files.

use crate::auth::{AuthVariant, Credentials};
use crate::backoff::BackoffConfig;
use crate::error::{Error, Result};
use crate::http::{ExecutorConfig, StatusPolicy};
use crate::pagination::PaginationConfig;
use crate::registry::RegistryConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Media type the API speaks
pub const DEFAULT_MEDIA_TYPE: &str = "application/vnd.piksel+json";

/// Path of the token endpoint relative to the identity location
pub const TOKEN_PATH: &str = "/oauth/token";

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_margin() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("sequoia-client/{}", env!("CARGO_PKG_VERSION"))
}

fn default_media_type() -> String {
    DEFAULT_MEDIA_TYPE.to_string()
}

/// Complete client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Base URL for API requests
    pub base_url: String,

    /// Credential material, required by the `direct` and `grant` variants
    #[serde(default)]
    pub credentials: Option<Credentials>,

    /// How tokens are obtained
    #[serde(default)]
    pub auth: AuthVariant,

    /// Token endpoint; defaults to `<base_url>/oauth/token`
    #[serde(default)]
    pub token_url: Option<String>,

    /// Retry budget and delay curve
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Correlation id attached to every request
    #[serde(default)]
    pub correlation_id: Option<String>,

    /// Timeout of a single HTTP attempt
    #[serde(
        default = "default_timeout",
        rename = "request_timeout_secs",
        deserialize_with = "duration_secs::deserialize"
    )]
    pub request_timeout: Duration,

    /// Tokens expiring within this margin are refreshed ahead of time
    #[serde(
        default = "default_margin",
        rename = "token_expiry_margin_secs",
        deserialize_with = "duration_secs::deserialize"
    )]
    pub token_expiry_margin: Duration,

    /// User agent string
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Accept / Content-Type media type
    #[serde(default = "default_media_type")]
    pub media_type: String,

    /// Which statuses are retried, refreshed or fatal
    #[serde(default)]
    pub status_policy: StatusPolicy,

    /// Where the continuation cursor lives
    #[serde(default)]
    pub pagination: PaginationConfig,

    /// Optional service registry
    #[serde(default)]
    pub registry: Option<RegistryConfig>,
}

impl ClientConfig {
    /// Create a config builder
    pub fn builder(base_url: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self {
                base_url: base_url.into(),
                credentials: None,
                auth: AuthVariant::default(),
                token_url: None,
                backoff: BackoffConfig::default(),
                correlation_id: None,
                request_timeout: default_timeout(),
                token_expiry_margin: default_margin(),
                user_agent: default_user_agent(),
                media_type: default_media_type(),
                status_policy: StatusPolicy::default(),
                pagination: PaginationConfig::default(),
                registry: None,
            },
        }
    }

    /// Parse a YAML (or JSON, which is valid YAML) document
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(input)?)
    }

    /// Parse a JSON document
    pub fn from_json_str(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    /// Token endpoint, explicit or derived from the base URL
    pub fn token_endpoint(&self) -> String {
        match &self.token_url {
            Some(url) => url.clone(),
            None => format!("{}{TOKEN_PATH}", self.base_url.trim_end_matches('/')),
        }
    }

    /// Settings for the request executor
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            base_url: Some(self.base_url.clone()),
            timeout: self.request_timeout,
            backoff: self.backoff.clone(),
            status_policy: self.status_policy.clone(),
            correlation_id: self.correlation_id.clone(),
            media_type: self.media_type.clone(),
            user_agent: self.user_agent.clone(),
            default_headers: Default::default(),
        }
    }

    /// Check the config for values that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(Error::missing_field("base_url"));
        }
        url::Url::parse(&self.base_url)
            .map_err(|e| Error::invalid_value("base_url", e.to_string()))?;

        if let Some(token_url) = &self.token_url {
            url::Url::parse(token_url)
                .map_err(|e| Error::invalid_value("token_url", e.to_string()))?;
        }

        if self.backoff.max_attempts == 0 {
            return Err(Error::invalid_value(
                "backoff.max_attempts",
                "at least one attempt is required",
            ));
        }
        if self.backoff.base_delay > self.backoff.max_delay {
            return Err(Error::invalid_value(
                "backoff.base_delay_ms",
                "must not exceed backoff.max_delay_ms",
            ));
        }

        match &self.auth {
            AuthVariant::Direct | AuthVariant::Grant { .. } if self.credentials.is_none() => {
                Err(Error::missing_field("credentials"))
            }
            AuthVariant::Grant { grant_type } if grant_type.trim().is_empty() => {
                Err(Error::invalid_value("auth.grant_type", "must not be empty"))
            }
            AuthVariant::Bearer { token } if token.is_empty() => {
                Err(Error::invalid_value("auth.token", "must not be empty"))
            }
            _ => Ok(()),
        }
    }
}

/// Builder for [`ClientConfig`]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set credentials
    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.config.credentials = Some(credentials);
        self
    }

    /// Set the auth variant
    #[must_use]
    pub fn auth(mut self, auth: AuthVariant) -> Self {
        self.config.auth = auth;
        self
    }

    /// Set an explicit token endpoint
    #[must_use]
    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.config.token_url = Some(url.into());
        self
    }

    /// Set the backoff config
    #[must_use]
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.config.backoff = backoff;
        self
    }

    /// Set the correlation id
    #[must_use]
    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.config.correlation_id = Some(id.into());
        self
    }

    /// Set the per-attempt timeout
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the token expiry margin
    #[must_use]
    pub fn token_expiry_margin(mut self, margin: Duration) -> Self {
        self.config.token_expiry_margin = margin;
        self
    }

    /// Set user agent
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Set the status classification
    #[must_use]
    pub fn status_policy(mut self, policy: StatusPolicy) -> Self {
        self.config.status_policy = policy;
        self
    }

    /// Set pagination settings
    #[must_use]
    pub fn pagination(mut self, pagination: PaginationConfig) -> Self {
        self.config.pagination = pagination;
        self
    }

    /// Set the service registry
    #[must_use]
    pub fn registry(mut self, registry: RegistryConfig) -> Self {
        self.config.registry = Some(registry);
        self
    }

    /// Build the config
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

/// Load and validate a config file
pub fn load_config(path: impl AsRef<Path>) -> Result<ClientConfig> {
    let config = read_config(path)?;
    config.validate()?;
    Ok(config)
}

/// Parse a config file without validating it, so callers can fill in
/// values such as credentials first. `.json` files are parsed as JSON,
/// anything else as YAML.
pub fn read_config(path: impl AsRef<Path>) -> Result<ClientConfig> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let content = std::fs::read_to_string(path)?;
    let config = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => ClientConfig::from_json_str(&content)?,
        _ => ClientConfig::from_yaml_str(&content)?,
    };
    Ok(config)
}

/// Serde adapter for durations written as milliseconds
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Serde adapter for durations written as seconds
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
