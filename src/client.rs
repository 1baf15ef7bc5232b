//! Client facade
//!
//! Wires the token manager, request executor and paginator together from a
//! single [`ClientConfig`]. The client is cheap to share: clone the `Arc`s
//! it hands out or wrap the client itself in an `Arc`.

use crate::auth::{Token, TokenManager};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::http::{build_http_client, ApiResponse, RequestExecutor, RequestSpec};
use crate::pagination::{ItemStream, PageStream, Paginator};
use crate::registry::Registry;
use crate::resource::ServiceEndpoint;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Authenticated access to the API
#[derive(Debug)]
pub struct Client {
    config: ClientConfig,
    executor: Arc<RequestExecutor>,
    paginator: Paginator,
    registry: Option<Registry>,
}

impl Client {
    /// Create a client without consulting the registry
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        Self::assemble(config, None)
    }

    /// Create a client, reading the service registry first when one is
    /// configured. The registry is read without authentication and, unless
    /// `token_url` is set, supplies the token endpoint.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let Some(registry_config) = config.registry.clone() else {
            return Self::assemble(config, None);
        };

        let mut discovery = config.executor_config();
        discovery.base_url = None;
        let http = build_http_client(&discovery)?;
        let registry = Registry::fetch(&RequestExecutor::new(http, discovery, None), &registry_config).await?;

        Self::assemble(config, Some(registry))
    }

    fn assemble(config: ClientConfig, registry: Option<Registry>) -> Result<Self> {
        let executor_config = config.executor_config();
        let http = build_http_client(&executor_config)?;

        let tokens = if config.auth.is_authenticated() {
            let token_url = match (&config.token_url, &registry) {
                (None, Some(registry)) => registry.token_url().unwrap_or_else(|e| {
                    debug!("{}; using {}", e, config.token_endpoint());
                    config.token_endpoint()
                }),
                _ => config.token_endpoint(),
            };

            let manager = TokenManager::new(
                config.auth.clone(),
                config.credentials.clone(),
                token_url,
            )
            .with_client(http.clone())
            .with_backoff(config.backoff.clone())
            .with_policy(config.status_policy.clone())
            .with_request_timeout(config.request_timeout)
            .with_expiry_margin(config.token_expiry_margin);
            Some(Arc::new(manager))
        } else {
            None
        };

        info!(
            "Client for {} ready (auth: {:?}, max attempts: {})",
            config.base_url, config.auth, config.backoff.max_attempts
        );

        let executor = Arc::new(RequestExecutor::new(http, executor_config, tokens));
        let paginator = Paginator::new(Arc::clone(&executor), config.pagination.clone());

        Ok(Self {
            config,
            executor,
            paginator,
            registry,
        })
    }

    /// Client settings
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The shared request executor
    pub fn executor(&self) -> &Arc<RequestExecutor> {
        &self.executor
    }

    /// The paginator
    pub fn paginator(&self) -> &Paginator {
        &self.paginator
    }

    /// The token manager, unless the client is unauthenticated
    pub fn token_manager(&self) -> Option<&Arc<TokenManager>> {
        self.executor.token_manager()
    }

    /// Current valid token, fetching one if needed
    pub async fn token(&self) -> Result<Token> {
        match self.token_manager() {
            Some(tokens) => tokens.get_token().await,
            None => Err(Error::auth("client is configured without authentication")),
        }
    }

    /// The registry read by [`Client::connect`]
    pub fn registry(&self) -> Option<&Registry> {
        self.registry.as_ref()
    }

    /// A registered service
    pub fn service(&self, name: &str) -> Result<ServiceEndpoint> {
        let registry = self.registry.as_ref().ok_or_else(|| Error::ServiceNotFound {
            service: name.to_string(),
        })?;
        let service = registry.get(name)?.clone();
        Ok(ServiceEndpoint::new(
            Arc::clone(&self.executor),
            self.paginator.clone(),
            service,
        ))
    }

    /// Execute one logical request
    pub async fn request(&self, spec: &RequestSpec) -> Result<ApiResponse> {
        self.executor.execute(spec).await
    }

    /// GET and return the payload
    pub async fn get(&self, path: &str) -> Result<Value> {
        Ok(self.executor.get(path).await?.body)
    }

    /// GET and deserialize the payload
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.executor.execute_json(&RequestSpec::get(path)).await
    }

    /// POST a JSON body
    pub async fn post(&self, path: &str, body: Value) -> Result<Value> {
        Ok(self.executor.post(path, body).await?.body)
    }

    /// PUT a JSON body
    pub async fn put(&self, path: &str, body: Value) -> Result<Value> {
        Ok(self.executor.execute(&RequestSpec::put(path, body)).await?.body)
    }

    /// DELETE a resource
    pub async fn delete(&self, path: &str) -> Result<Value> {
        Ok(self.executor.execute(&RequestSpec::delete(path)).await?.body)
    }

    /// Stream every page of a listing
    pub fn fetch_all(&self, spec: RequestSpec) -> PageStream {
        self.paginator.fetch_all(spec)
    }

    /// Stream the items under `field` of every page
    pub fn fetch_items(&self, spec: RequestSpec, field: impl Into<String>) -> ItemStream {
        self.paginator.fetch_items(spec, field)
    }
}
