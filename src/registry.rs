//! Service registry
//!
//! The registry lists the services an owner can reach and where they live.
//! It is read once, without authentication, when a client connects; the
//! `identity` service location also gives the token endpoint.

use crate::config::TOKEN_PATH;
use crate::error::{Error, Result};
use crate::http::{RequestExecutor, RequestSpec};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::info;

/// Name of the service issuing tokens
pub const IDENTITY_SERVICE: &str = "identity";

/// Where the registry lives
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegistryConfig {
    /// Registry base URL
    pub url: String,
    /// Owner whose services are listed
    pub owner: String,
}

impl RegistryConfig {
    /// Create a registry config
    pub fn new(url: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            owner: owner.into(),
        }
    }

    /// URL of the owner's service listing
    pub fn services_url(&self) -> String {
        format!("{}/services/{}", self.url.trim_end_matches('/'), self.owner)
    }
}

/// A registered service
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Service {
    /// Service name
    pub name: String,
    /// Base URL of the service
    pub location: String,
    /// Human-readable title
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Deserialize)]
struct ServiceListing {
    #[serde(default)]
    services: Vec<Service>,
}

/// Services by name
#[derive(Debug, Clone, Default)]
pub struct Registry {
    services: BTreeMap<String, Service>,
}

impl Registry {
    /// Read the owner's service listing
    pub async fn fetch(executor: &RequestExecutor, config: &RegistryConfig) -> Result<Self> {
        let listing: ServiceListing = executor
            .execute_json(&RequestSpec::get(config.services_url()))
            .await?;

        info!(
            "Registry {} lists {} services for owner {}",
            config.url,
            listing.services.len(),
            config.owner
        );
        Ok(Self::from_services(listing.services))
    }

    /// Build a registry from known services
    pub fn from_services(services: impl IntoIterator<Item = Service>) -> Self {
        Self {
            services: services
                .into_iter()
                .map(|service| (service.name.clone(), service))
                .collect(),
        }
    }

    /// Look up a service by name
    pub fn get(&self, name: &str) -> Result<&Service> {
        self.services
            .get(name)
            .ok_or_else(|| Error::ServiceNotFound {
                service: name.to_string(),
            })
    }

    /// Token endpoint of the identity service
    pub fn token_url(&self) -> Result<String> {
        let identity = self.get(IDENTITY_SERVICE)?;
        Ok(format!(
            "{}{TOKEN_PATH}",
            identity.location.trim_end_matches('/')
        ))
    }

    /// All services, ordered by name
    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.services.values()
    }

    /// Number of services
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether no service is listed
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
