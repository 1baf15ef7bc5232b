//! CLI runner - executes commands

use crate::auth::Credentials;
use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::client::Client;
use crate::config::{read_config, ClientConfig};
use crate::error::{Error, Result};
use crate::http::RequestSpec;
use futures::{StreamExt, TryStreamExt};
use serde_json::{json, Value};
use tracing::debug;

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        let client = Client::connect(self.load_config()?).await?;

        match &self.cli.command {
            Commands::Token => self.token(&client).await,
            Commands::Get { path, query } => self.get(&client, path, query).await,
            Commands::Browse {
                path,
                query,
                items,
                max_pages,
            } => {
                self.browse(&client, path, query, items.as_deref(), *max_pages)
                    .await
            }
            Commands::Services => self.services(&client),
        }
    }

    /// Config file plus command-line overrides
    fn load_config(&self) -> Result<ClientConfig> {
        let mut config = match (&self.cli.config, &self.cli.base_url) {
            (Some(path), _) => read_config(path)?,
            (None, Some(base_url)) => ClientConfig::builder(base_url.clone()).build(),
            (None, None) => {
                return Err(Error::config(
                    "No configuration given (use --config or --base-url)",
                ))
            }
        };

        if let Some(base_url) = &self.cli.base_url {
            config.base_url.clone_from(base_url);
        }

        match (&self.cli.client_id, &self.cli.client_secret) {
            (Some(id), Some(secret)) => {
                config.credentials = Some(Credentials::new(id.clone(), secret.clone()));
            }
            (None, None) => {}
            _ => {
                return Err(Error::config(
                    "--client-id and --client-secret must be given together",
                ))
            }
        }

        if let Some(id) = &self.cli.correlation_id {
            config.correlation_id = Some(id.clone());
        }

        debug!("Using base URL {}", config.base_url);
        Ok(config)
    }

    async fn token(&self, client: &Client) -> Result<()> {
        let token = client.token().await?;
        self.output(&json!({
            "method": format!("{:?}", token.method()),
            "expires_at": token.expires_at().map(|t| t.to_rfc3339()),
        }));
        Ok(())
    }

    async fn get(&self, client: &Client, path: &str, query: &[(String, String)]) -> Result<()> {
        let response = client.request(&with_query(RequestSpec::get(path), query)).await?;
        self.output(&response.body);
        Ok(())
    }

    async fn browse(
        &self,
        client: &Client,
        path: &str,
        query: &[(String, String)],
        items: Option<&str>,
        max_pages: Option<usize>,
    ) -> Result<()> {
        let pages = client.fetch_all(with_query(RequestSpec::get(path), query));
        let mut pages = match max_pages {
            Some(limit) => pages.take(limit).boxed(),
            None => pages,
        };

        let mut count = 0usize;
        while let Some(page) = pages.try_next().await? {
            count += 1;
            match items {
                Some(field) => {
                    for item in page.into_items(field) {
                        self.output(&item);
                    }
                }
                None => self.output(&page.body),
            }
        }

        debug!("Read {} pages from {}", count, path);
        Ok(())
    }

    fn services(&self, client: &Client) -> Result<()> {
        let registry = client
            .registry()
            .ok_or_else(|| Error::config("No registry configured"))?;

        for service in registry.services() {
            self.output(&json!({
                "name": service.name,
                "location": service.location,
                "title": service.title,
            }));
        }
        Ok(())
    }

    /// Output a document
    fn output(&self, value: &Value) {
        match self.cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(value).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
            }
        }
    }
}

fn with_query(mut spec: RequestSpec, query: &[(String, String)]) -> RequestSpec {
    for (key, value) in query {
        spec = spec.query(key.as_str(), value.as_str());
    }
    spec
}
