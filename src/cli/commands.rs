//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Sequoia API client CLI
#[derive(Parser, Debug)]
#[command(name = "sequoia-client")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (YAML or JSON)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// API base URL; overrides the config file
    #[arg(long, global = true, env = "SEQUOIA_BASE_URL")]
    pub base_url: Option<String>,

    /// Client identifier
    #[arg(long, global = true, env = "SEQUOIA_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Client secret
    #[arg(long, global = true, env = "SEQUOIA_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Correlation id sent with every request
    #[arg(long, global = true)]
    pub correlation_id: Option<String>,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Obtain an access token and show when it expires
    Token,

    /// Fetch a single resource
    Get {
        /// Path relative to the base URL, or an absolute URL
        path: String,

        /// Query parameter (repeatable)
        #[arg(short, long = "query", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        query: Vec<(String, String)>,
    },

    /// Follow a paginated listing to the end
    Browse {
        /// Path relative to the base URL, or an absolute URL
        path: String,

        /// Query parameter (repeatable)
        #[arg(short, long = "query", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        query: Vec<(String, String)>,

        /// Print the items under this field instead of whole pages
        #[arg(long)]
        items: Option<String>,

        /// Stop after this many pages
        #[arg(long)]
        max_pages: Option<usize>,
    },

    /// List the services in the registry
    Services,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one document per line)
    Json,
    /// Human-readable output
    Pretty,
}

fn parse_key_value(input: &str) -> Result<(String, String), String> {
    input
        .split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{input}'"))
}
