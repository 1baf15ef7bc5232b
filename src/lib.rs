// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # Sequoia Client
//!
//! Client access layer for the Sequoia management API.
//!
//! ## Features
//!
//! - **Token Management**: OAuth2 client-credentials exchange, cached and
//!   refreshed ahead of expiry, single-flight under concurrency
//! - **Retry with Backoff**: exponential delays with jitter and a bounded
//!   attempt budget per logical call
//! - **Auth Recovery**: a rejected token forces one refresh per attempt,
//!   charged to the same retry budget
//! - **Pagination**: `continue`-cursor listings as lazy streams
//! - **Service Registry**: service discovery and typed resource endpoints
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use futures::TryStreamExt;
//! use sequoia_client::{Client, ClientConfig, Credentials, RequestSpec, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ClientConfig::builder("https://api.example.com")
//!         .credentials(Credentials::new("client-id", "client-secret"))
//!         .build();
//!     let client = Client::new(config)?;
//!
//!     // Single request
//!     let asset = client.get("/data/assets/acme:a?owner=acme").await?;
//!
//!     // Every item of a paginated listing
//!     let spec = RequestSpec::get("/data/assets").query("owner", "acme");
//!     let assets: Vec<_> = client.fetch_items(spec, "assets").try_collect().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           Client                                │
//! │  request() / get() / post()   fetch_all()   service(name)       │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//! ┌────────────────┬─────────────┴───────┬────────────┬─────────────┐
//! │  Token Manager │  Request Executor   │ Paginator  │  Registry   │
//! ├────────────────┼─────────────────────┼────────────┼─────────────┤
//! │ Direct / Grant │ Retry loop          │ continue   │ services    │
//! │ Bearer         │ Status policy       │ next links │ identity    │
//! │ Single-flight  │ Forced refresh      │ Streams    │ Resources   │
//! │                │ Backoff / Cancel    │            │             │
//! └────────────────┴─────────────────────┴────────────┴─────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(missing_docs)] // TODO: Document error variant fields

// ============================================================================
// Module declarations
// ============================================================================

/// Error types for the client
pub mod error;

/// Common types and type aliases
pub mod types;

/// Backoff delay computation
pub mod backoff;

/// Credentials, tokens and the token manager
pub mod auth;

/// Request executor with retry and token refresh
pub mod http;

/// Continuation-cursor pagination
pub mod pagination;

/// Client configuration
pub mod config;

/// Service registry
pub mod registry;

/// Resource endpoints
pub mod resource;

/// Client facade
pub mod client;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use auth::{AuthMethod, AuthVariant, Credentials, Token, TokenManager};
pub use backoff::{BackoffConfig, BackoffState, Jitter, NextDelay};
pub use client::Client;
pub use config::{load_config, ClientConfig};
pub use http::{ApiResponse, RequestExecutor, RequestSpec, StatusClass, StatusPolicy};
pub use pagination::{Page, PageCursor, PageStream, PaginationConfig, Paginator};
pub use registry::{Registry, RegistryConfig, Service};
pub use resource::{BrowseOptions, BusinessEndpoint, ResourceEndpoint, ServiceEndpoint};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
