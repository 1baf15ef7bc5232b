//! Authentication module
//!
//! Supports: client credentials (Basic), grant-tagged exchange, caller-supplied
//! bearer token, no auth
//!
//! The `TokenManager` owns the current token, decides when it is stale and
//! serializes refreshes so concurrent callers share one exchange.

mod token_manager;
mod types;

pub use token_manager::TokenManager;
pub use types::{AuthMethod, AuthVariant, Credentials, Token};
