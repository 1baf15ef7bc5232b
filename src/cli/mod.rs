//! CLI module
//!
//! Command-line interface for the Sequoia API.
//!
//! # Commands
//!
//! - `token` - Obtain an access token and show its expiry
//! - `get` - Fetch a single resource
//! - `browse` - Follow a paginated listing
//! - `services` - List the registry's services

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::Runner;
