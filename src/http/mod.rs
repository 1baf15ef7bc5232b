//! HTTP request execution
//!
//! Runs each logical request through an attempt loop with backoff, token
//! refresh on rejection, and caller-controlled cancellation.
//!
//! # Features
//!
//! - **Automatic Retries**: transport failures and retryable statuses
//! - **Token Refresh**: one forced refresh per rejected attempt
//! - **Status Policy**: configurable success / retry / auth / fatal split
//! - **Cancellation**: per-call deadline and `CancellationToken`

mod client;
mod policy;

pub(crate) use client::build_http_client;
pub use client::{
    ApiResponse, ExecutorConfig, ExecutorConfigBuilder, RequestExecutor, RequestSpec,
    CORRELATION_HEADER,
};
pub use policy::{StatusClass, StatusPolicy};

#[cfg(test)]
mod tests;
