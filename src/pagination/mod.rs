//! Pagination module
//!
//! Follows server-driven continuations across pages.
//!
//! # Overview
//!
//! A page body carries its continuation at a configurable field (by default
//! `meta.continue`, with a `meta.next` link checked first). Opaque values are
//! sent back as the `continue` query parameter; values that look like a path
//! or URL are followed as links. The listing ends with the first page that
//! carries no continuation.

mod paginator;
mod types;

pub use paginator::{ItemStream, PageStream, Paginator};
pub use types::{Page, PageCursor, PaginationConfig};
