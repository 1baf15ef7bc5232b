//! Pagination types
//!
//! Configuration of where the continuation lives in a page, the cursor value
//! object, and the page handed to callers.

use crate::types::{lookup_path, JsonValue};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

/// Where continuations are read from and how they are sent back
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Dotted path of the continuation in a page body
    pub cursor_field: String,
    /// Query parameter carrying an opaque cursor on the next request
    pub cursor_param: String,
    /// Dotted path of a full next-page link, checked before `cursor_field`
    pub next_link_field: Option<String>,
    /// Treat the `cursor_field` value as a path or URL to follow instead of
    /// an opaque cursor
    pub cursor_is_link: bool,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            cursor_field: "meta.continue".to_string(),
            cursor_param: "continue".to_string(),
            next_link_field: Some("meta.next".to_string()),
            cursor_is_link: false,
        }
    }
}

impl PaginationConfig {
    /// Create cursor pagination config
    pub fn cursor(cursor_field: impl Into<String>, cursor_param: impl Into<String>) -> Self {
        Self {
            cursor_field: cursor_field.into(),
            cursor_param: cursor_param.into(),
            next_link_field: None,
            cursor_is_link: false,
        }
    }

    /// Also follow a next-page link found at `field`
    #[must_use]
    pub fn with_next_link(mut self, field: impl Into<String>) -> Self {
        self.next_link_field = Some(field.into());
        self
    }

    /// Follow `cursor_field` values as links, for servers that return the
    /// next page's path as the continuation
    #[must_use]
    pub fn with_cursor_links(mut self) -> Self {
        self.cursor_is_link = true;
        self
    }

    /// Continuation carried by a page body, if any
    pub fn continuation(&self, body: &Value) -> Option<PageCursor> {
        if let Some(link) = self
            .next_link_field
            .as_deref()
            .and_then(|field| non_empty_string(body, field))
        {
            return Some(PageCursor::Link(link));
        }

        let value = non_empty_string(body, &self.cursor_field)?;
        Some(if self.cursor_is_link {
            PageCursor::Link(value)
        } else {
            PageCursor::Token(value)
        })
    }
}

fn non_empty_string(body: &Value, field: &str) -> Option<String> {
    match lookup_path(body, field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Continuation extracted from a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// Opaque token sent back verbatim as the cursor query parameter
    Token(String),
    /// Path or URL of the next page
    Link(String),
}

impl PageCursor {
    /// The raw continuation value
    pub fn as_str(&self) -> &str {
        match self {
            Self::Token(s) | Self::Link(s) => s,
        }
    }
}

/// One page of a paginated listing
#[derive(Debug, Clone)]
pub struct Page {
    /// Zero-based position in the stream
    pub index: usize,
    /// URL the page was fetched from
    pub url: Url,
    /// Parsed page body
    pub body: JsonValue,
    /// Continuation to the next page; `None` on the last page
    pub cursor: Option<PageCursor>,
}

impl Page {
    /// Whether this is the last page
    pub fn is_last(&self) -> bool {
        self.cursor.is_none()
    }

    /// Items under `field`; empty when the field is absent or not an array
    pub fn items(&self, field: &str) -> &[Value] {
        match lookup_path(&self.body, field) {
            Some(Value::Array(items)) => items,
            _ => &[],
        }
    }

    /// Take the items under `field` out of the page
    pub fn into_items(self, field: &str) -> Vec<Value> {
        let field = field.strip_prefix("$.").unwrap_or(field);
        let pointer: String = field
            .split('.')
            .filter(|p| !p.is_empty())
            .map(|p| format!("/{p}"))
            .collect();

        let mut body = self.body;
        match body.pointer_mut(&pointer).map(Value::take) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        }
    }
}
