//! Page stream
//!
//! Follows continuations one page at a time. Every page is its own logical
//! request through the executor, so each gets a fresh retry budget while the
//! token is shared. Nothing is prefetched: the next request is issued only
//! when the consumer polls for the next page.

use super::types::{Page, PageCursor, PaginationConfig};
use crate::error::{Error, Result};
use crate::http::{RequestExecutor, RequestSpec};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Lazy, forward-only stream of pages
pub type PageStream = BoxStream<'static, Result<Page>>;

/// Lazy stream of the items of every page, in page order
pub type ItemStream = BoxStream<'static, Result<Value>>;

/// Next request of a walk; `None` once the last page was read
struct Walk {
    next: Option<(Url, RequestSpec)>,
    index: usize,
}

/// Drives paginated listings through the request executor
#[derive(Debug, Clone)]
pub struct Paginator {
    executor: Arc<RequestExecutor>,
    config: PaginationConfig,
    link_base: Option<String>,
}

impl Paginator {
    /// Create a paginator
    ///
    /// Root-relative links (`/data/...`) resolve under the executor's base
    /// URL, the same way request paths do.
    pub fn new(executor: Arc<RequestExecutor>, config: PaginationConfig) -> Self {
        let link_base = executor.config().base_url.clone();
        Self {
            executor,
            config,
            link_base,
        }
    }

    /// Resolve root-relative links under `base` instead, e.g. a service location
    #[must_use]
    pub fn with_link_base(mut self, base: impl Into<String>) -> Self {
        self.link_base = Some(base.into());
        self
    }

    /// Continuation settings
    pub fn config(&self) -> &PaginationConfig {
        &self.config
    }

    /// Stream every page of the listing starting at `spec`
    ///
    /// The stream yields the first unrecoverable error and then ends. Pages
    /// already yielded stay valid. Dropping the stream stops fetching.
    pub fn fetch_all(&self, spec: RequestSpec) -> PageStream {
        let start = match self.executor.build_url(&spec.path) {
            Ok(url) => url,
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };

        let executor = Arc::clone(&self.executor);
        let config = self.config.clone();
        let link_base = self.link_base.clone();
        let walk = Walk {
            next: Some((start, spec)),
            index: 0,
        };

        stream::try_unfold(walk, move |walk| {
            let executor = Arc::clone(&executor);
            let config = config.clone();
            let link_base = link_base.clone();
            async move { next_page(&executor, &config, link_base.as_deref(), walk).await }
        })
        .boxed()
    }

    /// Stream the items under `field` of every page
    pub fn fetch_items(&self, spec: RequestSpec, field: impl Into<String>) -> ItemStream {
        let field = field.into();
        self.fetch_all(spec)
            .map_ok(move |page| stream::iter(page.into_items(&field).into_iter().map(Ok)))
            .try_flatten()
            .boxed()
    }
}

async fn next_page(
    executor: &RequestExecutor,
    config: &PaginationConfig,
    link_base: Option<&str>,
    walk: Walk,
) -> Result<Option<(Page, Walk)>> {
    let Some((url, spec)) = walk.next else {
        return Ok(None);
    };

    if spec.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
        return Err(Error::cancelled("pagination cancelled by caller"));
    }

    let response = executor.execute_url(url.clone(), &spec).await?;
    let cursor = config.continuation(&response.body);

    let next = match &cursor {
        Some(cursor) => Some(follow(&url, spec, cursor, config, link_base)?),
        None => None,
    };

    debug!(
        "Fetched page {} from {} (more: {})",
        walk.index,
        response.url,
        next.is_some()
    );

    let page = Page {
        index: walk.index,
        url: response.url,
        body: response.body,
        cursor,
    };

    Ok(Some((
        page,
        Walk {
            next,
            index: walk.index + 1,
        },
    )))
}

/// Request for the page a continuation points at
fn follow(
    current: &Url,
    mut spec: RequestSpec,
    cursor: &PageCursor,
    config: &PaginationConfig,
    link_base: Option<&str>,
) -> Result<(Url, RequestSpec)> {
    match cursor {
        PageCursor::Token(token) => {
            let url = without_param(current, &config.cursor_param);
            spec.query.insert(config.cursor_param.clone(), token.clone());
            Ok((url, spec))
        }
        PageCursor::Link(link) => {
            let url = resolve_link(current, link, link_base)?;
            for (key, _) in url.query_pairs() {
                spec.query.remove(&*key);
            }
            Ok((url, spec))
        }
    }
}

/// Absolute URLs are taken as-is, root-relative paths go under `base`
fn resolve_link(current: &Url, link: &str, base: Option<&str>) -> Result<Url> {
    match base {
        Some(base) if link.starts_with('/') && !link.starts_with("//") => {
            Ok(Url::parse(&format!("{}{link}", base.trim_end_matches('/')))?)
        }
        _ => Ok(current.join(link)?),
    }
}

/// Copy of `url` with every occurrence of query parameter `key` removed
fn without_param(url: &Url, key: &str) -> Url {
    let mut url = url.clone();
    if url.query().is_none() {
        return url;
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| &**k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url
}
