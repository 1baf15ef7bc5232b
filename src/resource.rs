//! Resource endpoints
//!
//! Typed access to a service's resourceful API at
//! `<service location>/data/<resource>`. Every call is scoped to an owner,
//! sent as the `owner` query parameter. Business endpoints live under the
//! same location at a caller-supplied path template.

use crate::error::{Error, Result};
use crate::http::{RequestExecutor, RequestSpec};
use crate::pagination::{ItemStream, PageStream, Paginator};
use crate::registry::Service;
use crate::types::{lookup_path, StringMap};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const OWNER_PARAM: &str = "owner";
const FIELDS_PARAM: &str = "fields";
const PRECONDITION_FAILED: u16 = 412;

/// A service from the registry, bound to the client's executor
#[derive(Debug, Clone)]
pub struct ServiceEndpoint {
    executor: Arc<RequestExecutor>,
    paginator: Paginator,
    service: Service,
}

impl ServiceEndpoint {
    pub(crate) fn new(executor: Arc<RequestExecutor>, paginator: Paginator, service: Service) -> Self {
        let paginator = paginator.with_link_base(service.location.clone());
        Self {
            executor,
            paginator,
            service,
        }
    }

    /// The registry entry
    pub fn service(&self) -> &Service {
        &self.service
    }

    /// Endpoint for one resource type of this service
    pub fn resource(&self, name: impl Into<String>) -> ResourceEndpoint {
        ResourceEndpoint::new(
            Arc::clone(&self.executor),
            self.paginator.clone(),
            self.service.location.trim_end_matches('/').to_string(),
            name.into(),
        )
    }

    /// Business endpoint at `template` under this service's location
    pub fn business(&self, template: impl Into<String>) -> BusinessEndpoint {
        BusinessEndpoint {
            executor: Arc::clone(&self.executor),
            location: self.service.location.trim_end_matches('/').to_string(),
            template: template.into(),
        }
    }
}

/// Options for browsing a resource
#[derive(Debug, Clone, Default)]
pub struct BrowseOptions {
    /// Fields to return; sent sorted and comma-joined
    pub fields: Vec<String>,
    /// Filter and paging criteria, sent as query parameters
    pub criteria: StringMap,
}

impl BrowseOptions {
    /// Empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Return only `field`
    #[must_use]
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.fields.push(field.into());
        self
    }

    /// Add a criterion
    #[must_use]
    pub fn criterion(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.criteria.insert(key.into(), value.into());
        self
    }

    fn apply(&self, mut spec: RequestSpec) -> RequestSpec {
        for (key, value) in &self.criteria {
            spec = spec.query(key.as_str(), value.as_str());
        }
        if !self.fields.is_empty() {
            let mut fields = self.fields.clone();
            fields.sort();
            spec = spec.query(FIELDS_PARAM, fields.join(","));
        }
        spec
    }
}

/// One resource type of a service
#[derive(Debug, Clone)]
pub struct ResourceEndpoint {
    executor: Arc<RequestExecutor>,
    paginator: Paginator,
    location: String,
    name: String,
    url: String,
}

impl ResourceEndpoint {
    fn new(executor: Arc<RequestExecutor>, paginator: Paginator, location: String, name: String) -> Self {
        let url = format!("{location}/data/{name}");
        Self {
            executor,
            paginator,
            location,
            name,
            url,
        }
    }

    /// Resource name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Collection URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Read one document
    pub async fn read(&self, owner: &str, reference: &str) -> Result<Value> {
        let spec = RequestSpec::get(format!("{}/{}", self.url, reference)).query(OWNER_PARAM, owner);
        Ok(self.executor.execute(&spec).await?.body)
    }

    /// Store documents
    pub async fn store(&self, owner: &str, body: Value) -> Result<Value> {
        let spec = RequestSpec::post(format!("{}/", self.url), body).query(OWNER_PARAM, owner);
        Ok(self.executor.execute(&spec).await?.body)
    }

    /// Stream the pages of a listing
    pub fn browse(&self, owner: &str, options: &BrowseOptions) -> PageStream {
        let spec = options.apply(RequestSpec::get(self.url.clone()).query(OWNER_PARAM, owner));
        self.paginator.fetch_all(spec)
    }

    /// Stream the documents of a listing; items live under the resource name
    pub fn browse_items(&self, owner: &str, options: &BrowseOptions) -> ItemStream {
        let spec = options.apply(RequestSpec::get(self.url.clone()).query(OWNER_PARAM, owner));
        self.paginator.fetch_items(spec, self.name.clone())
    }

    /// Stream the `linked` documents included with this listing
    ///
    /// Each page contributes the documents inlined under `linked.<linked>`,
    /// then the rest announced by the `next` links of `meta.linked.<linked>`,
    /// fetched from the linked resource's own collection.
    pub fn browse_linked(&self, owner: &str, options: &BrowseOptions, linked: &str) -> ItemStream {
        let target = ResourceEndpoint::new(
            Arc::clone(&self.executor),
            self.paginator.clone(),
            self.location.clone(),
            linked.to_string(),
        );
        let owner = owner.to_string();
        let inline_field = format!("linked.{linked}");

        self.browse(&owner, options)
            .map_ok(move |page| {
                let inline: Vec<Result<Value>> =
                    page.items(&inline_field).iter().cloned().map(Ok).collect();
                let rest: Vec<ItemStream> = linked_next_links(&page.body, &target.name)
                    .iter()
                    .map(|link| target.follow_linked(&owner, link))
                    .collect();
                stream::iter(inline).chain(stream::iter(rest).flatten())
            })
            .try_flatten()
            .boxed()
    }

    /// Listing of this resource continuing where a `meta.linked` link points
    fn follow_linked(&self, owner: &str, link: &str) -> ItemStream {
        let mut spec = RequestSpec::get(self.url.clone()).query(OWNER_PARAM, owner);
        let query = link.split_once('?').map_or("", |(_, q)| q);
        spec.query
            .extend(url::form_urlencoded::parse(query.as_bytes()).into_owned());
        self.paginator.fetch_items(spec, self.name.clone())
    }

    /// Delete one or more documents
    pub async fn delete<S: AsRef<str>>(&self, owner: &str, references: &[S]) -> Result<Value> {
        if references.is_empty() {
            return Err(Error::invalid_value("references", "at least one reference is required"));
        }

        let refs: Vec<&str> = references.iter().map(AsRef::as_ref).collect();
        let spec = RequestSpec::delete(format!("{}/{}", self.url, refs.join(",")))
            .query(OWNER_PARAM, owner);
        Ok(self.executor.execute(&spec).await?.body)
    }

    /// Replace a document, guarded by its current version
    ///
    /// `body` is the document or an array whose first element is the
    /// document. Its `ref` must equal `reference` and `owner:name`.
    pub async fn update(
        &self,
        owner: &str,
        body: Value,
        reference: &str,
        version: &str,
    ) -> Result<Value> {
        check_reference(&body, reference)?;

        let spec = RequestSpec::put(format!("{}/{}", self.url, reference), body)
            .query(OWNER_PARAM, owner)
            .header("If-Match", format!("\"{version}\""));

        match self.executor.execute(&spec).await {
            Ok(response) => Ok(response.body),
            Err(Error::FatalRequest {
                status: PRECONDITION_FAILED,
                payload,
            }) => {
                debug!("Update of {} rejected: version {} is stale", reference, version);
                Err(Error::NotMatchingVersion {
                    message: format!("version {version} of {reference} does not match: {payload}"),
                })
            }
            Err(e) => Err(e),
        }
    }
}

/// `next` links of the `meta.linked` entries for `linked`
fn linked_next_links(body: &Value, linked: &str) -> Vec<String> {
    match lookup_path(body, &format!("meta.linked.{linked}")) {
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(|entry| entry.get("next")?.as_str())
            .filter(|link| !link.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Business endpoint of a service, addressed by a path template
///
/// Templates use `$name` or `${name}` placeholders, e.g.
/// `/business/v1/$service/$owner/$ref`. Placeholders without a value stay
/// as written and `$$` is a literal `$`.
#[derive(Debug, Clone)]
pub struct BusinessEndpoint {
    executor: Arc<RequestExecutor>,
    location: String,
    template: String,
}

impl BusinessEndpoint {
    /// The path template
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Full URL with `vars` substituted into the template
    pub fn url(&self, vars: &StringMap) -> String {
        format!("{}{}", self.location, substitute(&self.template, vars))
    }

    /// Store `content` for `service`, `owner` and `reference`
    ///
    /// `params` are sent as query parameters; `$params` in the template is
    /// substituted with nothing.
    pub async fn store(
        &self,
        service: &str,
        owner: &str,
        reference: &str,
        content: Value,
        params: &StringMap,
    ) -> Result<Value> {
        let vars = StringMap::from([
            ("service".to_string(), service.to_string()),
            (OWNER_PARAM.to_string(), owner.to_string()),
            ("ref".to_string(), reference.to_string()),
            ("params".to_string(), String::new()),
        ]);

        let mut spec = RequestSpec::post(self.url(&vars), content);
        spec.query.extend(params.clone());
        Ok(self.executor.execute(&spec).await?.body)
    }

    /// Read the template path for `service`, filling other placeholders from `vars`
    pub async fn browse(&self, service: &str, vars: &StringMap) -> Result<Value> {
        let mut vars = vars.clone();
        vars.insert("service".to_string(), service.to_string());
        let spec = RequestSpec::get(self.url(&vars));
        Ok(self.executor.execute(&spec).await?.body)
    }
}

fn substitute(template: &str, vars: &StringMap) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(escaped) = after.strip_prefix('$') {
            out.push('$');
            rest = escaped;
            continue;
        }

        let (name, consumed) = match after.strip_prefix('{') {
            Some(braced) => match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            },
            None => {
                let end = after
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .unwrap_or(after.len());
                (&after[..end], end)
            }
        };

        match vars.get(name) {
            Some(value) if !name.is_empty() => {
                out.push_str(value);
                rest = &after[consumed..];
            }
            _ => {
                out.push('$');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// The document's reference must match the target and its `owner:name`
fn check_reference(body: &Value, reference: &str) -> Result<()> {
    let document = match body {
        Value::Array(items) => items.first().unwrap_or(&Value::Null),
        other => other,
    };

    let field = |name: &str| document.get(name).and_then(Value::as_str);
    let (Some(doc_ref), Some(owner), Some(name)) = (field("ref"), field("owner"), field("name"))
    else {
        return Err(Error::ReferenceMismatch {
            message: format!(
                "reference to update {reference} does not match: document has no ref, owner or name"
            ),
        });
    };

    if doc_ref != reference {
        return Err(Error::ReferenceMismatch {
            message: format!("reference to update {reference} does not match document ref {doc_ref}"),
        });
    }

    let composed = format!("{owner}:{name}");
    if composed != reference {
        return Err(Error::ReferenceMismatch {
            message: format!("reference to update {reference} does not match document ref {composed}"),
        });
    }

    Ok(())
}
