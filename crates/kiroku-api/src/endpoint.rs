use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::client::{ApiClient, ApiRequest};
use crate::error::{ApiError, ApiResult, ErrorKind};
use crate::page::{Cursor, DataEnvelope, Page, PageEnvelope};
use crate::traits::PageSource;
use crate::transport::HttpTransport;
use crate::types::EntityId;

/// Named filter parameters for a collection request.
pub type Filters = BTreeMap<String, String>;

const ID_PARAM: &str = "id";

// ── Path templates ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("malformed path segment `{0}`: placeholders must span a whole segment")]
    Malformed(String),

    #[error("empty placeholder name in `{0}`")]
    EmptyPlaceholder(String),

    #[error("placeholder `{{{0}}}` appears more than once")]
    DuplicatePlaceholder(String),

    #[error("template `{0}` must end with the `{{id}}` placeholder")]
    MissingIdPlaceholder(String),

    #[error("no value bound for placeholder `{{{0}}}`")]
    Unbound(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A parsed path such as `/users/{user}/library/{id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut seen = BTreeSet::new();

        for part in template.split('/').filter(|s| !s.is_empty()) {
            let inner = part.strip_prefix('{').and_then(|p| p.strip_suffix('}'));
            match inner {
                Some(name) if name.contains(['{', '}']) => {
                    return Err(TemplateError::Malformed(part.to_string()));
                }
                Some(name) if name.trim().is_empty() => {
                    return Err(TemplateError::EmptyPlaceholder(template.to_string()));
                }
                Some(name) => {
                    if !seen.insert(name.to_string()) {
                        return Err(TemplateError::DuplicatePlaceholder(name.to_string()));
                    }
                    segments.push(Segment::Param(name.to_string()));
                }
                None if part.contains(['{', '}']) => {
                    return Err(TemplateError::Malformed(part.to_string()));
                }
                None => segments.push(Segment::Literal(part.to_string())),
            }
        }

        Ok(Self {
            raw: template.to_string(),
            segments,
        })
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Substitute bound values; the result is unencoded path segments.
    pub fn render(&self, params: &BTreeMap<String, String>) -> Result<Vec<String>, TemplateError> {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(text) => Ok(text.clone()),
                Segment::Param(name) => params
                    .get(name)
                    .cloned()
                    .ok_or_else(|| TemplateError::Unbound(name.clone())),
            })
            .collect()
    }

    /// Split `/shows/{id}` into the collection `/shows` and the item template.
    fn split_item(self) -> Result<(PathTemplate, PathTemplate), TemplateError> {
        let ends_with_id =
            matches!(self.segments.last(), Some(Segment::Param(name)) if name == ID_PARAM);
        if !ends_with_id {
            return Err(TemplateError::MissingIdPlaceholder(self.raw));
        }

        let mut segments = self.segments.clone();
        segments.pop();
        let collection = PathTemplate {
            raw: self
                .raw
                .trim_end_matches('/')
                .trim_end_matches("{id}")
                .to_string(),
            segments,
        };
        Ok((collection, self))
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// ── Resource endpoints ──────────────────────────────────────────

/// A typed REST resource: a collection path plus an item path ending in `{id}`.
///
/// Collection responses use the `{ "data": [...], "next": ... }` envelope;
/// item responses use `{ "data": ... }`.
pub struct ResourceEndpoint<T, H> {
    client: Arc<ApiClient<H>>,
    collection: PathTemplate,
    item: PathTemplate,
    params: BTreeMap<String, String>,
    allowed_filters: BTreeSet<String>,
    cursor_param: String,
    limit_param: String,
    page_size: Option<u32>,
    _entity: PhantomData<fn() -> T>,
}

impl<T, H> Clone for ResourceEndpoint<T, H> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            collection: self.collection.clone(),
            item: self.item.clone(),
            params: self.params.clone(),
            allowed_filters: self.allowed_filters.clone(),
            cursor_param: self.cursor_param.clone(),
            limit_param: self.limit_param.clone(),
            page_size: self.page_size,
            _entity: PhantomData,
        }
    }
}

impl<T, H> ResourceEndpoint<T, H>
where
    T: DeserializeOwned + Send,
    H: HttpTransport,
{
    /// `template` is the item path, e.g. `/shows/{id}`; the collection path
    /// is everything before the trailing `{id}`.
    pub fn new(client: Arc<ApiClient<H>>, template: &str) -> Result<Self, TemplateError> {
        let (collection, item) = PathTemplate::parse(template)?.split_item()?;
        Ok(Self {
            client,
            collection,
            item,
            params: BTreeMap::new(),
            allowed_filters: BTreeSet::new(),
            cursor_param: "cursor".into(),
            limit_param: "limit".into(),
            page_size: None,
            _entity: PhantomData,
        })
    }

    /// Declare which filter names [`fetch_page`](Self::fetch_page) accepts.
    pub fn with_filters<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_filters.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_cursor_param(mut self, name: impl Into<String>) -> Self {
        self.cursor_param = name.into();
        self
    }

    pub fn with_page_size(mut self, limit_param: impl Into<String>, size: u32) -> Self {
        self.limit_param = limit_param.into();
        self.page_size = Some(size);
        self
    }

    /// Bind a path parameter other than `{id}`, e.g. `{user}`.
    pub fn bind(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut bound = self.clone();
        bound.params.insert(name.into(), value.into());
        bound
    }

    pub fn collection_path(&self) -> &PathTemplate {
        &self.collection
    }

    /// A [`PageSource`] over this collection with fixed filters.
    pub fn listing(&self, filters: Filters) -> Listing<T, H> {
        Listing {
            endpoint: self.clone(),
            filters,
        }
    }

    pub async fn fetch_one(&self, id: &EntityId) -> ApiResult<T> {
        let mut params = self.params.clone();
        params.insert(ID_PARAM.into(), id.as_str().to_string());
        let segments = self.item.render(&params).map_err(contract_error)?;

        let envelope: DataEnvelope<T> = self
            .client
            .request_json(ApiRequest::from_segments(Method::GET, segments))
            .await?;

        envelope.data.into_first().ok_or_else(|| {
            ApiError::new(ErrorKind::NotFound, format!("no data returned for id {id}"))
        })
    }

    /// Fetch one page. The cursor is forwarded untouched; filters must have
    /// been declared with [`with_filters`](Self::with_filters).
    pub async fn fetch_page(&self, cursor: Option<&Cursor>, filters: &Filters) -> ApiResult<Page<T>> {
        self.check_filters(filters)?;
        let segments = self.collection.render(&self.params).map_err(contract_error)?;

        let mut request = ApiRequest::from_segments(Method::GET, segments);
        for (name, value) in filters {
            request = request.query(name, value);
        }
        if let Some(size) = self.page_size {
            request = request.query(&self.limit_param, size.to_string());
        }
        if let Some(cursor) = cursor {
            request = request.query(&self.cursor_param, cursor.as_str());
        }

        let envelope: PageEnvelope<T> = self.client.request_json(request).await?;
        let page = Page::from(envelope);
        tracing::debug!(
            path = %self.collection,
            items = page.items.len(),
            last = page.is_last(),
            "fetched page"
        );
        Ok(page)
    }

    fn check_filters(&self, filters: &Filters) -> ApiResult<()> {
        for name in filters.keys() {
            let reserved = *name == self.cursor_param || (self.page_size.is_some() && *name == self.limit_param);
            if reserved || !self.allowed_filters.contains(name) {
                return Err(ApiError::new(
                    ErrorKind::Unknown,
                    format!("filter `{name}` is not supported by {}", self.collection),
                ));
            }
        }
        Ok(())
    }
}

fn contract_error(err: TemplateError) -> ApiError {
    tracing::warn!(error = %err, "path template could not be rendered");
    ApiError::new(ErrorKind::Unknown, err.to_string())
}

/// An endpoint plus the filters for one list screen.
pub struct Listing<T, H> {
    endpoint: ResourceEndpoint<T, H>,
    filters: Filters,
}

impl<T, H> Listing<T, H> {
    pub fn filters(&self) -> &Filters {
        &self.filters
    }
}

impl<T, H> PageSource<T> for Listing<T, H>
where
    T: DeserializeOwned + Send,
    H: HttpTransport,
{
    async fn fetch_page(&self, cursor: Option<&Cursor>) -> ApiResult<Page<T>> {
        self.endpoint.fetch_page(cursor, &self.filters).await
    }

    async fn fetch_one(&self, id: &EntityId) -> ApiResult<T> {
        self.endpoint.fetch_one(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthContext;
    use crate::mock::MockTransport;
    use crate::types::RawEntity;
    use serde_json::json;
    use url::Url;

    fn endpoint(template: &str) -> ResourceEndpoint<RawEntity, MockTransport> {
        let base = Url::parse("https://api.kiroku.test/").unwrap();
        let client = Arc::new(ApiClient::new(base, MockTransport::new(), AuthContext::new()));
        ResourceEndpoint::new(client, template).unwrap()
    }

    fn transport(endpoint: &ResourceEndpoint<RawEntity, MockTransport>) -> &MockTransport {
        endpoint.client.transport()
    }

    #[test]
    fn test_parse_template() {
        let t = PathTemplate::parse("/users/{user}/library/{id}").unwrap();
        assert_eq!(t.placeholders().collect::<Vec<_>>(), vec!["user", "id"]);

        let params = BTreeMap::from([("user".to_string(), "42".to_string())]);
        assert_eq!(
            t.render(&params),
            Err(TemplateError::Unbound("id".into()))
        );
    }

    #[test]
    fn test_malformed_templates() {
        assert!(matches!(
            PathTemplate::parse("/shows/x{id}"),
            Err(TemplateError::Malformed(_))
        ));
        assert!(matches!(
            PathTemplate::parse("/shows/{id"),
            Err(TemplateError::Malformed(_))
        ));
        assert!(matches!(
            PathTemplate::parse("/shows/{}"),
            Err(TemplateError::EmptyPlaceholder(_))
        ));
        assert!(matches!(
            PathTemplate::parse("/{id}/x/{id}"),
            Err(TemplateError::DuplicatePlaceholder(_))
        ));
        let base = Url::parse("https://api.kiroku.test/").unwrap();
        let client = Arc::new(ApiClient::new(base, MockTransport::new(), AuthContext::new()));
        assert!(matches!(
            ResourceEndpoint::<RawEntity, _>::new(client, "/shows"),
            Err(TemplateError::MissingIdPlaceholder(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_first_page_has_no_cursor() {
        let shows = endpoint("/shows/{id}").with_filters(["status"]);
        transport(&shows).push_json(
            200,
            json!({ "data": [{ "id": "1" }, { "id": "2" }], "next": "c1" }),
        );

        let filters = Filters::from([("status".to_string(), "airing".to_string())]);
        let page = shows.fetch_page(None, &filters).await.unwrap();

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.next_cursor, Some(Cursor::new("c1")));
        let url = transport(&shows).last_request().url;
        assert_eq!(url.path(), "/shows");
        assert_eq!(url.query(), Some("status=airing"));
    }

    #[tokio::test]
    async fn test_cursor_passed_verbatim() {
        let shows = endpoint("/shows/{id}").with_page_size("limit", 25);
        transport(&shows).push_json(200, json!({ "data": [], "next": null }));

        let cursor = Cursor::new("opaque+token/==");
        let page = shows.fetch_page(Some(&cursor), &Filters::new()).await.unwrap();
        assert!(page.is_last());

        let url = transport(&shows).last_request().url;
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("limit".to_string(), "25".to_string()),
                ("cursor".to_string(), "opaque+token/==".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_undeclared_filter_is_rejected_without_request() {
        let shows = endpoint("/shows/{id}").with_filters(["status"]);

        for name in ["genre", "cursor"] {
            let filters = Filters::from([(name.to_string(), "x".to_string())]);
            let err = shows.fetch_page(None, &filters).await.unwrap_err();
            assert_eq!(err.kind, ErrorKind::Unknown);
        }
        assert!(transport(&shows).requests().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_element_fails_page() {
        let shows = endpoint("/shows/{id}");
        transport(&shows).push_json(
            200,
            json!({ "data": [{ "id": "1" }, { "name": "missing id" }], "next": "c2" }),
        );

        let err = shows.fetch_page(None, &Filters::new()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::DecodeError);
    }

    #[tokio::test]
    async fn test_fetch_one_binds_params() {
        let library = endpoint("/users/{user}/library/{id}").bind("user", "me");
        transport(&library).push_json(200, json!({ "data": { "id": 77, "progress": 3 } }));

        let entry = library.fetch_one(&EntityId::new("77")).await.unwrap();
        assert_eq!(entry.id.as_str(), "77");
        assert_eq!(entry.fields["progress"], 3);
        assert_eq!(transport(&library).last_request().url.path(), "/users/me/library/77");
    }

    #[tokio::test]
    async fn test_fetch_one_unbound_param() {
        let library = endpoint("/users/{user}/library/{id}");
        let err = library.fetch_one(&EntityId::new("1")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert!(transport(&library).requests().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_one_empty_list_is_not_found() {
        let shows = endpoint("/shows/{id}");
        transport(&shows).push_json(200, json!({ "data": [] }));
        transport(&shows).push_body(404, "gone");

        let err = shows.fetch_one(&EntityId::new("5")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);

        let err = shows.fetch_one(&EntityId::new("5")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.status, Some(404));
    }

    #[tokio::test]
    async fn test_listing_is_a_page_source() {
        let shows = endpoint("/shows/{id}").with_filters(["sort"]);
        let listing = shows.listing(Filters::from([("sort".to_string(), "-rating".to_string())]));
        transport(&shows).push_json(200, json!({ "data": [{ "id": 1 }], "next": "n" }));

        let page = PageSource::fetch_page(&listing, None).await.unwrap();
        assert_eq!(page.items[0].id.as_str(), "1");
        assert_eq!(
            transport(&shows).last_request().url.query(),
            Some("sort=-rating")
        );
    }
}
