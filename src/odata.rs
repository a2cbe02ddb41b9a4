//! Dynamics 365 Web API request engine with OData query builder.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::TokenManager;
use crate::error::CrmError;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

/// Retry-After value used when a 429 carries none.
const DEFAULT_RETRY_AFTER_SECONDS: u64 = 60;

const PREFER_ANNOTATIONS: &str = "odata.include-annotations=\"*\"";
const PREFER_REPRESENTATION: &str = "return=representation";

/// OData query builder for constructing query parameters.
#[derive(Debug, Default, Clone)]
pub struct ODataQuery {
    filter: Option<String>,
    select: Option<Vec<String>>,
    expand: Option<Vec<String>>,
    orderby: Option<Vec<(String, SortOrder)>>,
    top: Option<u32>,
    skip: Option<u32>,
    count: bool,
    params: Vec<(String, String)>,
}

/// Sort order for $orderby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// Parses `asc`/`desc` (case-insensitive); anything else is ascending.
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("desc") {
            SortOrder::Desc
        } else {
            SortOrder::Asc
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl ODataQuery {
    /// Create a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a $filter expression.
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Add $select fields.
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Add $expand relations.
    pub fn expand<I, S>(mut self, relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expand = Some(relations.into_iter().map(Into::into).collect());
        self
    }

    /// Add $orderby field.
    pub fn orderby(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        let orders = self.orderby.get_or_insert_with(Vec::new);
        orders.push((field.into(), order));
        self
    }

    /// Add a raw `$orderby` clause such as `name asc,createdon desc`.
    pub fn orderby_raw(self, clause: &str) -> Self {
        clause
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .fold(self, |query, part| {
                let mut pieces = part.split_whitespace();
                let field = pieces.next().unwrap_or_default().to_string();
                let order = pieces.next().map(SortOrder::parse).unwrap_or_default();
                query.orderby(field, order)
            })
    }

    /// Add $top limit.
    pub fn top(mut self, limit: u32) -> Self {
        self.top = Some(limit);
        self
    }

    /// Add $skip offset.
    pub fn skip(mut self, offset: u32) -> Self {
        self.skip = Some(offset);
        self
    }

    /// Request `@odata.count`.
    pub fn count(mut self) -> Self {
        self.count = true;
        self
    }

    /// Add a non-system query parameter (e.g. `fetchXml`).
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Build query string for URL.
    pub fn to_query_string(&self) -> String {
        let mut params = Vec::new();

        if let Some(ref select) = self.select {
            params.push(format!("$select={}", select.join(",")));
        }

        if let Some(ref filter) = self.filter {
            params.push(format!("$filter={}", urlencoding::encode(filter)));
        }

        if let Some(ref expand) = self.expand {
            params.push(format!("$expand={}", urlencoding::encode(&expand.join(","))));
        }

        if let Some(ref orderby) = self.orderby {
            let order_str: Vec<String> = orderby
                .iter()
                .map(|(field, order)| format!("{} {}", field, order.as_str()))
                .collect();
            params.push(format!(
                "$orderby={}",
                urlencoding::encode(&order_str.join(","))
            ));
        }

        if let Some(top) = self.top {
            params.push(format!("$top={}", top));
        }

        if let Some(skip) = self.skip {
            params.push(format!("$skip={}", skip));
        }

        if self.count {
            params.push("$count=true".to_string());
        }

        for (name, value) in &self.params {
            params.push(format!("{}={}", name, urlencoding::encode(value)));
        }

        if params.is_empty() {
            String::new()
        } else {
            format!("?{}", params.join("&"))
        }
    }
}

/// OData v4 collection response wrapper.
#[derive(Debug, Deserialize, Serialize)]
pub struct ODataCollection<T> {
    #[serde(rename = "@odata.context", default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    #[serde(rename = "@odata.count", default, skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,

    #[serde(rename = "@odata.nextLink", default, skip_serializing_if = "Option::is_none")]
    pub next_link: Option<String>,

    pub value: Vec<T>,
}

/// Entity sets whose plural is not the logical name plus `s`.
const IRREGULAR_ENTITY_SETS: &[(&str, &str)] = &[
    ("opportunity", "opportunities"),
    ("activityparty", "activityparties"),
    ("campaignactivity", "campaignactivities"),
    ("socialactivity", "socialactivities"),
    ("fax", "faxes"),
    ("territory", "territories"),
    ("transactioncurrency", "transactioncurrencies"),
    ("customeraddress", "customeraddresses"),
    ("category", "categories"),
    ("entity", "entities"),
    ("bookableresourcecategory", "bookableresourcecategories"),
    ("msdyn_playbookactivity", "msdyn_playbookactivities"),
];

/// Entity set (collection) name for a logical entity name.
pub fn entity_set_name(logical_name: &str) -> String {
    IRREGULAR_ENTITY_SETS
        .iter()
        .find(|(singular, _)| *singular == logical_name)
        .map(|(_, plural)| plural.to_string())
        .unwrap_or_else(|| format!("{}s", logical_name))
}

/// Identifier from an `OData-EntityId` header: the trailing `(...)` segment.
pub fn parse_entity_id(header: &str) -> Option<String> {
    let inner = header.strip_suffix(')')?;
    let start = inner.rfind('(')?;
    let id = &inner[start + 1..];
    if id.is_empty() || id.contains(')') {
        None
    } else {
        Some(id.to_string())
    }
}

/// Maps a non-success response onto the error taxonomy.
///
/// 401 cache invalidation is the caller's job; this function is pure.
pub fn classify_failure(response: &HttpResponse) -> CrmError {
    match response.status {
        StatusCode::TOO_MANY_REQUESTS => CrmError::RateLimit {
            message: "Dynamics 365 rate limit exceeded".to_string(),
            retry_after_seconds: response
                .header("retry-after")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECONDS),
        },
        StatusCode::UNAUTHORIZED => CrmError::Authentication(
            "Authentication failed. Token may have expired.".to_string(),
        ),
        StatusCode::FORBIDDEN => CrmError::Authentication(
            "Access denied. Check that your app has the required Dynamics 365 permissions."
                .to_string(),
        ),
        status => CrmError::CrmApi {
            status,
            message: error_message(&response.body)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
        },
    }
}

/// `error.message` or top-level `message` from an error body.
fn error_message(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    json.pointer("/error/message")
        .or_else(|| json.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Result of a create: the new identifier and the raw response.
///
/// `id` is empty when the `OData-EntityId` header is missing or unparsable.
#[derive(Debug, Clone)]
pub struct CreatedEntity {
    pub id: String,
    pub response: HttpResponse,
}

/// Web API client for one Dynamics 365 environment.
#[derive(Clone)]
pub struct ODataClient {
    base_url: String,
    tokens: TokenManager,
    transport: Arc<dyn HttpTransport>,
}

impl ODataClient {
    /// Create a new client rooted at `{environment}/api/data/{version}`.
    pub fn new(base_url: String, tokens: TokenManager, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
            transport,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URLs (continuation links) are used verbatim.
    pub fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http") {
            endpoint.to_string()
        } else {
            format!("{}{}", self.base_url, endpoint)
        }
    }

    /// Sends a request and decodes the body. `Ok(None)` means 204 No Content.
    ///
    /// Caller headers override the default header set.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
        headers: &[(&str, &str)],
    ) -> Result<Option<Value>, CrmError> {
        let response = self.send(method, endpoint, body, headers).await?;

        if response.status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if response.body.trim().is_empty() {
            return Ok(Some(Value::Null));
        }
        Ok(Some(serde_json::from_str(&response.body)?))
    }

    /// GET and deserialize a JSON body.
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, CrmError> {
        let value = self
            .request(Method::GET, endpoint, None, &[])
            .await?
            .ok_or_else(|| CrmError::EmptyResponse(endpoint.to_string()))?;
        Ok(serde_json::from_value(value)?)
    }

    /// GET a collection with an optional query.
    pub async fn get_collection<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: Option<&ODataQuery>,
    ) -> Result<ODataCollection<T>, CrmError> {
        let url = format!(
            "{}{}",
            endpoint,
            query.map(ODataQuery::to_query_string).unwrap_or_default()
        );
        self.get(&url).await
    }

    /// POST a JSON body; returns the decoded response, if any.
    pub async fn post(&self, endpoint: &str, body: &Value) -> Result<Option<Value>, CrmError> {
        self.request(Method::POST, endpoint, Some(body), &[]).await
    }

    pub async fn patch(&self, endpoint: &str, body: &Value) -> Result<(), CrmError> {
        self.request(Method::PATCH, endpoint, Some(body), &[])
            .await
            .map(|_| ())
    }

    pub async fn patch_with_headers(
        &self,
        endpoint: &str,
        body: &Value,
        headers: &[(&str, &str)],
    ) -> Result<(), CrmError> {
        self.request(Method::PATCH, endpoint, Some(body), headers)
            .await
            .map(|_| ())
    }

    pub async fn delete(&self, endpoint: &str) -> Result<(), CrmError> {
        self.request(Method::DELETE, endpoint, None, &[])
            .await
            .map(|_| ())
    }

    /// POST a new record and pull its id from the `OData-EntityId` header.
    pub async fn create_entity(
        &self,
        endpoint: &str,
        body: &Value,
    ) -> Result<CreatedEntity, CrmError> {
        let response = self
            .send(
                Method::POST,
                endpoint,
                Some(body),
                &[("Prefer", PREFER_REPRESENTATION)],
            )
            .await?;

        let id = response
            .header("odata-entityid")
            .and_then(parse_entity_id)
            .unwrap_or_default();
        if id.is_empty() {
            tracing::warn!(endpoint = %endpoint, "created record without a parsable OData-EntityId header");
        }

        Ok(CreatedEntity { id, response })
    }

    /// Sends with auth headers and classifies non-success statuses.
    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse, CrmError> {
        let url = self.url(endpoint);
        let token = self.tokens.get_token().await?;

        tracing::debug!(method = %method, url = %url, "Dynamics 365 request");

        let mut request = HttpRequest::new(method, url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Content-Type", "application/json")
            .header("OData-MaxVersion", "4.0")
            .header("OData-Version", "4.0")
            .header("Accept", "application/json")
            .header("Prefer", PREFER_ANNOTATIONS);
        for (name, value) in headers {
            request = request.header(name, *value);
        }
        if let Some(body) = body {
            request = request.body(serde_json::to_string(body)?);
        }

        let response = self.transport.send(request).await?;

        if response.status.is_success() {
            return Ok(response);
        }

        tracing::debug!(status = %response.status, "Dynamics 365 error response");
        if response.status == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
        }
        Err(classify_failure(&response))
    }
}

impl std::fmt::Debug for ODataClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ODataClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}
