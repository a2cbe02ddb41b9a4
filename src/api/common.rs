//! Pagination, search and shared value types used by every entity client.

use rmcp::schemars::{self, JsonSchema};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CrmError;
use crate::odata::{ODataClient, ODataCollection, ODataQuery, SortOrder};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Offset or cursor pagination. A cursor wins over limit/offset.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaginationParams {
    /// Number of records to return (default 20, max 100)
    #[serde(default)]
    pub limit: Option<u32>,
    /// Opaque continuation link returned as `nextCursor` by a previous call
    #[serde(default)]
    pub cursor: Option<String>,
    /// Number of records to skip
    #[serde(default)]
    pub offset: Option<u32>,
}

impl PaginationParams {
    pub fn with_limit(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn page_size(&self) -> u32 {
        self.limit
            .filter(|limit| *limit > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref().filter(|c| !c.is_empty())
    }

    /// Adds `$top` and `$skip`.
    pub fn apply(&self, query: ODataQuery) -> ODataQuery {
        query.top(self.page_size()).skip(self.offset())
    }
}

/// One page of normalized records.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
    pub has_more: bool,
    /// Server continuation link, passed back untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl<T> PaginatedResponse<T> {
    pub fn from_collection<W>(collection: ODataCollection<W>) -> Self
    where
        T: From<W>,
    {
        let items: Vec<T> = collection.value.into_iter().map(T::from).collect();
        Self {
            count: items.len(),
            items,
            total: collection.count,
            has_more: collection.next_link.is_some(),
            next_cursor: collection.next_link,
        }
    }
}

/// Fetch one page of `entity_set`, or follow the cursor verbatim when present.
pub async fn fetch_page<W, T>(
    odata: &ODataClient,
    entity_set: &str,
    query: ODataQuery,
    pagination: &PaginationParams,
) -> Result<PaginatedResponse<T>, CrmError>
where
    W: DeserializeOwned,
    T: From<W>,
{
    let endpoint = match pagination.cursor() {
        Some(cursor) => cursor.to_string(),
        None => format!("/{}{}", entity_set, pagination.apply(query).to_query_string()),
    };
    let collection: ODataCollection<W> = odata.get(&endpoint).await?;
    Ok(PaginatedResponse::from_collection(collection))
}

/// Fetch every record of an unpaged collection query.
pub async fn fetch_all<W, T>(
    odata: &ODataClient,
    endpoint: &str,
    query: &ODataQuery,
) -> Result<Vec<T>, CrmError>
where
    W: DeserializeOwned,
    T: From<W>,
{
    let collection: ODataCollection<W> = odata.get_collection(endpoint, Some(query)).await?;
    Ok(collection.value.into_iter().map(T::from).collect())
}

/// Fetch a single record by id with a column selection.
pub async fn fetch_one<W, T>(
    odata: &ODataClient,
    entity_set: &str,
    id: &str,
    select: &[&str],
) -> Result<T, CrmError>
where
    W: DeserializeOwned,
    T: From<W>,
{
    let query = ODataQuery::new().select(select.iter().copied());
    let record: W = odata
        .get(&format!(
            "{}{}",
            record_path(entity_set, id),
            query.to_query_string()
        ))
        .await?;
    Ok(T::from(record))
}

/// `/{entity_set}({id})`
pub fn record_path(entity_set: &str, id: &str) -> String {
    format!("/{}({})", entity_set, id)
}

/// Free-text search plus structured filters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    #[serde(flatten)]
    pub pagination: PaginationParams,
    /// Text matched with `contains` against the entity's name and email columns
    #[serde(default)]
    pub query: Option<String>,
    /// Structured filters, combined with `and`
    #[serde(default)]
    pub filters: Vec<SearchFilter>,
    /// Column to sort by
    #[serde(default)]
    pub sort_by: Option<String>,
    /// Sort direction: asc (default) or desc
    #[serde(default)]
    pub sort_order: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchFilter {
    /// Wire column name (e.g. `statecode`, `jobtitle`)
    pub field: String,
    pub operator: FilterOperator,
    /// Literal value; strings are single-quoted, arrays feed `in`/`not_in`
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Contains,
    NotContains,
    StartsWith,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

/// OData literal for a filter value. String values are quoted, not escaped.
pub fn odata_literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn joined(field: &str, op: &str, joiner: &str, value: &Value) -> String {
    match value {
        Value::Array(values) if !values.is_empty() => {
            let parts: Vec<String> = values
                .iter()
                .map(|v| format!("{} {} {}", field, op, odata_literal(v)))
                .collect();
            format!("({})", parts.join(joiner))
        }
        other => format!("{} {} {}", field, op, odata_literal(other)),
    }
}

impl SearchFilter {
    pub fn to_clause(&self) -> String {
        let field = self.field.as_str();
        let literal = odata_literal(&self.value);
        match self.operator {
            FilterOperator::Eq => format!("{} eq {}", field, literal),
            FilterOperator::Neq => format!("{} ne {}", field, literal),
            FilterOperator::Lt => format!("{} lt {}", field, literal),
            FilterOperator::Lte => format!("{} le {}", field, literal),
            FilterOperator::Gt => format!("{} gt {}", field, literal),
            FilterOperator::Gte => format!("{} ge {}", field, literal),
            FilterOperator::Contains => format!("contains({},{})", field, literal),
            FilterOperator::NotContains => format!("not contains({},{})", field, literal),
            FilterOperator::StartsWith => format!("startswith({},{})", field, literal),
            FilterOperator::In => joined(field, "eq", " or ", &self.value),
            FilterOperator::NotIn => joined(field, "ne", " and ", &self.value),
            FilterOperator::IsNull => format!("{} eq null", field),
            FilterOperator::IsNotNull => format!("{} ne null", field),
        }
    }
}

/// `(contains(a,'q') or contains(b,'q'))`
pub fn contains_any(fields: &[&str], text: &str) -> String {
    let parts: Vec<String> = fields
        .iter()
        .map(|field| format!("contains({},'{}')", field, text))
        .collect();
    format!("({})", parts.join(" or "))
}

impl SearchParams {
    /// Builds the query for a search over `text_fields`.
    pub fn to_query(&self, select: &[&str], text_fields: &[&str]) -> ODataQuery {
        let mut clauses = Vec::new();
        if let Some(text) = self.query.as_deref().filter(|q| !q.is_empty()) {
            clauses.push(contains_any(text_fields, text));
        }
        clauses.extend(self.filters.iter().map(SearchFilter::to_clause));

        let mut query = ODataQuery::new().select(select.iter().copied());
        if !clauses.is_empty() {
            query = query.filter(clauses.join(" and "));
        }
        if let Some(sort_by) = self.sort_by.as_deref().filter(|s| !s.is_empty()) {
            let order = self
                .sort_order
                .as_deref()
                .map(SortOrder::parse)
                .unwrap_or_default();
            query = query.orderby(sort_by, order);
        }
        query
    }
}

/// Postal address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl Address {
    pub fn is_empty(&self) -> bool {
        self.street.is_none()
            && self.street2.is_none()
            && self.city.is_none()
            && self.state.is_none()
            && self.postal_code.is_none()
            && self.country.is_none()
    }

    /// `None` when every part is absent.
    pub fn non_empty(self) -> Option<Self> {
        if self.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

/// Simple two-state status used by records whose only distinction is
/// `statecode` 0 versus anything else.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActiveStatus {
    Active,
    #[default]
    Inactive,
}

impl ActiveStatus {
    pub fn from_state_code(state_code: Option<i32>) -> Self {
        match state_code {
            Some(0) => ActiveStatus::Active,
            _ => ActiveStatus::Inactive,
        }
    }
}

/// Non-annotation attributes the normalized model does not map.
pub fn custom_fields(extra: Map<String, Value>) -> Option<Map<String, Value>> {
    let fields: Map<String, Value> = extra
        .into_iter()
        .filter(|(key, _)| !key.contains('@'))
        .collect();
    if fields.is_empty() {
        None
    } else {
        Some(fields)
    }
}

/// Loosely typed records from generic queries and metadata calls.
pub type Record = Map<String, Value>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_size_defaults_and_clamps() {
        assert_eq!(PaginationParams::default().page_size(), 20);
        assert_eq!(PaginationParams::with_limit(0).page_size(), 20);
        assert_eq!(PaginationParams::with_limit(50).page_size(), 50);
        assert_eq!(PaginationParams::with_limit(500).page_size(), 100);
    }

    #[test]
    fn test_filter_clauses() {
        let filter = |field: &str, operator, value| SearchFilter {
            field: field.to_string(),
            operator,
            value,
        };

        assert_eq!(
            filter("jobtitle", FilterOperator::Eq, json!("CEO")).to_clause(),
            "jobtitle eq 'CEO'"
        );
        assert_eq!(
            filter("numberofemployees", FilterOperator::Gte, json!(50)).to_clause(),
            "numberofemployees ge 50"
        );
        assert_eq!(
            filter("fullname", FilterOperator::StartsWith, json!("Ann")).to_clause(),
            "startswith(fullname,'Ann')"
        );
        assert_eq!(
            filter("fullname", FilterOperator::NotContains, json!("test")).to_clause(),
            "not contains(fullname,'test')"
        );
        assert_eq!(
            filter("statecode", FilterOperator::In, json!([0, 1])).to_clause(),
            "(statecode eq 0 or statecode eq 1)"
        );
        assert_eq!(
            filter("statecode", FilterOperator::NotIn, json!([0, 1])).to_clause(),
            "(statecode ne 0 and statecode ne 1)"
        );
        assert_eq!(
            filter("emailaddress1", FilterOperator::IsNull, Value::Null).to_clause(),
            "emailaddress1 eq null"
        );
    }

    #[test]
    fn test_search_query_combines_text_filters_and_sort() {
        let params = SearchParams {
            query: Some("ann".to_string()),
            filters: vec![SearchFilter {
                field: "statecode".to_string(),
                operator: FilterOperator::Eq,
                value: json!(0),
            }],
            sort_by: Some("fullname".to_string()),
            ..Default::default()
        };

        let query = params.to_query(&["contactid"], &["fullname", "emailaddress1"]);
        let expected_filter = urlencoding::encode(
            "(contains(fullname,'ann') or contains(emailaddress1,'ann')) and statecode eq 0",
        )
        .into_owned();
        assert_eq!(
            query.to_query_string(),
            format!(
                "?$select=contactid&$filter={}&$orderby=fullname%20asc",
                expected_filter
            )
        );
    }

    #[test]
    fn test_paginated_response_from_collection() {
        let collection: ODataCollection<Value> = serde_json::from_value(json!({
            "@odata.count": 42,
            "@odata.nextLink": "https://org/api/data/v9.2/contacts?$skiptoken=x",
            "value": [{"a": 1}, {"a": 2}]
        }))
        .unwrap();

        let page: PaginatedResponse<Value> = PaginatedResponse::from_collection(collection);
        assert_eq!(page.count, 2);
        assert_eq!(page.total, Some(42));
        assert!(page.has_more);
        assert_eq!(
            page.next_cursor.as_deref(),
            Some("https://org/api/data/v9.2/contacts?$skiptoken=x")
        );
    }

    #[test]
    fn test_custom_fields_skip_annotations() {
        let mut extra = Map::new();
        extra.insert("new_tier".to_string(), json!("gold"));
        extra.insert("@odata.etag".to_string(), json!("W/\"1\""));
        extra.insert(
            "statecode@OData.Community.Display.V1.FormattedValue".to_string(),
            json!("Active"),
        );

        let fields = custom_fields(extra).unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["new_tier"], "gold");
        assert!(custom_fields(Map::new()).is_none());
    }

    #[test]
    fn test_active_status_mapping() {
        assert_eq!(ActiveStatus::from_state_code(Some(0)), ActiveStatus::Active);
        assert_eq!(ActiveStatus::from_state_code(Some(1)), ActiveStatus::Inactive);
        assert_eq!(ActiveStatus::from_state_code(Some(99)), ActiveStatus::Inactive);
        assert_eq!(ActiveStatus::from_state_code(None), ActiveStatus::Inactive);
    }
}
