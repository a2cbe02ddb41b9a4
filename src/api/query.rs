//! Generic OData queries, FetchXML execution and stored views.
//!
//! Filter, order and FetchXML text is passed through unescaped; callers own
//! validation of anything that reaches these functions.

use rmcp::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};

use super::common::{record_path, Record};
use crate::error::CrmError;
use crate::odata::{entity_set_name, ODataClient, ODataCollection, ODataQuery};

/// Arbitrary query against one entity set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams {
    /// Logical entity name, e.g. `account`
    pub entity_type: String,
    /// Comma-separated columns
    #[serde(default)]
    pub select: Option<String>,
    /// Raw OData `$filter` expression
    #[serde(default)]
    pub filter: Option<String>,
    /// Raw `$orderby`, e.g. `name asc,createdon desc`
    #[serde(default)]
    pub orderby: Option<String>,
    /// Comma-separated navigation properties to expand
    #[serde(default)]
    pub expand: Option<String>,
    #[serde(default)]
    pub top: Option<u32>,
    #[serde(default)]
    pub skip: Option<u32>,
    /// Ask the server for the total count
    #[serde(default)]
    pub count: Option<bool>,
}

impl QueryParams {
    pub fn to_query(&self) -> ODataQuery {
        let mut query = ODataQuery::new();
        if let Some(select) = non_empty(&self.select) {
            query = query.select(select.split(',').map(str::trim));
        }
        if let Some(filter) = non_empty(&self.filter) {
            query = query.filter(filter);
        }
        if let Some(orderby) = non_empty(&self.orderby) {
            query = query.orderby_raw(orderby);
        }
        if let Some(expand) = non_empty(&self.expand) {
            query = query.expand(expand.split(',').map(str::trim));
        }
        if let Some(top) = self.top.filter(|t| *t > 0) {
            query = query.top(top);
        }
        if let Some(skip) = self.skip.filter(|s| *s > 0) {
            query = query.skip(skip);
        }
        if self.count.unwrap_or(false) {
            query = query.count();
        }
        query
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub records: Vec<Record>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<i64>,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl From<ODataCollection<Record>> for QueryResult {
    fn from(collection: ODataCollection<Record>) -> Self {
        Self {
            records: collection.value,
            total_count: collection.count,
            has_more: collection.next_link.is_some(),
            next_cursor: collection.next_link,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    fn as_str(self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AggregateParams {
    /// Logical entity name, e.g. `opportunity`
    pub entity_type: String,
    pub aggregate_function: AggregateFunction,
    /// Column to aggregate; `count` defaults to the primary id column
    #[serde(default)]
    pub field: Option<String>,
    /// Only aggregate active records (`statecode` 0)
    #[serde(default)]
    pub active_only: Option<bool>,
    /// Column to group results by
    #[serde(default)]
    pub group_by: Option<String>,
}

impl AggregateParams {
    /// Minimal aggregate FetchXML document.
    pub fn to_fetch_xml(&self) -> Result<String, CrmError> {
        let entity = &self.entity_type;
        let attribute = match (self.aggregate_function, non_empty(&self.field)) {
            (AggregateFunction::Count, field) => {
                let field = field.map(str::to_string).unwrap_or_else(|| format!("{}id", entity));
                format!(r#"<attribute name="{}" aggregate="count" alias="count"/>"#, field)
            }
            (function, Some(field)) => format!(
                r#"<attribute name="{}" aggregate="{}" alias="result"/>"#,
                field,
                function.as_str()
            ),
            (function, None) => {
                return Err(CrmError::InvalidInput(format!(
                    "field is required for the {} aggregate",
                    function.as_str()
                )))
            }
        };

        let mut xml = format!(
            r#"<fetch aggregate="true"><entity name="{}">{}"#,
            entity, attribute
        );
        if self.active_only.unwrap_or(false) {
            xml.push_str(r#"<filter><condition attribute="statecode" operator="eq" value="0"/></filter>"#);
        }
        if let Some(group_by) = non_empty(&self.group_by) {
            xml.push_str(&format!(
                r#"<attribute name="{}" groupby="true" alias="groupby"/>"#,
                group_by
            ));
        }
        xml.push_str("</entity></fetch>");
        Ok(xml)
    }
}

/// Adds `top="N"` to the root `<fetch>` element unless it already limits
/// rows with `top` or `count`.
pub fn with_top(fetch_xml: &str, top: u32) -> String {
    let Some(start) = fetch_xml.find("<fetch") else {
        return fetch_xml.to_string();
    };
    let tag_start = start + "<fetch".len();
    let Some(tag_len) = fetch_xml[tag_start..].find('>') else {
        return fetch_xml.to_string();
    };
    let tag = &fetch_xml[tag_start..tag_start + tag_len];
    if tag.contains("top=") || tag.contains("count=") {
        return fetch_xml.to_string();
    }
    format!(
        "{} top=\"{}\"{}",
        &fetch_xml[..tag_start],
        top,
        &fetch_xml[tag_start..]
    )
}

#[derive(Debug, Deserialize)]
struct StoredQuery {
    #[serde(default)]
    fetchxml: String,
}

/// Generic query API client.
#[derive(Clone, Debug)]
pub struct QueryClient {
    odata: ODataClient,
}

impl QueryClient {
    pub fn new(odata: ODataClient) -> Self {
        Self { odata }
    }

    pub async fn execute_query(&self, params: &QueryParams) -> Result<QueryResult, CrmError> {
        let endpoint = format!("/{}", entity_set_name(&params.entity_type));
        let collection = self
            .odata
            .get_collection::<Record>(&endpoint, Some(&params.to_query()))
            .await?;
        Ok(QueryResult::from(collection))
    }

    pub async fn execute_fetch_xml(
        &self,
        entity_type: &str,
        fetch_xml: &str,
    ) -> Result<Vec<Record>, CrmError> {
        let query = ODataQuery::new().param("fetchXml", fetch_xml);
        let collection = self
            .odata
            .get_collection::<Record>(&format!("/{}", entity_set_name(entity_type)), Some(&query))
            .await?;
        Ok(collection.value)
    }

    pub async fn execute_aggregate(&self, params: &AggregateParams) -> Result<Vec<Record>, CrmError> {
        let fetch_xml = params.to_fetch_xml()?;
        self.execute_fetch_xml(&params.entity_type, &fetch_xml).await
    }

    /// `@odata.count` of the filtered set; zero when the server omits it.
    pub async fn get_record_count(
        &self,
        entity_type: &str,
        filter: Option<&str>,
    ) -> Result<i64, CrmError> {
        let mut query = ODataQuery::new().top(0).count();
        if let Some(filter) = filter.filter(|f| !f.trim().is_empty()) {
            query = query.filter(filter);
        }
        let collection = self
            .odata
            .get_collection::<Record>(&format!("/{}", entity_set_name(entity_type)), Some(&query))
            .await?;
        Ok(collection.count.unwrap_or(0))
    }

    /// Runs a system view's FetchXML.
    pub async fn execute_saved_query(
        &self,
        saved_query_id: &str,
        entity_type: &str,
        top: u32,
    ) -> Result<Vec<Record>, CrmError> {
        self.execute_stored("savedqueries", saved_query_id, entity_type, top)
            .await
    }

    /// Runs a personal view's FetchXML.
    pub async fn execute_user_query(
        &self,
        user_query_id: &str,
        entity_type: &str,
        top: u32,
    ) -> Result<Vec<Record>, CrmError> {
        self.execute_stored("userqueries", user_query_id, entity_type, top)
            .await
    }

    async fn execute_stored(
        &self,
        entity_set: &str,
        id: &str,
        entity_type: &str,
        top: u32,
    ) -> Result<Vec<Record>, CrmError> {
        let stored: StoredQuery = self
            .odata
            .get(&format!("{}?$select=fetchxml", record_path(entity_set, id)))
            .await?;
        if stored.fetchxml.is_empty() {
            return Err(CrmError::InvalidInput(format!(
                "{}({}) has no FetchXML",
                entity_set, id
            )));
        }
        self.execute_fetch_xml(entity_type, &with_top(&stored.fetchxml, top))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{collection, json_response, odata_client, ScriptedTransport, BASE_URL};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_query_params_pass_through() {
        let params = QueryParams {
            entity_type: "account".to_string(),
            select: Some("name, revenue".to_string()),
            filter: Some("revenue gt 1000".to_string()),
            orderby: Some("revenue desc".to_string()),
            top: Some(5),
            count: Some(true),
            ..Default::default()
        };
        assert_eq!(
            params.to_query().to_query_string(),
            "?$select=name,revenue&$filter=revenue%20gt%201000&$orderby=revenue%20desc&$top=5&$count=true"
        );
    }

    #[test]
    fn test_aggregate_fetch_xml() {
        let count = AggregateParams {
            entity_type: "opportunity".to_string(),
            aggregate_function: AggregateFunction::Count,
            field: None,
            active_only: Some(true),
            group_by: Some("ownerid".to_string()),
        };
        assert_eq!(
            count.to_fetch_xml().unwrap(),
            concat!(
                r#"<fetch aggregate="true"><entity name="opportunity">"#,
                r#"<attribute name="opportunityid" aggregate="count" alias="count"/>"#,
                r#"<filter><condition attribute="statecode" operator="eq" value="0"/></filter>"#,
                r#"<attribute name="ownerid" groupby="true" alias="groupby"/>"#,
                "</entity></fetch>"
            )
        );

        let sum = AggregateParams {
            entity_type: "opportunity".to_string(),
            aggregate_function: AggregateFunction::Sum,
            field: Some("estimatedvalue".to_string()),
            active_only: None,
            group_by: None,
        };
        assert!(sum
            .to_fetch_xml()
            .unwrap()
            .contains(r#"<attribute name="estimatedvalue" aggregate="sum" alias="result"/>"#));

        let missing = AggregateParams { field: None, ..sum };
        assert!(matches!(missing.to_fetch_xml(), Err(CrmError::InvalidInput(_))));
    }

    #[test]
    fn test_with_top() {
        assert_eq!(
            with_top(r#"<fetch version="1.0"><entity name="account"/></fetch>"#, 50),
            r#"<fetch top="50" version="1.0"><entity name="account"/></fetch>"#
        );
        assert_eq!(
            with_top("<fetch><entity name=\"account\"/></fetch>", 10),
            "<fetch top=\"10\"><entity name=\"account\"/></fetch>"
        );
        let limited = r#"<fetch top="5"><entity name="account"/></fetch>"#;
        assert_eq!(with_top(limited, 50), limited);
    }

    #[tokio::test]
    async fn test_record_count_uses_zero_top() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(json_response(200, json!({"@odata.count": 17, "value": []})));
        let client = QueryClient::new(odata_client(transport.clone()));

        let count = client
            .get_record_count("opportunity", Some("statecode eq 0"))
            .await
            .unwrap();
        assert_eq!(count, 17);
        assert_eq!(
            transport.last_request().url,
            format!(
                "{}/opportunities?$filter=statecode%20eq%200&$top=0&$count=true",
                BASE_URL
            )
        );
    }

    #[tokio::test]
    async fn test_saved_query_runs_stored_fetch_xml() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(json_response(
            200,
            json!({"fetchxml": "<fetch><entity name=\"account\"/></fetch>"}),
        ));
        transport.push(collection(vec![json!({"accountid": "A1"})]));
        let client = QueryClient::new(odata_client(transport.clone()));

        let records = client.execute_saved_query("V1", "account", 25).await.unwrap();
        assert_eq!(records.len(), 1);

        let requests = transport.requests();
        assert!(requests[0].url.ends_with("/savedqueries(V1)?$select=fetchxml"));
        let expected = urlencoding::encode("<fetch top=\"25\"><entity name=\"account\"/></fetch>")
            .into_owned();
        assert_eq!(
            requests[1].url,
            format!("{}/accounts?fetchXml={}", BASE_URL, expected)
        );
    }
}
