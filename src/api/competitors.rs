//! Competitors and their links to opportunities.

use rmcp::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::common::{
    custom_fields, fetch_all, fetch_one, fetch_page, record_path, ActiveStatus, Address,
    PaginatedResponse, PaginationParams,
};
use super::relationships;
use super::wire::WireBody;
use crate::error::CrmError;
use crate::odata::{ODataClient, ODataQuery, SortOrder};

pub const ENTITY_SET: &str = "competitors";

/// Many-to-many navigation from opportunities to competitors.
const OPPORTUNITY_COMPETITORS: &str = "opportunitycompetitors_association";

const SELECT: &[&str] = &[
    "competitorid",
    "name",
    "websiteurl",
    "tickersymbol",
    "stockexchange",
    "reportedrevenue",
    "reportingquarter",
    "reportingyear",
    "keyproduct",
    "strengths",
    "weaknesses",
    "overview",
    "opportunities",
    "threats",
    "winpercentage",
    "address1_line1",
    "address1_city",
    "address1_stateorprovince",
    "address1_postalcode",
    "address1_country",
    "statuscode",
    "statecode",
    "createdon",
    "modifiedon",
];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompetitorRecord {
    #[serde(default)]
    pub competitorid: String,
    pub name: Option<String>,
    pub websiteurl: Option<String>,
    pub tickersymbol: Option<String>,
    pub stockexchange: Option<String>,
    pub reportedrevenue: Option<f64>,
    pub reportingquarter: Option<i32>,
    pub reportingyear: Option<i32>,
    pub keyproduct: Option<String>,
    pub strengths: Option<String>,
    pub weaknesses: Option<String>,
    pub overview: Option<String>,
    pub opportunities: Option<String>,
    pub threats: Option<String>,
    pub winpercentage: Option<f64>,
    pub address1_line1: Option<String>,
    pub address1_city: Option<String>,
    pub address1_stateorprovince: Option<String>,
    pub address1_postalcode: Option<String>,
    pub address1_country: Option<String>,
    pub statecode: Option<i32>,
    pub statuscode: Option<i32>,
    pub createdon: Option<String>,
    pub modifiedon: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Competitor {
    pub id: String,
    pub name: Option<String>,
    pub website: Option<String>,
    pub ticker_symbol: Option<String>,
    pub stock_exchange: Option<String>,
    pub reported_revenue: Option<f64>,
    pub reporting_quarter: Option<i32>,
    pub reporting_year: Option<i32>,
    pub key_product: Option<String>,
    pub strengths: Option<String>,
    pub weaknesses: Option<String>,
    pub overview: Option<String>,
    pub opportunities: Option<String>,
    pub threats: Option<String>,
    pub win_percentage: Option<f64>,
    pub address: Option<Address>,
    pub status: ActiveStatus,
    pub state_code: Option<i32>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Map<String, Value>>,
}

impl From<CompetitorRecord> for Competitor {
    fn from(d: CompetitorRecord) -> Self {
        Self {
            id: d.competitorid,
            name: d.name,
            website: d.websiteurl,
            ticker_symbol: d.tickersymbol,
            stock_exchange: d.stockexchange,
            reported_revenue: d.reportedrevenue,
            reporting_quarter: d.reportingquarter,
            reporting_year: d.reportingyear,
            key_product: d.keyproduct,
            strengths: d.strengths,
            weaknesses: d.weaknesses,
            overview: d.overview,
            opportunities: d.opportunities,
            threats: d.threats,
            win_percentage: d.winpercentage,
            address: Address {
                street: d.address1_line1,
                city: d.address1_city,
                state: d.address1_stateorprovince,
                postal_code: d.address1_postalcode,
                country: d.address1_country,
                ..Default::default()
            }
            .non_empty(),
            status: ActiveStatus::from_state_code(d.statecode),
            state_code: d.statecode,
            created_at: d.createdon,
            updated_at: d.modifiedon,
            custom_fields: custom_fields(d.extra),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompetitorCreateInput {
    pub name: String,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub ticker_symbol: Option<String>,
    #[serde(default)]
    pub key_product: Option<String>,
    #[serde(default)]
    pub strengths: Option<String>,
    #[serde(default)]
    pub weaknesses: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub custom_fields: Option<Map<String, Value>>,
}

impl CompetitorCreateInput {
    pub fn to_wire(&self) -> WireBody {
        WireBody::new()
            .value("name", self.name.clone())
            .field("websiteurl", &self.website)
            .field("tickersymbol", &self.ticker_symbol)
            .field("keyproduct", &self.key_product)
            .field("strengths", &self.strengths)
            .field("weaknesses", &self.weaknesses)
            .field("overview", &self.overview)
            .custom(&self.custom_fields)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompetitorUpdateInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub ticker_symbol: Option<String>,
    #[serde(default)]
    pub key_product: Option<String>,
    #[serde(default)]
    pub strengths: Option<String>,
    #[serde(default)]
    pub weaknesses: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub custom_fields: Option<Map<String, Value>>,
}

impl CompetitorUpdateInput {
    pub fn to_wire(&self) -> WireBody {
        WireBody::new()
            .field("name", &self.name)
            .field("websiteurl", &self.website)
            .field("tickersymbol", &self.ticker_symbol)
            .field("keyproduct", &self.key_product)
            .field("strengths", &self.strengths)
            .field("weaknesses", &self.weaknesses)
            .field("overview", &self.overview)
            .custom(&self.custom_fields)
    }
}

/// Competitors API client.
#[derive(Clone, Debug)]
pub struct CompetitorsClient {
    odata: ODataClient,
}

impl CompetitorsClient {
    pub fn new(odata: ODataClient) -> Self {
        Self { odata }
    }

    pub async fn list_competitors(
        &self,
        params: &PaginationParams,
    ) -> Result<PaginatedResponse<Competitor>, CrmError> {
        let query = ODataQuery::new()
            .select(SELECT.iter().copied())
            .orderby("createdon", SortOrder::Desc);
        fetch_page::<CompetitorRecord, _>(&self.odata, ENTITY_SET, query, params).await
    }

    pub async fn get_competitor(&self, id: &str) -> Result<Competitor, CrmError> {
        fetch_one::<CompetitorRecord, _>(&self.odata, ENTITY_SET, id, SELECT).await
    }

    pub async fn create_competitor(
        &self,
        input: &CompetitorCreateInput,
    ) -> Result<Competitor, CrmError> {
        let created = self
            .odata
            .create_entity(&format!("/{}", ENTITY_SET), &input.to_wire().into_value())
            .await?;
        self.get_competitor(&created.id).await
    }

    pub async fn update_competitor(
        &self,
        id: &str,
        input: &CompetitorUpdateInput,
    ) -> Result<Competitor, CrmError> {
        self.odata
            .patch(&record_path(ENTITY_SET, id), &input.to_wire().into_value())
            .await?;
        self.get_competitor(id).await
    }

    pub async fn delete_competitor(&self, id: &str) -> Result<(), CrmError> {
        self.odata.delete(&record_path(ENTITY_SET, id)).await
    }

    pub async fn associate_to_opportunity(
        &self,
        competitor_id: &str,
        opportunity_id: &str,
    ) -> Result<(), CrmError> {
        relationships::associate(
            &self.odata,
            "opportunities",
            opportunity_id,
            OPPORTUNITY_COMPETITORS,
            ENTITY_SET,
            competitor_id,
        )
        .await
    }

    pub async fn disassociate_from_opportunity(
        &self,
        competitor_id: &str,
        opportunity_id: &str,
    ) -> Result<(), CrmError> {
        relationships::disassociate(
            &self.odata,
            "opportunities",
            opportunity_id,
            OPPORTUNITY_COMPETITORS,
            competitor_id,
        )
        .await
    }

    pub async fn list_opportunity_competitors(
        &self,
        opportunity_id: &str,
    ) -> Result<Vec<Competitor>, CrmError> {
        let endpoint = format!(
            "{}/{}",
            record_path("opportunities", opportunity_id),
            OPPORTUNITY_COMPETITORS
        );
        let query = ODataQuery::new().select(SELECT.iter().copied());
        fetch_all::<CompetitorRecord, _>(&self.odata, &endpoint, &query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{collection, no_content, odata_client, ScriptedTransport, BASE_URL};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_round_trip_populated_fields() {
        let input = CompetitorCreateInput {
            name: "Northwind".to_string(),
            website: Some("northwind.example".to_string()),
            ticker_symbol: Some("NWND".to_string()),
            key_product: Some("Widgets".to_string()),
            strengths: Some("Price".to_string()),
            weaknesses: Some("Support".to_string()),
            overview: Some("Regional".to_string()),
            custom_fields: None,
        };
        let mut echoed = input.to_wire().into_value();
        echoed["competitorid"] = json!("X1");
        echoed["statecode"] = json!(0);
        let competitor =
            Competitor::from(serde_json::from_value::<CompetitorRecord>(echoed).unwrap());

        assert_eq!(competitor.website, input.website);
        assert_eq!(competitor.ticker_symbol, input.ticker_symbol);
        assert_eq!(competitor.key_product, input.key_product);
        assert_eq!(competitor.strengths, input.strengths);
        assert_eq!(competitor.weaknesses, input.weaknesses);
        assert_eq!(competitor.overview, input.overview);
        assert_eq!(competitor.status, ActiveStatus::Active);
    }

    #[tokio::test]
    async fn test_associate_targets_opportunity_navigation() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(no_content());
        let client = CompetitorsClient::new(odata_client(transport.clone()));

        client.associate_to_opportunity("X1", "O1").await.unwrap();
        assert!(transport
            .last_request()
            .url
            .ends_with("/opportunities(O1)/opportunitycompetitors_association/$ref"));
        assert_eq!(
            transport.body_json(0),
            json!({"@odata.id": format!("{}/competitors(X1)", BASE_URL)})
        );
    }

    #[tokio::test]
    async fn test_list_opportunity_competitors() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(collection(vec![
            json!({"competitorid": "X1", "name": "Northwind"}),
            json!({"competitorid": "X2", "name": "Tailspin"}),
        ]));
        let client = CompetitorsClient::new(odata_client(transport.clone()));

        let competitors = client.list_opportunity_competitors("O1").await.unwrap();
        assert_eq!(competitors.len(), 2);
        assert_eq!(competitors[1].name.as_deref(), Some("Tailspin"));
    }
}
