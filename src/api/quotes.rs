//! Quotes, quote lines and the quote lifecycle actions.

use rmcp::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::common::{
    custom_fields, fetch_one, fetch_page, record_path, PaginatedResponse, PaginationParams,
};
use super::sales::{self, all_columns, LineItem, LineItemInput, LineItemKind, Pricing};
use super::wire::WireBody;
use crate::error::CrmError;
use crate::odata::{ODataClient, ODataQuery, SortOrder};

pub const ENTITY_SET: &str = "quotes";

const SELECT: &[&str] = &[
    "quoteid",
    "name",
    "quotenumber",
    "description",
    "effectivefrom",
    "effectiveto",
    "totalamount",
    "totallineitemamount",
    "totaldiscountamount",
    "totaltax",
    "freightamount",
    "discountpercentage",
    "discountamount",
    "statuscode",
    "statecode",
    "_opportunityid_value",
    "_customerid_value",
    "_pricelevelid_value",
    "_ownerid_value",
    "_transactioncurrencyid_value",
    "createdon",
    "modifiedon",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    #[default]
    Draft,
    Active,
    Won,
    Closed,
}

impl QuoteStatus {
    pub fn from_state_code(state_code: Option<i32>) -> Self {
        match state_code {
            Some(1) => QuoteStatus::Active,
            Some(2) => QuoteStatus::Won,
            Some(3) => QuoteStatus::Closed,
            _ => QuoteStatus::Draft,
        }
    }
}

/// Outcome passed to CloseQuote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum QuoteCloseStatus {
    Won,
    Lost,
    Cancelled,
}

impl QuoteCloseStatus {
    pub fn status_code(self) -> i32 {
        match self {
            QuoteCloseStatus::Won => 4,
            QuoteCloseStatus::Lost => 5,
            QuoteCloseStatus::Cancelled => 6,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuoteRecord {
    #[serde(default)]
    pub quoteid: String,
    pub name: Option<String>,
    pub quotenumber: Option<String>,
    pub description: Option<String>,
    pub effectivefrom: Option<String>,
    pub effectiveto: Option<String>,
    pub totalamount: Option<f64>,
    pub totallineitemamount: Option<f64>,
    pub totaldiscountamount: Option<f64>,
    pub totaltax: Option<f64>,
    pub freightamount: Option<f64>,
    pub discountpercentage: Option<f64>,
    pub discountamount: Option<f64>,
    pub statecode: Option<i32>,
    pub statuscode: Option<i32>,
    #[serde(rename = "_opportunityid_value")]
    pub opportunityid: Option<String>,
    #[serde(rename = "_customerid_value")]
    pub customerid: Option<String>,
    #[serde(rename = "_pricelevelid_value")]
    pub pricelevelid: Option<String>,
    #[serde(rename = "_ownerid_value")]
    pub ownerid: Option<String>,
    #[serde(rename = "_transactioncurrencyid_value")]
    pub transactioncurrencyid: Option<String>,
    pub createdon: Option<String>,
    pub modifiedon: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub id: String,
    pub name: Option<String>,
    pub quote_number: Option<String>,
    pub description: Option<String>,
    pub effective_from: Option<String>,
    pub effective_to: Option<String>,
    #[serde(flatten)]
    pub pricing: Pricing,
    pub status: QuoteStatus,
    pub state_code: Option<i32>,
    pub opportunity_id: Option<String>,
    pub customer_id: Option<String>,
    pub price_level_id: Option<String>,
    pub owner_id: Option<String>,
    pub currency_id: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Map<String, Value>>,
}

impl From<QuoteRecord> for Quote {
    fn from(d: QuoteRecord) -> Self {
        Self {
            id: d.quoteid,
            name: d.name,
            quote_number: d.quotenumber,
            description: d.description,
            effective_from: d.effectivefrom,
            effective_to: d.effectiveto,
            pricing: Pricing {
                total_amount: d.totalamount,
                total_line_item_amount: d.totallineitemamount,
                total_discount_amount: d.totaldiscountamount,
                total_tax: d.totaltax,
                freight_amount: d.freightamount,
                discount_percentage: d.discountpercentage,
                discount_amount: d.discountamount,
            },
            status: QuoteStatus::from_state_code(d.statecode),
            state_code: d.statecode,
            opportunity_id: d.opportunityid,
            customer_id: d.customerid,
            price_level_id: d.pricelevelid,
            owner_id: d.ownerid,
            currency_id: d.transactioncurrencyid,
            created_at: d.createdon,
            updated_at: d.modifiedon,
            custom_fields: custom_fields(d.extra),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuoteCreateInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub opportunity_id: Option<String>,
    /// Customer account ID
    #[serde(default)]
    pub customer_account_id: Option<String>,
    /// Price list ID
    #[serde(default)]
    pub price_level_id: Option<String>,
    #[serde(default)]
    pub currency_id: Option<String>,
    #[serde(default)]
    pub effective_from: Option<String>,
    #[serde(default)]
    pub effective_to: Option<String>,
    #[serde(default)]
    pub discount_percentage: Option<f64>,
    #[serde(default)]
    pub freight_amount: Option<f64>,
    #[serde(default)]
    pub custom_fields: Option<Map<String, Value>>,
}

impl QuoteCreateInput {
    pub fn to_wire(&self) -> WireBody {
        WireBody::new()
            .value("name", self.name.clone())
            .field("description", &self.description)
            .bind("opportunityid", "opportunities", &self.opportunity_id)
            .bind("customerid_account", "accounts", &self.customer_account_id)
            .bind("pricelevelid", "pricelevels", &self.price_level_id)
            .bind("transactioncurrencyid", "transactioncurrencies", &self.currency_id)
            .field("effectivefrom", &self.effective_from)
            .field("effectiveto", &self.effective_to)
            .field("discountpercentage", &self.discount_percentage)
            .field("freightamount", &self.freight_amount)
            .custom(&self.custom_fields)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuoteUpdateInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub effective_from: Option<String>,
    #[serde(default)]
    pub effective_to: Option<String>,
    #[serde(default)]
    pub discount_percentage: Option<f64>,
    #[serde(default)]
    pub freight_amount: Option<f64>,
    #[serde(default)]
    pub custom_fields: Option<Map<String, Value>>,
}

impl QuoteUpdateInput {
    pub fn to_wire(&self) -> WireBody {
        WireBody::new()
            .field("name", &self.name)
            .field("description", &self.description)
            .field("effectivefrom", &self.effective_from)
            .field("effectiveto", &self.effective_to)
            .field("discountpercentage", &self.discount_percentage)
            .field("freightamount", &self.freight_amount)
            .custom(&self.custom_fields)
    }
}

/// Result of ConvertQuoteToSalesOrder.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteConversion {
    pub sales_order_id: Option<String>,
}

/// Quotes API client.
#[derive(Clone, Debug)]
pub struct QuotesClient {
    odata: ODataClient,
}

impl QuotesClient {
    pub fn new(odata: ODataClient) -> Self {
        Self { odata }
    }

    pub async fn list_quotes(
        &self,
        params: &PaginationParams,
    ) -> Result<PaginatedResponse<Quote>, CrmError> {
        let query = ODataQuery::new()
            .select(SELECT.iter().copied())
            .orderby("createdon", SortOrder::Desc);
        fetch_page::<QuoteRecord, _>(&self.odata, ENTITY_SET, query, params).await
    }

    pub async fn get_quote(&self, id: &str) -> Result<Quote, CrmError> {
        fetch_one::<QuoteRecord, _>(&self.odata, ENTITY_SET, id, SELECT).await
    }

    pub async fn create_quote(&self, input: &QuoteCreateInput) -> Result<Quote, CrmError> {
        let created = self
            .odata
            .create_entity(&format!("/{}", ENTITY_SET), &input.to_wire().into_value())
            .await?;
        self.get_quote(&created.id).await
    }

    pub async fn update_quote(&self, id: &str, input: &QuoteUpdateInput) -> Result<Quote, CrmError> {
        self.odata
            .patch(&record_path(ENTITY_SET, id), &input.to_wire().into_value())
            .await?;
        self.get_quote(id).await
    }

    pub async fn delete_quote(&self, id: &str) -> Result<(), CrmError> {
        self.odata.delete(&record_path(ENTITY_SET, id)).await
    }

    pub async fn list_quote_details(&self, quote_id: &str) -> Result<Vec<LineItem>, CrmError> {
        sales::list_line_items(&self.odata, LineItemKind::Quote, quote_id).await
    }

    pub async fn add_quote_detail(
        &self,
        quote_id: &str,
        input: &LineItemInput,
    ) -> Result<LineItem, CrmError> {
        sales::add_line_item(&self.odata, LineItemKind::Quote, quote_id, input).await
    }

    /// Draft to active.
    pub async fn activate_quote(&self, id: &str) -> Result<(), CrmError> {
        self.odata
            .post(&self.action(id, "ActivateQuote"), &json!({}))
            .await
            .map(|_| ())
    }

    pub async fn close_quote(&self, id: &str, status: QuoteCloseStatus) -> Result<(), CrmError> {
        self.odata
            .post(
                &self.action(id, "CloseQuote"),
                &json!({ "Status": status.status_code() }),
            )
            .await
            .map(|_| ())
    }

    pub async fn convert_quote_to_order(&self, id: &str) -> Result<QuoteConversion, CrmError> {
        let response = self
            .odata
            .post(&self.action(id, "ConvertQuoteToSalesOrder"), &all_columns())
            .await?;
        Ok(QuoteConversion {
            sales_order_id: response
                .as_ref()
                .and_then(|r| r.get("salesorderid"))
                .and_then(Value::as_str)
                .map(String::from),
        })
    }

    fn action(&self, id: &str, name: &str) -> String {
        format!("{}/Microsoft.Dynamics.CRM.{}", record_path(ENTITY_SET, id), name)
    }
}
