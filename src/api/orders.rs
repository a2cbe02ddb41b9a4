//! Sales orders (`salesorders`), order lines and fulfilment.

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

pub const ENTITY_SET: &str = "salesorders";

const SELECT: &[&str] = &[
    "salesorderid",
    "name",
    "ordernumber",
    "description",
    "totalamount",
    "totallineitemamount",
    "totaldiscountamount",
    "totaltax",
    "freightamount",
    "discountpercentage",
    "discountamount",
    "datedelivered",
    "requestdeliveryby",
    "statuscode",
    "statecode",
    "_quoteid_value",
    "_opportunityid_value",
    "_customerid_value",
    "_pricelevelid_value",
    "_ownerid_value",
    "createdon",
    "modifiedon",
];

/// `Status` of -1 lets the server choose the default close status.
const DEFAULT_CLOSE_STATUS: i32 = -1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Active,
    Submitted,
    Cancelled,
    Fulfilled,
    Invoiced,
}

impl OrderStatus {
    pub fn from_state_code(state_code: Option<i32>) -> Self {
        match state_code {
            Some(1) => OrderStatus::Submitted,
            Some(2) => OrderStatus::Cancelled,
            Some(3) => OrderStatus::Fulfilled,
            Some(4) => OrderStatus::Invoiced,
            _ => OrderStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SalesOrderRecord {
    #[serde(default)]
    pub salesorderid: String,
    pub name: Option<String>,
    pub ordernumber: Option<String>,
    pub description: Option<String>,
    pub totalamount: Option<f64>,
    pub totallineitemamount: Option<f64>,
    pub totaldiscountamount: Option<f64>,
    pub totaltax: Option<f64>,
    pub freightamount: Option<f64>,
    pub discountpercentage: Option<f64>,
    pub discountamount: Option<f64>,
    pub datedelivered: Option<String>,
    pub requestdeliveryby: Option<String>,
    pub statecode: Option<i32>,
    pub statuscode: Option<i32>,
    #[serde(rename = "_quoteid_value")]
    pub quoteid: Option<String>,
    #[serde(rename = "_opportunityid_value")]
    pub opportunityid: Option<String>,
    #[serde(rename = "_customerid_value")]
    pub customerid: Option<String>,
    #[serde(rename = "_pricelevelid_value")]
    pub pricelevelid: Option<String>,
    #[serde(rename = "_ownerid_value")]
    pub ownerid: Option<String>,
    pub createdon: Option<String>,
    pub modifiedon: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesOrder {
    pub id: String,
    pub name: Option<String>,
    pub order_number: Option<String>,
    pub description: Option<String>,
    #[serde(flatten)]
    pub pricing: Pricing,
    pub date_delivered: Option<String>,
    pub request_delivery_by: Option<String>,
    pub status: OrderStatus,
    pub state_code: Option<i32>,
    pub quote_id: Option<String>,
    pub opportunity_id: Option<String>,
    pub customer_id: Option<String>,
    pub price_level_id: Option<String>,
    pub owner_id: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Map<String, Value>>,
}

impl From<SalesOrderRecord> for SalesOrder {
    fn from(d: SalesOrderRecord) -> Self {
        Self {
            id: d.salesorderid,
            name: d.name,
            order_number: d.ordernumber,
            description: d.description,
            pricing: Pricing {
                total_amount: d.totalamount,
                total_line_item_amount: d.totallineitemamount,
                total_discount_amount: d.totaldiscountamount,
                total_tax: d.totaltax,
                freight_amount: d.freightamount,
                discount_percentage: d.discountpercentage,
                discount_amount: d.discountamount,
            },
            date_delivered: d.datedelivered,
            request_delivery_by: d.requestdeliveryby,
            status: OrderStatus::from_state_code(d.statecode),
            state_code: d.statecode,
            quote_id: d.quoteid,
            opportunity_id: d.opportunityid,
            customer_id: d.customerid,
            price_level_id: d.pricelevelid,
            owner_id: d.ownerid,
            created_at: d.createdon,
            updated_at: d.modifiedon,
            custom_fields: custom_fields(d.extra),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SalesOrderCreateInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub quote_id: Option<String>,
    #[serde(default)]
    pub opportunity_id: Option<String>,
    #[serde(default)]
    pub customer_account_id: Option<String>,
    #[serde(default)]
    pub price_level_id: Option<String>,
    /// Requested delivery date (YYYY-MM-DD)
    #[serde(default)]
    pub request_delivery_by: Option<String>,
    #[serde(default)]
    pub custom_fields: Option<Map<String, Value>>,
}

impl SalesOrderCreateInput {
    pub fn to_wire(&self) -> WireBody {
        WireBody::new()
            .value("name", self.name.clone())
            .field("description", &self.description)
            .bind("quoteid", "quotes", &self.quote_id)
            .bind("opportunityid", "opportunities", &self.opportunity_id)
            .bind("customerid_account", "accounts", &self.customer_account_id)
            .bind("pricelevelid", "pricelevels", &self.price_level_id)
            .field("requestdeliveryby", &self.request_delivery_by)
            .custom(&self.custom_fields)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SalesOrderUpdateInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub request_delivery_by: Option<String>,
    #[serde(default)]
    pub custom_fields: Option<Map<String, Value>>,
}

impl SalesOrderUpdateInput {
    pub fn to_wire(&self) -> WireBody {
        WireBody::new()
            .field("name", &self.name)
            .field("description", &self.description)
            .field("requestdeliveryby", &self.request_delivery_by)
            .custom(&self.custom_fields)
    }
}

/// Result of ConvertSalesOrderToInvoice.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderConversion {
    pub invoice_id: Option<String>,
}

fn order_close(subject: &str) -> Value {
    json!({
        "OrderClose": { "subject": subject },
        "Status": DEFAULT_CLOSE_STATUS,
    })
}

/// Sales orders API client.
#[derive(Clone, Debug)]
pub struct OrdersClient {
    odata: ODataClient,
}

impl OrdersClient {
    pub fn new(odata: ODataClient) -> Self {
        Self { odata }
    }

    pub async fn list_orders(
        &self,
        params: &PaginationParams,
    ) -> Result<PaginatedResponse<SalesOrder>, CrmError> {
        let query = ODataQuery::new()
            .select(SELECT.iter().copied())
            .orderby("createdon", SortOrder::Desc);
        fetch_page::<SalesOrderRecord, _>(&self.odata, ENTITY_SET, query, params).await
    }

    pub async fn get_order(&self, id: &str) -> Result<SalesOrder, CrmError> {
        fetch_one::<SalesOrderRecord, _>(&self.odata, ENTITY_SET, id, SELECT).await
    }

    pub async fn create_order(&self, input: &SalesOrderCreateInput) -> Result<SalesOrder, CrmError> {
        let created = self
            .odata
            .create_entity(&format!("/{}", ENTITY_SET), &input.to_wire().into_value())
            .await?;
        self.get_order(&created.id).await
    }

    pub async fn update_order(
        &self,
        id: &str,
        input: &SalesOrderUpdateInput,
    ) -> Result<SalesOrder, CrmError> {
        self.odata
            .patch(&record_path(ENTITY_SET, id), &input.to_wire().into_value())
            .await?;
        self.get_order(id).await
    }

    pub async fn delete_order(&self, id: &str) -> Result<(), CrmError> {
        self.odata.delete(&record_path(ENTITY_SET, id)).await
    }

    pub async fn list_order_details(&self, order_id: &str) -> Result<Vec<LineItem>, CrmError> {
        sales::list_line_items(&self.odata, LineItemKind::Order, order_id).await
    }

    pub async fn add_order_detail(
        &self,
        order_id: &str,
        input: &LineItemInput,
    ) -> Result<LineItem, CrmError> {
        sales::add_line_item(&self.odata, LineItemKind::Order, order_id, input).await
    }

    pub async fn fulfill_order(&self, id: &str) -> Result<(), CrmError> {
        self.odata
            .post(&self.action(id, "FulfillSalesOrder"), &order_close("Order fulfilled"))
            .await
            .map(|_| ())
    }

    pub async fn cancel_order(&self, id: &str) -> Result<(), CrmError> {
        self.odata
            .post(&self.action(id, "CancelSalesOrder"), &order_close("Order cancelled"))
            .await
            .map(|_| ())
    }

    pub async fn convert_order_to_invoice(&self, id: &str) -> Result<OrderConversion, CrmError> {
        let response = self
            .odata
            .post(&self.action(id, "ConvertSalesOrderToInvoice"), &all_columns())
            .await?;
        Ok(OrderConversion {
            invoice_id: response
                .as_ref()
                .and_then(|r| r.get("invoiceid"))
                .and_then(Value::as_str)
                .map(String::from),
        })
    }

    fn action(&self, id: &str, name: &str) -> String {
        format!("{}/Microsoft.Dynamics.CRM.{}", record_path(ENTITY_SET, id), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{json_response, no_content, odata_client, ScriptedTransport};
    use std::sync::Arc;

    #[test]
    fn test_status_mapping() {
        assert_eq!(OrderStatus::from_state_code(Some(0)), OrderStatus::Active);
        assert_eq!(OrderStatus::from_state_code(Some(3)), OrderStatus::Fulfilled);
        assert_eq!(OrderStatus::from_state_code(Some(4)), OrderStatus::Invoiced);
        assert_eq!(OrderStatus::from_state_code(None), OrderStatus::Active);
    }

    #[test]
    fn test_update_minimal() {
        let input = SalesOrderUpdateInput {
            request_delivery_by: Some("2024-07-01".to_string()),
            ..Default::default()
        };
        assert_eq!(
            input.to_wire().into_value(),
            json!({"requestdeliveryby": "2024-07-01"})
        );
    }

    #[test]
    fn test_round_trip_populated_fields() {
        let input = SalesOrderCreateInput {
            name: "SO-1".to_string(),
            description: Some("Rush".to_string()),
            request_delivery_by: Some("2024-07-01".to_string()),
            ..Default::default()
        };
        let mut echoed = input.to_wire().into_value();
        echoed["salesorderid"] = json!("S1");
        let order = SalesOrder::from(serde_json::from_value::<SalesOrderRecord>(echoed).unwrap());

        assert_eq!(order.name.as_deref(), Some("SO-1"));
        assert_eq!(order.description, input.description);
        assert_eq!(order.request_delivery_by, input.request_delivery_by);
    }

    #[tokio::test]
    async fn test_fulfill_posts_order_close() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(no_content());
        let client = OrdersClient::new(odata_client(transport.clone()));

        client.fulfill_order("S1").await.unwrap();
        assert!(transport
            .last_request()
            .url
            .ends_with("/salesorders(S1)/Microsoft.Dynamics.CRM.FulfillSalesOrder"));
        assert_eq!(
            transport.body_json(0),
            json!({"OrderClose": {"subject": "Order fulfilled"}, "Status": -1})
        );
    }

    #[tokio::test]
    async fn test_convert_to_invoice() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(json_response(200, json!({"invoiceid": "I1"})));
        let client = OrdersClient::new(odata_client(transport.clone()));

        let conversion = client.convert_order_to_invoice("S1").await.unwrap();
        assert_eq!(conversion.invoice_id.as_deref(), Some("I1"));
    }
}
