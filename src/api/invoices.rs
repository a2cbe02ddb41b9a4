//! Invoices.

use rmcp::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::common::{
    custom_fields, fetch_one, fetch_page, record_path, PaginatedResponse, PaginationParams,
};
use super::sales::Pricing;
use super::wire::WireBody;
use crate::error::CrmError;
use crate::odata::{ODataClient, ODataQuery, SortOrder};

pub const ENTITY_SET: &str = "invoices";

const SELECT: &[&str] = &[
    "invoiceid",
    "name",
    "invoicenumber",
    "description",
    "totalamount",
    "totallineitemamount",
    "totaldiscountamount",
    "totaltax",
    "freightamount",
    "discountpercentage",
    "discountamount",
    "duedate",
    "datedelivered",
    "statuscode",
    "statecode",
    "ispricelocked",
    "_salesorderid_value",
    "_opportunityid_value",
    "_customerid_value",
    "_pricelevelid_value",
    "_ownerid_value",
    "createdon",
    "modifiedon",
];

/// statecode Canceled, statuscode Canceled.
const CANCELLED_STATE: (i32, i32) = (4, 100003);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    #[default]
    Active,
    Closed,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    pub fn from_state_code(state_code: Option<i32>) -> Self {
        match state_code {
            Some(2) => InvoiceStatus::Closed,
            Some(3) => InvoiceStatus::Paid,
            Some(4) => InvoiceStatus::Cancelled,
            _ => InvoiceStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceRecord {
    #[serde(default)]
    pub invoiceid: String,
    pub name: Option<String>,
    pub invoicenumber: Option<String>,
    pub description: Option<String>,
    pub totalamount: Option<f64>,
    pub totallineitemamount: Option<f64>,
    pub totaldiscountamount: Option<f64>,
    pub totaltax: Option<f64>,
    pub freightamount: Option<f64>,
    pub discountpercentage: Option<f64>,
    pub discountamount: Option<f64>,
    pub duedate: Option<String>,
    pub datedelivered: Option<String>,
    pub statecode: Option<i32>,
    pub statuscode: Option<i32>,
    pub ispricelocked: Option<bool>,
    #[serde(rename = "_salesorderid_value")]
    pub salesorderid: Option<String>,
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
pub struct Invoice {
    pub id: String,
    pub name: Option<String>,
    pub invoice_number: Option<String>,
    pub description: Option<String>,
    #[serde(flatten)]
    pub pricing: Pricing,
    pub due_date: Option<String>,
    pub date_delivered: Option<String>,
    pub status: InvoiceStatus,
    pub state_code: Option<i32>,
    pub is_price_locked: Option<bool>,
    pub sales_order_id: Option<String>,
    pub opportunity_id: Option<String>,
    pub customer_id: Option<String>,
    pub price_level_id: Option<String>,
    pub owner_id: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Map<String, Value>>,
}

impl From<InvoiceRecord> for Invoice {
    fn from(d: InvoiceRecord) -> Self {
        Self {
            id: d.invoiceid,
            name: d.name,
            invoice_number: d.invoicenumber,
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
            due_date: d.duedate,
            date_delivered: d.datedelivered,
            status: InvoiceStatus::from_state_code(d.statecode),
            state_code: d.statecode,
            is_price_locked: d.ispricelocked,
            sales_order_id: d.salesorderid,
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
pub struct InvoiceCreateInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sales_order_id: Option<String>,
    #[serde(default)]
    pub customer_account_id: Option<String>,
    #[serde(default)]
    pub price_level_id: Option<String>,
    /// Due date (YYYY-MM-DD)
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub custom_fields: Option<Map<String, Value>>,
}

impl InvoiceCreateInput {
    pub fn to_wire(&self) -> WireBody {
        WireBody::new()
            .value("name", self.name.clone())
            .field("description", &self.description)
            .bind("salesorderid", "salesorders", &self.sales_order_id)
            .bind("customerid_account", "accounts", &self.customer_account_id)
            .bind("pricelevelid", "pricelevels", &self.price_level_id)
            .field("duedate", &self.due_date)
            .custom(&self.custom_fields)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceUpdateInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub custom_fields: Option<Map<String, Value>>,
}

impl InvoiceUpdateInput {
    pub fn to_wire(&self) -> WireBody {
        WireBody::new()
            .field("name", &self.name)
            .field("description", &self.description)
            .field("duedate", &self.due_date)
            .custom(&self.custom_fields)
    }
}

/// Invoices API client.
#[derive(Clone, Debug)]
pub struct InvoicesClient {
    odata: ODataClient,
}

impl InvoicesClient {
    pub fn new(odata: ODataClient) -> Self {
        Self { odata }
    }

    pub async fn list_invoices(
        &self,
        params: &PaginationParams,
    ) -> Result<PaginatedResponse<Invoice>, CrmError> {
        let query = ODataQuery::new()
            .select(SELECT.iter().copied())
            .orderby("createdon", SortOrder::Desc);
        fetch_page::<InvoiceRecord, _>(&self.odata, ENTITY_SET, query, params).await
    }

    pub async fn get_invoice(&self, id: &str) -> Result<Invoice, CrmError> {
        fetch_one::<InvoiceRecord, _>(&self.odata, ENTITY_SET, id, SELECT).await
    }

    pub async fn create_invoice(&self, input: &InvoiceCreateInput) -> Result<Invoice, CrmError> {
        let created = self
            .odata
            .create_entity(&format!("/{}", ENTITY_SET), &input.to_wire().into_value())
            .await?;
        self.get_invoice(&created.id).await
    }

    pub async fn update_invoice(
        &self,
        id: &str,
        input: &InvoiceUpdateInput,
    ) -> Result<Invoice, CrmError> {
        self.odata
            .patch(&record_path(ENTITY_SET, id), &input.to_wire().into_value())
            .await?;
        self.get_invoice(id).await
    }

    pub async fn delete_invoice(&self, id: &str) -> Result<(), CrmError> {
        self.odata.delete(&record_path(ENTITY_SET, id)).await
    }

    pub async fn lock_invoice_pricing(&self, id: &str) -> Result<(), CrmError> {
        self.odata
            .post(
                &format!(
                    "{}/Microsoft.Dynamics.CRM.LockInvoicePricing",
                    record_path(ENTITY_SET, id)
                ),
                &json!({}),
            )
            .await
            .map(|_| ())
    }

    pub async fn cancel_invoice(&self, id: &str) -> Result<(), CrmError> {
        let (state, status) = CANCELLED_STATE;
        self.odata
            .patch(
                &record_path(ENTITY_SET, id),
                &json!({ "statecode": state, "statuscode": status }),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{no_content, odata_client, ScriptedTransport};
    use std::sync::Arc;

    #[test]
    fn test_status_mapping() {
        assert_eq!(InvoiceStatus::from_state_code(Some(0)), InvoiceStatus::Active);
        assert_eq!(InvoiceStatus::from_state_code(Some(1)), InvoiceStatus::Active);
        assert_eq!(InvoiceStatus::from_state_code(Some(3)), InvoiceStatus::Paid);
        assert_eq!(InvoiceStatus::from_state_code(Some(4)), InvoiceStatus::Cancelled);
    }

    #[test]
    fn test_round_trip_populated_fields() {
        let input = InvoiceCreateInput {
            name: "INV-7".to_string(),
            description: Some("Q2 services".to_string()),
            due_date: Some("2024-08-15".to_string()),
            sales_order_id: Some("S1".to_string()),
            ..Default::default()
        };
        let wire = input.to_wire();
        assert_eq!(
            wire.get("salesorderid@odata.bind"),
            Some(&json!("/salesorders(S1)"))
        );

        let mut echoed = wire.into_value();
        echoed["invoiceid"] = json!("I1");
        let invoice = Invoice::from(serde_json::from_value::<InvoiceRecord>(echoed).unwrap());
        assert_eq!(invoice.name.as_deref(), Some("INV-7"));
        assert_eq!(invoice.description, input.description);
        assert_eq!(invoice.due_date, input.due_date);
        assert!(invoice.custom_fields.is_none());
    }

    #[tokio::test]
    async fn test_cancel_patches_state_codes() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(no_content());
        let client = InvoicesClient::new(odata_client(transport.clone()));

        client.cancel_invoice("I1").await.unwrap();
        assert!(transport.last_request().url.ends_with("/invoices(I1)"));
        assert_eq!(
            transport.body_json(0),
            json!({"statecode": 4, "statuscode": 100003})
        );
    }
}
