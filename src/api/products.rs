//! Product catalog: products and price lists (`pricelevels`).

use rmcp::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::common::{
    custom_fields, fetch_one, fetch_page, record_path, ActiveStatus, PaginatedResponse,
    PaginationParams,
};
use super::wire::WireBody;
use crate::error::CrmError;
use crate::odata::{ODataClient, ODataQuery, SortOrder};

pub const ENTITY_SET: &str = "products";
pub const PRICE_LEVEL_SET: &str = "pricelevels";

const SELECT: &[&str] = &[
    "productid",
    "name",
    "productnumber",
    "description",
    "productstructure",
    "producttypecode",
    "quantitydecimal",
    "currentcost",
    "standardcost",
    "price",
    "stockweight",
    "stockvolume",
    "quantityonhand",
    "_defaultuomid_value",
    "_defaultuomscheduleid_value",
    "_subjectid_value",
    "statuscode",
    "statecode",
    "createdon",
    "modifiedon",
];

const PRICE_LEVEL_SELECT: &[&str] = &[
    "pricelevelid",
    "name",
    "description",
    "begindate",
    "enddate",
    "freighttermscode",
    "paymentmethodcode",
    "shippingmethodcode",
    "statuscode",
    "statecode",
    "_transactioncurrencyid_value",
    "createdon",
    "modifiedon",
];

/// `productstructure` 1: a plain product, not a family or bundle.
const DEFAULT_PRODUCT_STRUCTURE: i32 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    #[default]
    Draft,
    Active,
    Retired,
    UnderRevision,
}

impl ProductStatus {
    pub fn from_state_code(state_code: Option<i32>) -> Self {
        match state_code {
            Some(0) => ProductStatus::Active,
            Some(1) => ProductStatus::Retired,
            Some(2) => ProductStatus::UnderRevision,
            _ => ProductStatus::Draft,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductRecord {
    #[serde(default)]
    pub productid: String,
    pub name: Option<String>,
    pub productnumber: Option<String>,
    pub description: Option<String>,
    pub productstructure: Option<i32>,
    pub producttypecode: Option<i32>,
    pub quantitydecimal: Option<i32>,
    pub currentcost: Option<f64>,
    pub standardcost: Option<f64>,
    pub price: Option<f64>,
    pub stockweight: Option<f64>,
    pub stockvolume: Option<f64>,
    pub quantityonhand: Option<f64>,
    #[serde(rename = "_defaultuomid_value")]
    pub defaultuomid: Option<String>,
    #[serde(rename = "_defaultuomscheduleid_value")]
    pub defaultuomscheduleid: Option<String>,
    #[serde(rename = "_subjectid_value")]
    pub subjectid: Option<String>,
    pub statecode: Option<i32>,
    pub statuscode: Option<i32>,
    pub createdon: Option<String>,
    pub modifiedon: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: Option<String>,
    pub product_number: Option<String>,
    pub description: Option<String>,
    pub product_structure: Option<i32>,
    pub product_type_code: Option<i32>,
    pub quantity_decimal: Option<i32>,
    pub current_cost: Option<f64>,
    pub standard_cost: Option<f64>,
    pub price: Option<f64>,
    pub stock_weight: Option<f64>,
    pub stock_volume: Option<f64>,
    pub quantity_on_hand: Option<f64>,
    pub default_uom_id: Option<String>,
    pub default_uom_schedule_id: Option<String>,
    pub subject_id: Option<String>,
    pub status: ProductStatus,
    pub state_code: Option<i32>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Map<String, Value>>,
}

impl From<ProductRecord> for Product {
    fn from(d: ProductRecord) -> Self {
        Self {
            id: d.productid,
            name: d.name,
            product_number: d.productnumber,
            description: d.description,
            product_structure: d.productstructure,
            product_type_code: d.producttypecode,
            quantity_decimal: d.quantitydecimal,
            current_cost: d.currentcost,
            standard_cost: d.standardcost,
            price: d.price,
            stock_weight: d.stockweight,
            stock_volume: d.stockvolume,
            quantity_on_hand: d.quantityonhand,
            default_uom_id: d.defaultuomid,
            default_uom_schedule_id: d.defaultuomscheduleid,
            subject_id: d.subjectid,
            status: ProductStatus::from_state_code(d.statecode),
            state_code: d.statecode,
            created_at: d.createdon,
            updated_at: d.modifiedon,
            custom_fields: custom_fields(d.extra),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductCreateInput {
    pub name: String,
    /// Unique product ID (SKU)
    pub product_number: String,
    #[serde(default)]
    pub description: Option<String>,
    /// 1 product (default), 2 family, 3 bundle
    #[serde(default)]
    pub product_structure: Option<i32>,
    #[serde(default)]
    pub product_type_code: Option<i32>,
    /// Decimal places supported for quantities
    #[serde(default)]
    pub quantity_decimal: Option<i32>,
    #[serde(default)]
    pub current_cost: Option<f64>,
    #[serde(default)]
    pub standard_cost: Option<f64>,
    /// List price
    #[serde(default)]
    pub price: Option<f64>,
    /// Default unit ID
    #[serde(default)]
    pub default_uom_id: Option<String>,
    /// Unit group ID
    #[serde(default)]
    pub default_uom_schedule_id: Option<String>,
    #[serde(default)]
    pub custom_fields: Option<Map<String, Value>>,
}

impl ProductCreateInput {
    pub fn to_wire(&self) -> WireBody {
        WireBody::new()
            .value("name", self.name.clone())
            .value("productnumber", self.product_number.clone())
            .field("description", &self.description)
            .value(
                "productstructure",
                self.product_structure.unwrap_or(DEFAULT_PRODUCT_STRUCTURE),
            )
            .field("producttypecode", &self.product_type_code)
            .field("quantitydecimal", &self.quantity_decimal)
            .field("currentcost", &self.current_cost)
            .field("standardcost", &self.standard_cost)
            .field("price", &self.price)
            .bind("defaultuomid", "uoms", &self.default_uom_id)
            .bind("defaultuomscheduleid", "uomschedules", &self.default_uom_schedule_id)
            .custom(&self.custom_fields)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpdateInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub product_number: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub product_type_code: Option<i32>,
    #[serde(default)]
    pub current_cost: Option<f64>,
    #[serde(default)]
    pub standard_cost: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub custom_fields: Option<Map<String, Value>>,
}

impl ProductUpdateInput {
    pub fn to_wire(&self) -> WireBody {
        WireBody::new()
            .field("name", &self.name)
            .field("productnumber", &self.product_number)
            .field("description", &self.description)
            .field("producttypecode", &self.product_type_code)
            .field("currentcost", &self.current_cost)
            .field("standardcost", &self.standard_cost)
            .field("price", &self.price)
            .custom(&self.custom_fields)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PriceLevelRecord {
    #[serde(default)]
    pub pricelevelid: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub begindate: Option<String>,
    pub enddate: Option<String>,
    pub freighttermscode: Option<i32>,
    pub paymentmethodcode: Option<i32>,
    pub shippingmethodcode: Option<i32>,
    pub statecode: Option<i32>,
    pub statuscode: Option<i32>,
    #[serde(rename = "_transactioncurrencyid_value")]
    pub transactioncurrencyid: Option<String>,
    pub createdon: Option<String>,
    pub modifiedon: Option<String>,
}

/// Normalized price list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceLevel {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub begin_date: Option<String>,
    pub end_date: Option<String>,
    pub freight_terms_code: Option<i32>,
    pub payment_method_code: Option<i32>,
    pub shipping_method_code: Option<i32>,
    pub status: ActiveStatus,
    pub state_code: Option<i32>,
    pub currency_id: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl From<PriceLevelRecord> for PriceLevel {
    fn from(d: PriceLevelRecord) -> Self {
        Self {
            id: d.pricelevelid,
            name: d.name,
            description: d.description,
            begin_date: d.begindate,
            end_date: d.enddate,
            freight_terms_code: d.freighttermscode,
            payment_method_code: d.paymentmethodcode,
            shipping_method_code: d.shippingmethodcode,
            status: ActiveStatus::from_state_code(d.statecode),
            state_code: d.statecode,
            currency_id: d.transactioncurrencyid,
            created_at: d.createdon,
            updated_at: d.modifiedon,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PriceLevelCreateInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Transaction currency ID
    #[serde(default)]
    pub currency_id: Option<String>,
}

impl PriceLevelCreateInput {
    pub fn to_wire(&self) -> WireBody {
        WireBody::new()
            .value("name", self.name.clone())
            .field("description", &self.description)
            .bind("transactioncurrencyid", "transactioncurrencies", &self.currency_id)
    }
}

/// Products and price lists API client.
#[derive(Clone, Debug)]
pub struct ProductsClient {
    odata: ODataClient,
}

impl ProductsClient {
    pub fn new(odata: ODataClient) -> Self {
        Self { odata }
    }

    pub async fn list_products(
        &self,
        params: &PaginationParams,
    ) -> Result<PaginatedResponse<Product>, CrmError> {
        let query = ODataQuery::new()
            .select(SELECT.iter().copied())
            .orderby("createdon", SortOrder::Desc);
        fetch_page::<ProductRecord, _>(&self.odata, ENTITY_SET, query, params).await
    }

    pub async fn get_product(&self, id: &str) -> Result<Product, CrmError> {
        fetch_one::<ProductRecord, _>(&self.odata, ENTITY_SET, id, SELECT).await
    }

    pub async fn create_product(&self, input: &ProductCreateInput) -> Result<Product, CrmError> {
        let created = self
            .odata
            .create_entity(&format!("/{}", ENTITY_SET), &input.to_wire().into_value())
            .await?;
        self.get_product(&created.id).await
    }

    pub async fn update_product(
        &self,
        id: &str,
        input: &ProductUpdateInput,
    ) -> Result<Product, CrmError> {
        self.odata
            .patch(&record_path(ENTITY_SET, id), &input.to_wire().into_value())
            .await?;
        self.get_product(id).await
    }

    pub async fn delete_product(&self, id: &str) -> Result<(), CrmError> {
        self.odata.delete(&record_path(ENTITY_SET, id)).await
    }

    /// Publishes a draft product (and its hierarchy) so it can be sold.
    pub async fn publish_product(&self, id: &str) -> Result<(), CrmError> {
        self.odata
            .post(
                &format!(
                    "{}/Microsoft.Dynamics.CRM.PublishProductHierarchy",
                    record_path(ENTITY_SET, id)
                ),
                &json!({}),
            )
            .await
            .map(|_| ())
    }

    pub async fn list_price_levels(
        &self,
        params: &PaginationParams,
    ) -> Result<PaginatedResponse<PriceLevel>, CrmError> {
        let query = ODataQuery::new()
            .select(PRICE_LEVEL_SELECT.iter().copied())
            .orderby("createdon", SortOrder::Desc);
        fetch_page::<PriceLevelRecord, _>(&self.odata, PRICE_LEVEL_SET, query, params).await
    }

    pub async fn get_price_level(&self, id: &str) -> Result<PriceLevel, CrmError> {
        fetch_one::<PriceLevelRecord, _>(&self.odata, PRICE_LEVEL_SET, id, PRICE_LEVEL_SELECT)
            .await
    }

    pub async fn create_price_level(
        &self,
        input: &PriceLevelCreateInput,
    ) -> Result<PriceLevel, CrmError> {
        let created = self
            .odata
            .create_entity(&format!("/{}", PRICE_LEVEL_SET), &input.to_wire().into_value())
            .await?;
        self.get_price_level(&created.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{created, json_response, odata_client, ScriptedTransport};
    use std::sync::Arc;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ProductStatus::from_state_code(Some(0)), ProductStatus::Active);
        assert_eq!(ProductStatus::from_state_code(Some(1)), ProductStatus::Retired);
        assert_eq!(
            ProductStatus::from_state_code(Some(2)),
            ProductStatus::UnderRevision
        );
        assert_eq!(ProductStatus::from_state_code(Some(3)), ProductStatus::Draft);
        assert_eq!(
            serde_json::to_value(ProductStatus::UnderRevision).unwrap(),
            json!("under_revision")
        );
    }

    #[test]
    fn test_create_defaults_product_structure() {
        let input = ProductCreateInput {
            name: "Widget".to_string(),
            product_number: "W-1".to_string(),
            default_uom_id: Some("U1".to_string()),
            ..Default::default()
        };
        assert_eq!(
            input.to_wire().into_value(),
            json!({
                "name": "Widget",
                "productnumber": "W-1",
                "productstructure": 1,
                "defaultuomid@odata.bind": "/uoms(U1)"
            })
        );
    }

    #[test]
    fn test_round_trip_populated_fields() {
        let input = ProductCreateInput {
            name: "Widget".to_string(),
            product_number: "W-1".to_string(),
            description: Some("Blue".to_string()),
            quantity_decimal: Some(2),
            current_cost: Some(4.5),
            standard_cost: Some(4.0),
            price: Some(9.99),
            ..Default::default()
        };
        let mut echoed = input.to_wire().into_value();
        echoed["productid"] = json!("P1");
        let product = Product::from(serde_json::from_value::<ProductRecord>(echoed).unwrap());

        assert_eq!(product.product_number.as_deref(), Some("W-1"));
        assert_eq!(product.description, input.description);
        assert_eq!(product.quantity_decimal, input.quantity_decimal);
        assert_eq!(product.current_cost, input.current_cost);
        assert_eq!(product.standard_cost, input.standard_cost);
        assert_eq!(product.price, input.price);
    }

    #[tokio::test]
    async fn test_create_price_level_refetches() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(created("pricelevels", "PL1"));
        transport.push(json_response(
            200,
            json!({"pricelevelid": "PL1", "name": "Retail", "statecode": 0}),
        ));
        let client = ProductsClient::new(odata_client(transport.clone()));

        let level = client
            .create_price_level(&PriceLevelCreateInput {
                name: "Retail".to_string(),
                currency_id: Some("USD1".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(
            transport.body_json(0)["transactioncurrencyid@odata.bind"],
            json!("/transactioncurrencies(USD1)")
        );
        assert_eq!(level.status, ActiveStatus::Active);
        assert!(transport.requests()[1].url.contains("/pricelevels(PL1)"));
    }
}
