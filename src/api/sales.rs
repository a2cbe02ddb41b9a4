//! Pieces shared by quotes, orders and invoices: price totals and line items.

use rmcp::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::common::record_path;
use super::wire::WireBody;
use crate::error::CrmError;
use crate::odata::{ODataClient, ODataQuery};

/// Price totals carried by every sales document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pricing {
    pub total_amount: Option<f64>,
    pub total_line_item_amount: Option<f64>,
    pub total_discount_amount: Option<f64>,
    pub total_tax: Option<f64>,
    pub freight_amount: Option<f64>,
    pub discount_percentage: Option<f64>,
    pub discount_amount: Option<f64>,
}

/// `ColumnSet` body for the Convert* actions.
pub fn all_columns() -> Value {
    json!({ "ColumnSet": { "AllColumns": true } })
}

/// Which document a line item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineItemKind {
    Quote,
    Order,
}

impl LineItemKind {
    fn entity_set(self) -> &'static str {
        match self {
            LineItemKind::Quote => "quotedetails",
            LineItemKind::Order => "salesorderdetails",
        }
    }

    fn id_column(self) -> &'static str {
        match self {
            LineItemKind::Quote => "quotedetailid",
            LineItemKind::Order => "salesorderdetailid",
        }
    }

    /// Lookup navigation property and entity set of the parent document.
    fn parent(self) -> (&'static str, &'static str) {
        match self {
            LineItemKind::Quote => ("quoteid", "quotes"),
            LineItemKind::Order => ("salesorderid", "salesorders"),
        }
    }

    fn select(self) -> Vec<String> {
        let (parent_nav, _) = self.parent();
        let mut columns = vec![
            self.id_column().to_string(),
            format!("_{}_value", parent_nav),
            "_productid_value".to_string(),
            "productdescription".to_string(),
            "quantity".to_string(),
            "priceperunit".to_string(),
            "baseamount".to_string(),
            "extendedamount".to_string(),
            "manualdiscountamount".to_string(),
            "tax".to_string(),
        ];
        if self == LineItemKind::Quote {
            columns.extend(
                ["_uomid_value", "ispriceoverridden", "isproductoverridden"]
                    .iter()
                    .map(|c| c.to_string()),
            );
        }
        columns
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LineItemRecord {
    #[serde(default, alias = "quotedetailid", alias = "salesorderdetailid")]
    pub id: String,
    #[serde(default, alias = "_quoteid_value", alias = "_salesorderid_value")]
    pub parent_id: Option<String>,
    #[serde(rename = "_productid_value")]
    pub productid: Option<String>,
    pub productdescription: Option<String>,
    pub quantity: Option<f64>,
    pub priceperunit: Option<f64>,
    pub baseamount: Option<f64>,
    pub extendedamount: Option<f64>,
    pub manualdiscountamount: Option<f64>,
    pub tax: Option<f64>,
    #[serde(rename = "_uomid_value")]
    pub uomid: Option<String>,
    pub ispriceoverridden: Option<bool>,
    pub isproductoverridden: Option<bool>,
}

/// Normalized quote or order line.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub id: String,
    /// Owning quote or sales order.
    pub parent_id: Option<String>,
    pub product_id: Option<String>,
    pub product_description: Option<String>,
    pub quantity: Option<f64>,
    pub price_per_unit: Option<f64>,
    pub base_amount: Option<f64>,
    pub extended_amount: Option<f64>,
    pub manual_discount_amount: Option<f64>,
    pub tax: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uom_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_price_overridden: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_product_overridden: Option<bool>,
}

impl From<LineItemRecord> for LineItem {
    fn from(d: LineItemRecord) -> Self {
        Self {
            id: d.id,
            parent_id: d.parent_id,
            product_id: d.productid,
            product_description: d.productdescription,
            quantity: d.quantity,
            price_per_unit: d.priceperunit,
            base_amount: d.baseamount,
            extended_amount: d.extendedamount,
            manual_discount_amount: d.manualdiscountamount,
            tax: d.tax,
            uom_id: d.uomid,
            is_price_overridden: d.ispriceoverridden,
            is_product_overridden: d.isproductoverridden,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LineItemInput {
    pub quantity: f64,
    /// Catalog product; omit for a write-in product
    #[serde(default)]
    pub product_id: Option<String>,
    /// Write-in product description
    #[serde(default)]
    pub product_description: Option<String>,
    #[serde(default)]
    pub price_per_unit: Option<f64>,
    #[serde(default)]
    pub manual_discount_amount: Option<f64>,
    #[serde(default)]
    pub tax: Option<f64>,
    /// Unit of measure (quote lines only)
    #[serde(default)]
    pub uom_id: Option<String>,
    /// Quote lines only
    #[serde(default)]
    pub is_price_overridden: Option<bool>,
}

impl LineItemInput {
    pub fn to_wire(&self, kind: LineItemKind, parent_id: &str) -> WireBody {
        let (parent_nav, parent_set) = kind.parent();
        let body = WireBody::new()
            .bind_id(parent_nav, parent_set, parent_id)
            .value("quantity", self.quantity)
            .bind("productid", "products", &self.product_id)
            .field("productdescription", &self.product_description)
            .field("priceperunit", &self.price_per_unit)
            .field("manualdiscountamount", &self.manual_discount_amount)
            .field("tax", &self.tax);
        match kind {
            LineItemKind::Quote => body
                .bind("uomid", "uoms", &self.uom_id)
                .field("ispriceoverridden", &self.is_price_overridden),
            LineItemKind::Order => body,
        }
    }
}

pub async fn list_line_items(
    odata: &ODataClient,
    kind: LineItemKind,
    parent_id: &str,
) -> Result<Vec<LineItem>, CrmError> {
    let (parent_nav, _) = kind.parent();
    let query = ODataQuery::new()
        .select(kind.select())
        .filter(format!("_{}_value eq {}", parent_nav, parent_id));
    let collection = odata
        .get_collection::<LineItemRecord>(&format!("/{}", kind.entity_set()), Some(&query))
        .await?;
    Ok(collection.value.into_iter().map(LineItem::from).collect())
}

pub async fn add_line_item(
    odata: &ODataClient,
    kind: LineItemKind,
    parent_id: &str,
    input: &LineItemInput,
) -> Result<LineItem, CrmError> {
    let created = odata
        .create_entity(
            &format!("/{}", kind.entity_set()),
            &input.to_wire(kind, parent_id).into_value(),
        )
        .await?;
    let query = ODataQuery::new().select(kind.select());
    let record: LineItemRecord = odata
        .get(&format!(
            "{}{}",
            record_path(kind.entity_set(), &created.id),
            query.to_query_string()
        ))
        .await?;
    Ok(LineItem::from(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{collection, created, json_response, odata_client, ScriptedTransport};
    use std::sync::Arc;

    #[test]
    fn test_line_item_record_accepts_both_kinds() {
        let quote_line: LineItemRecord = serde_json::from_value(json!({
            "quotedetailid": "QD1",
            "_quoteid_value": "Q1",
            "quantity": 2.0,
            "ispriceoverridden": true
        }))
        .unwrap();
        let line = LineItem::from(quote_line);
        assert_eq!(line.id, "QD1");
        assert_eq!(line.parent_id.as_deref(), Some("Q1"));
        assert_eq!(line.is_price_overridden, Some(true));

        let order_line: LineItemRecord = serde_json::from_value(json!({
            "salesorderdetailid": "SD1",
            "_salesorderid_value": "S1"
        }))
        .unwrap();
        assert_eq!(LineItem::from(order_line).parent_id.as_deref(), Some("S1"));
    }

    #[test]
    fn test_order_line_ignores_quote_only_fields() {
        let input = LineItemInput {
            quantity: 3.0,
            product_id: Some("P1".to_string()),
            uom_id: Some("U1".to_string()),
            is_price_overridden: Some(true),
            ..Default::default()
        };
        assert_eq!(
            input.to_wire(LineItemKind::Order, "S1").into_value(),
            json!({
                "salesorderid@odata.bind": "/salesorders(S1)",
                "quantity": 3.0,
                "productid@odata.bind": "/products(P1)"
            })
        );

        let quote = input.to_wire(LineItemKind::Quote, "Q1");
        assert_eq!(quote.get("uomid@odata.bind"), Some(&json!("/uoms(U1)")));
        assert_eq!(quote.get("ispriceoverridden"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_list_filters_by_parent() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(collection(vec![json!({"quotedetailid": "QD1", "_quoteid_value": "Q1"})]));
        let odata = odata_client(transport.clone());

        let lines = list_line_items(&odata, LineItemKind::Quote, "Q1").await.unwrap();
        assert_eq!(lines.len(), 1);
        let url = transport.last_request().url;
        assert!(url.contains("/quotedetails?"));
        assert!(url.contains(&urlencoding::encode("_quoteid_value eq Q1").into_owned()));
    }

    #[tokio::test]
    async fn test_add_refetches_created_line() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(created("salesorderdetails", "SD7"));
        transport.push(json_response(
            200,
            json!({"salesorderdetailid": "SD7", "_salesorderid_value": "S1", "quantity": 1.0}),
        ));
        let odata = odata_client(transport.clone());

        let line = add_line_item(
            &odata,
            LineItemKind::Order,
            "S1",
            &LineItemInput {
                quantity: 1.0,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(line.id, "SD7");
        assert!(transport.requests()[1].url.contains("/salesorderdetails(SD7)"));
    }
}
