//! Entity, attribute and option set definitions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CrmError;
use crate::odata::{ODataClient, ODataCollection, ODataQuery};

const ENTITY_SELECT: &[&str] = &[
    "LogicalName",
    "DisplayName",
    "Description",
    "IsCustomEntity",
    "PrimaryIdAttribute",
    "PrimaryNameAttribute",
];

const ATTRIBUTE_SELECT: &[&str] = &[
    "LogicalName",
    "DisplayName",
    "AttributeType",
    "RequiredLevel",
    "IsCustomAttribute",
    "Description",
];

/// Localized label wrapper used throughout metadata payloads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Label {
    #[serde(rename = "UserLocalizedLabel", default)]
    pub user_localized_label: Option<LocalizedLabel>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocalizedLabel {
    #[serde(rename = "Label", default)]
    pub label: Option<String>,
}

impl Label {
    pub fn text(&self) -> Option<String> {
        self.user_localized_label
            .as_ref()
            .and_then(|l| l.label.clone())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EntityDefinitionRecord {
    #[serde(default)]
    logical_name: String,
    #[serde(default)]
    display_name: Option<Label>,
    #[serde(default)]
    description: Option<Label>,
    #[serde(default)]
    is_custom_entity: bool,
    #[serde(default)]
    primary_id_attribute: Option<String>,
    #[serde(default)]
    primary_name_attribute: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySummary {
    pub logical_name: String,
    /// Falls back to the logical name when no label exists.
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_custom_entity: bool,
    pub primary_id_attribute: Option<String>,
    pub primary_name_attribute: Option<String>,
}

impl From<EntityDefinitionRecord> for EntitySummary {
    fn from(d: EntityDefinitionRecord) -> Self {
        Self {
            display_name: d
                .display_name
                .as_ref()
                .and_then(Label::text)
                .unwrap_or_else(|| d.logical_name.clone()),
            description: d.description.as_ref().and_then(Label::text),
            logical_name: d.logical_name,
            is_custom_entity: d.is_custom_entity,
            primary_id_attribute: d.primary_id_attribute,
            primary_name_attribute: d.primary_name_attribute,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequiredLevel {
    #[serde(rename = "Value", default)]
    value: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AttributeDefinitionRecord {
    #[serde(default)]
    logical_name: String,
    #[serde(default)]
    display_name: Option<Label>,
    #[serde(default)]
    attribute_type: Option<String>,
    #[serde(default)]
    required_level: Option<RequiredLevel>,
    #[serde(default)]
    is_custom_attribute: bool,
    #[serde(default)]
    description: Option<Label>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeSummary {
    pub logical_name: String,
    pub display_name: String,
    pub attribute_type: Option<String>,
    /// Application or system required.
    pub is_required: bool,
    pub is_custom_attribute: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<AttributeDefinitionRecord> for AttributeSummary {
    fn from(d: AttributeDefinitionRecord) -> Self {
        let is_required = matches!(
            d.required_level.and_then(|l| l.value).as_deref(),
            Some("ApplicationRequired") | Some("SystemRequired")
        );
        Self {
            display_name: d
                .display_name
                .as_ref()
                .and_then(Label::text)
                .unwrap_or_else(|| d.logical_name.clone()),
            description: d.description.as_ref().and_then(Label::text),
            logical_name: d.logical_name,
            attribute_type: d.attribute_type,
            is_required,
            is_custom_attribute: d.is_custom_attribute,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OptionRecord {
    #[serde(rename = "Value", default)]
    value: i64,
    #[serde(rename = "Label", default)]
    label: Option<Label>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OptionSetRecord {
    #[serde(rename = "Options", default)]
    options: Vec<OptionRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PicklistRecord {
    #[serde(rename = "OptionSet", default)]
    option_set: Option<OptionSetRecord>,
}

/// One choice of an option set. The label falls back to the number.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionValue {
    pub value: i64,
    pub label: String,
}

impl From<OptionRecord> for OptionValue {
    fn from(o: OptionRecord) -> Self {
        Self {
            label: o
                .label
                .as_ref()
                .and_then(Label::text)
                .unwrap_or_else(|| o.value.to_string()),
            value: o.value,
        }
    }
}

fn entity_path(logical_name: &str) -> String {
    format!("/EntityDefinitions(LogicalName='{}')", logical_name)
}

fn attribute_path(entity: &str, attribute: &str) -> String {
    format!(
        "{}/Attributes(LogicalName='{}')",
        entity_path(entity),
        attribute
    )
}

/// Metadata API client.
#[derive(Clone, Debug)]
pub struct MetadataClient {
    odata: ODataClient,
}

impl MetadataClient {
    pub fn new(odata: ODataClient) -> Self {
        Self { odata }
    }

    /// `name_filter` matches inside the logical name; `include_custom = false`
    /// keeps system entities only.
    pub async fn list_entities(
        &self,
        name_filter: Option<&str>,
        include_custom: bool,
    ) -> Result<Vec<EntitySummary>, CrmError> {
        let mut clauses = Vec::new();
        if let Some(name) = name_filter.filter(|n| !n.is_empty()) {
            clauses.push(format!("contains(LogicalName,'{}')", name));
        }
        if !include_custom {
            clauses.push("IsCustomEntity eq false".to_string());
        }
        let mut query = ODataQuery::new().select(ENTITY_SELECT.iter().copied());
        if !clauses.is_empty() {
            query = query.filter(clauses.join(" and "));
        }
        let collection: ODataCollection<EntityDefinitionRecord> = self
            .odata
            .get_collection("/EntityDefinitions", Some(&query))
            .await?;
        Ok(collection.value.into_iter().map(EntitySummary::from).collect())
    }

    /// Full definition as returned by the server.
    pub async fn get_entity_metadata(&self, logical_name: &str) -> Result<Value, CrmError> {
        self.odata.get(&entity_path(logical_name)).await
    }

    /// `attribute_type` is an `AttributeTypeCode` member such as `Picklist`.
    pub async fn list_entity_attributes(
        &self,
        logical_name: &str,
        attribute_type: Option<&str>,
    ) -> Result<Vec<AttributeSummary>, CrmError> {
        let mut query = ODataQuery::new().select(ATTRIBUTE_SELECT.iter().copied());
        if let Some(kind) = attribute_type.filter(|k| !k.is_empty()) {
            query = query.filter(format!(
                "AttributeType eq Microsoft.Dynamics.CRM.AttributeTypeCode'{}'",
                kind
            ));
        }
        let collection: ODataCollection<AttributeDefinitionRecord> = self
            .odata
            .get_collection(&format!("{}/Attributes", entity_path(logical_name)), Some(&query))
            .await?;
        Ok(collection
            .value
            .into_iter()
            .map(AttributeSummary::from)
            .collect())
    }

    pub async fn get_attribute_metadata(
        &self,
        entity: &str,
        attribute: &str,
    ) -> Result<Value, CrmError> {
        self.odata.get(&attribute_path(entity, attribute)).await
    }

    /// Choices of a picklist column; empty when the column has none.
    pub async fn get_optionset_values(
        &self,
        entity: &str,
        attribute: &str,
    ) -> Result<Vec<OptionValue>, CrmError> {
        let endpoint = format!(
            "{}/Microsoft.Dynamics.CRM.PicklistAttributeMetadata{}",
            attribute_path(entity, attribute),
            ODataQuery::new().expand(["OptionSet"]).to_query_string()
        );
        let picklist: PicklistRecord = self.odata.get(&endpoint).await?;
        Ok(picklist
            .option_set
            .map(|set| set.options.into_iter().map(OptionValue::from).collect())
            .unwrap_or_default())
    }

    pub async fn get_global_optionset(&self, name: &str) -> Result<Vec<OptionValue>, CrmError> {
        let option_set: OptionSetRecord = self
            .odata
            .get(&format!("/GlobalOptionSetDefinitions(Name='{}')", name))
            .await?;
        Ok(option_set
            .options
            .into_iter()
            .map(OptionValue::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{collection, json_response, odata_client, ScriptedTransport};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_list_entities_labels_and_filters() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(collection(vec![
            json!({
                "LogicalName": "account",
                "DisplayName": {"UserLocalizedLabel": {"Label": "Account"}},
                "Description": {"UserLocalizedLabel": null},
                "IsCustomEntity": false,
                "PrimaryIdAttribute": "accountid",
                "PrimaryNameAttribute": "name"
            }),
            json!({"LogicalName": "new_widget", "DisplayName": {}, "IsCustomEntity": true}),
        ]));
        let client = MetadataClient::new(odata_client(transport.clone()));

        let entities = client.list_entities(Some("a"), false).await.unwrap();
        assert_eq!(entities[0].display_name, "Account");
        assert!(entities[0].description.is_none());
        assert_eq!(entities[1].display_name, "new_widget");

        let expected = urlencoding::encode("contains(LogicalName,'a') and IsCustomEntity eq false")
            .into_owned();
        assert!(transport.last_request().url.contains(&expected));
    }

    #[tokio::test]
    async fn test_attributes_required_level() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(collection(vec![
            json!({"LogicalName": "name", "AttributeType": "String", "RequiredLevel": {"Value": "ApplicationRequired"}}),
            json!({"LogicalName": "fax", "AttributeType": "String", "RequiredLevel": {"Value": "None"}}),
        ]));
        let client = MetadataClient::new(odata_client(transport.clone()));

        let attributes = client
            .list_entity_attributes("account", Some("String"))
            .await
            .unwrap();
        assert!(attributes[0].is_required);
        assert!(!attributes[1].is_required);
        assert!(transport
            .last_request()
            .url
            .contains("/EntityDefinitions(LogicalName='account')/Attributes?$select=LogicalName"));
    }

    #[tokio::test]
    async fn test_optionset_label_fallback() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(json_response(
            200,
            json!({"OptionSet": {"Options": [
                {"Value": 1, "Label": {"UserLocalizedLabel": {"Label": "Preferred Customer"}}},
                {"Value": 2, "Label": {}}
            ]}}),
        ));
        transport.push(json_response(200, json!({})));
        let client = MetadataClient::new(odata_client(transport.clone()));

        let options = client
            .get_optionset_values("account", "customertypecode")
            .await
            .unwrap();
        assert_eq!(
            options,
            vec![
                OptionValue { value: 1, label: "Preferred Customer".to_string() },
                OptionValue { value: 2, label: "2".to_string() },
            ]
        );
        assert!(transport.requests()[0].url.ends_with(
            "/Attributes(LogicalName='customertypecode')/Microsoft.Dynamics.CRM.PicklistAttributeMetadata?$expand=OptionSet"
        ));

        let empty = client.get_global_optionset("budgetstatus").await.unwrap();
        assert!(empty.is_empty());
    }
}
