//! `$ref` associations between existing records.
//!
//! Navigation property names are passed through as given; the server rejects
//! names that do not exist on the source entity.

use rmcp::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::common::{record_path, Record};
use crate::error::CrmError;
use crate::odata::{entity_set_name, ODataClient, ODataQuery};

/// POST `/{source}({id})/{navigation}/$ref` pointing at the target record.
pub async fn associate(
    odata: &ODataClient,
    source_set: &str,
    source_id: &str,
    navigation: &str,
    target_set: &str,
    target_id: &str,
) -> Result<(), CrmError> {
    let target = format!("{}{}", odata.base_url(), record_path(target_set, target_id));
    odata
        .post(
            &format!("{}/{}/$ref", record_path(source_set, source_id), navigation),
            &json!({ "@odata.id": target }),
        )
        .await
        .map(|_| ())
}

/// DELETE `/{source}({id})/{navigation}({target})/$ref`.
pub async fn disassociate(
    odata: &ODataClient,
    source_set: &str,
    source_id: &str,
    navigation: &str,
    target_id: &str,
) -> Result<(), CrmError> {
    odata
        .delete(&format!(
            "{}/{}({})/$ref",
            record_path(source_set, source_id),
            navigation,
            target_id
        ))
        .await
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordLink {
    /// Logical name of the source entity, e.g. `account`
    pub source_entity_type: String,
    pub source_id: String,
    /// Logical name of the target entity, e.g. `contact`
    pub target_entity_type: String,
    pub target_id: String,
    /// Collection-valued navigation property on the source entity
    pub relationship_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RelatedRecordsParams {
    /// Logical name of the entity, e.g. `account`
    pub entity_type: String,
    pub id: String,
    /// Navigation property to follow, e.g. `contact_customer_accounts`
    pub navigation_property: String,
    /// Comma-separated columns to return
    #[serde(default)]
    pub select: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Generic relationship API client.
#[derive(Clone, Debug)]
pub struct RelationshipsClient {
    odata: ODataClient,
}

impl RelationshipsClient {
    pub fn new(odata: ODataClient) -> Self {
        Self { odata }
    }

    pub async fn associate_records(&self, link: &RecordLink) -> Result<(), CrmError> {
        associate(
            &self.odata,
            &entity_set_name(&link.source_entity_type),
            &link.source_id,
            &link.relationship_name,
            &entity_set_name(&link.target_entity_type),
            &link.target_id,
        )
        .await
    }

    pub async fn disassociate_records(&self, link: &RecordLink) -> Result<(), CrmError> {
        disassociate(
            &self.odata,
            &entity_set_name(&link.source_entity_type),
            &link.source_id,
            &link.relationship_name,
            &link.target_id,
        )
        .await
    }

    pub async fn list_related_records(
        &self,
        params: &RelatedRecordsParams,
    ) -> Result<Vec<Record>, CrmError> {
        let mut query = ODataQuery::new();
        if let Some(select) = params.select.as_deref().filter(|s| !s.is_empty()) {
            query = query.select(select.split(',').map(str::trim));
        }
        if let Some(limit) = params.limit.filter(|l| *l > 0) {
            query = query.top(limit);
        }
        let endpoint = format!(
            "{}/{}",
            record_path(&entity_set_name(&params.entity_type), &params.id),
            params.navigation_property
        );
        let collection = self
            .odata
            .get_collection::<Record>(&endpoint, Some(&query))
            .await?;
        Ok(collection.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{collection, no_content, odata_client, ScriptedTransport, BASE_URL};
    use reqwest::Method;
    use std::sync::Arc;

    fn link() -> RecordLink {
        RecordLink {
            source_entity_type: "opportunity".to_string(),
            source_id: "O1".to_string(),
            target_entity_type: "competitor".to_string(),
            target_id: "X1".to_string(),
            relationship_name: "opportunitycompetitors_association".to_string(),
        }
    }

    #[tokio::test]
    async fn test_associate_posts_absolute_reference() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(no_content());
        let client = RelationshipsClient::new(odata_client(transport.clone()));

        client.associate_records(&link()).await.unwrap();

        let request = transport.last_request();
        assert_eq!(request.method, Method::POST);
        assert_eq!(
            request.url,
            format!(
                "{}/opportunities(O1)/opportunitycompetitors_association/$ref",
                BASE_URL
            )
        );
        assert_eq!(
            transport.body_json(0),
            json!({"@odata.id": format!("{}/competitors(X1)", BASE_URL)})
        );
    }

    #[tokio::test]
    async fn test_disassociate_deletes_keyed_reference() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(no_content());
        let client = RelationshipsClient::new(odata_client(transport.clone()));

        client.disassociate_records(&link()).await.unwrap();

        let request = transport.last_request();
        assert_eq!(request.method, Method::DELETE);
        assert!(request
            .url
            .ends_with("/opportunities(O1)/opportunitycompetitors_association(X1)/$ref"));
    }

    #[tokio::test]
    async fn test_list_related_applies_select_and_top() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(collection(vec![json!({"contactid": "K1"})]));
        let client = RelationshipsClient::new(odata_client(transport.clone()));

        let records = client
            .list_related_records(&RelatedRecordsParams {
                entity_type: "account".to_string(),
                id: "A1".to_string(),
                navigation_property: "contact_customer_accounts".to_string(),
                select: Some("contactid, fullname".to_string()),
                limit: Some(5),
            })
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        let url = transport.last_request().url;
        assert!(url.contains("/accounts(A1)/contact_customer_accounts?$select=contactid,fullname&$top=5"));
    }
}
