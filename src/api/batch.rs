//! Multi-record create, update, delete and upsert with per-item accounting.
//!
//! Create, update and delete dispatch every request concurrently and then
//! tally the outcomes in input order. Without `continue_on_error` the tally
//! stops at the first failure, but requests already dispatched still run to
//! completion. Upsert runs strictly in order and really stops.

use std::collections::BTreeMap;

use futures::future::join_all;
use rmcp::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::common::{record_path, Record};
use crate::error::CrmError;
use crate::odata::{entity_set_name, ODataClient};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchError {
    pub index: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<BatchError>,
    /// Ids of created records in input order (create only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpsertResult {
    pub succeeded: usize,
    pub failed: usize,
    pub created: usize,
    pub updated: usize,
    pub errors: Vec<BatchError>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RecordUpdate {
    pub id: String,
    /// Wire attributes to write
    pub data: Record,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpsertRecord {
    /// Primary key; the record is updated in place
    #[serde(default)]
    pub id: Option<String>,
    /// Alternate key columns and values, used when no id is given
    #[serde(default)]
    pub alternate_key: Option<BTreeMap<String, String>>,
    pub data: Record,
}

impl UpsertRecord {
    /// Keyed path segment, or `None` when the record should be created.
    fn key(&self) -> Option<String> {
        if let Some(id) = self.id.as_deref().filter(|id| !id.is_empty()) {
            return Some(id.to_string());
        }
        self.alternate_key
            .as_ref()
            .filter(|key| !key.is_empty())
            .map(|key| {
                key.iter()
                    .map(|(column, value)| format!("{}='{}'", column, value))
                    .collect::<Vec<_>>()
                    .join(",")
            })
    }
}

/// Tallies settled outcomes in dispatch order.
fn tally(outcomes: Vec<Result<Option<String>, CrmError>>, continue_on_error: bool) -> BatchResult {
    let mut result = BatchResult::default();
    let mut created_ids = Vec::new();
    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(id) => {
                result.succeeded += 1;
                created_ids.extend(id);
            }
            Err(e) => {
                result.failed += 1;
                result.errors.push(BatchError {
                    index,
                    message: e.to_string(),
                });
                if !continue_on_error {
                    break;
                }
            }
        }
    }
    result.created_ids = Some(created_ids);
    result
}

/// Batch API client.
#[derive(Clone, Debug)]
pub struct BatchClient {
    odata: ODataClient,
}

impl BatchClient {
    pub fn new(odata: ODataClient) -> Self {
        Self { odata }
    }

    pub async fn batch_create(
        &self,
        entity_type: &str,
        records: &[Record],
        continue_on_error: bool,
    ) -> Result<BatchResult, CrmError> {
        let endpoint = format!("/{}", entity_set_name(entity_type));
        let outcomes = join_all(records.iter().map(|record| {
            let endpoint = endpoint.as_str();
            async move {
                let body = Value::Object(record.clone());
                self.odata
                    .create_entity(endpoint, &body)
                    .await
                    .map(|created| Some(created.id))
            }
        }))
        .await;
        tracing::debug!(entity_type, count = records.len(), "batch create settled");
        Ok(tally(outcomes, continue_on_error))
    }

    pub async fn batch_update(
        &self,
        entity_type: &str,
        updates: &[RecordUpdate],
        continue_on_error: bool,
    ) -> Result<BatchResult, CrmError> {
        let entity_set = entity_set_name(entity_type);
        let outcomes = join_all(updates.iter().map(|update| {
            let entity_set = entity_set.as_str();
            async move {
                let body = Value::Object(update.data.clone());
                self.odata
                    .patch(&record_path(entity_set, &update.id), &body)
                    .await
                    .map(|_| None)
            }
        }))
        .await;
        let mut result = tally(outcomes, continue_on_error);
        result.created_ids = None;
        Ok(result)
    }

    pub async fn batch_delete(
        &self,
        entity_type: &str,
        ids: &[String],
        continue_on_error: bool,
    ) -> Result<BatchResult, CrmError> {
        let entity_set = entity_set_name(entity_type);
        let outcomes = join_all(ids.iter().map(|id| {
            let entity_set = entity_set.as_str();
            async move {
                self.odata
                    .delete(&record_path(entity_set, id))
                    .await
                    .map(|_| None)
            }
        }))
        .await;
        let mut result = tally(outcomes, continue_on_error);
        result.created_ids = None;
        Ok(result)
    }

    /// Keyed records are PATCHed with `If-Match: *` (update only); unkeyed
    /// records are POSTed.
    pub async fn batch_upsert(
        &self,
        entity_type: &str,
        records: &[UpsertRecord],
        continue_on_error: bool,
    ) -> Result<UpsertResult, CrmError> {
        let entity_set = entity_set_name(entity_type);
        let mut result = UpsertResult::default();

        for (index, record) in records.iter().enumerate() {
            let body = Value::Object(record.data.clone());
            let key = record.key();
            let outcome = match &key {
                Some(key) => self
                    .odata
                    .patch_with_headers(
                        &record_path(&entity_set, key),
                        &body,
                        &[("If-Match", "*")],
                    )
                    .await,
                None => self
                    .odata
                    .post(&format!("/{}", entity_set), &body)
                    .await
                    .map(|_| ()),
            };

            match outcome {
                Ok(()) => {
                    result.succeeded += 1;
                    if key.is_some() {
                        result.updated += 1;
                    } else {
                        result.created += 1;
                    }
                }
                Err(e) => {
                    tracing::debug!(index, error = %e, "batch upsert item failed");
                    result.failed += 1;
                    result.errors.push(BatchError {
                        index,
                        message: e.to_string(),
                    });
                    if !continue_on_error {
                        break;
                    }
                }
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{created, json_response, no_content, odata_client, ScriptedTransport};
    use reqwest::Method;
    use serde_json::json;
    use std::sync::Arc;

    fn records(count: usize) -> Vec<Record> {
        (0..count)
            .map(|i| {
                let mut record = Record::new();
                record.insert("name".to_string(), json!(format!("Account {}", i)));
                record
            })
            .collect()
    }

    fn bad_request() -> crate::transport::HttpResponse {
        json_response(400, json!({"error": {"message": "name is too long"}}))
    }

    #[tokio::test]
    async fn test_create_continues_past_failure() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(created("accounts", "A0"));
        transport.push(created("accounts", "A1"));
        transport.push(bad_request());
        transport.push(created("accounts", "A3"));
        transport.push(created("accounts", "A4"));
        let client = BatchClient::new(odata_client(transport.clone()));

        let result = client
            .batch_create("account", &records(5), true)
            .await
            .unwrap();

        assert_eq!(result.succeeded, 4);
        assert_eq!(result.failed, 1);
        assert_eq!(result.errors[0].index, 2);
        assert!(result.errors[0].message.contains("name is too long"));
        assert_eq!(
            result.created_ids,
            Some(vec![
                "A0".to_string(),
                "A1".to_string(),
                "A3".to_string(),
                "A4".to_string()
            ])
        );
    }

    #[tokio::test]
    async fn test_stop_on_error_halts_accounting_not_dispatch() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(created("accounts", "A0"));
        transport.push(bad_request());
        transport.push(created("accounts", "A2"));
        let client = BatchClient::new(odata_client(transport.clone()));

        let result = client
            .batch_create("account", &records(3), false)
            .await
            .unwrap();

        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.created_ids, Some(vec!["A0".to_string()]));
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_delete_has_no_created_ids() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(no_content());
        transport.push(no_content());
        let client = BatchClient::new(odata_client(transport.clone()));

        let result = client
            .batch_delete("opportunity", &["O1".to_string(), "O2".to_string()], false)
            .await
            .unwrap();

        assert_eq!(result.succeeded, 2);
        assert!(result.created_ids.is_none());
        let requests = transport.requests();
        assert_eq!(requests[0].method, Method::DELETE);
        assert!(requests[1].url.ends_with("/opportunities(O2)"));
    }

    #[tokio::test]
    async fn test_upsert_counts_created_and_updated() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(no_content());
        transport.push(no_content());
        transport.push(no_content());
        let client = BatchClient::new(odata_client(transport.clone()));

        let data = records(1).remove(0);
        let mut key = BTreeMap::new();
        key.insert("accountnumber".to_string(), "ACC-9".to_string());
        let upserts = vec![
            UpsertRecord {
                id: Some("A1".to_string()),
                alternate_key: None,
                data: data.clone(),
            },
            UpsertRecord {
                id: None,
                alternate_key: Some(key),
                data: data.clone(),
            },
            UpsertRecord {
                id: None,
                alternate_key: None,
                data,
            },
        ];

        let result = client.batch_upsert("account", &upserts, false).await.unwrap();
        assert_eq!(result.succeeded, 3);
        assert_eq!(result.updated, 2);
        assert_eq!(result.created, 1);

        let requests = transport.requests();
        assert_eq!(requests[0].method, Method::PATCH);
        assert_eq!(requests[0].header_value("If-Match"), Some("*"));
        assert!(requests[1].url.ends_with("/accounts(accountnumber='ACC-9')"));
        assert_eq!(requests[2].method, Method::POST);
        assert!(requests[2].url.ends_with("/accounts"));
    }

    #[tokio::test]
    async fn test_upsert_stops_sequentially() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(bad_request());
        let client = BatchClient::new(odata_client(transport.clone()));

        let upserts: Vec<UpsertRecord> = records(3)
            .into_iter()
            .map(|data| UpsertRecord {
                data,
                ..Default::default()
            })
            .collect();
        let result = client.batch_upsert("account", &upserts, false).await.unwrap();

        assert_eq!(result.failed, 1);
        assert_eq!(result.succeeded, 0);
        assert_eq!(transport.requests().len(), 1);
    }
}
