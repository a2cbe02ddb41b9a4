//! Service cases (`incident` records).

use rmcp::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::common::{
    custom_fields, fetch_one, fetch_page, record_path, PaginatedResponse, PaginationParams,
};
use super::wire::WireBody;
use crate::error::CrmError;
use crate::odata::{ODataClient, ODataQuery, SortOrder};

pub const ENTITY_SET: &str = "incidents";

const SELECT: &[&str] = &[
    "incidentid",
    "title",
    "ticketnumber",
    "description",
    "caseorigincode",
    "casetypecode",
    "prioritycode",
    "severitycode",
    "statuscode",
    "statecode",
    "escalatedon",
    "isescalated",
    "followupby",
    "_customerid_value",
    "_primarycontactid_value",
    "_productid_value",
    "_subjectid_value",
    "_ownerid_value",
    "_entitlementid_value",
    "_contractid_value",
    "_contractdetailid_value",
    "resolveby",
    "responseby",
    "createdon",
    "modifiedon",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    #[default]
    Active,
    Resolved,
    Cancelled,
}

impl CaseStatus {
    pub fn from_state_code(state_code: Option<i32>) -> Self {
        match state_code {
            Some(1) => CaseStatus::Resolved,
            Some(2) => CaseStatus::Cancelled,
            _ => CaseStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncidentRecord {
    #[serde(default)]
    pub incidentid: String,
    pub title: Option<String>,
    pub ticketnumber: Option<String>,
    pub description: Option<String>,
    pub caseorigincode: Option<i32>,
    pub casetypecode: Option<i32>,
    pub prioritycode: Option<i32>,
    pub severitycode: Option<i32>,
    pub statecode: Option<i32>,
    pub statuscode: Option<i32>,
    pub escalatedon: Option<String>,
    pub isescalated: Option<bool>,
    pub followupby: Option<String>,
    #[serde(rename = "_customerid_value")]
    pub customerid: Option<String>,
    #[serde(rename = "_primarycontactid_value")]
    pub primarycontactid: Option<String>,
    #[serde(rename = "_productid_value")]
    pub productid: Option<String>,
    #[serde(rename = "_subjectid_value")]
    pub subjectid: Option<String>,
    #[serde(rename = "_ownerid_value")]
    pub ownerid: Option<String>,
    #[serde(rename = "_entitlementid_value")]
    pub entitlementid: Option<String>,
    #[serde(rename = "_contractid_value")]
    pub contractid: Option<String>,
    #[serde(rename = "_contractdetailid_value")]
    pub contractdetailid: Option<String>,
    pub resolveby: Option<String>,
    pub responseby: Option<String>,
    pub createdon: Option<String>,
    pub modifiedon: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    pub id: String,
    pub title: Option<String>,
    pub ticket_number: Option<String>,
    pub description: Option<String>,
    pub case_origin_code: Option<i32>,
    pub case_type_code: Option<i32>,
    pub priority_code: Option<i32>,
    pub severity_code: Option<i32>,
    pub status: CaseStatus,
    pub state_code: Option<i32>,
    pub escalated_on: Option<String>,
    pub is_escalated: Option<bool>,
    pub follow_up_by: Option<String>,
    pub customer_id: Option<String>,
    pub primary_contact_id: Option<String>,
    pub product_id: Option<String>,
    pub subject_id: Option<String>,
    pub owner_id: Option<String>,
    pub entitlement_id: Option<String>,
    pub contract_id: Option<String>,
    pub contract_detail_id: Option<String>,
    pub resolve_by: Option<String>,
    pub response_by: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Map<String, Value>>,
}

impl From<IncidentRecord> for Case {
    fn from(d: IncidentRecord) -> Self {
        Self {
            id: d.incidentid,
            title: d.title,
            ticket_number: d.ticketnumber,
            description: d.description,
            case_origin_code: d.caseorigincode,
            case_type_code: d.casetypecode,
            priority_code: d.prioritycode,
            severity_code: d.severitycode,
            status: CaseStatus::from_state_code(d.statecode),
            state_code: d.statecode,
            escalated_on: d.escalatedon,
            is_escalated: d.isescalated,
            follow_up_by: d.followupby,
            customer_id: d.customerid,
            primary_contact_id: d.primarycontactid,
            product_id: d.productid,
            subject_id: d.subjectid,
            owner_id: d.ownerid,
            entitlement_id: d.entitlementid,
            contract_id: d.contractid,
            contract_detail_id: d.contractdetailid,
            resolve_by: d.resolveby,
            response_by: d.responseby,
            created_at: d.createdon,
            updated_at: d.modifiedon,
            custom_fields: custom_fields(d.extra),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CaseCreateInput {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// 1 phone, 2 email, 3 web, ...
    #[serde(default)]
    pub case_origin_code: Option<i32>,
    /// 1 question, 2 problem, 3 request
    #[serde(default)]
    pub case_type_code: Option<i32>,
    /// 1 high, 2 normal, 3 low
    #[serde(default)]
    pub priority_code: Option<i32>,
    #[serde(default)]
    pub severity_code: Option<i32>,
    /// Customer account; one of account or contact is required by the server
    #[serde(default)]
    pub customer_account_id: Option<String>,
    /// Customer contact
    #[serde(default)]
    pub customer_contact_id: Option<String>,
    #[serde(default)]
    pub primary_contact_id: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub subject_id: Option<String>,
    #[serde(default)]
    pub custom_fields: Option<Map<String, Value>>,
}

impl CaseCreateInput {
    pub fn to_wire(&self) -> WireBody {
        WireBody::new()
            .value("title", self.title.clone())
            .field("description", &self.description)
            .field("caseorigincode", &self.case_origin_code)
            .field("casetypecode", &self.case_type_code)
            .field("prioritycode", &self.priority_code)
            .field("severitycode", &self.severity_code)
            .bind("customerid_account", "accounts", &self.customer_account_id)
            .bind("customerid_contact", "contacts", &self.customer_contact_id)
            .bind("primarycontactid", "contacts", &self.primary_contact_id)
            .bind("productid", "products", &self.product_id)
            .bind("subjectid", "subjects", &self.subject_id)
            .custom(&self.custom_fields)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CaseUpdateInput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub case_origin_code: Option<i32>,
    #[serde(default)]
    pub case_type_code: Option<i32>,
    #[serde(default)]
    pub priority_code: Option<i32>,
    #[serde(default)]
    pub severity_code: Option<i32>,
    #[serde(default)]
    pub custom_fields: Option<Map<String, Value>>,
}

impl CaseUpdateInput {
    pub fn to_wire(&self) -> WireBody {
        WireBody::new()
            .field("title", &self.title)
            .field("description", &self.description)
            .field("caseorigincode", &self.case_origin_code)
            .field("casetypecode", &self.case_type_code)
            .field("prioritycode", &self.priority_code)
            .field("severitycode", &self.severity_code)
            .custom(&self.custom_fields)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CaseResolution {
    /// Subject of the resolution activity
    pub subject: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Minutes spent on the case
    #[serde(default)]
    pub time_spent: Option<i32>,
}

impl CaseResolution {
    /// `CloseIncident` body; status -1 lets the server pick the default
    /// resolved status.
    pub fn to_action_body(&self, case_id: &str) -> Value {
        let resolution = WireBody::new()
            .value("subject", self.subject.clone())
            .field("description", &self.description)
            .field("timespent", &self.time_spent)
            .bind_id("incidentid", ENTITY_SET, case_id);
        json!({
            "IncidentResolution": resolution.into_value(),
            "Status": -1,
        })
    }
}

/// Cases API client.
#[derive(Clone, Debug)]
pub struct CasesClient {
    odata: ODataClient,
}

impl CasesClient {
    pub fn new(odata: ODataClient) -> Self {
        Self { odata }
    }

    pub async fn list_cases(
        &self,
        params: &PaginationParams,
    ) -> Result<PaginatedResponse<Case>, CrmError> {
        let query = ODataQuery::new()
            .select(SELECT.iter().copied())
            .orderby("createdon", SortOrder::Desc);
        fetch_page::<IncidentRecord, _>(&self.odata, ENTITY_SET, query, params).await
    }

    pub async fn get_case(&self, id: &str) -> Result<Case, CrmError> {
        fetch_one::<IncidentRecord, _>(&self.odata, ENTITY_SET, id, SELECT).await
    }

    pub async fn create_case(&self, input: &CaseCreateInput) -> Result<Case, CrmError> {
        let created = self
            .odata
            .create_entity(&format!("/{}", ENTITY_SET), &input.to_wire().into_value())
            .await?;
        self.get_case(&created.id).await
    }

    pub async fn update_case(&self, id: &str, input: &CaseUpdateInput) -> Result<Case, CrmError> {
        self.odata
            .patch(&record_path(ENTITY_SET, id), &input.to_wire().into_value())
            .await?;
        self.get_case(id).await
    }

    pub async fn delete_case(&self, id: &str) -> Result<(), CrmError> {
        self.odata.delete(&record_path(ENTITY_SET, id)).await
    }

    pub async fn resolve_case(&self, id: &str, resolution: &CaseResolution) -> Result<(), CrmError> {
        self.odata
            .post(
                &format!(
                    "{}/Microsoft.Dynamics.CRM.CloseIncident",
                    record_path(ENTITY_SET, id)
                ),
                &resolution.to_action_body(id),
            )
            .await
            .map(|_| ())
    }

    /// statecode 2 / statuscode 6
    pub async fn cancel_case(&self, id: &str) -> Result<(), CrmError> {
        self.set_state(id, 2, 6).await
    }

    /// Back to active, in progress.
    pub async fn reactivate_case(&self, id: &str) -> Result<(), CrmError> {
        self.set_state(id, 0, 1).await
    }

    async fn set_state(&self, id: &str, state: i32, status: i32) -> Result<(), CrmError> {
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
    use reqwest::Method;
    use std::sync::Arc;

    #[test]
    fn test_status_mapping() {
        assert_eq!(CaseStatus::from_state_code(Some(0)), CaseStatus::Active);
        assert_eq!(CaseStatus::from_state_code(Some(1)), CaseStatus::Resolved);
        assert_eq!(CaseStatus::from_state_code(Some(2)), CaseStatus::Cancelled);
        assert_eq!(CaseStatus::from_state_code(Some(9)), CaseStatus::Active);
        assert_eq!(CaseStatus::from_state_code(None), CaseStatus::Active);
    }

    #[test]
    fn test_create_binds_customer_and_contact() {
        let input = CaseCreateInput {
            title: "Printer offline".to_string(),
            priority_code: Some(1),
            customer_account_id: Some("A1".to_string()),
            primary_contact_id: Some("K1".to_string()),
            ..Default::default()
        };
        assert_eq!(
            input.to_wire().into_value(),
            json!({
                "title": "Printer offline",
                "prioritycode": 1,
                "customerid_account@odata.bind": "/accounts(A1)",
                "primarycontactid@odata.bind": "/contacts(K1)"
            })
        );
    }

    #[tokio::test]
    async fn test_resolve_posts_incident_resolution() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(no_content());
        let client = CasesClient::new(odata_client(transport.clone()));

        client
            .resolve_case(
                "I1",
                &CaseResolution {
                    subject: "Replaced cable".to_string(),
                    description: None,
                    time_spent: Some(30),
                },
            )
            .await
            .unwrap();

        let request = transport.last_request();
        assert_eq!(request.method, Method::POST);
        assert!(request
            .url
            .ends_with("/incidents(I1)/Microsoft.Dynamics.CRM.CloseIncident"));
        assert_eq!(
            transport.body_json(0),
            json!({
                "IncidentResolution": {
                    "subject": "Replaced cable",
                    "timespent": 30,
                    "incidentid@odata.bind": "/incidents(I1)"
                },
                "Status": -1
            })
        );
    }

    #[tokio::test]
    async fn test_cancel_and_reactivate_patch_state() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(no_content());
        transport.push(no_content());
        let client = CasesClient::new(odata_client(transport.clone()));

        client.cancel_case("I1").await.unwrap();
        client.reactivate_case("I1").await.unwrap();

        assert_eq!(transport.body_json(0), json!({"statecode": 2, "statuscode": 6}));
        assert_eq!(transport.body_json(1), json!({"statecode": 0, "statuscode": 1}));
        assert_eq!(transport.requests()[1].method, Method::PATCH);
    }
}
