//! Activities: the `activitypointers` projection plus the concrete activity
//! entity sets (tasks, phone calls, emails, appointments, letters, faxes).

use rmcp::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::common::{custom_fields, fetch_one, fetch_page, record_path, PaginatedResponse, PaginationParams, Record};
use super::wire::WireBody;
use crate::error::CrmError;
use crate::odata::{entity_set_name, ODataClient, ODataQuery, SortOrder};

pub const ENTITY_SET: &str = "activitypointers";

const SELECT: &[&str] = &[
    "activityid",
    "subject",
    "description",
    "activitytypecode",
    "scheduledstart",
    "scheduledend",
    "actualend",
    "actualdurationminutes",
    "statecode",
    "statuscode",
    "createdon",
    "modifiedon",
    "_regardingobjectid_value",
    "_ownerid_value",
];

// activityparty.participationtypemask
const PARTY_FROM: i32 = 1;
const PARTY_TO: i32 = 2;
const PARTY_REQUIRED_ATTENDEE: i32 = 5;
const PARTY_OPTIONAL_ATTENDEE: i32 = 6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Call,
    Email,
    Meeting,
    Task,
    Note,
    #[default]
    Other,
}

impl ActivityType {
    pub fn from_type_code(code: Option<&str>) -> Self {
        match code {
            Some("phonecall") => ActivityType::Call,
            Some("email") => ActivityType::Email,
            Some("appointment") => ActivityType::Meeting,
            Some("task") => ActivityType::Task,
            Some("annotation") => ActivityType::Note,
            _ => ActivityType::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    #[default]
    Pending,
    Completed,
    Cancelled,
}

impl ActivityStatus {
    pub fn from_state_code(state_code: Option<i32>) -> Self {
        match state_code {
            Some(1) => ActivityStatus::Completed,
            Some(2) => ActivityStatus::Cancelled,
            _ => ActivityStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActivityRecord {
    #[serde(default)]
    pub activityid: String,
    pub subject: Option<String>,
    pub description: Option<String>,
    pub activitytypecode: Option<String>,
    pub scheduledstart: Option<String>,
    pub scheduledend: Option<String>,
    pub actualend: Option<String>,
    pub actualdurationminutes: Option<i32>,
    pub statecode: Option<i32>,
    pub statuscode: Option<i32>,
    pub createdon: Option<String>,
    pub modifiedon: Option<String>,
    #[serde(rename = "_regardingobjectid_value")]
    pub regardingobjectid: Option<String>,
    #[serde(rename = "_ownerid_value")]
    pub ownerid: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Normalized activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub subject: String,
    pub body: Option<String>,
    pub status: ActivityStatus,
    pub due_date: Option<String>,
    pub completed_date: Option<String>,
    pub duration_minutes: Option<i32>,
    pub activity_date: Option<String>,
    pub regarding_id: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub owner_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Map<String, Value>>,
}

impl From<ActivityRecord> for Activity {
    fn from(d: ActivityRecord) -> Self {
        Self {
            id: d.activityid,
            activity_type: ActivityType::from_type_code(d.activitytypecode.as_deref()),
            subject: d.subject.unwrap_or_default(),
            body: d.description,
            status: ActivityStatus::from_state_code(d.statecode),
            due_date: d.scheduledend,
            completed_date: d.actualend,
            duration_minutes: d.actualdurationminutes,
            activity_date: d.scheduledstart,
            regarding_id: d.regardingobjectid,
            created_at: d.createdon,
            updated_at: d.modifiedon,
            owner_id: d.ownerid,
            custom_fields: custom_fields(d.extra),
        }
    }
}

/// `regardingobjectid_{type}@odata.bind` when both parts are given.
fn regarding(body: WireBody, regarding_type: &Option<String>, regarding_id: &Option<String>) -> WireBody {
    match (regarding_type.as_deref(), regarding_id) {
        (Some(kind), Some(_)) if !kind.is_empty() => body.bind(
            &format!("regardingobjectid_{}", kind),
            &entity_set_name(kind),
            regarding_id,
        ),
        _ => body,
    }
}

fn contact_party(mask: i32, contact_id: &str) -> Value {
    json!({
        "participationtypemask": mask,
        "partyid_contact@odata.bind": record_path("contacts", contact_id),
    })
}

fn user_parties(mask: i32, user_ids: &[String]) -> impl Iterator<Item = Value> + '_ {
    user_ids.iter().map(move |id| {
        json!({
            "participationtypemask": mask,
            "partyid_systemuser@odata.bind": record_path("systemusers", id),
        })
    })
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActivityListParams {
    #[serde(flatten)]
    pub pagination: PaginationParams,
    /// Only activities regarding this record
    #[serde(default)]
    pub record_id: Option<String>,
}

/// Task creation input.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActivityCreateInput {
    pub subject: String,
    #[serde(default)]
    pub body: Option<String>,
    /// Due date (ISO 8601)
    #[serde(default)]
    pub due_date: Option<String>,
    /// Contacts; the first one becomes the regarding record
    #[serde(default)]
    pub contact_ids: Vec<String>,
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub deal_id: Option<String>,
    #[serde(default)]
    pub custom_fields: Option<Map<String, Value>>,
}

impl ActivityCreateInput {
    /// Regarding precedence: first contact, then company, then deal.
    pub fn to_wire(&self) -> WireBody {
        let body = WireBody::new()
            .value("subject", self.subject.clone())
            .field("description", &self.body)
            .field("scheduledend", &self.due_date);
        let body = if let Some(contact) = self.contact_ids.first() {
            body.bind_id("regardingobjectid_contact", "contacts", contact)
        } else if self.company_id.is_some() {
            body.bind("regardingobjectid_account", "accounts", &self.company_id)
        } else {
            body.bind("regardingobjectid_opportunity", "opportunities", &self.deal_id)
        };
        body.custom(&self.custom_fields)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActivityUpdateInput {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub scheduled_start: Option<String>,
    #[serde(default)]
    pub scheduled_end: Option<String>,
    /// 0 low, 1 normal, 2 high
    #[serde(default)]
    pub priority_code: Option<i32>,
}

impl ActivityUpdateInput {
    pub fn to_wire(&self) -> WireBody {
        WireBody::new()
            .field("subject", &self.subject)
            .field("description", &self.description)
            .field("scheduledstart", &self.scheduled_start)
            .field("scheduledend", &self.scheduled_end)
            .field("prioritycode", &self.priority_code)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogCallInput {
    pub contact_id: String,
    pub subject: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<i32>,
}

impl LogCallInput {
    /// Completed ("Made") phone call to the contact.
    pub fn to_wire(&self) -> WireBody {
        WireBody::new()
            .value("subject", self.subject.clone())
            .field("description", &self.notes)
            .value("actualdurationminutes", self.duration_minutes.unwrap_or(0))
            .value(
                "phonecall_activity_parties",
                json!([contact_party(PARTY_TO, &self.contact_id)]),
            )
            .value("statecode", 1)
            .value("statuscode", 2)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EmailDirection {
    #[default]
    Sent,
    Received,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogEmailInput {
    pub contact_id: String,
    pub subject: String,
    pub body: String,
    /// sent (outgoing) or received (incoming)
    #[serde(default)]
    pub direction: EmailDirection,
}

impl LogEmailInput {
    pub fn to_wire(&self) -> WireBody {
        let sent = self.direction == EmailDirection::Sent;
        let (mask, status) = if sent { (PARTY_TO, 2) } else { (PARTY_FROM, 3) };
        WireBody::new()
            .value("subject", self.subject.clone())
            .value("description", self.body.clone())
            .value("directioncode", sent)
            .value(
                "email_activity_parties",
                json!([contact_party(mask, &self.contact_id)]),
            )
            .value("statecode", 1)
            .value("statuscode", status)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentInput {
    pub subject: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    /// Start (ISO 8601)
    pub scheduled_start: String,
    /// End (ISO 8601)
    pub scheduled_end: String,
    #[serde(default)]
    pub regarding_id: Option<String>,
    /// Logical name of the regarding record, e.g. `account`
    #[serde(default)]
    pub regarding_type: Option<String>,
    /// System user IDs
    #[serde(default)]
    pub required_attendees: Vec<String>,
    /// System user IDs
    #[serde(default)]
    pub optional_attendees: Vec<String>,
    #[serde(default)]
    pub is_all_day_event: bool,
}

impl AppointmentInput {
    pub fn to_wire(&self) -> WireBody {
        let body = WireBody::new()
            .value("subject", self.subject.clone())
            .field("description", &self.description)
            .field("location", &self.location)
            .value("scheduledstart", self.scheduled_start.clone())
            .value("scheduledend", self.scheduled_end.clone())
            .value("isalldayevent", self.is_all_day_event);
        let body = regarding(body, &self.regarding_type, &self.regarding_id);

        let parties: Vec<Value> = user_parties(PARTY_REQUIRED_ATTENDEE, &self.required_attendees)
            .chain(user_parties(PARTY_OPTIONAL_ATTENDEE, &self.optional_attendees))
            .collect();
        if parties.is_empty() {
            body
        } else {
            body.value("appointment_activity_parties", parties)
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LetterInput {
    pub subject: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub regarding_id: Option<String>,
    #[serde(default)]
    pub regarding_type: Option<String>,
    /// Postal address the letter is sent to
    #[serde(default)]
    pub address: Option<String>,
}

impl LetterInput {
    pub fn to_wire(&self) -> WireBody {
        let body = WireBody::new()
            .value("subject", self.subject.clone())
            .field("description", &self.description)
            .field("address", &self.address);
        regarding(body, &self.regarding_type, &self.regarding_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FaxInput {
    pub subject: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub regarding_id: Option<String>,
    #[serde(default)]
    pub regarding_type: Option<String>,
    #[serde(default)]
    pub fax_number: Option<String>,
}

impl FaxInput {
    pub fn to_wire(&self) -> WireBody {
        let body = WireBody::new()
            .value("subject", self.subject.clone())
            .field("description", &self.description)
            .field("faxnumber", &self.fax_number);
        regarding(body, &self.regarding_type, &self.regarding_id)
    }
}

/// Activities API client.
#[derive(Clone, Debug)]
pub struct ActivitiesClient {
    odata: ODataClient,
}

impl ActivitiesClient {
    pub fn new(odata: ODataClient) -> Self {
        Self { odata }
    }

    pub async fn list_activities(
        &self,
        params: &ActivityListParams,
    ) -> Result<PaginatedResponse<Activity>, CrmError> {
        let mut query = ODataQuery::new()
            .select(SELECT.iter().copied())
            .orderby("modifiedon", SortOrder::Desc);
        if let Some(record_id) = &params.record_id {
            query = query.filter(format!("_regardingobjectid_value eq {}", record_id));
        }
        fetch_page::<ActivityRecord, _>(&self.odata, ENTITY_SET, query, &params.pagination).await
    }

    /// Lists one concrete activity entity (`task`, `phonecall`, ...).
    pub async fn list_activities_by_type(
        &self,
        activity_type: &str,
        params: &ActivityListParams,
    ) -> Result<PaginatedResponse<Activity>, CrmError> {
        let mut query = ODataQuery::new()
            .select(SELECT.iter().copied())
            .orderby("createdon", SortOrder::Desc);
        if let Some(record_id) = &params.record_id {
            query = query.filter(format!("_regardingobjectid_value eq {}", record_id));
        }
        fetch_page::<ActivityRecord, _>(
            &self.odata,
            &entity_set_name(activity_type),
            query,
            &params.pagination,
        )
        .await
    }

    /// Reads through `activitypointers` unless the concrete type is known.
    pub async fn get_activity(
        &self,
        id: &str,
        activity_type: Option<&str>,
    ) -> Result<Activity, CrmError> {
        let entity_set = activity_type
            .filter(|t| !t.is_empty())
            .map(entity_set_name)
            .unwrap_or_else(|| ENTITY_SET.to_string());
        fetch_one::<ActivityRecord, _>(&self.odata, &entity_set, id, SELECT).await
    }

    async fn create_typed(&self, activity_type: &str, body: WireBody) -> Result<Activity, CrmError> {
        let entity_set = entity_set_name(activity_type);
        let created = self
            .odata
            .create_entity(&format!("/{}", entity_set), &body.into_value())
            .await?;
        self.get_activity(&created.id, Some(activity_type)).await
    }

    pub async fn create_task(&self, input: &ActivityCreateInput) -> Result<Activity, CrmError> {
        self.create_typed("task", input.to_wire()).await
    }

    pub async fn update_activity(
        &self,
        id: &str,
        activity_type: &str,
        input: &ActivityUpdateInput,
    ) -> Result<Activity, CrmError> {
        self.odata
            .patch(
                &record_path(&entity_set_name(activity_type), id),
                &input.to_wire().into_value(),
            )
            .await?;
        self.get_activity(id, Some(activity_type)).await
    }

    pub async fn delete_activity(&self, id: &str, activity_type: &str) -> Result<(), CrmError> {
        self.odata
            .delete(&record_path(&entity_set_name(activity_type), id))
            .await
    }

    pub async fn complete_activity(&self, id: &str, activity_type: &str) -> Result<(), CrmError> {
        self.set_state(id, activity_type, 1, 2).await
    }

    pub async fn cancel_activity(&self, id: &str, activity_type: &str) -> Result<(), CrmError> {
        self.set_state(id, activity_type, 2, 3).await
    }

    async fn set_state(
        &self,
        id: &str,
        activity_type: &str,
        state: i32,
        status: i32,
    ) -> Result<(), CrmError> {
        self.odata
            .patch(
                &record_path(&entity_set_name(activity_type), id),
                &json!({ "statecode": state, "statuscode": status }),
            )
            .await
    }

    pub async fn log_call(&self, input: &LogCallInput) -> Result<Activity, CrmError> {
        self.create_typed("phonecall", input.to_wire()).await
    }

    pub async fn log_email(&self, input: &LogEmailInput) -> Result<Activity, CrmError> {
        self.create_typed("email", input.to_wire()).await
    }

    pub async fn create_appointment(&self, input: &AppointmentInput) -> Result<Activity, CrmError> {
        self.create_typed("appointment", input.to_wire()).await
    }

    pub async fn create_letter(&self, input: &LetterInput) -> Result<Activity, CrmError> {
        self.create_typed("letter", input.to_wire()).await
    }

    pub async fn create_fax(&self, input: &FaxInput) -> Result<Activity, CrmError> {
        self.create_typed("fax", input.to_wire()).await
    }

    /// Raw `activityparty` rows of an activity.
    pub async fn get_activity_parties(&self, activity_id: &str) -> Result<Vec<Record>, CrmError> {
        let query = ODataQuery::new()
            .filter(format!("_activityid_value eq {}", activity_id))
            .select([
                "activitypartyid",
                "participationtypemask",
                "_partyid_value",
                "addressused",
            ]);
        let collection = self
            .odata
            .get_collection::<Record>("/activityparties", Some(&query))
            .await?;
        Ok(collection.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{created, json_response, no_content, odata_client, ScriptedTransport};
    use std::sync::Arc;

    #[test]
    fn test_type_and_status_mapping() {
        let record: ActivityRecord = serde_json::from_value(json!({
            "activityid": "A1",
            "activitytypecode": "phonecall",
            "statecode": 2
        }))
        .unwrap();
        let activity = Activity::from(record);
        assert_eq!(activity.activity_type, ActivityType::Call);
        assert_eq!(activity.status, ActivityStatus::Cancelled);
        assert_eq!(activity.subject, "");

        assert_eq!(ActivityType::from_type_code(Some("annotation")), ActivityType::Note);
        assert_eq!(ActivityType::from_type_code(Some("letter")), ActivityType::Other);
        assert_eq!(ActivityStatus::from_state_code(Some(9)), ActivityStatus::Pending);
    }

    #[test]
    fn test_task_regarding_precedence() {
        let input = ActivityCreateInput {
            subject: "Follow up".to_string(),
            contact_ids: vec!["K1".to_string(), "K2".to_string()],
            company_id: Some("C1".to_string()),
            ..Default::default()
        };
        let body = input.to_wire();
        assert_eq!(
            body.get("regardingobjectid_contact@odata.bind"),
            Some(&json!("/contacts(K1)"))
        );
        assert!(body.get("regardingobjectid_account@odata.bind").is_none());

        let deal_only = ActivityCreateInput {
            subject: "Follow up".to_string(),
            deal_id: Some("O1".to_string()),
            ..Default::default()
        };
        assert_eq!(
            deal_only.to_wire().into_value(),
            json!({
                "subject": "Follow up",
                "regardingobjectid_opportunity@odata.bind": "/opportunities(O1)"
            })
        );
    }

    #[test]
    fn test_received_email_party_and_status() {
        let input = LogEmailInput {
            contact_id: "K1".to_string(),
            subject: "Re: pricing".to_string(),
            body: "Thanks".to_string(),
            direction: EmailDirection::Received,
        };
        let body = input.to_wire().into_value();
        assert_eq!(body["directioncode"], json!(false));
        assert_eq!(body["statuscode"], json!(3));
        assert_eq!(
            body["email_activity_parties"][0]["participationtypemask"],
            json!(PARTY_FROM)
        );
    }

    #[test]
    fn test_appointment_attendees_and_regarding() {
        let input = AppointmentInput {
            subject: "Demo".to_string(),
            scheduled_start: "2024-05-01T10:00:00Z".to_string(),
            scheduled_end: "2024-05-01T11:00:00Z".to_string(),
            regarding_id: Some("C1".to_string()),
            regarding_type: Some("account".to_string()),
            required_attendees: vec!["U1".to_string()],
            optional_attendees: vec!["U2".to_string()],
            ..Default::default()
        };
        let body = input.to_wire().into_value();
        assert_eq!(body["regardingobjectid_account@odata.bind"], json!("/accounts(C1)"));
        assert_eq!(body["isalldayevent"], json!(false));
        let parties = body["appointment_activity_parties"].as_array().unwrap();
        assert_eq!(parties.len(), 2);
        assert_eq!(parties[1]["partyid_systemuser@odata.bind"], json!("/systemusers(U2)"));
    }

    #[test]
    fn test_update_minimal() {
        let input = ActivityUpdateInput {
            priority_code: Some(2),
            ..Default::default()
        };
        assert_eq!(input.to_wire().into_value(), json!({"prioritycode": 2}));
    }

    #[tokio::test]
    async fn test_log_call_creates_completed_phonecall() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(created("phonecalls", "P1"));
        transport.push(json_response(
            200,
            json!({"activityid": "P1", "activitytypecode": "phonecall", "statecode": 1, "subject": "Intro"}),
        ));
        let client = ActivitiesClient::new(odata_client(transport.clone()));

        let activity = client
            .log_call(&LogCallInput {
                contact_id: "K1".to_string(),
                subject: "Intro".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let requests = transport.requests();
        assert!(requests[0].url.ends_with("/phonecalls"));
        let body = transport.body_json(0);
        assert_eq!(body["statecode"], json!(1));
        assert_eq!(body["statuscode"], json!(2));
        assert_eq!(body["actualdurationminutes"], json!(0));
        assert!(requests[1].url.contains("/phonecalls(P1)"));
        assert_eq!(activity.status, ActivityStatus::Completed);
    }

    #[tokio::test]
    async fn test_fax_uses_irregular_entity_set() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(no_content());
        let client = ActivitiesClient::new(odata_client(transport.clone()));

        client.cancel_activity("F1", "fax").await.unwrap();
        let request = transport.last_request();
        assert!(request.url.ends_with("/faxes(F1)"));
        assert_eq!(transport.body_json(0), json!({"statecode": 2, "statuscode": 3}));
    }
}
