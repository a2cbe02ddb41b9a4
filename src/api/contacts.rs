//! Contacts (`contacts` entity set).

use rmcp::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::common::{
    custom_fields, fetch_one, fetch_page, record_path, ActiveStatus, PaginatedResponse,
    PaginationParams, SearchParams,
};
use super::wire::WireBody;
use crate::error::CrmError;
use crate::odata::{ODataClient, ODataQuery, SortOrder};

pub const ENTITY_SET: &str = "contacts";

const SELECT: &[&str] = &[
    "contactid",
    "firstname",
    "lastname",
    "fullname",
    "emailaddress1",
    "telephone1",
    "mobilephone",
    "jobtitle",
    "department",
    "_parentcustomerid_value",
    "createdon",
    "modifiedon",
    "statecode",
    "_ownerid_value",
];

const SEARCH_FIELDS: &[&str] = &["fullname", "emailaddress1"];

/// Wire shape of a `contact` record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactRecord {
    #[serde(default)]
    pub contactid: String,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub fullname: Option<String>,
    pub emailaddress1: Option<String>,
    pub telephone1: Option<String>,
    pub mobilephone: Option<String>,
    pub jobtitle: Option<String>,
    pub department: Option<String>,
    #[serde(rename = "_parentcustomerid_value")]
    pub parentcustomerid: Option<String>,
    pub statecode: Option<i32>,
    pub createdon: Option<String>,
    pub modifiedon: Option<String>,
    #[serde(rename = "_ownerid_value")]
    pub ownerid: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Normalized contact.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub mobile_phone: Option<String>,
    pub title: Option<String>,
    pub department: Option<String>,
    pub company_id: Option<String>,
    pub status: ActiveStatus,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub owner_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Map<String, Value>>,
}

impl From<ContactRecord> for Contact {
    fn from(d: ContactRecord) -> Self {
        Self {
            id: d.contactid,
            first_name: d.firstname,
            last_name: d.lastname,
            full_name: d.fullname,
            email: d.emailaddress1,
            phone: d.telephone1,
            mobile_phone: d.mobilephone,
            title: d.jobtitle,
            department: d.department,
            company_id: d.parentcustomerid,
            status: ActiveStatus::from_state_code(d.statecode),
            created_at: d.createdon,
            updated_at: d.modifiedon,
            owner_id: d.ownerid,
            custom_fields: custom_fields(d.extra),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContactCreateInput {
    /// Email address (required)
    pub email: String,
    /// First name
    #[serde(default)]
    pub first_name: Option<String>,
    /// Last name
    #[serde(default)]
    pub last_name: Option<String>,
    /// Business phone
    #[serde(default)]
    pub phone: Option<String>,
    /// Job title
    #[serde(default)]
    pub title: Option<String>,
    /// Parent account ID
    #[serde(default)]
    pub company_id: Option<String>,
    /// Raw CRM attributes to set in addition to the mapped fields
    #[serde(default)]
    pub custom_fields: Option<Map<String, Value>>,
}

impl ContactCreateInput {
    pub fn to_wire(&self) -> WireBody {
        WireBody::new()
            .field("firstname", &self.first_name)
            .field("lastname", &self.last_name)
            .value("emailaddress1", self.email.clone())
            .field("telephone1", &self.phone)
            .field("jobtitle", &self.title)
            .bind("parentcustomerid_account", "accounts", &self.company_id)
            .custom(&self.custom_fields)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContactUpdateInput {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// Parent account ID; an empty string detaches the contact
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub custom_fields: Option<Map<String, Value>>,
}

impl ContactUpdateInput {
    pub fn to_wire(&self) -> WireBody {
        WireBody::new()
            .field("firstname", &self.first_name)
            .field("lastname", &self.last_name)
            .field("emailaddress1", &self.email)
            .field("telephone1", &self.phone)
            .field("jobtitle", &self.title)
            .bind_or_clear("parentcustomerid_account", "accounts", &self.company_id)
            .custom(&self.custom_fields)
    }
}

/// Contacts API client.
#[derive(Clone)]
pub struct ContactsClient {
    odata: ODataClient,
}

impl ContactsClient {
    pub fn new(odata: ODataClient) -> Self {
        Self { odata }
    }

    pub async fn list_contacts(
        &self,
        params: &PaginationParams,
    ) -> Result<PaginatedResponse<Contact>, CrmError> {
        let query = ODataQuery::new()
            .select(SELECT.iter().copied())
            .orderby("modifiedon", SortOrder::Desc);
        fetch_page::<ContactRecord, _>(&self.odata, ENTITY_SET, query, params).await
    }

    pub async fn get_contact(&self, id: &str) -> Result<Contact, CrmError> {
        fetch_one::<ContactRecord, _>(&self.odata, ENTITY_SET, id, SELECT).await
    }

    pub async fn create_contact(&self, input: &ContactCreateInput) -> Result<Contact, CrmError> {
        let created = self
            .odata
            .create_entity(&format!("/{}", ENTITY_SET), &input.to_wire().into_value())
            .await?;
        self.get_contact(&created.id).await
    }

    pub async fn update_contact(
        &self,
        id: &str,
        input: &ContactUpdateInput,
    ) -> Result<Contact, CrmError> {
        self.odata
            .patch(&record_path(ENTITY_SET, id), &input.to_wire().into_value())
            .await?;
        self.get_contact(id).await
    }

    pub async fn delete_contact(&self, id: &str) -> Result<(), CrmError> {
        self.odata.delete(&record_path(ENTITY_SET, id)).await
    }

    pub async fn search_contacts(
        &self,
        params: &SearchParams,
    ) -> Result<PaginatedResponse<Contact>, CrmError> {
        let query = params.to_query(SELECT, SEARCH_FIELDS);
        fetch_page::<ContactRecord, _>(&self.odata, ENTITY_SET, query, &params.pagination).await
    }
}

impl std::fmt::Debug for ContactsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContactsClient")
            .field("odata", &self.odata)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{created, json_response, no_content, odata_client, ScriptedTransport, BASE_URL};
    use reqwest::Method;
    use serde_json::json;
    use std::sync::Arc;

    fn contact_json(id: &str) -> Value {
        json!({
            "@odata.etag": "W/\"1001\"",
            "contactid": id,
            "firstname": "Ann",
            "lastname": "Lee",
            "fullname": "Ann Lee",
            "emailaddress1": "a@b.com",
            "telephone1": "555-0100",
            "jobtitle": "CTO",
            "_parentcustomerid_value": "C1",
            "_parentcustomerid_value@OData.Community.Display.V1.FormattedValue": "Contoso",
            "statecode": 0,
            "createdon": "2024-01-01T00:00:00Z",
            "modifiedon": "2024-01-02T00:00:00Z",
            "_ownerid_value": "U1"
        })
    }

    #[test]
    fn test_to_domain_maps_prefixed_fields() {
        let record: ContactRecord = serde_json::from_value(contact_json("K1")).unwrap();
        let contact = Contact::from(record);

        assert_eq!(contact.id, "K1");
        assert_eq!(contact.email.as_deref(), Some("a@b.com"));
        assert_eq!(contact.title.as_deref(), Some("CTO"));
        assert_eq!(contact.company_id.as_deref(), Some("C1"));
        assert_eq!(contact.owner_id.as_deref(), Some("U1"));
        assert_eq!(contact.status, ActiveStatus::Active);
        assert!(contact.custom_fields.is_none());
    }

    #[test]
    fn test_to_domain_inactive_and_custom_fields() {
        let record: ContactRecord = serde_json::from_value(json!({
            "contactid": "K2",
            "statecode": 1,
            "new_loyaltytier": "gold"
        }))
        .unwrap();
        let contact = Contact::from(record);

        assert_eq!(contact.status, ActiveStatus::Inactive);
        assert_eq!(contact.custom_fields.unwrap()["new_loyaltytier"], "gold");
    }

    #[test]
    fn test_create_wire_body() {
        let input = ContactCreateInput {
            email: "a@b.com".to_string(),
            company_id: Some("C1".to_string()),
            ..Default::default()
        };

        assert_eq!(
            input.to_wire().into_value(),
            json!({
                "emailaddress1": "a@b.com",
                "parentcustomerid_account@odata.bind": "/accounts(C1)"
            })
        );
    }

    #[test]
    fn test_update_wire_body_is_minimal() {
        let input = ContactUpdateInput {
            phone: Some("555-0199".to_string()),
            title: Some(String::new()),
            ..Default::default()
        };
        let body = input.to_wire();

        assert_eq!(body.len(), 2);
        assert_eq!(
            body.into_value(),
            json!({"telephone1": "555-0199", "jobtitle": ""})
        );
    }

    #[test]
    fn test_update_with_empty_company_detaches() {
        let input = ContactUpdateInput {
            company_id: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(
            input.to_wire().into_value(),
            json!({"parentcustomerid_account@odata.bind": null})
        );
    }

    #[test]
    fn test_round_trip_populated_fields() {
        let input = ContactCreateInput {
            email: "a@b.com".to_string(),
            first_name: Some("Ann".to_string()),
            last_name: Some("Lee".to_string()),
            phone: Some("555-0100".to_string()),
            title: Some("CTO".to_string()),
            ..Default::default()
        };
        let mut echoed = input.to_wire().into_value();
        echoed["contactid"] = json!("K1");

        let contact = Contact::from(serde_json::from_value::<ContactRecord>(echoed).unwrap());
        assert_eq!(contact.email, Some(input.email.clone()));
        assert_eq!(contact.first_name, input.first_name);
        assert_eq!(contact.last_name, input.last_name);
        assert_eq!(contact.phone, input.phone);
        assert_eq!(contact.title, input.title);
    }

    #[tokio::test]
    async fn test_create_then_get_round_trip() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(created("contacts", "K1"));
        transport.push(json_response(200, contact_json("K1")));
        let client = ContactsClient::new(odata_client(transport.clone()));

        let input = ContactCreateInput {
            email: "a@b.com".to_string(),
            company_id: Some("C1".to_string()),
            ..Default::default()
        };
        let contact = client.create_contact(&input).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].url, format!("{}/contacts", BASE_URL));
        let body = transport.body_json(0);
        assert_eq!(body["emailaddress1"], "a@b.com");
        assert_eq!(body["parentcustomerid_account@odata.bind"], "/accounts(C1)");

        assert_eq!(requests[1].method, Method::GET);
        assert!(requests[1].url.starts_with(&format!("{}/contacts(K1)?$select=contactid,", BASE_URL)));
        assert_eq!(contact.id, "K1");
        assert_eq!(contact.email.as_deref(), Some("a@b.com"));
        assert_eq!(contact.company_id.as_deref(), Some("C1"));
    }

    #[tokio::test]
    async fn test_update_patches_then_refetches() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(no_content());
        transport.push(json_response(200, contact_json("K1")));
        let client = ContactsClient::new(odata_client(transport.clone()));

        let input = ContactUpdateInput {
            first_name: Some("Ann".to_string()),
            ..Default::default()
        };
        client.update_contact("K1", &input).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].method, Method::PATCH);
        assert_eq!(requests[0].url, format!("{}/contacts(K1)", BASE_URL));
        assert_eq!(transport.body_json(0), json!({"firstname": "Ann"}));
        assert_eq!(requests[1].method, Method::GET);
    }

    #[tokio::test]
    async fn test_list_builds_query() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(json_response(
            200,
            json!({
                "@odata.nextLink": "https://org.crm.dynamics.com/api/data/v9.2/contacts?$skiptoken=abc",
                "value": [contact_json("K1")]
            }),
        ));
        let client = ContactsClient::new(odata_client(transport.clone()));

        let page = client
            .list_contacts(&PaginationParams {
                limit: Some(10),
                offset: Some(30),
                cursor: None,
            })
            .await
            .unwrap();

        let url = transport.last_request().url;
        assert!(url.contains("$top=10"));
        assert!(url.contains("$skip=30"));
        assert!(url.contains("$orderby=modifiedon%20desc"));
        assert_eq!(page.count, 1);
        assert!(page.has_more);
    }

    #[tokio::test]
    async fn test_cursor_is_used_verbatim() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(json_response(200, json!({"value": []})));
        let client = ContactsClient::new(odata_client(transport.clone()));
        let cursor = "https://org.crm.dynamics.com/api/data/v9.2/contacts?$select=contactid&$skiptoken=%3Ccookie%2F%3E";

        let page = client
            .list_contacts(&PaginationParams {
                limit: Some(5),
                offset: Some(10),
                cursor: Some(cursor.to_string()),
            })
            .await
            .unwrap();

        assert_eq!(transport.last_request().url, cursor);
        assert!(!page.has_more);
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_get_not_found_propagates_status() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(json_response(
            404,
            json!({"error": {"code": "0x80040217", "message": "contact With Id = K9 Does Not Exist"}}),
        ));
        let client = ContactsClient::new(odata_client(transport));

        let err = client.get_contact("K9").await.unwrap_err();
        assert_eq!(err.status(), Some(reqwest::StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_search_filter_sent() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(json_response(200, json!({"value": []})));
        let client = ContactsClient::new(odata_client(transport.clone()));

        let params = SearchParams {
            query: Some("lee".to_string()),
            ..Default::default()
        };
        client.search_contacts(&params).await.unwrap();

        let url = transport.last_request().url;
        let filter = urlencoding::encode(
            "(contains(fullname,'lee') or contains(emailaddress1,'lee'))",
        )
        .into_owned();
        assert!(url.contains(&format!("$filter={}", filter)));
    }
}
