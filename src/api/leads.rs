//! Leads and lead qualification.

use rmcp::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::common::{
    custom_fields, fetch_one, fetch_page, record_path, Address, PaginatedResponse,
    PaginationParams, SearchParams,
};
use super::wire::WireBody;
use crate::error::CrmError;
use crate::odata::{ODataClient, ODataQuery, SortOrder};

pub const ENTITY_SET: &str = "leads";

const SELECT: &[&str] = &[
    "leadid",
    "subject",
    "firstname",
    "lastname",
    "fullname",
    "emailaddress1",
    "telephone1",
    "mobilephone",
    "companyname",
    "jobtitle",
    "websiteurl",
    "address1_line1",
    "address1_city",
    "address1_stateorprovince",
    "address1_postalcode",
    "address1_country",
    "description",
    "leadsourcecode",
    "leadqualitycode",
    "industrycode",
    "revenue",
    "numberofemployees",
    "statuscode",
    "statecode",
    "_ownerid_value",
    "_parentaccountid_value",
    "_parentcontactid_value",
    "createdon",
    "modifiedon",
];

const SEARCH_FIELDS: &[&str] = &["fullname", "emailaddress1", "companyname"];

/// `Status` sent to QualifyLead when the caller gives none.
const QUALIFIED_STATUS: i32 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    #[default]
    Open,
    Qualified,
    Disqualified,
}

impl LeadStatus {
    pub fn from_state_code(state_code: Option<i32>) -> Self {
        match state_code {
            Some(1) => LeadStatus::Qualified,
            Some(2) => LeadStatus::Disqualified,
            _ => LeadStatus::Open,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadRecord {
    #[serde(default)]
    pub leadid: String,
    pub subject: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub fullname: Option<String>,
    pub emailaddress1: Option<String>,
    pub telephone1: Option<String>,
    pub mobilephone: Option<String>,
    pub companyname: Option<String>,
    pub jobtitle: Option<String>,
    pub websiteurl: Option<String>,
    pub address1_line1: Option<String>,
    pub address1_city: Option<String>,
    pub address1_stateorprovince: Option<String>,
    pub address1_postalcode: Option<String>,
    pub address1_country: Option<String>,
    pub description: Option<String>,
    pub leadsourcecode: Option<i32>,
    pub leadqualitycode: Option<i32>,
    pub industrycode: Option<i32>,
    pub revenue: Option<f64>,
    pub numberofemployees: Option<i64>,
    pub statecode: Option<i32>,
    pub statuscode: Option<i32>,
    #[serde(rename = "_ownerid_value")]
    pub ownerid: Option<String>,
    #[serde(rename = "_parentaccountid_value")]
    pub parentaccountid: Option<String>,
    #[serde(rename = "_parentcontactid_value")]
    pub parentcontactid: Option<String>,
    pub createdon: Option<String>,
    pub modifiedon: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Normalized lead.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: String,
    pub subject: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub mobile_phone: Option<String>,
    pub company_name: Option<String>,
    pub job_title: Option<String>,
    pub website: Option<String>,
    pub description: Option<String>,
    pub address: Option<Address>,
    pub lead_source: Option<i32>,
    pub lead_quality: Option<i32>,
    pub industry_code: Option<i32>,
    pub revenue: Option<f64>,
    pub number_of_employees: Option<i64>,
    pub status: LeadStatus,
    pub state_code: Option<i32>,
    pub owner_id: Option<String>,
    pub parent_account_id: Option<String>,
    pub parent_contact_id: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Map<String, Value>>,
}

impl From<LeadRecord> for Lead {
    fn from(d: LeadRecord) -> Self {
        Self {
            id: d.leadid,
            subject: d.subject,
            first_name: d.firstname,
            last_name: d.lastname,
            full_name: d.fullname,
            email: d.emailaddress1,
            phone: d.telephone1,
            mobile_phone: d.mobilephone,
            company_name: d.companyname,
            job_title: d.jobtitle,
            website: d.websiteurl,
            description: d.description,
            address: Address {
                street: d.address1_line1,
                city: d.address1_city,
                state: d.address1_stateorprovince,
                postal_code: d.address1_postalcode,
                country: d.address1_country,
                ..Default::default()
            }
            .non_empty(),
            lead_source: d.leadsourcecode,
            lead_quality: d.leadqualitycode,
            industry_code: d.industrycode,
            revenue: d.revenue,
            number_of_employees: d.numberofemployees,
            status: LeadStatus::from_state_code(d.statecode),
            state_code: d.statecode,
            owner_id: d.ownerid,
            parent_account_id: d.parentaccountid,
            parent_contact_id: d.parentcontactid,
            created_at: d.createdon,
            updated_at: d.modifiedon,
            custom_fields: custom_fields(d.extra),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeadCreateInput {
    /// Last name (required)
    pub last_name: String,
    /// Topic
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
    /// `leadsourcecode` option value
    #[serde(default)]
    pub lead_source: Option<i32>,
    /// `leadqualitycode` option value (1 hot, 2 warm, 3 cold)
    #[serde(default)]
    pub lead_quality: Option<i32>,
    /// Owning system user ID
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub custom_fields: Option<Map<String, Value>>,
}

impl LeadCreateInput {
    pub fn to_wire(&self) -> WireBody {
        WireBody::new()
            .value("lastname", self.last_name.clone())
            .field("subject", &self.subject)
            .field("firstname", &self.first_name)
            .field("emailaddress1", &self.email)
            .field("telephone1", &self.phone)
            .field("companyname", &self.company_name)
            .field("jobtitle", &self.job_title)
            .field("websiteurl", &self.website)
            .field("description", &self.description)
            .address("address1", &self.address)
            .field("leadsourcecode", &self.lead_source)
            .field("leadqualitycode", &self.lead_quality)
            .bind("ownerid", "systemusers", &self.owner_id)
            .custom(&self.custom_fields)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeadUpdateInput {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub lead_source: Option<i32>,
    #[serde(default)]
    pub lead_quality: Option<i32>,
    #[serde(default)]
    pub custom_fields: Option<Map<String, Value>>,
}

impl LeadUpdateInput {
    pub fn to_wire(&self) -> WireBody {
        WireBody::new()
            .field("subject", &self.subject)
            .field("firstname", &self.first_name)
            .field("lastname", &self.last_name)
            .field("emailaddress1", &self.email)
            .field("telephone1", &self.phone)
            .field("companyname", &self.company_name)
            .field("jobtitle", &self.job_title)
            .field("websiteurl", &self.website)
            .field("description", &self.description)
            .address("address1", &self.address)
            .field("leadsourcecode", &self.lead_source)
            .field("leadqualitycode", &self.lead_quality)
            .custom(&self.custom_fields)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeadQualifyInput {
    #[serde(default)]
    pub create_account: bool,
    #[serde(default)]
    pub create_contact: bool,
    #[serde(default)]
    pub create_opportunity: bool,
    /// Lead status code after qualification (default 3, Qualified)
    #[serde(default)]
    pub status: Option<i32>,
    #[serde(default)]
    pub opportunity_currency_id: Option<String>,
    /// Account the new opportunity is created for
    #[serde(default)]
    pub opportunity_customer_id: Option<String>,
    #[serde(default)]
    pub source_campaign_id: Option<String>,
}

/// Typed entity reference used in action parameters.
fn entity_reference(logical_name: &str, id: &str) -> Value {
    let mut reference = Map::new();
    reference.insert(
        "@odata.type".to_string(),
        Value::String(format!("Microsoft.Dynamics.CRM.{}", logical_name)),
    );
    reference.insert(format!("{}id", logical_name), Value::String(id.to_string()));
    Value::Object(reference)
}

impl LeadQualifyInput {
    pub fn to_action_body(&self) -> Value {
        let mut body = json!({
            "CreateAccount": self.create_account,
            "CreateContact": self.create_contact,
            "CreateOpportunity": self.create_opportunity,
            "Status": self.status.unwrap_or(QUALIFIED_STATUS),
        });
        let references = [
            ("OpportunityCurrencyId", "transactioncurrency", &self.opportunity_currency_id),
            ("OpportunityCustomerId", "account", &self.opportunity_customer_id),
            ("SourceCampaignId", "campaign", &self.source_campaign_id),
        ];
        for (parameter, logical_name, id) in references {
            if let Some(id) = id.as_deref().filter(|id| !id.is_empty()) {
                body[parameter] = entity_reference(logical_name, id);
            }
        }
        body
    }
}

/// Records created by QualifyLead.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadQualifyResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opportunity_id: Option<String>,
}

impl LeadQualifyResult {
    /// Picks created ids out of `CreatedEntities` by `@odata.type`.
    pub fn from_response(response: Option<&Value>) -> Self {
        let mut result = Self {
            success: true,
            ..Default::default()
        };
        let entities = response
            .and_then(|r| r.get("CreatedEntities"))
            .and_then(Value::as_array);
        for entity in entities.into_iter().flatten() {
            let odata_type = entity
                .get("@odata.type")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let id = |key: &str| entity.get(key).and_then(Value::as_str).map(String::from);
            if odata_type.contains("account") {
                result.account_id = id("accountid");
            } else if odata_type.contains("contact") {
                result.contact_id = id("contactid");
            } else if odata_type.contains("opportunity") {
                result.opportunity_id = id("opportunityid");
            }
        }
        result
    }
}

/// Leads API client.
#[derive(Clone, Debug)]
pub struct LeadsClient {
    odata: ODataClient,
}

impl LeadsClient {
    pub fn new(odata: ODataClient) -> Self {
        Self { odata }
    }

    pub async fn list_leads(
        &self,
        params: &PaginationParams,
    ) -> Result<PaginatedResponse<Lead>, CrmError> {
        let query = ODataQuery::new()
            .select(SELECT.iter().copied())
            .orderby("createdon", SortOrder::Desc);
        fetch_page::<LeadRecord, _>(&self.odata, ENTITY_SET, query, params).await
    }

    pub async fn get_lead(&self, id: &str) -> Result<Lead, CrmError> {
        fetch_one::<LeadRecord, _>(&self.odata, ENTITY_SET, id, SELECT).await
    }

    pub async fn create_lead(&self, input: &LeadCreateInput) -> Result<Lead, CrmError> {
        let created = self
            .odata
            .create_entity(&format!("/{}", ENTITY_SET), &input.to_wire().into_value())
            .await?;
        self.get_lead(&created.id).await
    }

    pub async fn update_lead(&self, id: &str, input: &LeadUpdateInput) -> Result<Lead, CrmError> {
        self.odata
            .patch(&record_path(ENTITY_SET, id), &input.to_wire().into_value())
            .await?;
        self.get_lead(id).await
    }

    pub async fn delete_lead(&self, id: &str) -> Result<(), CrmError> {
        self.odata.delete(&record_path(ENTITY_SET, id)).await
    }

    pub async fn search_leads(
        &self,
        params: &SearchParams,
    ) -> Result<PaginatedResponse<Lead>, CrmError> {
        let query = params.to_query(SELECT, SEARCH_FIELDS);
        fetch_page::<LeadRecord, _>(&self.odata, ENTITY_SET, query, &params.pagination).await
    }

    pub async fn qualify_lead(
        &self,
        id: &str,
        input: &LeadQualifyInput,
    ) -> Result<LeadQualifyResult, CrmError> {
        let response = self
            .odata
            .post(
                &format!("{}/Microsoft.Dynamics.CRM.QualifyLead", record_path(ENTITY_SET, id)),
                &input.to_action_body(),
            )
            .await?;
        Ok(LeadQualifyResult::from_response(response.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::common::{FilterOperator, SearchFilter};
    use crate::testing::{collection, json_response, odata_client, ScriptedTransport};
    use std::sync::Arc;

    #[test]
    fn test_status_mapping() {
        assert_eq!(LeadStatus::from_state_code(Some(1)), LeadStatus::Qualified);
        assert_eq!(LeadStatus::from_state_code(Some(2)), LeadStatus::Disqualified);
        assert_eq!(LeadStatus::from_state_code(Some(5)), LeadStatus::Open);
    }

    #[test]
    fn test_create_binds_owner() {
        let input = LeadCreateInput {
            last_name: "Doe".to_string(),
            subject: Some("Interested in trial".to_string()),
            owner_id: Some("U1".to_string()),
            lead_quality: Some(1),
            ..Default::default()
        };
        assert_eq!(
            input.to_wire().into_value(),
            json!({
                "lastname": "Doe",
                "subject": "Interested in trial",
                "leadqualitycode": 1,
                "ownerid@odata.bind": "/systemusers(U1)"
            })
        );
    }

    #[test]
    fn test_round_trip_populated_fields() {
        let input = LeadCreateInput {
            last_name: "Doe".to_string(),
            subject: Some("Trial".to_string()),
            first_name: Some("Ann".to_string()),
            email: Some("ann@fabrikam.com".to_string()),
            company_name: Some("Fabrikam".to_string()),
            lead_source: Some(8),
            address: Some(Address {
                city: Some("Lyon".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut echoed = input.to_wire().into_value();
        echoed["leadid"] = json!("L1");
        let lead = Lead::from(serde_json::from_value::<LeadRecord>(echoed).unwrap());

        assert_eq!(lead.subject.as_deref(), Some("Trial"));
        assert_eq!(lead.last_name.as_deref(), Some("Doe"));
        assert_eq!(lead.first_name, input.first_name);
        assert_eq!(lead.email, input.email);
        assert_eq!(lead.company_name, input.company_name);
        assert_eq!(lead.lead_source, input.lead_source);
        assert_eq!(lead.address, input.address);
    }

    #[test]
    fn test_create_requires_only_last_name() {
        let input: LeadCreateInput = serde_json::from_value(json!({"lastName": "Doe"})).unwrap();
        assert_eq!(input.to_wire().into_value(), json!({"lastname": "Doe"}));

        assert!(serde_json::from_value::<LeadCreateInput>(json!({"subject": "Trial"})).is_err());
    }

    #[test]
    fn test_qualify_body_defaults_and_references() {
        let input = LeadQualifyInput {
            create_opportunity: true,
            opportunity_customer_id: Some("A1".to_string()),
            ..Default::default()
        };
        let body = input.to_action_body();
        assert_eq!(body["Status"], json!(3));
        assert_eq!(body["CreateOpportunity"], json!(true));
        assert_eq!(
            body["OpportunityCustomerId"],
            json!({"@odata.type": "Microsoft.Dynamics.CRM.account", "accountid": "A1"})
        );
        assert!(body.get("SourceCampaignId").is_none());
    }

    #[tokio::test]
    async fn test_qualify_picks_created_ids_by_type() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(json_response(
            200,
            json!({"CreatedEntities": [
                {"@odata.type": "#Microsoft.Dynamics.CRM.account", "accountid": "A9"},
                {"@odata.type": "#Microsoft.Dynamics.CRM.contact", "contactid": "K9"},
                {"@odata.type": "#Microsoft.Dynamics.CRM.opportunity", "opportunityid": "O9"}
            ]}),
        ));
        let client = LeadsClient::new(odata_client(transport.clone()));

        let result = client
            .qualify_lead("L1", &LeadQualifyInput::default())
            .await
            .unwrap();
        assert!(transport
            .last_request()
            .url
            .ends_with("/leads(L1)/Microsoft.Dynamics.CRM.QualifyLead"));
        assert_eq!(result.account_id.as_deref(), Some("A9"));
        assert_eq!(result.contact_id.as_deref(), Some("K9"));
        assert_eq!(result.opportunity_id.as_deref(), Some("O9"));
    }

    #[tokio::test]
    async fn test_search_includes_company_name() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(collection(vec![]));
        let client = LeadsClient::new(odata_client(transport.clone()));

        let params = SearchParams {
            query: Some("fab".to_string()),
            filters: vec![SearchFilter {
                field: "leadqualitycode".to_string(),
                operator: FilterOperator::Eq,
                value: json!(1),
            }],
            ..Default::default()
        };
        client.search_leads(&params).await.unwrap();

        let filter = urlencoding::encode(
            "(contains(fullname,'fab') or contains(emailaddress1,'fab') or contains(companyname,'fab')) and leadqualitycode eq 1",
        )
        .into_owned();
        assert!(transport.last_request().url.contains(&filter));
    }
}
