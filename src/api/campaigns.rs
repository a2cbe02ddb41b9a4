//! Marketing campaigns, campaign activities, responses and members.

use rmcp::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::common::{
    custom_fields, fetch_one, fetch_page, record_path, ActiveStatus, PaginatedResponse,
    PaginationParams, Record,
};
use super::relationships;
use super::wire::WireBody;
use crate::error::CrmError;
use crate::odata::{ODataClient, ODataQuery, SortOrder};

pub const ENTITY_SET: &str = "campaigns";

const SELECT: &[&str] = &[
    "campaignid",
    "name",
    "codename",
    "description",
    "message",
    "objective",
    "typecode",
    "proposedstart",
    "proposedend",
    "actualstart",
    "actualend",
    "budgetedcost",
    "othercost",
    "totalcampaignactivityactualcost",
    "totalactualcost",
    "expectedresponse",
    "expectedrevenue",
    "statuscode",
    "statecode",
    "_pricelevelid_value",
    "_ownerid_value",
    "_transactioncurrencyid_value",
    "createdon",
    "modifiedon",
];

const ACTIVITY_SELECT: &[&str] = &[
    "activityid",
    "subject",
    "description",
    "channeltypecode",
    "typecode",
    "scheduledstart",
    "scheduledend",
    "budgetedcost",
    "actualcost",
    "statuscode",
    "statecode",
    "createdon",
];

const RESPONSE_SELECT: &[&str] = &[
    "activityid",
    "subject",
    "description",
    "channeltypecode",
    "responsecode",
    "receivedon",
    "firstname",
    "lastname",
    "emailaddress",
    "telephone",
    "companyname",
    "statuscode",
    "statecode",
    "createdon",
];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CampaignRecord {
    #[serde(default)]
    pub campaignid: String,
    pub name: Option<String>,
    pub codename: Option<String>,
    pub description: Option<String>,
    pub message: Option<String>,
    pub objective: Option<String>,
    pub typecode: Option<i32>,
    pub proposedstart: Option<String>,
    pub proposedend: Option<String>,
    pub actualstart: Option<String>,
    pub actualend: Option<String>,
    pub budgetedcost: Option<f64>,
    pub othercost: Option<f64>,
    pub totalcampaignactivityactualcost: Option<f64>,
    pub totalactualcost: Option<f64>,
    pub expectedresponse: Option<i32>,
    pub expectedrevenue: Option<f64>,
    pub statecode: Option<i32>,
    pub statuscode: Option<i32>,
    #[serde(rename = "_pricelevelid_value")]
    pub pricelevelid: Option<String>,
    #[serde(rename = "_ownerid_value")]
    pub ownerid: Option<String>,
    #[serde(rename = "_transactioncurrencyid_value")]
    pub transactioncurrencyid: Option<String>,
    pub createdon: Option<String>,
    pub modifiedon: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub name: Option<String>,
    pub code_name: Option<String>,
    pub description: Option<String>,
    pub message: Option<String>,
    pub objective: Option<String>,
    pub type_code: Option<i32>,
    pub proposed_start: Option<String>,
    pub proposed_end: Option<String>,
    pub actual_start: Option<String>,
    pub actual_end: Option<String>,
    pub budgeted_cost: Option<f64>,
    pub other_cost: Option<f64>,
    pub total_campaign_activity_actual_cost: Option<f64>,
    pub total_actual_cost: Option<f64>,
    pub expected_response: Option<i32>,
    pub expected_revenue: Option<f64>,
    pub status: ActiveStatus,
    pub state_code: Option<i32>,
    pub price_level_id: Option<String>,
    pub owner_id: Option<String>,
    pub currency_id: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Map<String, Value>>,
}

impl From<CampaignRecord> for Campaign {
    fn from(d: CampaignRecord) -> Self {
        Self {
            id: d.campaignid,
            name: d.name,
            code_name: d.codename,
            description: d.description,
            message: d.message,
            objective: d.objective,
            type_code: d.typecode,
            proposed_start: d.proposedstart,
            proposed_end: d.proposedend,
            actual_start: d.actualstart,
            actual_end: d.actualend,
            budgeted_cost: d.budgetedcost,
            other_cost: d.othercost,
            total_campaign_activity_actual_cost: d.totalcampaignactivityactualcost,
            total_actual_cost: d.totalactualcost,
            expected_response: d.expectedresponse,
            expected_revenue: d.expectedrevenue,
            status: ActiveStatus::from_state_code(d.statecode),
            state_code: d.statecode,
            price_level_id: d.pricelevelid,
            owner_id: d.ownerid,
            currency_id: d.transactioncurrencyid,
            created_at: d.createdon,
            updated_at: d.modifiedon,
            custom_fields: custom_fields(d.extra),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CampaignCreateInput {
    pub name: String,
    /// Campaign code
    #[serde(default)]
    pub code_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Promotional message
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub objective: Option<String>,
    /// 1 advertisement, 2 direct marketing, 3 event, 4 co-branding, 5 other
    #[serde(default)]
    pub type_code: Option<i32>,
    #[serde(default)]
    pub proposed_start: Option<String>,
    #[serde(default)]
    pub proposed_end: Option<String>,
    #[serde(default)]
    pub budgeted_cost: Option<f64>,
    #[serde(default)]
    pub price_level_id: Option<String>,
    #[serde(default)]
    pub currency_id: Option<String>,
    #[serde(default)]
    pub custom_fields: Option<Map<String, Value>>,
}

impl CampaignCreateInput {
    pub fn to_wire(&self) -> WireBody {
        WireBody::new()
            .value("name", self.name.clone())
            .field("codename", &self.code_name)
            .field("description", &self.description)
            .field("message", &self.message)
            .field("objective", &self.objective)
            .field("typecode", &self.type_code)
            .field("proposedstart", &self.proposed_start)
            .field("proposedend", &self.proposed_end)
            .field("budgetedcost", &self.budgeted_cost)
            .bind("pricelevelid", "pricelevels", &self.price_level_id)
            .bind("transactioncurrencyid", "transactioncurrencies", &self.currency_id)
            .custom(&self.custom_fields)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CampaignUpdateInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub code_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub objective: Option<String>,
    #[serde(default)]
    pub type_code: Option<i32>,
    #[serde(default)]
    pub proposed_start: Option<String>,
    #[serde(default)]
    pub proposed_end: Option<String>,
    #[serde(default)]
    pub budgeted_cost: Option<f64>,
    #[serde(default)]
    pub custom_fields: Option<Map<String, Value>>,
}

impl CampaignUpdateInput {
    pub fn to_wire(&self) -> WireBody {
        WireBody::new()
            .field("name", &self.name)
            .field("codename", &self.code_name)
            .field("description", &self.description)
            .field("message", &self.message)
            .field("objective", &self.objective)
            .field("typecode", &self.type_code)
            .field("proposedstart", &self.proposed_start)
            .field("proposedend", &self.proposed_end)
            .field("budgetedcost", &self.budgeted_cost)
            .custom(&self.custom_fields)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CampaignActivityInput {
    pub subject: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Channel option value (phone, email, letter, ...)
    #[serde(default)]
    pub channel_type_code: Option<i32>,
    #[serde(default)]
    pub type_code: Option<i32>,
    #[serde(default)]
    pub scheduled_start: Option<String>,
    #[serde(default)]
    pub scheduled_end: Option<String>,
    #[serde(default)]
    pub budgeted_cost: Option<f64>,
}

impl CampaignActivityInput {
    pub fn to_wire(&self, campaign_id: &str) -> WireBody {
        WireBody::new()
            .value("subject", self.subject.clone())
            .field("description", &self.description)
            .field("channeltypecode", &self.channel_type_code)
            .field("typecode", &self.type_code)
            .field("scheduledstart", &self.scheduled_start)
            .field("scheduledend", &self.scheduled_end)
            .field("budgetedcost", &self.budgeted_cost)
            .bind_id("regardingobjectid_campaign", ENTITY_SET, campaign_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CampaignResponseInput {
    pub subject: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub channel_type_code: Option<i32>,
    /// 1 interested, 2 not interested, 3 do not send marketing materials, 4 error
    #[serde(default)]
    pub response_code: Option<i32>,
    #[serde(default)]
    pub received_on: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email_address: Option<String>,
    #[serde(default)]
    pub telephone: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
}

impl CampaignResponseInput {
    pub fn to_wire(&self, campaign_id: &str) -> WireBody {
        WireBody::new()
            .value("subject", self.subject.clone())
            .field("description", &self.description)
            .field("channeltypecode", &self.channel_type_code)
            .field("responsecode", &self.response_code)
            .field("receivedon", &self.received_on)
            .field("firstname", &self.first_name)
            .field("lastname", &self.last_name)
            .field("emailaddress", &self.email_address)
            .field("telephone", &self.telephone)
            .field("companyname", &self.company_name)
            .bind_id("regardingobjectid_campaign", ENTITY_SET, campaign_id)
    }
}

/// Kind of record that can be a campaign member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CampaignMemberType {
    Contact,
    Lead,
    Account,
}

impl CampaignMemberType {
    fn entity_set(self) -> &'static str {
        match self {
            CampaignMemberType::Contact => "contacts",
            CampaignMemberType::Lead => "leads",
            CampaignMemberType::Account => "accounts",
        }
    }

    /// `Campaign_{logical name}s` collection on the campaign.
    fn navigation(self) -> String {
        format!("Campaign_{}", self.entity_set())
    }
}

/// Id of a record created through a campaign operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedRecord {
    pub id: String,
}

/// Campaigns API client.
#[derive(Clone, Debug)]
pub struct CampaignsClient {
    odata: ODataClient,
}

impl CampaignsClient {
    pub fn new(odata: ODataClient) -> Self {
        Self { odata }
    }

    pub async fn list_campaigns(
        &self,
        params: &PaginationParams,
    ) -> Result<PaginatedResponse<Campaign>, CrmError> {
        let query = ODataQuery::new()
            .select(SELECT.iter().copied())
            .orderby("createdon", SortOrder::Desc);
        fetch_page::<CampaignRecord, _>(&self.odata, ENTITY_SET, query, params).await
    }

    pub async fn get_campaign(&self, id: &str) -> Result<Campaign, CrmError> {
        fetch_one::<CampaignRecord, _>(&self.odata, ENTITY_SET, id, SELECT).await
    }

    pub async fn create_campaign(&self, input: &CampaignCreateInput) -> Result<Campaign, CrmError> {
        let created = self
            .odata
            .create_entity(&format!("/{}", ENTITY_SET), &input.to_wire().into_value())
            .await?;
        self.get_campaign(&created.id).await
    }

    pub async fn update_campaign(
        &self,
        id: &str,
        input: &CampaignUpdateInput,
    ) -> Result<Campaign, CrmError> {
        self.odata
            .patch(&record_path(ENTITY_SET, id), &input.to_wire().into_value())
            .await?;
        self.get_campaign(id).await
    }

    pub async fn delete_campaign(&self, id: &str) -> Result<(), CrmError> {
        self.odata.delete(&record_path(ENTITY_SET, id)).await
    }

    pub async fn list_campaign_activities(&self, campaign_id: &str) -> Result<Vec<Record>, CrmError> {
        self.list_child(campaign_id, "Campaign_CampaignActivities", ACTIVITY_SELECT)
            .await
    }

    pub async fn create_campaign_activity(
        &self,
        campaign_id: &str,
        input: &CampaignActivityInput,
    ) -> Result<CreatedRecord, CrmError> {
        let created = self
            .odata
            .create_entity("/campaignactivities", &input.to_wire(campaign_id).into_value())
            .await?;
        Ok(CreatedRecord { id: created.id })
    }

    pub async fn list_campaign_responses(&self, campaign_id: &str) -> Result<Vec<Record>, CrmError> {
        self.list_child(campaign_id, "Campaign_CampaignResponses", RESPONSE_SELECT)
            .await
    }

    pub async fn create_campaign_response(
        &self,
        campaign_id: &str,
        input: &CampaignResponseInput,
    ) -> Result<CreatedRecord, CrmError> {
        let created = self
            .odata
            .create_entity("/campaignresponses", &input.to_wire(campaign_id).into_value())
            .await?;
        Ok(CreatedRecord { id: created.id })
    }

    pub async fn add_campaign_member(
        &self,
        campaign_id: &str,
        member_type: CampaignMemberType,
        member_id: &str,
    ) -> Result<(), CrmError> {
        relationships::associate(
            &self.odata,
            ENTITY_SET,
            campaign_id,
            &member_type.navigation(),
            member_type.entity_set(),
            member_id,
        )
        .await
    }

    pub async fn remove_campaign_member(
        &self,
        campaign_id: &str,
        member_type: CampaignMemberType,
        member_id: &str,
    ) -> Result<(), CrmError> {
        relationships::disassociate(
            &self.odata,
            ENTITY_SET,
            campaign_id,
            &member_type.navigation(),
            member_id,
        )
        .await
    }

    async fn list_child(
        &self,
        campaign_id: &str,
        navigation: &str,
        select: &[&str],
    ) -> Result<Vec<Record>, CrmError> {
        let endpoint = format!("{}/{}", record_path(ENTITY_SET, campaign_id), navigation);
        let query = ODataQuery::new().select(select.iter().copied());
        let collection = self
            .odata
            .get_collection::<Record>(&endpoint, Some(&query))
            .await?;
        Ok(collection.value)
    }
}
