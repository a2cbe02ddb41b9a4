//! Deals (`opportunities`) and sales pipelines (business process flows).

use rmcp::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::common::{
    custom_fields, fetch_all, fetch_one, fetch_page, record_path, PaginatedResponse,
    PaginationParams,
};
use super::wire::WireBody;
use crate::error::CrmError;
use crate::odata::{ODataClient, ODataQuery, SortOrder};

pub const ENTITY_SET: &str = "opportunities";

const SELECT: &[&str] = &[
    "opportunityid",
    "name",
    "estimatedvalue",
    "_transactioncurrencyid_value",
    "stepname",
    "estimatedclosedate",
    "closeprobability",
    "_parentaccountid_value",
    "description",
    "statecode",
    "statuscode",
    "createdon",
    "modifiedon",
    "_ownerid_value",
];

/// Business process flow category.
const BUSINESS_PROCESS_FLOW_CATEGORY: i32 = 4;
/// `stagecategory` of the closing stage.
const CLOSE_STAGE_CATEGORY: i32 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    #[default]
    Open,
    Won,
    Lost,
}

impl DealStatus {
    pub fn from_state_code(state_code: Option<i32>) -> Self {
        match state_code {
            Some(1) => DealStatus::Won,
            Some(2) => DealStatus::Lost,
            _ => DealStatus::Open,
        }
    }

    /// `(statecode, statuscode)` written when moving a deal to this status.
    pub fn state_and_status(self) -> (i32, i32) {
        match self {
            DealStatus::Open => (0, 1),
            DealStatus::Won => (1, 3),
            DealStatus::Lost => (2, 4),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpportunityRecord {
    #[serde(default)]
    pub opportunityid: String,
    pub name: Option<String>,
    pub estimatedvalue: Option<f64>,
    #[serde(rename = "_transactioncurrencyid_value")]
    pub transactioncurrencyid: Option<String>,
    pub stepname: Option<String>,
    pub estimatedclosedate: Option<String>,
    pub closeprobability: Option<i32>,
    #[serde(rename = "_parentaccountid_value")]
    pub parentaccountid: Option<String>,
    pub description: Option<String>,
    pub statecode: Option<i32>,
    pub statuscode: Option<i32>,
    pub createdon: Option<String>,
    pub modifiedon: Option<String>,
    #[serde(rename = "_ownerid_value")]
    pub ownerid: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Normalized deal.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    pub id: String,
    pub name: Option<String>,
    pub amount: Option<f64>,
    /// Transaction currency id.
    pub currency: Option<String>,
    pub stage: Option<String>,
    pub close_date: Option<String>,
    pub probability: Option<i32>,
    pub company_id: Option<String>,
    pub description: Option<String>,
    pub status: DealStatus,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub owner_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Map<String, Value>>,
}

impl From<OpportunityRecord> for Deal {
    fn from(d: OpportunityRecord) -> Self {
        Self {
            id: d.opportunityid,
            name: d.name,
            amount: d.estimatedvalue,
            currency: d.transactioncurrencyid,
            stage: d.stepname,
            close_date: d.estimatedclosedate,
            probability: d.closeprobability,
            company_id: d.parentaccountid,
            description: d.description,
            status: DealStatus::from_state_code(d.statecode),
            created_at: d.createdon,
            updated_at: d.modifiedon,
            owner_id: d.ownerid,
            custom_fields: custom_fields(d.extra),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DealCreateInput {
    /// Opportunity topic (required)
    pub name: String,
    /// Estimated revenue
    #[serde(default)]
    pub amount: Option<f64>,
    /// Estimated close date (YYYY-MM-DD)
    #[serde(default)]
    pub close_date: Option<String>,
    /// Pipeline stage name, stored in `stepname`
    #[serde(default)]
    pub stage_id: Option<String>,
    /// Parent account ID
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub custom_fields: Option<Map<String, Value>>,
}

impl DealCreateInput {
    pub fn to_wire(&self) -> WireBody {
        WireBody::new()
            .value("name", self.name.clone())
            .field("estimatedvalue", &self.amount)
            .field("estimatedclosedate", &self.close_date)
            .bind("parentaccountid", "accounts", &self.company_id)
            .field("stepname", &self.stage_id)
            .custom(&self.custom_fields)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DealUpdateInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub close_date: Option<String>,
    #[serde(default)]
    pub stage_id: Option<String>,
    /// open, won or lost
    #[serde(default)]
    pub status: Option<DealStatus>,
    #[serde(default)]
    pub custom_fields: Option<Map<String, Value>>,
}

impl DealUpdateInput {
    pub fn to_wire(&self) -> WireBody {
        let codes = self.status.map(DealStatus::state_and_status);
        WireBody::new()
            .field("name", &self.name)
            .field("estimatedvalue", &self.amount)
            .field("estimatedclosedate", &self.close_date)
            .field("stepname", &self.stage_id)
            .field("statecode", &codes.map(|(state, _)| state))
            .field("statuscode", &codes.map(|(_, status)| status))
            .custom(&self.custom_fields)
    }
}

/// A sales pipeline backed by a business process flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    pub id: String,
    pub name: Option<String>,
    pub stages: Vec<PipelineStage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStage {
    pub id: String,
    pub name: Option<String>,
    pub order: usize,
    pub is_closed: bool,
    pub is_won: bool,
}

#[derive(Debug, Deserialize)]
struct WorkflowRecord {
    workflowid: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProcessStageRecord {
    processstageid: String,
    stagename: Option<String>,
    stagecategory: Option<i32>,
}

/// Deals API client.
#[derive(Clone, Debug)]
pub struct DealsClient {
    odata: ODataClient,
}

impl DealsClient {
    pub fn new(odata: ODataClient) -> Self {
        Self { odata }
    }

    pub async fn list_deals(
        &self,
        params: &PaginationParams,
    ) -> Result<PaginatedResponse<Deal>, CrmError> {
        let query = ODataQuery::new()
            .select(SELECT.iter().copied())
            .orderby("modifiedon", SortOrder::Desc);
        fetch_page::<OpportunityRecord, _>(&self.odata, ENTITY_SET, query, params).await
    }

    pub async fn get_deal(&self, id: &str) -> Result<Deal, CrmError> {
        fetch_one::<OpportunityRecord, _>(&self.odata, ENTITY_SET, id, SELECT).await
    }

    pub async fn create_deal(&self, input: &DealCreateInput) -> Result<Deal, CrmError> {
        let created = self
            .odata
            .create_entity(&format!("/{}", ENTITY_SET), &input.to_wire().into_value())
            .await?;
        self.get_deal(&created.id).await
    }

    pub async fn update_deal(&self, id: &str, input: &DealUpdateInput) -> Result<Deal, CrmError> {
        self.odata
            .patch(&record_path(ENTITY_SET, id), &input.to_wire().into_value())
            .await?;
        self.get_deal(id).await
    }

    pub async fn delete_deal(&self, id: &str) -> Result<(), CrmError> {
        self.odata.delete(&record_path(ENTITY_SET, id)).await
    }

    /// Sets `stepname`; business process flow stage records are not touched.
    pub async fn move_deal_stage(&self, id: &str, stage: &str) -> Result<Deal, CrmError> {
        self.odata
            .patch(&record_path(ENTITY_SET, id), &json!({ "stepname": stage }))
            .await?;
        self.get_deal(id).await
    }

    /// Active business process flows with their stages.
    pub async fn list_pipelines(&self) -> Result<Vec<Pipeline>, CrmError> {
        let workflows_query = ODataQuery::new()
            .filter(format!(
                "category eq {} and statecode eq 1",
                BUSINESS_PROCESS_FLOW_CATEGORY
            ))
            .select(["workflowid", "name"]);
        let workflows: Vec<WorkflowRecord> =
            fetch_all::<WorkflowRecord, _>(&self.odata, "/workflows", &workflows_query).await?;

        let mut pipelines = Vec::with_capacity(workflows.len());
        for workflow in workflows {
            let stages_query = ODataQuery::new()
                .filter(format!("_processid_value eq {}", workflow.workflowid))
                .select(["processstageid", "stagename", "stagecategory"])
                .orderby("stagecategory", SortOrder::Asc);
            let stages: Vec<ProcessStageRecord> =
                fetch_all::<ProcessStageRecord, _>(&self.odata, "/processstages", &stages_query)
                    .await?;

            pipelines.push(Pipeline {
                id: workflow.workflowid,
                name: workflow.name,
                stages: stages
                    .into_iter()
                    .enumerate()
                    .map(|(order, stage)| {
                        let closing = stage.stagecategory == Some(CLOSE_STAGE_CATEGORY);
                        PipelineStage {
                            id: stage.processstageid,
                            name: stage.stagename,
                            order,
                            is_closed: closing,
                            is_won: closing,
                        }
                    })
                    .collect(),
            });
        }

        Ok(pipelines)
    }
}
