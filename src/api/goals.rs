//! Sales goals and the goal metrics they are measured with.

use rmcp::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::common::{
    custom_fields, fetch_one, fetch_page, record_path, ActiveStatus, PaginatedResponse,
    PaginationParams,
};
use super::wire::WireBody;
use crate::error::CrmError;
use crate::odata::{ODataClient, ODataQuery, SortOrder};

pub const ENTITY_SET: &str = "goals";
pub const METRIC_SET: &str = "metrics";

const SELECT: &[&str] = &[
    "goalid",
    "title",
    "_goalownerid_value",
    "_metricid_value",
    "targetmoney",
    "targetdecimal",
    "targetinteger",
    "actualmoney",
    "actualdecimal",
    "actualinteger",
    "inprogressmoney",
    "inprogressdecimal",
    "inprogressinteger",
    "percentage",
    "fiscalperiod",
    "fiscalyear",
    "goalstartdate",
    "goalenddate",
    "consideronlygoalownersrecords",
    "_parentgoalid_value",
    "statuscode",
    "statecode",
    "lastrolledupdate",
    "createdon",
    "modifiedon",
];

const METRIC_SELECT: &[&str] = &[
    "metricid",
    "name",
    "description",
    "amountdatatype",
    "isamount",
    "isstretchtracked",
    "statuscode",
    "statecode",
];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GoalRecord {
    #[serde(default)]
    pub goalid: String,
    pub title: Option<String>,
    #[serde(rename = "_goalownerid_value")]
    pub goalownerid: Option<String>,
    #[serde(rename = "_metricid_value")]
    pub metricid: Option<String>,
    pub targetmoney: Option<f64>,
    pub targetdecimal: Option<f64>,
    pub targetinteger: Option<i64>,
    pub actualmoney: Option<f64>,
    pub actualdecimal: Option<f64>,
    pub actualinteger: Option<i64>,
    pub inprogressmoney: Option<f64>,
    pub inprogressdecimal: Option<f64>,
    pub inprogressinteger: Option<i64>,
    pub percentage: Option<f64>,
    pub fiscalperiod: Option<i32>,
    pub fiscalyear: Option<i32>,
    pub goalstartdate: Option<String>,
    pub goalenddate: Option<String>,
    pub consideronlygoalownersrecords: Option<bool>,
    #[serde(rename = "_parentgoalid_value")]
    pub parentgoalid: Option<String>,
    pub statecode: Option<i32>,
    pub statuscode: Option<i32>,
    pub lastrolledupdate: Option<String>,
    pub createdon: Option<String>,
    pub modifiedon: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    pub title: Option<String>,
    pub goal_owner_id: Option<String>,
    pub metric_id: Option<String>,
    pub target_money: Option<f64>,
    pub target_decimal: Option<f64>,
    pub target_integer: Option<i64>,
    pub actual_money: Option<f64>,
    pub actual_decimal: Option<f64>,
    pub actual_integer: Option<i64>,
    pub in_progress_money: Option<f64>,
    pub in_progress_decimal: Option<f64>,
    pub in_progress_integer: Option<i64>,
    pub percentage: Option<f64>,
    pub fiscal_period: Option<i32>,
    pub fiscal_year: Option<i32>,
    pub goal_start_date: Option<String>,
    pub goal_end_date: Option<String>,
    pub consider_only_goal_owners_records: Option<bool>,
    pub parent_goal_id: Option<String>,
    pub status: ActiveStatus,
    pub state_code: Option<i32>,
    pub last_rolled_up_date: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Map<String, Value>>,
}

impl From<GoalRecord> for Goal {
    fn from(d: GoalRecord) -> Self {
        Self {
            id: d.goalid,
            title: d.title,
            goal_owner_id: d.goalownerid,
            metric_id: d.metricid,
            target_money: d.targetmoney,
            target_decimal: d.targetdecimal,
            target_integer: d.targetinteger,
            actual_money: d.actualmoney,
            actual_decimal: d.actualdecimal,
            actual_integer: d.actualinteger,
            in_progress_money: d.inprogressmoney,
            in_progress_decimal: d.inprogressdecimal,
            in_progress_integer: d.inprogressinteger,
            percentage: d.percentage,
            fiscal_period: d.fiscalperiod,
            fiscal_year: d.fiscalyear,
            goal_start_date: d.goalstartdate,
            goal_end_date: d.goalenddate,
            consider_only_goal_owners_records: d.consideronlygoalownersrecords,
            parent_goal_id: d.parentgoalid,
            status: ActiveStatus::from_state_code(d.statecode),
            state_code: d.statecode,
            last_rolled_up_date: d.lastrolledupdate,
            created_at: d.createdon,
            updated_at: d.modifiedon,
            custom_fields: custom_fields(d.extra),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricRecord {
    #[serde(default)]
    pub metricid: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub amountdatatype: Option<i32>,
    pub isamount: Option<bool>,
    pub isstretchtracked: Option<bool>,
    pub statecode: Option<i32>,
    pub statuscode: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalMetric {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    /// 0 money, 1 decimal, 2 integer
    pub amount_data_type: Option<i32>,
    pub is_amount: Option<bool>,
    pub is_stretch_tracked: Option<bool>,
    pub status: ActiveStatus,
    pub state_code: Option<i32>,
}

impl From<MetricRecord> for GoalMetric {
    fn from(d: MetricRecord) -> Self {
        Self {
            id: d.metricid,
            name: d.name,
            description: d.description,
            amount_data_type: d.amountdatatype,
            is_amount: d.isamount,
            is_stretch_tracked: d.isstretchtracked,
            status: ActiveStatus::from_state_code(d.statecode),
            state_code: d.statecode,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GoalCreateInput {
    pub title: String,
    /// System user who owns the goal
    pub goal_owner_id: String,
    /// Goal metric the goal is measured with
    pub metric_id: String,
    #[serde(default)]
    pub target_money: Option<f64>,
    #[serde(default)]
    pub target_decimal: Option<f64>,
    #[serde(default)]
    pub target_integer: Option<i64>,
    #[serde(default)]
    pub goal_start_date: Option<String>,
    #[serde(default)]
    pub goal_end_date: Option<String>,
    #[serde(default)]
    pub fiscal_period: Option<i32>,
    #[serde(default)]
    pub fiscal_year: Option<i32>,
    #[serde(default)]
    pub consider_only_goal_owners_records: Option<bool>,
    #[serde(default)]
    pub parent_goal_id: Option<String>,
    #[serde(default)]
    pub custom_fields: Option<Map<String, Value>>,
}

impl GoalCreateInput {
    pub fn to_wire(&self) -> WireBody {
        WireBody::new()
            .value("title", self.title.clone())
            .bind_id("goalownerid", "systemusers", &self.goal_owner_id)
            .bind_id("metricid", METRIC_SET, &self.metric_id)
            .field("targetmoney", &self.target_money)
            .field("targetdecimal", &self.target_decimal)
            .field("targetinteger", &self.target_integer)
            .field("goalstartdate", &self.goal_start_date)
            .field("goalenddate", &self.goal_end_date)
            .field("fiscalperiod", &self.fiscal_period)
            .field("fiscalyear", &self.fiscal_year)
            .field(
                "consideronlygoalownersrecords",
                &self.consider_only_goal_owners_records,
            )
            .bind("parentgoalid", ENTITY_SET, &self.parent_goal_id)
            .custom(&self.custom_fields)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GoalUpdateInput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub target_money: Option<f64>,
    #[serde(default)]
    pub target_decimal: Option<f64>,
    #[serde(default)]
    pub target_integer: Option<i64>,
    #[serde(default)]
    pub goal_start_date: Option<String>,
    #[serde(default)]
    pub goal_end_date: Option<String>,
    #[serde(default)]
    pub fiscal_period: Option<i32>,
    #[serde(default)]
    pub fiscal_year: Option<i32>,
    #[serde(default)]
    pub consider_only_goal_owners_records: Option<bool>,
    #[serde(default)]
    pub custom_fields: Option<Map<String, Value>>,
}

impl GoalUpdateInput {
    pub fn to_wire(&self) -> WireBody {
        WireBody::new()
            .field("title", &self.title)
            .field("targetmoney", &self.target_money)
            .field("targetdecimal", &self.target_decimal)
            .field("targetinteger", &self.target_integer)
            .field("goalstartdate", &self.goal_start_date)
            .field("goalenddate", &self.goal_end_date)
            .field("fiscalperiod", &self.fiscal_period)
            .field("fiscalyear", &self.fiscal_year)
            .field(
                "consideronlygoalownersrecords",
                &self.consider_only_goal_owners_records,
            )
            .custom(&self.custom_fields)
    }
}

/// Goals API client.
#[derive(Clone, Debug)]
pub struct GoalsClient {
    odata: ODataClient,
}

impl GoalsClient {
    pub fn new(odata: ODataClient) -> Self {
        Self { odata }
    }

    pub async fn list_goals(
        &self,
        params: &PaginationParams,
    ) -> Result<PaginatedResponse<Goal>, CrmError> {
        let query = ODataQuery::new()
            .select(SELECT.iter().copied())
            .orderby("createdon", SortOrder::Desc);
        fetch_page::<GoalRecord, _>(&self.odata, ENTITY_SET, query, params).await
    }

    pub async fn get_goal(&self, id: &str) -> Result<Goal, CrmError> {
        fetch_one::<GoalRecord, _>(&self.odata, ENTITY_SET, id, SELECT).await
    }

    pub async fn create_goal(&self, input: &GoalCreateInput) -> Result<Goal, CrmError> {
        let created = self
            .odata
            .create_entity(&format!("/{}", ENTITY_SET), &input.to_wire().into_value())
            .await?;
        self.get_goal(&created.id).await
    }

    pub async fn update_goal(&self, id: &str, input: &GoalUpdateInput) -> Result<Goal, CrmError> {
        self.odata
            .patch(&record_path(ENTITY_SET, id), &input.to_wire().into_value())
            .await?;
        self.get_goal(id).await
    }

    pub async fn delete_goal(&self, id: &str) -> Result<(), CrmError> {
        self.odata.delete(&record_path(ENTITY_SET, id)).await
    }

    /// Rolls actuals up again from the underlying records.
    pub async fn recalculate_goal(&self, id: &str) -> Result<(), CrmError> {
        self.odata
            .post(
                &format!("{}/Microsoft.Dynamics.CRM.Recalculate", record_path(ENTITY_SET, id)),
                &json!({}),
            )
            .await
            .map(|_| ())
    }

    pub async fn list_goal_metrics(
        &self,
        params: &PaginationParams,
    ) -> Result<PaginatedResponse<GoalMetric>, CrmError> {
        let query = ODataQuery::new().select(METRIC_SELECT.iter().copied());
        fetch_page::<MetricRecord, _>(&self.odata, METRIC_SET, query, params).await
    }

    pub async fn get_goal_metric(&self, id: &str) -> Result<GoalMetric, CrmError> {
        fetch_one::<MetricRecord, _>(&self.odata, METRIC_SET, id, METRIC_SELECT).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{collection, no_content, odata_client, ScriptedTransport};
    use std::sync::Arc;

    #[test]
    fn test_create_binds_owner_metric_and_parent() {
        let input = GoalCreateInput {
            title: "Q3 revenue".to_string(),
            goal_owner_id: "U1".to_string(),
            metric_id: "M1".to_string(),
            target_money: Some(250000.0),
            fiscal_year: Some(2024),
            parent_goal_id: Some("G0".to_string()),
            ..Default::default()
        };
        let body = input.to_wire();
        assert_eq!(body.get("goalownerid@odata.bind"), Some(&json!("/systemusers(U1)")));
        assert_eq!(body.get("metricid@odata.bind"), Some(&json!("/metrics(M1)")));
        assert_eq!(body.get("parentgoalid@odata.bind"), Some(&json!("/goals(G0)")));
        assert_eq!(body.get("targetmoney"), Some(&json!(250000.0)));
        assert!(body.get("targetinteger").is_none());
    }

    #[test]
    fn test_goal_from_record() {
        let record: GoalRecord = serde_json::from_value(json!({
            "goalid": "G1",
            "title": "Q3 revenue",
            "_metricid_value": "M1",
            "actualmoney": 120000.0,
            "percentage": 48.0,
            "statecode": 1
        }))
        .unwrap();
        let goal = Goal::from(record);
        assert_eq!(goal.metric_id.as_deref(), Some("M1"));
        assert_eq!(goal.percentage, Some(48.0));
        assert_eq!(goal.status, ActiveStatus::Inactive);
    }

    #[tokio::test]
    async fn test_recalculate_posts_empty_body() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(no_content());
        let client = GoalsClient::new(odata_client(transport.clone()));

        client.recalculate_goal("G1").await.unwrap();
        assert!(transport
            .last_request()
            .url
            .ends_with("/goals(G1)/Microsoft.Dynamics.CRM.Recalculate"));
        assert_eq!(transport.body_json(0), json!({}));
    }

    #[tokio::test]
    async fn test_list_metrics() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(collection(vec![json!({
            "metricid": "M1",
            "name": "Revenue",
            "amountdatatype": 0,
            "isamount": true,
            "statecode": 0
        })]));
        let client = GoalsClient::new(odata_client(transport.clone()));

        let page = client
            .list_goal_metrics(&PaginationParams::default())
            .await
            .unwrap();
        assert_eq!(page.items[0].name.as_deref(), Some("Revenue"));
        assert_eq!(page.items[0].status, ActiveStatus::Active);
        assert!(transport.last_request().url.contains("/metrics?$select=metricid"));
    }
}
