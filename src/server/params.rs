//! Tool parameter structs that are not entity inputs themselves.

use rmcp::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};

use crate::api::batch::{RecordUpdate, UpsertRecord};
use crate::api::campaigns::CampaignMemberType;
use crate::api::common::{PaginationParams, Record};
use crate::api::quotes::QuoteCloseStatus;

/// Default `top` for saved and user queries.
pub const DEFAULT_QUERY_TOP: u32 = 50;
pub const MAX_QUERY_TOP: u32 = 5000;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct IdParams {
    /// Record ID (GUID)
    pub id: String,
}

/// A record ID plus the fields of an entity input.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct WithId<T> {
    /// Record ID (GUID)
    pub id: String,
    #[serde(flatten)]
    pub input: T,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MoveStageParams {
    /// Opportunity ID
    pub id: String,
    /// Target stage name, e.g. "Propose"
    pub stage: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetActivityParams {
    pub id: String,
    /// Concrete activity type (task, phonecall, email, appointment, letter, fax);
    /// omitted reads the generic activity projection
    #[serde(default)]
    pub activity_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TypedActivityParams {
    pub id: String,
    /// Concrete activity type, e.g. task or phonecall
    pub activity_type: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TypedActivityInput<T> {
    pub id: String,
    /// Concrete activity type, e.g. task or phonecall
    pub activity_type: String,
    #[serde(flatten)]
    pub input: T,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActivitiesByTypeParams<T> {
    /// Concrete activity type, e.g. task or phonecall
    pub activity_type: String,
    #[serde(flatten)]
    pub list: T,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CloseQuoteParams {
    pub id: String,
    /// won, lost or cancelled
    pub status: QuoteCloseStatus,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompetitorOpportunityParams {
    pub competitor_id: String,
    pub opportunity_id: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityParams {
    pub opportunity_id: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CampaignMemberParams {
    pub campaign_id: String,
    /// contact, lead or account
    pub member_type: CampaignMemberType,
    pub member_id: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntityNotesParams {
    /// ID of the record the notes are attached to
    pub entity_id: String,
    /// Maximum number of notes (default 20, max 100)
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TextSearchParams {
    /// Text to search for
    pub query: String,
    /// Maximum number of results (default 20, max 100)
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TeamMemberParams {
    pub team_id: String,
    pub user_id: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FetchXmlParams {
    /// Logical name of the root entity, e.g. account
    pub entity_type: String,
    /// Complete FetchXML document
    pub fetch_xml: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CountParams {
    /// Logical name of the entity, e.g. account
    pub entity_type: String,
    /// Optional OData $filter expression
    #[serde(default)]
    pub filter: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoredQueryParams {
    /// Saved query (system view) or user query ID
    pub query_id: String,
    /// Logical name of the entity the view targets
    pub entity_type: String,
    /// Maximum number of records (default 50, max 5000)
    #[serde(default)]
    pub top: Option<u32>,
}

impl StoredQueryParams {
    pub fn top(&self) -> u32 {
        self.top
            .filter(|top| *top > 0)
            .unwrap_or(DEFAULT_QUERY_TOP)
            .min(MAX_QUERY_TOP)
    }
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchCreateParams {
    /// Logical name of the entity, e.g. contact
    pub entity_type: String,
    /// Wire attribute maps, one per record
    pub records: Vec<Record>,
    /// Keep counting after the first failure (default false)
    #[serde(default)]
    pub continue_on_error: bool,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdateParams {
    pub entity_type: String,
    pub updates: Vec<RecordUpdate>,
    #[serde(default)]
    pub continue_on_error: bool,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchDeleteParams {
    pub entity_type: String,
    pub ids: Vec<String>,
    #[serde(default)]
    pub continue_on_error: bool,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpsertParams {
    pub entity_type: String,
    pub records: Vec<UpsertRecord>,
    #[serde(default)]
    pub continue_on_error: bool,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListEntitiesParams {
    /// Only entities whose logical name contains this text
    #[serde(default)]
    pub filter: Option<String>,
    /// Include custom entities (default true)
    #[serde(default = "default_true")]
    pub include_custom: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntityNameParams {
    /// Entity logical name, e.g. account
    pub entity_name: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntityAttributesParams {
    pub entity_name: String,
    /// Only attributes of this type, e.g. Picklist or String
    #[serde(default)]
    pub attribute_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttributeParams {
    pub entity_name: String,
    /// Attribute logical name, e.g. industrycode
    pub attribute_name: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct OptionSetNameParams {
    /// Global option set name
    pub name: String,
}

/// Limit clamped the same way list pagination is.
pub fn page_limit(limit: Option<u32>) -> u32 {
    PaginationParams {
        limit,
        ..Default::default()
    }
    .page_size()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::contacts::ContactUpdateInput;
    use serde_json::json;

    #[test]
    fn test_with_id_flattens_input_fields() {
        let params: WithId<ContactUpdateInput> = serde_json::from_value(json!({
            "id": "C1",
            "firstName": "Ada"
        }))
        .unwrap();

        assert_eq!(params.id, "C1");
        assert_eq!(params.input.first_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn test_limits_are_clamped() {
        assert_eq!(page_limit(None), 20);
        assert_eq!(page_limit(Some(500)), 100);

        let stored: StoredQueryParams = serde_json::from_value(json!({
            "queryId": "Q1",
            "entityType": "account"
        }))
        .unwrap();
        assert_eq!(stored.top(), 50);
    }

    #[test]
    fn test_batch_continue_on_error_defaults_to_false() {
        let params: BatchDeleteParams = serde_json::from_value(json!({
            "entityType": "contact",
            "ids": ["C1"]
        }))
        .unwrap();
        assert!(!params.continue_on_error);
    }
}
