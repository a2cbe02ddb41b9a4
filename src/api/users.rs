//! System users, teams and business units.

use rmcp::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};

use super::common::{
    contains_any, fetch_all, fetch_one, fetch_page, record_path, PaginatedResponse,
    PaginationParams,
};
use super::connection::who_am_i;
use super::relationships;
use super::wire::WireBody;
use crate::error::CrmError;
use crate::odata::{ODataClient, ODataQuery, SortOrder};

pub const USER_SET: &str = "systemusers";
pub const TEAM_SET: &str = "teams";
pub const BUSINESS_UNIT_SET: &str = "businessunits";

const TEAM_MEMBERSHIP: &str = "teammembership_association";
const ENABLED_ONLY: &str = "isdisabled eq false";

const USER_SELECT: &[&str] = &[
    "systemuserid",
    "fullname",
    "firstname",
    "lastname",
    "domainname",
    "internalemailaddress",
    "title",
    "jobtitle",
    "mobilephone",
    "address1_telephone1",
    "_businessunitid_value",
    "_territoryid_value",
    "_positionid_value",
    "_queueid_value",
    "isdisabled",
    "accessmode",
    "userlicensetype",
    "setupuser",
    "createdon",
    "modifiedon",
];

const TEAM_SELECT: &[&str] = &[
    "teamid",
    "name",
    "description",
    "teamtype",
    "_businessunitid_value",
    "_administratorid_value",
    "_queueid_value",
    "isdefault",
    "createdon",
];

const BUSINESS_UNIT_SELECT: &[&str] = &[
    "businessunitid",
    "name",
    "_parentbusinessunitid_value",
    "divisionname",
    "emailaddress",
    "websiteurl",
    "isdisabled",
    "createdon",
];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SystemUserRecord {
    #[serde(default)]
    pub systemuserid: String,
    pub fullname: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub domainname: Option<String>,
    pub internalemailaddress: Option<String>,
    pub title: Option<String>,
    pub jobtitle: Option<String>,
    pub mobilephone: Option<String>,
    pub address1_telephone1: Option<String>,
    #[serde(rename = "_businessunitid_value")]
    pub businessunitid: Option<String>,
    #[serde(rename = "_territoryid_value")]
    pub territoryid: Option<String>,
    #[serde(rename = "_positionid_value")]
    pub positionid: Option<String>,
    #[serde(rename = "_queueid_value")]
    pub queueid: Option<String>,
    pub isdisabled: Option<bool>,
    pub accessmode: Option<i32>,
    pub userlicensetype: Option<i32>,
    pub setupuser: Option<bool>,
    pub createdon: Option<String>,
    pub modifiedon: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemUser {
    pub id: String,
    pub full_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub domain_name: Option<String>,
    pub internal_email_address: Option<String>,
    pub title: Option<String>,
    pub job_title: Option<String>,
    pub mobile_phone: Option<String>,
    pub phone: Option<String>,
    pub business_unit_id: Option<String>,
    pub territory_id: Option<String>,
    pub position_id: Option<String>,
    pub queue_id: Option<String>,
    pub is_disabled: Option<bool>,
    pub access_mode: Option<i32>,
    pub user_license_type: Option<i32>,
    pub setup_user: Option<bool>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl From<SystemUserRecord> for SystemUser {
    fn from(d: SystemUserRecord) -> Self {
        Self {
            id: d.systemuserid,
            full_name: d.fullname,
            first_name: d.firstname,
            last_name: d.lastname,
            domain_name: d.domainname,
            internal_email_address: d.internalemailaddress,
            title: d.title,
            job_title: d.jobtitle,
            mobile_phone: d.mobilephone,
            phone: d.address1_telephone1,
            business_unit_id: d.businessunitid,
            territory_id: d.territoryid,
            position_id: d.positionid,
            queue_id: d.queueid,
            is_disabled: d.isdisabled,
            access_mode: d.accessmode,
            user_license_type: d.userlicensetype,
            setup_user: d.setupuser,
            created_at: d.createdon,
            updated_at: d.modifiedon,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeamRecord {
    #[serde(default)]
    pub teamid: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub teamtype: Option<i32>,
    #[serde(rename = "_businessunitid_value")]
    pub businessunitid: Option<String>,
    #[serde(rename = "_administratorid_value")]
    pub administratorid: Option<String>,
    #[serde(rename = "_queueid_value")]
    pub queueid: Option<String>,
    pub isdefault: Option<bool>,
    pub createdon: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    /// 0 owner, 1 access, 2 security group, 3 office group
    pub team_type: Option<i32>,
    pub business_unit_id: Option<String>,
    pub administrator_id: Option<String>,
    pub queue_id: Option<String>,
    pub is_default: Option<bool>,
    pub created_at: Option<String>,
}

impl From<TeamRecord> for Team {
    fn from(d: TeamRecord) -> Self {
        Self {
            id: d.teamid,
            name: d.name,
            description: d.description,
            team_type: d.teamtype,
            business_unit_id: d.businessunitid,
            administrator_id: d.administratorid,
            queue_id: d.queueid,
            is_default: d.isdefault,
            created_at: d.createdon,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BusinessUnitRecord {
    #[serde(default)]
    pub businessunitid: String,
    pub name: Option<String>,
    #[serde(rename = "_parentbusinessunitid_value")]
    pub parentbusinessunitid: Option<String>,
    pub divisionname: Option<String>,
    pub emailaddress: Option<String>,
    pub websiteurl: Option<String>,
    pub isdisabled: Option<bool>,
    pub createdon: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessUnit {
    pub id: String,
    pub name: Option<String>,
    pub parent_business_unit_id: Option<String>,
    pub division_name: Option<String>,
    pub email_address: Option<String>,
    pub website: Option<String>,
    pub is_disabled: Option<bool>,
    pub created_at: Option<String>,
}

impl From<BusinessUnitRecord> for BusinessUnit {
    fn from(d: BusinessUnitRecord) -> Self {
        Self {
            id: d.businessunitid,
            name: d.name,
            parent_business_unit_id: d.parentbusinessunitid,
            division_name: d.divisionname,
            email_address: d.emailaddress,
            website: d.websiteurl,
            is_disabled: d.isdisabled,
            created_at: d.createdon,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserListParams {
    #[serde(flatten)]
    pub pagination: PaginationParams,
    /// Exclude disabled users (default true)
    #[serde(default)]
    pub active_only: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TeamCreateInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub business_unit_id: String,
    /// 0 owner (default), 1 access
    #[serde(default)]
    pub team_type: Option<i32>,
    #[serde(default)]
    pub administrator_id: Option<String>,
}

impl TeamCreateInput {
    pub fn to_wire(&self) -> WireBody {
        WireBody::new()
            .value("name", self.name.clone())
            .field("description", &self.description)
            .value("teamtype", self.team_type.unwrap_or(0))
            .bind_id("businessunitid", BUSINESS_UNIT_SET, &self.business_unit_id)
            .bind("administratorid", USER_SET, &self.administrator_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TeamUpdateInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub administrator_id: Option<String>,
}

impl TeamUpdateInput {
    pub fn to_wire(&self) -> WireBody {
        WireBody::new()
            .field("name", &self.name)
            .field("description", &self.description)
            .bind("administratorid", USER_SET, &self.administrator_id)
    }
}

/// Users, teams and business units API client.
#[derive(Clone, Debug)]
pub struct UsersClient {
    odata: ODataClient,
}

impl UsersClient {
    pub fn new(odata: ODataClient) -> Self {
        Self { odata }
    }

    pub async fn list_users(
        &self,
        params: &UserListParams,
    ) -> Result<PaginatedResponse<SystemUser>, CrmError> {
        let mut query = ODataQuery::new()
            .select(USER_SELECT.iter().copied())
            .orderby("fullname", SortOrder::Asc);
        if params.active_only.unwrap_or(true) {
            query = query.filter(ENABLED_ONLY);
        }
        fetch_page::<SystemUserRecord, _>(&self.odata, USER_SET, query, &params.pagination).await
    }

    pub async fn get_user(&self, id: &str) -> Result<SystemUser, CrmError> {
        fetch_one::<SystemUserRecord, _>(&self.odata, USER_SET, id, USER_SELECT).await
    }

    /// The application user the client authenticates as.
    pub async fn get_current_user(&self) -> Result<SystemUser, CrmError> {
        let identity = who_am_i(&self.odata).await?;
        self.get_user(&identity.user_id).await
    }

    /// Enabled users whose name or email contains `text`.
    pub async fn search_users(&self, text: &str, limit: u32) -> Result<Vec<SystemUser>, CrmError> {
        let filter = if text.is_empty() {
            ENABLED_ONLY.to_string()
        } else {
            format!(
                "{} and {}",
                ENABLED_ONLY,
                contains_any(&["fullname", "internalemailaddress"], text)
            )
        };
        let query = ODataQuery::new()
            .select(USER_SELECT.iter().copied())
            .filter(filter)
            .top(limit)
            .orderby("fullname", SortOrder::Asc);
        fetch_all::<SystemUserRecord, _>(&self.odata, &format!("/{}", USER_SET), &query).await
    }

    pub async fn list_teams(
        &self,
        params: &PaginationParams,
    ) -> Result<PaginatedResponse<Team>, CrmError> {
        let query = ODataQuery::new()
            .select(TEAM_SELECT.iter().copied())
            .orderby("name", SortOrder::Asc);
        fetch_page::<TeamRecord, _>(&self.odata, TEAM_SET, query, params).await
    }

    pub async fn get_team(&self, id: &str) -> Result<Team, CrmError> {
        fetch_one::<TeamRecord, _>(&self.odata, TEAM_SET, id, TEAM_SELECT).await
    }

    pub async fn create_team(&self, input: &TeamCreateInput) -> Result<Team, CrmError> {
        let created = self
            .odata
            .create_entity(&format!("/{}", TEAM_SET), &input.to_wire().into_value())
            .await?;
        self.get_team(&created.id).await
    }

    pub async fn update_team(&self, id: &str, input: &TeamUpdateInput) -> Result<Team, CrmError> {
        self.odata
            .patch(&record_path(TEAM_SET, id), &input.to_wire().into_value())
            .await?;
        self.get_team(id).await
    }

    pub async fn delete_team(&self, id: &str) -> Result<(), CrmError> {
        self.odata.delete(&record_path(TEAM_SET, id)).await
    }

    pub async fn add_team_member(&self, team_id: &str, user_id: &str) -> Result<(), CrmError> {
        relationships::associate(
            &self.odata,
            TEAM_SET,
            team_id,
            TEAM_MEMBERSHIP,
            USER_SET,
            user_id,
        )
        .await
    }

    pub async fn remove_team_member(&self, team_id: &str, user_id: &str) -> Result<(), CrmError> {
        relationships::disassociate(&self.odata, TEAM_SET, team_id, TEAM_MEMBERSHIP, user_id).await
    }

    pub async fn list_team_members(&self, team_id: &str) -> Result<Vec<SystemUser>, CrmError> {
        let endpoint = format!("{}/{}", record_path(TEAM_SET, team_id), TEAM_MEMBERSHIP);
        let query = ODataQuery::new().select(USER_SELECT.iter().copied());
        fetch_all::<SystemUserRecord, _>(&self.odata, &endpoint, &query).await
    }

    /// Enabled business units only.
    pub async fn list_business_units(
        &self,
        params: &PaginationParams,
    ) -> Result<PaginatedResponse<BusinessUnit>, CrmError> {
        let query = ODataQuery::new()
            .select(BUSINESS_UNIT_SELECT.iter().copied())
            .filter(ENABLED_ONLY)
            .orderby("name", SortOrder::Asc);
        fetch_page::<BusinessUnitRecord, _>(&self.odata, BUSINESS_UNIT_SET, query, params).await
    }

    pub async fn get_business_unit(&self, id: &str) -> Result<BusinessUnit, CrmError> {
        fetch_one::<BusinessUnitRecord, _>(&self.odata, BUSINESS_UNIT_SET, id, BUSINESS_UNIT_SELECT)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        collection, json_response, no_content, odata_client, ScriptedTransport, BASE_URL,
    };
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_list_users_filters_disabled_by_default() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(collection(vec![]));
        transport.push(collection(vec![]));
        let client = UsersClient::new(odata_client(transport.clone()));

        client.list_users(&UserListParams::default()).await.unwrap();
        client
            .list_users(&UserListParams {
                active_only: Some(false),
                ..Default::default()
            })
            .await
            .unwrap();

        let requests = transport.requests();
        assert!(requests[0].url.contains("$filter=isdisabled%20eq%20false"));
        assert!(!requests[1].url.contains("$filter"));
    }

    #[tokio::test]
    async fn test_current_user_resolves_who_am_i() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(json_response(
            200,
            json!({"UserId": "U1", "BusinessUnitId": "B1", "OrganizationId": "O1"}),
        ));
        transport.push(json_response(
            200,
            json!({"systemuserid": "U1", "fullname": "App User", "address1_telephone1": "555"}),
        ));
        let client = UsersClient::new(odata_client(transport.clone()));

        let user = client.get_current_user().await.unwrap();
        assert_eq!(user.id, "U1");
        assert_eq!(user.phone.as_deref(), Some("555"));
        assert!(transport.requests()[1].url.contains("/systemusers(U1)?$select="));
    }

    #[tokio::test]
    async fn test_search_users_combines_filters() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(collection(vec![json!({"systemuserid": "U2"})]));
        let client = UsersClient::new(odata_client(transport.clone()));

        let users = client.search_users("ann", 10).await.unwrap();
        assert_eq!(users.len(), 1);
        let expected = urlencoding::encode(
            "isdisabled eq false and (contains(fullname,'ann') or contains(internalemailaddress,'ann'))",
        )
        .into_owned();
        assert!(transport.last_request().url.contains(&expected));
    }

    #[test]
    fn test_team_defaults_to_owner_type() {
        let input = TeamCreateInput {
            name: "Inside sales".to_string(),
            business_unit_id: "B1".to_string(),
            ..Default::default()
        };
        assert_eq!(
            input.to_wire().into_value(),
            json!({
                "name": "Inside sales",
                "teamtype": 0,
                "businessunitid@odata.bind": "/businessunits(B1)"
            })
        );
    }

    #[tokio::test]
    async fn test_team_membership_uses_association() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(no_content());
        transport.push(no_content());
        let client = UsersClient::new(odata_client(transport.clone()));

        client.add_team_member("T1", "U1").await.unwrap();
        client.remove_team_member("T1", "U1").await.unwrap();

        let requests = transport.requests();
        assert!(requests[0]
            .url
            .ends_with("/teams(T1)/teammembership_association/$ref"));
        assert_eq!(
            transport.body_json(0),
            json!({"@odata.id": format!("{}/systemusers(U1)", BASE_URL)})
        );
        assert!(requests[1]
            .url
            .ends_with("/teams(T1)/teammembership_association(U1)/$ref"));
    }
}
