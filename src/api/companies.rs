//! Companies (`accounts` entity set).

use rmcp::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::common::{
    custom_fields, fetch_one, fetch_page, record_path, ActiveStatus, Address, PaginatedResponse,
    PaginationParams,
};
use super::wire::WireBody;
use crate::error::CrmError;
use crate::odata::{ODataClient, ODataQuery, SortOrder};

pub const ENTITY_SET: &str = "accounts";

const SELECT: &[&str] = &[
    "accountid",
    "name",
    "websiteurl",
    "industrycode",
    "description",
    "numberofemployees",
    "revenue",
    "telephone1",
    "address1_line1",
    "address1_city",
    "address1_stateorprovince",
    "address1_country",
    "address1_postalcode",
    "createdon",
    "modifiedon",
    "statecode",
    "_ownerid_value",
];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountRecord {
    #[serde(default)]
    pub accountid: String,
    pub name: Option<String>,
    pub websiteurl: Option<String>,
    pub industrycode: Option<i32>,
    pub description: Option<String>,
    pub numberofemployees: Option<i64>,
    pub revenue: Option<f64>,
    pub telephone1: Option<String>,
    pub address1_line1: Option<String>,
    pub address1_city: Option<String>,
    pub address1_stateorprovince: Option<String>,
    pub address1_country: Option<String>,
    pub address1_postalcode: Option<String>,
    pub statecode: Option<i32>,
    pub createdon: Option<String>,
    pub modifiedon: Option<String>,
    #[serde(rename = "_ownerid_value")]
    pub ownerid: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Normalized company.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: String,
    pub name: Option<String>,
    pub website: Option<String>,
    /// Industry option value rendered as text.
    pub industry: Option<String>,
    pub description: Option<String>,
    pub number_of_employees: Option<i64>,
    pub annual_revenue: Option<f64>,
    pub phone: Option<String>,
    pub address: Option<Address>,
    pub status: ActiveStatus,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub owner_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Map<String, Value>>,
}

impl From<AccountRecord> for Company {
    fn from(d: AccountRecord) -> Self {
        Self {
            id: d.accountid,
            name: d.name,
            website: d.websiteurl,
            industry: d.industrycode.map(|code| code.to_string()),
            description: d.description,
            number_of_employees: d.numberofemployees,
            annual_revenue: d.revenue,
            phone: d.telephone1,
            address: Address {
                street: d.address1_line1,
                city: d.address1_city,
                state: d.address1_stateorprovince,
                country: d.address1_country,
                postal_code: d.address1_postalcode,
                ..Default::default()
            }
            .non_empty(),
            status: ActiveStatus::from_state_code(d.statecode),
            created_at: d.createdon,
            updated_at: d.modifiedon,
            owner_id: d.ownerid,
            custom_fields: custom_fields(d.extra),
        }
    }
}

/// Industry is an option set; only numeric text is sent.
fn industry_code(industry: &Option<String>) -> Option<i32> {
    industry.as_deref().and_then(|s| s.trim().parse().ok())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompanyCreateInput {
    /// Account name (required)
    pub name: String,
    /// Website or domain
    #[serde(default)]
    pub domain: Option<String>,
    /// Industry option set value as text (e.g. "7")
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub number_of_employees: Option<i64>,
    /// Main phone
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub custom_fields: Option<Map<String, Value>>,
}

impl CompanyCreateInput {
    pub fn to_wire(&self) -> WireBody {
        WireBody::new()
            .value("name", self.name.clone())
            .field("websiteurl", &self.domain)
            .field("description", &self.description)
            .field("numberofemployees", &self.number_of_employees)
            .field("telephone1", &self.phone)
            .field("industrycode", &industry_code(&self.industry))
            .address("address1", &self.address)
            .custom(&self.custom_fields)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompanyUpdateInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub number_of_employees: Option<i64>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub custom_fields: Option<Map<String, Value>>,
}

impl CompanyUpdateInput {
    pub fn to_wire(&self) -> WireBody {
        WireBody::new()
            .field("name", &self.name)
            .field("websiteurl", &self.domain)
            .field("description", &self.description)
            .field("numberofemployees", &self.number_of_employees)
            .field("telephone1", &self.phone)
            .field("industrycode", &industry_code(&self.industry))
            .address("address1", &self.address)
            .custom(&self.custom_fields)
    }
}

/// Companies API client.
#[derive(Clone, Debug)]
pub struct CompaniesClient {
    odata: ODataClient,
}

impl CompaniesClient {
    pub fn new(odata: ODataClient) -> Self {
        Self { odata }
    }

    pub async fn list_companies(
        &self,
        params: &PaginationParams,
    ) -> Result<PaginatedResponse<Company>, CrmError> {
        let query = ODataQuery::new()
            .select(SELECT.iter().copied())
            .orderby("modifiedon", SortOrder::Desc);
        fetch_page::<AccountRecord, _>(&self.odata, ENTITY_SET, query, params).await
    }

    pub async fn get_company(&self, id: &str) -> Result<Company, CrmError> {
        fetch_one::<AccountRecord, _>(&self.odata, ENTITY_SET, id, SELECT).await
    }

    pub async fn create_company(&self, input: &CompanyCreateInput) -> Result<Company, CrmError> {
        let created = self
            .odata
            .create_entity(&format!("/{}", ENTITY_SET), &input.to_wire().into_value())
            .await?;
        self.get_company(&created.id).await
    }

    pub async fn update_company(
        &self,
        id: &str,
        input: &CompanyUpdateInput,
    ) -> Result<Company, CrmError> {
        self.odata
            .patch(&record_path(ENTITY_SET, id), &input.to_wire().into_value())
            .await?;
        self.get_company(id).await
    }

    pub async fn delete_company(&self, id: &str) -> Result<(), CrmError> {
        self.odata.delete(&record_path(ENTITY_SET, id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_domain_builds_address_and_industry() {
        let record: AccountRecord = serde_json::from_value(json!({
            "accountid": "C1",
            "name": "Contoso",
            "websiteurl": "contoso.com",
            "industrycode": 7,
            "revenue": 1500000.5,
            "address1_city": "Redmond",
            "address1_country": "US",
            "statecode": 0
        }))
        .unwrap();
        let company = Company::from(record);

        assert_eq!(company.website.as_deref(), Some("contoso.com"));
        assert_eq!(company.industry.as_deref(), Some("7"));
        assert_eq!(company.annual_revenue, Some(1500000.5));
        let address = company.address.unwrap();
        assert_eq!(address.city.as_deref(), Some("Redmond"));
        assert_eq!(address.street, None);
        assert_eq!(company.status, ActiveStatus::Active);
    }

    #[test]
    fn test_to_domain_without_address_parts() {
        let record: AccountRecord = serde_json::from_value(json!({"accountid": "C2"})).unwrap();
        assert!(Company::from(record).address.is_none());
    }

    #[test]
    fn test_create_wire_parses_numeric_industry_only() {
        let input = CompanyCreateInput {
            name: "Contoso".to_string(),
            industry: Some("12".to_string()),
            ..Default::default()
        };
        assert_eq!(
            input.to_wire().into_value(),
            json!({"name": "Contoso", "industrycode": 12})
        );

        let textual = CompanyCreateInput {
            name: "Contoso".to_string(),
            industry: Some("Retail".to_string()),
            ..Default::default()
        };
        assert_eq!(textual.to_wire().into_value(), json!({"name": "Contoso"}));
    }

    #[test]
    fn test_update_wire_address_subset() {
        let input = CompanyUpdateInput {
            address: Some(Address {
                city: Some("Oslo".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(input.to_wire().into_value(), json!({"address1_city": "Oslo"}));
    }

    #[test]
    fn test_round_trip_populated_fields() {
        let input = CompanyCreateInput {
            name: "Contoso".to_string(),
            domain: Some("contoso.com".to_string()),
            industry: Some("7".to_string()),
            description: Some("Manufacturer".to_string()),
            number_of_employees: Some(250),
            phone: Some("555-0100".to_string()),
            address: Some(Address {
                street: Some("1 Main St".to_string()),
                city: Some("Redmond".to_string()),
                ..Default::default()
            }),
            custom_fields: None,
        };
        let mut echoed = input.to_wire().into_value();
        echoed["accountid"] = json!("C1");

        let company = Company::from(serde_json::from_value::<AccountRecord>(echoed).unwrap());
        assert_eq!(company.name.as_deref(), Some("Contoso"));
        assert_eq!(company.website, input.domain);
        assert_eq!(company.industry, input.industry);
        assert_eq!(company.description, input.description);
        assert_eq!(company.number_of_employees, input.number_of_employees);
        assert_eq!(company.phone, input.phone);
        assert_eq!(company.address, input.address);
    }
}
