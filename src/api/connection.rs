//! Identity of the calling application user and a connectivity probe.

use serde::{Deserialize, Serialize};

use crate::error::CrmError;
use crate::odata::ODataClient;

/// Response of the unbound `WhoAmI` function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WhoAmI {
    #[serde(rename = "UserId", default)]
    pub user_id: String,
    #[serde(rename = "BusinessUnitId", default)]
    pub business_unit_id: String,
    #[serde(rename = "OrganizationId", default)]
    pub organization_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub message: String,
}

#[derive(Clone, Debug)]
pub struct ConnectionClient {
    odata: ODataClient,
}

impl ConnectionClient {
    pub fn new(odata: ODataClient) -> Self {
        Self { odata }
    }

    pub async fn who_am_i(&self) -> Result<WhoAmI, CrmError> {
        who_am_i(&self.odata).await
    }

    /// Never fails; a failed probe is reported as `connected: false`.
    pub async fn test_connection(&self) -> ConnectionStatus {
        match who_am_i(&self.odata).await {
            Ok(who) => ConnectionStatus {
                connected: true,
                message: format!(
                    "Successfully connected to Dynamics 365. User ID: {}, Organization ID: {}",
                    who.user_id, who.organization_id
                ),
            },
            Err(e) => {
                tracing::warn!(error = %e, "Dynamics 365 connection test failed");
                ConnectionStatus {
                    connected: false,
                    message: e.to_string(),
                }
            }
        }
    }
}

pub async fn who_am_i(odata: &ODataClient) -> Result<WhoAmI, CrmError> {
    odata.get("/WhoAmI").await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{json_response, odata_client, ScriptedTransport};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_connection_reports_identity() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(json_response(
            200,
            json!({"UserId": "U1", "BusinessUnitId": "B1", "OrganizationId": "O1"}),
        ));
        let client = ConnectionClient::new(odata_client(transport.clone()));

        let status = client.test_connection().await;
        assert!(status.connected);
        assert_eq!(
            status.message,
            "Successfully connected to Dynamics 365. User ID: U1, Organization ID: O1"
        );
        assert!(transport.last_request().url.ends_with("/WhoAmI"));
    }

    #[tokio::test]
    async fn test_connection_failure_is_not_an_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(json_response(401, json!({"error": {"message": "nope"}})));
        let client = ConnectionClient::new(odata_client(transport));

        let status = client.test_connection().await;
        assert!(!status.connected);
        assert!(status.message.contains("Authentication"));
    }
}
