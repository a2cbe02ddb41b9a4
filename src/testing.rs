//! Scripted transport and fixtures shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

use crate::auth::{TenantCredentials, TokenManager};
use crate::error::CrmError;
use crate::odata::ODataClient;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

pub const ENVIRONMENT_URL: &str = "https://org.crm.dynamics.com";
pub const BASE_URL: &str = "https://org.crm.dynamics.com/api/data/v9.2";

/// Replays queued responses in order and records every request.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: HttpResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> HttpRequest {
        self.requests().last().cloned().expect("no request recorded")
    }

    /// Body of the nth recorded request parsed as JSON.
    pub fn body_json(&self, index: usize) -> Value {
        let requests = self.requests();
        let body = requests[index].body.as_deref().expect("request had no body");
        serde_json::from_str(body).expect("request body is not JSON")
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, CrmError> {
        self.requests.lock().unwrap().push(request);
        let next = self.responses.lock().unwrap().pop_front();
        next.ok_or_else(|| CrmError::CrmApi {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "no scripted response".to_string(),
        })
    }
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).expect("valid status code")
}

pub fn json_response(code: u16, body: Value) -> HttpResponse {
    HttpResponse {
        status: status(code),
        headers: HashMap::new(),
        body: body.to_string(),
    }
}

pub fn text_response(code: u16, body: &str) -> HttpResponse {
    HttpResponse {
        status: status(code),
        headers: HashMap::new(),
        body: body.to_string(),
    }
}

pub fn no_content() -> HttpResponse {
    text_response(204, "")
}

/// A 201 response whose `OData-EntityId` header points at `{entity_set}({id})`.
pub fn created(entity_set: &str, id: &str) -> HttpResponse {
    let mut headers = HashMap::new();
    headers.insert(
        "odata-entityid".to_string(),
        format!("{}/{}({})", BASE_URL, entity_set, id),
    );
    HttpResponse {
        status: status(201),
        headers,
        body: "{}".to_string(),
    }
}

pub fn with_header(mut response: HttpResponse, name: &str, value: &str) -> HttpResponse {
    response
        .headers
        .insert(name.to_ascii_lowercase(), value.to_string());
    response
}

pub fn collection(records: Vec<Value>) -> HttpResponse {
    json_response(200, serde_json::json!({ "value": records }))
}

/// Engine authenticated with a fixed bearer token, so no token calls are scripted.
pub fn odata_client(transport: Arc<ScriptedTransport>) -> ODataClient {
    let credentials = TenantCredentials {
        environment_url: ENVIRONMENT_URL.to_string(),
        access_token: Some("test-token".to_string()),
        ..Default::default()
    };
    let tokens = TokenManager::new(credentials, transport.clone());
    ODataClient::new(BASE_URL.to_string(), tokens, transport)
}
