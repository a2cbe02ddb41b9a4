//! OAuth2 client credentials authentication against Microsoft Entra ID.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::error::CrmError;
use crate::transport::{HttpRequest, HttpTransport};

/// Default identity provider authority.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Tokens are treated as expired this long before the provider says so.
pub const DEFAULT_SAFETY_MARGIN_SECONDS: i64 = 60;

const MISSING_CREDENTIALS: &str = "Missing credentials for OAuth client credentials flow. \
    Provide tenant_id, client_id and client_secret, or access_token for a pre-obtained token.";

/// Credentials for one tenant. Empty strings count as absent.
#[derive(Clone, Default)]
pub struct TenantCredentials {
    pub environment_url: String,
    pub access_token: Option<String>,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// The authentication mode a credential set resolves to.
#[derive(Debug, PartialEq, Eq)]
pub enum AuthMode<'a> {
    PreObtained(&'a str),
    ClientCredentials {
        tenant_id: &'a str,
        client_id: &'a str,
        client_secret: &'a str,
    },
    Invalid,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl TenantCredentials {
    pub fn auth_mode(&self) -> AuthMode<'_> {
        if let Some(token) = present(&self.access_token) {
            return AuthMode::PreObtained(token);
        }
        match (
            present(&self.tenant_id),
            present(&self.client_id),
            present(&self.client_secret),
        ) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => {
                AuthMode::ClientCredentials {
                    tenant_id,
                    client_id,
                    client_secret,
                }
            }
            _ => AuthMode::Invalid,
        }
    }
}

impl std::fmt::Debug for TenantCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantCredentials")
            .field("environment_url", &self.environment_url)
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Token endpoint success body.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Token endpoint failure body.
#[derive(Debug, Default, Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

/// Cached token. `expires_at` already has the safety margin subtracted.
#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Acquires and caches bearer tokens for a single tenant.
///
/// Clones share the cache slot. Concurrent refreshes race benignly: the
/// last fetched token wins.
#[derive(Clone)]
pub struct TokenManager {
    credentials: TenantCredentials,
    authority_host: String,
    safety_margin: Duration,
    transport: Arc<dyn HttpTransport>,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

impl TokenManager {
    pub fn new(credentials: TenantCredentials, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            credentials,
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            safety_margin: Duration::seconds(DEFAULT_SAFETY_MARGIN_SECONDS),
            transport,
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_authority_host(mut self, authority_host: impl Into<String>) -> Self {
        self.authority_host = authority_host.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = margin;
        self
    }

    /// Get a valid access token, acquiring one if necessary.
    pub async fn get_token(&self) -> Result<String, CrmError> {
        self.token_at(Utc::now()).await
    }

    /// Same as [`get_token`](Self::get_token) with an explicit clock.
    pub async fn token_at(&self, now: DateTime<Utc>) -> Result<String, CrmError> {
        let (tenant_id, client_id, client_secret) = match self.credentials.auth_mode() {
            AuthMode::PreObtained(token) => return Ok(token.to_string()),
            AuthMode::ClientCredentials {
                tenant_id,
                client_id,
                client_secret,
            } => (tenant_id, client_id, client_secret),
            AuthMode::Invalid => {
                return Err(CrmError::Authentication(MISSING_CREDENTIALS.to_string()))
            }
        };

        if let Some(token) = self.cached_at(now).await {
            return Ok(token);
        }

        self.fetch_token(tenant_id, client_id, client_secret, now)
            .await
    }

    /// Drop the cached token so the next call re-acquires one.
    pub async fn invalidate(&self) {
        let mut cache = self.token_cache.write().await;
        *cache = None;
    }

    fn token_url(&self, tenant_id: &str) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.authority_host, tenant_id)
    }

    fn scope(&self) -> String {
        format!(
            "{}/.default",
            self.credentials.environment_url.trim_end_matches('/')
        )
    }

    async fn cached_at(&self, now: DateTime<Utc>) -> Option<String> {
        let cache = self.token_cache.read().await;
        cache
            .as_ref()
            .filter(|cached| cached.is_valid_at(now))
            .map(|cached| cached.access_token.clone())
    }

    async fn fetch_token(
        &self,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
        now: DateTime<Utc>,
    ) -> Result<String, CrmError> {
        let token_url = self.token_url(tenant_id);
        let form = [
            ("grant_type", "client_credentials".to_string()),
            ("client_id", client_id.to_string()),
            ("client_secret", client_secret.to_string()),
            ("scope", self.scope()),
        ]
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

        tracing::debug!(url = %token_url, "requesting client credentials token");

        let request = HttpRequest::new(Method::POST, &token_url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(form);
        let response = self.transport.send(request).await?;

        if !response.status.is_success() {
            let error: TokenErrorResponse =
                serde_json::from_str(&response.body).unwrap_or_default();
            let message = error
                .error_description
                .or(error.error)
                .unwrap_or_else(|| "Failed to acquire Dynamics 365 token".to_string());
            tracing::warn!(status = %response.status, "token request rejected");
            return Err(CrmError::Authentication(message));
        }

        let token: TokenResponse = serde_json::from_str(&response.body).map_err(|e| {
            CrmError::Authentication(format!("Failed to parse token response: {}", e))
        })?;

        let expires_at = now + Duration::seconds(token.expires_in) - self.safety_margin;
        tracing::info!(
            expires_at = %expires_at.format("%Y-%m-%d %H:%M:%S UTC"),
            "access token acquired"
        );

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                access_token: token.access_token.clone(),
                expires_at,
            });
        }

        Ok(token.access_token)
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("environment_url", &self.credentials.environment_url)
            .field("tenant_id", &self.credentials.tenant_id)
            .field("authority_host", &self.authority_host)
            .finish()
    }
}
