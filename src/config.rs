//! Configuration management for the Dynamics 365 MCP Server.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::auth::{TenantCredentials, DEFAULT_AUTHORITY_HOST};
use crate::error::ConfigError;

/// Main configuration structure.
#[derive(Clone, Deserialize, Serialize)]
pub struct Config {
    /// Environment root, e.g. `https://contoso.crm.dynamics.com`
    pub environment_url: String,

    /// Pre-obtained bearer token; skips the client-credentials exchange
    #[serde(default)]
    pub access_token: Option<String>,

    /// Azure AD tenant (client-credentials mode)
    #[serde(default)]
    pub tenant_id: Option<String>,

    /// App registration client ID (client-credentials mode)
    #[serde(default)]
    pub client_id: Option<String>,

    /// App registration client secret (client-credentials mode)
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Token authority host
    #[serde(default = "default_authority_host")]
    pub authority_host: String,

    /// Web API version segment
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Enable debug logging and the tool-call trace file
    #[serde(default)]
    pub debug: bool,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Buffer before token expiration to refresh (seconds)
    #[serde(default = "default_token_buffer")]
    pub token_refresh_buffer_seconds: u64,
}

fn default_authority_host() -> String {
    DEFAULT_AUTHORITY_HOST.to_string()
}

fn default_api_version() -> String {
    "v9.2".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_token_buffer() -> u64 {
    60
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.environment_url.trim();
        if url.is_empty() {
            return Err(ConfigError::MissingField("environment_url".into()));
        }
        if !url.starts_with("https://") && !url.starts_with("http://") {
            return Err(ConfigError::Invalid(format!(
                "environment_url must start with http:// or https://, got '{}'",
                url
            )));
        }

        if present(&self.access_token) {
            return Ok(());
        }
        for (name, value) in [
            ("tenant_id", &self.tenant_id),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ] {
            if !present(value) {
                return Err(ConfigError::MissingField(format!(
                    "{} (required unless access_token is set)",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Environment root without trailing slashes.
    pub fn environment_root(&self) -> &str {
        self.environment_url.trim().trim_end_matches('/')
    }

    /// Get the Web API base URL.
    pub fn api_base_url(&self) -> String {
        format!("{}/api/data/{}", self.environment_root(), self.api_version)
    }

    pub fn to_credentials(&self) -> TenantCredentials {
        TenantCredentials {
            environment_url: self.environment_root().to_string(),
            access_token: self.access_token.clone(),
            tenant_id: self.tenant_id.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
        }
    }

    /// Get timeout as Duration.
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_seconds)
    }

    /// Get token refresh buffer as chrono Duration.
    pub fn token_buffer(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.token_refresh_buffer_seconds as i64)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| "<redacted>");
        f.debug_struct("Config")
            .field("environment_url", &self.environment_url)
            .field("access_token", &redact(&self.access_token))
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("authority_host", &self.authority_host)
            .field("api_version", &self.api_version)
            .field("debug", &self.debug)
            .field("timeout_seconds", &self.timeout_seconds)
            .field(
                "token_refresh_buffer_seconds",
                &self.token_refresh_buffer_seconds,
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Config {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_defaults_and_url_construction() {
        let config = parse(json!({
            "environment_url": "https://contoso.crm.dynamics.com/",
            "tenant_id": "tenant",
            "client_id": "client",
            "client_secret": "secret"
        }));

        assert!(config.validate().is_ok());
        assert_eq!(
            config.api_base_url(),
            "https://contoso.crm.dynamics.com/api/data/v9.2"
        );
        assert_eq!(config.authority_host, "https://login.microsoftonline.com");
        assert_eq!(config.timeout(), std::time::Duration::from_secs(30));
        assert_eq!(config.token_buffer(), chrono::Duration::seconds(60));
        assert_eq!(
            config.to_credentials().environment_url,
            "https://contoso.crm.dynamics.com"
        );
    }

    #[test]
    fn test_access_token_alone_is_enough() {
        let config = parse(json!({
            "environment_url": "https://contoso.crm4.dynamics.com",
            "access_token": "eyJ0",
            "api_version": "v9.1"
        }));

        assert!(config.validate().is_ok());
        assert_eq!(
            config.api_base_url(),
            "https://contoso.crm4.dynamics.com/api/data/v9.1"
        );
    }

    #[test]
    fn test_missing_client_secret_is_reported() {
        let config = parse(json!({
            "environment_url": "https://contoso.crm.dynamics.com",
            "tenant_id": "tenant",
            "client_id": "client",
            "client_secret": ""
        }));

        match config.validate() {
            Err(ConfigError::MissingField(field)) => assert!(field.starts_with("client_secret")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_environment_url_needs_scheme() {
        let config = parse(json!({
            "environment_url": "contoso.crm.dynamics.com",
            "access_token": "t"
        }));

        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_debug_output_redacts_secrets() {
        let config = parse(json!({
            "environment_url": "https://contoso.crm.dynamics.com",
            "access_token": "super-secret-token",
            "client_secret": "hunter2"
        }));

        let printed = format!("{:?}", config);
        assert!(!printed.contains("super-secret-token"));
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("<redacted>"));
    }
}
