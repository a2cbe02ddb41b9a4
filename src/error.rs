//! Unified error types for the Dynamics 365 CRM MCP Server.

use reqwest::StatusCode;
use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised by the CRM client adapter.
///
/// The first three variants are the terminal taxonomy every operation
/// reports; none of them is retried inside the adapter.
#[derive(Debug, Error)]
pub enum CrmError {
    /// Missing credentials, rejected token exchange, 401 or 403.
    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("{message} (retry after {retry_after_seconds}s)")]
    RateLimit {
        message: String,
        retry_after_seconds: u64,
    },

    #[error("Dynamics 365 API error [{status}]: {message}")]
    CrmApi { status: StatusCode, message: String },

    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A body was required but the server answered 204.
    #[error("Empty response from {0}")]
    EmptyResponse(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to create HTTP client: {0}")]
    HttpClientInit(String),
}

impl CrmError {
    /// HTTP status carried by API errors.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            CrmError::CrmApi { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            CrmError::RateLimit {
                retry_after_seconds,
                ..
            } => Some(*retry_after_seconds),
            _ => None,
        }
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, CrmError::Authentication(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_missing_field_display() {
        let error = ConfigError::MissingField("environment_url".to_string());
        assert_eq!(error.to_string(), "Missing required field: environment_url");
    }

    #[test]
    fn test_config_error_invalid_display() {
        let error = ConfigError::Invalid("environment_url must use https".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: environment_url must use https"
        );
    }

    #[test]
    fn test_config_error_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let config_err: ConfigError = io_err.into();
        assert!(config_err.to_string().contains("IO error"));
    }

    #[test]
    fn test_authentication_display() {
        let error = CrmError::Authentication("Access denied".to_string());
        assert_eq!(error.to_string(), "Authentication error: Access denied");
        assert!(error.is_authentication());
    }

    #[test]
    fn test_rate_limit_carries_retry_after() {
        let error = CrmError::RateLimit {
            message: "Dynamics 365 rate limit exceeded".to_string(),
            retry_after_seconds: 30,
        };
        assert_eq!(error.retry_after(), Some(30));
        assert_eq!(error.status(), None);
        assert!(error.to_string().contains("retry after 30s"));
    }

    #[test]
    fn test_crm_api_error_status() {
        let error = CrmError::CrmApi {
            status: StatusCode::NOT_FOUND,
            message: "contact With Id = 42 Does Not Exist".to_string(),
        };
        assert_eq!(error.status(), Some(StatusCode::NOT_FOUND));
        let display = error.to_string();
        assert!(display.contains("404"));
        assert!(display.contains("Does Not Exist"));
    }

    #[test]
    fn test_empty_response_display() {
        let error = CrmError::EmptyResponse("/WhoAmI".to_string());
        assert_eq!(error.to_string(), "Empty response from /WhoAmI");
    }

    #[test]
    fn test_crm_error_debug_format() {
        let error = CrmError::CrmApi {
            status: StatusCode::BAD_REQUEST,
            message: "bad filter".to_string(),
        };
        let debug = format!("{:?}", error);
        assert!(debug.contains("CrmApi"));
        assert!(debug.contains("bad filter"));
    }
}
