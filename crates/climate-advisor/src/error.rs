//! Error Types for Climate Advisor

use agent_core::AgentError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AdvisorError>;

#[derive(Error, Debug)]
pub enum AdvisorError {
    #[error("{service} returned HTTP {status}: {body}")]
    Api {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("Knowledge source error: {0}")]
    Knowledge(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AdvisorError {
    /// Timeouts, dropped connections, throttling and 5xx answers
    pub fn is_transient(&self) -> bool {
        match self {
            AdvisorError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            AdvisorError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<AdvisorError> for AgentError {
    fn from(err: AdvisorError) -> Self {
        match &err {
            AdvisorError::Api { status: 429, .. } => AgentError::RateLimited(err.to_string()),
            e if e.is_transient() => AgentError::ProviderUnavailable(err.to_string()),
            AdvisorError::Config(msg) => AgentError::Config(msg.clone()),
            _ => AgentError::Other(err.to_string()),
        }
    }
}

/// Turn a non-success response into `AdvisorError::Api`
pub(crate) async fn check_status(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(service, status = status.as_u16(), "Upstream API returned error");
    Err(AdvisorError::Api {
        service,
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> AdvisorError {
        AdvisorError::Api {
            service: "NOAA",
            status,
            body: String::new(),
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(api(503).is_transient());
        assert!(api(429).is_transient());
        assert!(!api(404).is_transient());
        assert!(!AdvisorError::InvalidRequest("no variables".into()).is_transient());
    }

    #[test]
    fn test_agent_error_conversion() {
        assert!(AgentError::from(api(502)).is_retryable());
        assert!(matches!(AgentError::from(api(429)), AgentError::RateLimited(_)));
        assert!(!AgentError::from(api(400)).is_retryable());
    }
}
