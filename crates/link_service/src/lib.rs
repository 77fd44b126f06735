use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle of the background link service, as the service reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceLifecycle {
    Stopped,
    Pending,
    Running,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkServiceError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("network error: {0}")]
    Network(String),
    #[error("service error: {0}")]
    Service(String),
}

/// Control surface of the background service. Implementations usually sit
/// on an IPC or service-manager boundary; latency is unspecified and
/// transient failures are expected.
#[async_trait]
pub trait LinkServiceHandle: Send + Sync {
    async fn status(&self) -> Result<ServiceLifecycle, LinkServiceError>;
    async fn start(&self) -> Result<(), LinkServiceError>;
    async fn stop(&self) -> Result<(), LinkServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_uses_snake_case_wire_form() {
        let json = serde_json::to_string(&ServiceLifecycle::Pending).unwrap();
        assert_eq!(json, "\"pending\"");

        let back: ServiceLifecycle = serde_json::from_str("\"running\"").unwrap();
        assert_eq!(back, ServiceLifecycle::Running);
    }

    #[test]
    fn error_text_is_user_presentable() {
        assert_eq!(LinkServiceError::Unauthorized.to_string(), "unauthorized");
        assert_eq!(
            LinkServiceError::Network("connection refused".into()).to_string(),
            "network error: connection refused"
        );
        assert_eq!(
            LinkServiceError::Service("spawn failed".into()).to_string(),
            "service error: spawn failed"
        );
    }
}
