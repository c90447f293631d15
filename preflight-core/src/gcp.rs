pub mod http;
pub mod mock;
pub mod retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub use http::HttpClientFactory;
pub use mock::MockClientFactory;
pub use retry::retry_with_backoff;

/// Retry configuration for client construction.
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);
pub const MAX_RETRIES: u32 = 5;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum GcpError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("GCP API error (HTTP {status}): {message}")]
    Api {
        status: u16,
        /// GCP-specific reason token (e.g. "accessNotConfigured"), empty
        /// when the error body carried none.
        reason: String,
        message: String,
    },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("max retries exceeded: {0}")]
    MaxRetriesExceeded(Box<GcpError>),
}

impl GcpError {
    /// Transient upstream conditions are retried; client-side errors
    /// (auth, permission, not-found, bad request) are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            GcpError::Api { status, .. } => matches!(status, 429 | 500 | 503),
            GcpError::Transport(_) => true,
            _ => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GcpError::Auth(_) => "Auth",
            GcpError::Api { .. } => "Api",
            GcpError::Transport(_) => "Transport",
            GcpError::Cancelled => "Cancelled",
            GcpError::MaxRetriesExceeded(_) => "MaxRetriesExceeded",
        }
    }
}

/// Extract a short machine-readable reason token from a GCP error.
/// Prefers the GCP-specific reason field, falls back to the HTTP status
/// code, and finally to the caller-supplied token.
pub fn extract_error_reason(err: &GcpError, fallback: &str) -> String {
    match err {
        GcpError::Api { status, reason, .. } => {
            if reason.is_empty() {
                format!("HTTP_{status}")
            } else {
                reason.clone()
            }
        }
        GcpError::MaxRetriesExceeded(inner) => extract_error_reason(inner, fallback),
        _ => fallback.to_string(),
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    /// "ENABLED" or "DISABLED" as reported by Service Usage.
    pub state: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub project_id: String,
    pub project_number: i64,
    pub lifecycle_state: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuotaInfo {
    pub metric: String,
    pub limit: f64,
    pub usage: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceAccountInfo {
    pub email: String,
    pub disabled: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AlertPolicyInfo {
    pub name: String,
    pub enabled: bool,
}

#[async_trait]
pub trait ServiceUsageApi: Send + Sync {
    async fn get_service(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        service: &str,
    ) -> Result<ServiceInfo, GcpError>;
}

impl std::fmt::Debug for dyn ServiceUsageApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn ServiceUsageApi")
    }
}

#[async_trait]
pub trait ComputeApi: Send + Sync {
    async fn project_quotas(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
    ) -> Result<Vec<QuotaInfo>, GcpError>;
}

impl std::fmt::Debug for dyn ComputeApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn ComputeApi")
    }
}

#[async_trait]
pub trait IamApi: Send + Sync {
    async fn list_service_accounts(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
    ) -> Result<Vec<ServiceAccountInfo>, GcpError>;
}

impl std::fmt::Debug for dyn IamApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn IamApi")
    }
}

#[async_trait]
pub trait ResourceManagerApi: Send + Sync {
    async fn get_project(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
    ) -> Result<ProjectInfo, GcpError>;
}

impl std::fmt::Debug for dyn ResourceManagerApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn ResourceManagerApi")
    }
}

#[async_trait]
pub trait MonitoringApi: Send + Sync {
    async fn list_alert_policies(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
    ) -> Result<Vec<AlertPolicyInfo>, GcpError>;
}

impl std::fmt::Debug for dyn MonitoringApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn MonitoringApi")
    }
}

/// Builds narrowly-scoped, read-only service clients. Construction is
/// wrapped in bounded retry with backoff; the factory never caches —
/// caching is the context's responsibility.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn create_service_usage(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn ServiceUsageApi>, GcpError>;

    async fn create_compute(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn ComputeApi>, GcpError>;

    async fn create_iam(&self, cancel: &CancellationToken) -> Result<Arc<dyn IamApi>, GcpError>;

    async fn create_resource_manager(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn ResourceManagerApi>, GcpError>;

    async fn create_monitoring(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn MonitoringApi>, GcpError>;
}
