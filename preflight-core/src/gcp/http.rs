//! GCP REST clients. Workloads authenticate through the instance
//! metadata server, so no SDK dependency is needed: each client carries
//! a bearer token scoped to the narrowest read-only scope that covers
//! its consumers.

use crate::gcp::retry::retry_with_backoff;
use crate::gcp::{
    AlertPolicyInfo, ClientFactory, ComputeApi, GcpError, IamApi, MonitoringApi, ProjectInfo,
    QuotaInfo, ResourceManagerApi, ServiceAccountInfo, ServiceInfo, ServiceUsageApi,
};
use crate::logging::{LogEvent, LogLevel, SharedEventLogger};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const METADATA_BASE: &str = "http://metadata.google.internal";
const SERVICE_USAGE_BASE: &str = "https://serviceusage.googleapis.com";
const COMPUTE_BASE: &str = "https://compute.googleapis.com";
const IAM_BASE: &str = "https://iam.googleapis.com";
const RESOURCE_MANAGER_BASE: &str = "https://cloudresourcemanager.googleapis.com";
const MONITORING_BASE: &str = "https://monitoring.googleapis.com";

const COMPUTE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/compute.readonly";
const CLOUD_PLATFORM_READONLY_SCOPE: &str =
    "https://www.googleapis.com/auth/cloud-platform.read-only";
const MONITORING_READ_SCOPE: &str = "https://www.googleapis.com/auth/monitoring.read";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

fn error_from_response(status: u16, body: &Value) -> GcpError {
    let reason = body
        .pointer("/error/errors/0/reason")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let message = body
        .pointer("/error/message")
        .and_then(Value::as_str)
        .unwrap_or("request failed")
        .to_string();
    GcpError::Api {
        status,
        reason,
        message,
    }
}

/// Send a request, mapping transport faults, non-2xx responses and
/// cancellation into [`GcpError`].
async fn execute(
    request: reqwest::RequestBuilder,
    cancel: &CancellationToken,
) -> Result<Value, GcpError> {
    let send = async {
        let response = request
            .send()
            .await
            .map_err(|e| GcpError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            return Err(error_from_response(status, &body));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| GcpError::Transport(e.to_string()))
    };

    tokio::select! {
        result = send => result,
        _ = cancel.cancelled() => Err(GcpError::Cancelled),
    }
}

pub struct HttpServiceUsage {
    http: Client,
    token: String,
}

#[async_trait]
impl ServiceUsageApi for HttpServiceUsage {
    async fn get_service(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        service: &str,
    ) -> Result<ServiceInfo, GcpError> {
        let url = format!("{SERVICE_USAGE_BASE}/v1/projects/{project_id}/services/{service}");
        let body = execute(self.http.get(url).bearer_auth(&self.token), cancel).await?;
        Ok(ServiceInfo {
            name: body
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(service)
                .to_string(),
            state: body
                .get("state")
                .and_then(Value::as_str)
                .unwrap_or("STATE_UNSPECIFIED")
                .to_string(),
        })
    }
}

pub struct HttpCompute {
    http: Client,
    token: String,
}

#[async_trait]
impl ComputeApi for HttpCompute {
    async fn project_quotas(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
    ) -> Result<Vec<QuotaInfo>, GcpError> {
        let url = format!("{COMPUTE_BASE}/compute/v1/projects/{project_id}");
        let body = execute(self.http.get(url).bearer_auth(&self.token), cancel).await?;
        let quotas = body
            .get("quotas")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(quotas
            .iter()
            .map(|q| QuotaInfo {
                metric: q
                    .get("metric")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
                limit: q.get("limit").and_then(Value::as_f64).unwrap_or(0.0),
                usage: q.get("usage").and_then(Value::as_f64).unwrap_or(0.0),
            })
            .collect())
    }
}

pub struct HttpIam {
    http: Client,
    token: String,
}

#[async_trait]
impl IamApi for HttpIam {
    async fn list_service_accounts(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
    ) -> Result<Vec<ServiceAccountInfo>, GcpError> {
        let url = format!("{IAM_BASE}/v1/projects/{project_id}/serviceAccounts");
        let body = execute(self.http.get(url).bearer_auth(&self.token), cancel).await?;
        let accounts = body
            .get("accounts")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(accounts
            .iter()
            .map(|a| ServiceAccountInfo {
                email: a
                    .get("email")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
                disabled: a.get("disabled").and_then(Value::as_bool).unwrap_or(false),
            })
            .collect())
    }
}

pub struct HttpResourceManager {
    http: Client,
    token: String,
}

#[async_trait]
impl ResourceManagerApi for HttpResourceManager {
    async fn get_project(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
    ) -> Result<ProjectInfo, GcpError> {
        let url = format!("{RESOURCE_MANAGER_BASE}/v1/projects/{project_id}");
        let body = execute(self.http.get(url).bearer_auth(&self.token), cancel).await?;
        // projectNumber is serialized as a decimal string.
        let project_number = match body.get("projectNumber") {
            Some(Value::String(s)) => s.parse().unwrap_or(0),
            Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
            _ => 0,
        };
        Ok(ProjectInfo {
            project_id: body
                .get("projectId")
                .and_then(Value::as_str)
                .unwrap_or(project_id)
                .to_string(),
            project_number,
            lifecycle_state: body
                .get("lifecycleState")
                .and_then(Value::as_str)
                .unwrap_or("LIFECYCLE_STATE_UNSPECIFIED")
                .to_string(),
        })
    }
}

pub struct HttpMonitoring {
    http: Client,
    token: String,
}

#[async_trait]
impl MonitoringApi for HttpMonitoring {
    async fn list_alert_policies(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
    ) -> Result<Vec<AlertPolicyInfo>, GcpError> {
        let url = format!("{MONITORING_BASE}/v3/projects/{project_id}/alertPolicies");
        let body = execute(self.http.get(url).bearer_auth(&self.token), cancel).await?;
        let policies = body
            .get("alertPolicies")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(policies
            .iter()
            .map(|p| AlertPolicyInfo {
                name: p
                    .get("displayName")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
                enabled: p.get("enabled").and_then(Value::as_bool).unwrap_or(false),
            })
            .collect())
    }
}

/// Builds REST-backed service clients. Token acquisition is the one
/// construction step that can fail transiently, so it runs under the
/// bounded retry policy.
pub struct HttpClientFactory {
    http: Client,
    logger: SharedEventLogger,
    metadata_base: String,
}

impl HttpClientFactory {
    pub fn new(logger: SharedEventLogger) -> Self {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        // GCE_METADATA_HOST is the standard override used by emulators.
        let metadata_base = match std::env::var("GCE_METADATA_HOST") {
            Ok(host) if !host.is_empty() => format!("http://{host}"),
            _ => METADATA_BASE.to_string(),
        };
        Self {
            http,
            logger,
            metadata_base,
        }
    }

    async fn fetch_token(&self, cancel: &CancellationToken, scope: &str) -> Result<String, GcpError> {
        let url = format!(
            "{}/computeMetadata/v1/instance/service-accounts/default/token?scopes={scope}",
            self.metadata_base
        );
        let body = execute(
            self.http.get(url).header("Metadata-Flavor", "Google"),
            cancel,
        )
        .await?;
        body.get("access_token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                GcpError::Auth("metadata token response missing access_token".to_string())
            })
    }

    async fn token_with_retry(
        &self,
        cancel: &CancellationToken,
        scope: &str,
    ) -> Result<String, GcpError> {
        retry_with_backoff(cancel, &self.logger, || self.fetch_token(cancel, scope)).await
    }
}

#[async_trait]
impl ClientFactory for HttpClientFactory {
    async fn create_service_usage(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn ServiceUsageApi>, GcpError> {
        self.logger.log(LogEvent::new(
            LogLevel::Debug,
            "Creating Service Usage client",
        ));
        let token = self
            .token_with_retry(cancel, CLOUD_PLATFORM_READONLY_SCOPE)
            .await?;
        Ok(Arc::new(HttpServiceUsage {
            http: self.http.clone(),
            token,
        }))
    }

    async fn create_compute(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn ComputeApi>, GcpError> {
        self.logger
            .log(LogEvent::new(LogLevel::Debug, "Creating Compute client"));
        let token = self.token_with_retry(cancel, COMPUTE_READONLY_SCOPE).await?;
        Ok(Arc::new(HttpCompute {
            http: self.http.clone(),
            token,
        }))
    }

    async fn create_iam(&self, cancel: &CancellationToken) -> Result<Arc<dyn IamApi>, GcpError> {
        self.logger
            .log(LogEvent::new(LogLevel::Debug, "Creating IAM client"));
        let token = self
            .token_with_retry(cancel, CLOUD_PLATFORM_READONLY_SCOPE)
            .await?;
        Ok(Arc::new(HttpIam {
            http: self.http.clone(),
            token,
        }))
    }

    async fn create_resource_manager(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn ResourceManagerApi>, GcpError> {
        self.logger.log(LogEvent::new(
            LogLevel::Debug,
            "Creating Resource Manager client",
        ));
        let token = self
            .token_with_retry(cancel, CLOUD_PLATFORM_READONLY_SCOPE)
            .await?;
        Ok(Arc::new(HttpResourceManager {
            http: self.http.clone(),
            token,
        }))
    }

    async fn create_monitoring(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn MonitoringApi>, GcpError> {
        self.logger
            .log(LogEvent::new(LogLevel::Debug, "Creating Monitoring client"));
        let token = self.token_with_retry(cancel, MONITORING_READ_SCOPE).await?;
        Ok(Arc::new(HttpMonitoring {
            http: self.http.clone(),
            token,
        }))
    }
}
