//! Canned in-memory service clients. Used by tests and local dry runs
//! where no metadata server is reachable.

use crate::gcp::{
    AlertPolicyInfo, ClientFactory, ComputeApi, GcpError, IamApi, MonitoringApi, ProjectInfo,
    QuotaInfo, ResourceManagerApi, ServiceAccountInfo, ServiceInfo, ServiceUsageApi,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How many clients of each kind the factory has built. Exposed so
/// tests can assert the once-only construction guarantee.
#[derive(Default)]
pub struct ConstructionCounts {
    pub service_usage: AtomicU64,
    pub compute: AtomicU64,
    pub iam: AtomicU64,
    pub resource_manager: AtomicU64,
    pub monitoring: AtomicU64,
}

impl ConstructionCounts {
    pub fn total(&self) -> u64 {
        self.service_usage.load(Ordering::Relaxed)
            + self.compute.load(Ordering::Relaxed)
            + self.iam.load(Ordering::Relaxed)
            + self.resource_manager.load(Ordering::Relaxed)
            + self.monitoring.load(Ordering::Relaxed)
    }
}

#[derive(Default)]
pub struct MockClientFactory {
    services: Mutex<HashMap<String, String>>,
    service_errors: Mutex<HashMap<String, GcpError>>,
    accounts: Mutex<Vec<ServiceAccountInfo>>,
    policies: Mutex<Vec<AlertPolicyInfo>>,
    quotas: Mutex<Vec<QuotaInfo>>,
    project: Mutex<Option<ProjectInfo>>,
    construction_error: Mutex<Option<GcpError>>,
    construction_delay: Mutex<Option<Duration>>,
    /// Successful constructions per client kind.
    pub counts: ConstructionCounts,
    /// Construction attempts, successful or not.
    pub attempts: AtomicU64,
}

impl MockClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(self, name: impl Into<String>, state: impl Into<String>) -> Self {
        self.services
            .lock()
            .unwrap()
            .insert(name.into(), state.into());
        self
    }

    /// Make checks of `name` fail with `err`.
    pub fn with_service_error(self, name: impl Into<String>, err: GcpError) -> Self {
        self.service_errors.lock().unwrap().insert(name.into(), err);
        self
    }

    pub fn with_project(self, project: ProjectInfo) -> Self {
        *self.project.lock().unwrap() = Some(project);
        self
    }

    pub fn with_quota(self, quota: QuotaInfo) -> Self {
        self.quotas.lock().unwrap().push(quota);
        self
    }

    /// Make every client construction fail with `err`.
    pub fn failing_with(self, err: GcpError) -> Self {
        *self.construction_error.lock().unwrap() = Some(err);
        self
    }

    /// Delay every construction, widening the race window in
    /// concurrency tests.
    pub fn with_construction_delay(self, delay: Duration) -> Self {
        *self.construction_delay.lock().unwrap() = Some(delay);
        self
    }

    async fn begin_construction(&self, counter: &AtomicU64) -> Result<(), GcpError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        let delay = *self.construction_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.construction_error.lock().unwrap().clone() {
            return Err(err);
        }
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

struct MockServiceUsage {
    services: HashMap<String, String>,
    errors: HashMap<String, GcpError>,
}

#[async_trait]
impl ServiceUsageApi for MockServiceUsage {
    async fn get_service(
        &self,
        _cancel: &CancellationToken,
        project_id: &str,
        service: &str,
    ) -> Result<ServiceInfo, GcpError> {
        if let Some(err) = self.errors.get(service) {
            return Err(err.clone());
        }
        match self.services.get(service) {
            Some(state) => Ok(ServiceInfo {
                name: format!("projects/{project_id}/services/{service}"),
                state: state.clone(),
            }),
            None => Err(GcpError::Api {
                status: 404,
                reason: String::new(),
                message: format!("service {service} not found"),
            }),
        }
    }
}

struct MockCompute {
    quotas: Vec<QuotaInfo>,
}

#[async_trait]
impl ComputeApi for MockCompute {
    async fn project_quotas(
        &self,
        _cancel: &CancellationToken,
        _project_id: &str,
    ) -> Result<Vec<QuotaInfo>, GcpError> {
        Ok(self.quotas.clone())
    }
}

struct MockIam {
    accounts: Vec<ServiceAccountInfo>,
}

#[async_trait]
impl IamApi for MockIam {
    async fn list_service_accounts(
        &self,
        _cancel: &CancellationToken,
        _project_id: &str,
    ) -> Result<Vec<ServiceAccountInfo>, GcpError> {
        Ok(self.accounts.clone())
    }
}

struct MockResourceManager {
    project: Option<ProjectInfo>,
}

#[async_trait]
impl ResourceManagerApi for MockResourceManager {
    async fn get_project(
        &self,
        _cancel: &CancellationToken,
        project_id: &str,
    ) -> Result<ProjectInfo, GcpError> {
        match &self.project {
            Some(project) => Ok(project.clone()),
            None => Err(GcpError::Api {
                status: 404,
                reason: String::new(),
                message: format!("project {project_id} not found"),
            }),
        }
    }
}

struct MockMonitoring {
    policies: Vec<AlertPolicyInfo>,
}

#[async_trait]
impl MonitoringApi for MockMonitoring {
    async fn list_alert_policies(
        &self,
        _cancel: &CancellationToken,
        _project_id: &str,
    ) -> Result<Vec<AlertPolicyInfo>, GcpError> {
        Ok(self.policies.clone())
    }
}

#[async_trait]
impl ClientFactory for MockClientFactory {
    async fn create_service_usage(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<Arc<dyn ServiceUsageApi>, GcpError> {
        self.begin_construction(&self.counts.service_usage).await?;
        Ok(Arc::new(MockServiceUsage {
            services: self.services.lock().unwrap().clone(),
            errors: self.service_errors.lock().unwrap().clone(),
        }))
    }

    async fn create_compute(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<Arc<dyn ComputeApi>, GcpError> {
        self.begin_construction(&self.counts.compute).await?;
        Ok(Arc::new(MockCompute {
            quotas: self.quotas.lock().unwrap().clone(),
        }))
    }

    async fn create_iam(&self, _cancel: &CancellationToken) -> Result<Arc<dyn IamApi>, GcpError> {
        self.begin_construction(&self.counts.iam).await?;
        Ok(Arc::new(MockIam {
            accounts: self.accounts.lock().unwrap().clone(),
        }))
    }

    async fn create_resource_manager(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<Arc<dyn ResourceManagerApi>, GcpError> {
        self.begin_construction(&self.counts.resource_manager).await?;
        Ok(Arc::new(MockResourceManager {
            project: self.project.lock().unwrap().clone(),
        }))
    }

    async fn create_monitoring(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<Arc<dyn MonitoringApi>, GcpError> {
        self.begin_construction(&self.counts.monitoring).await?;
        Ok(Arc::new(MockMonitoring {
            policies: self.policies.lock().unwrap().clone(),
        }))
    }
}
