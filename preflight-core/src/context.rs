use crate::config::Config;
use crate::gcp::{
    ClientFactory, ComputeApi, GcpError, IamApi, MonitoringApi, ResourceManagerApi,
    ServiceUsageApi,
};
use crate::logging::SharedEventLogger;
use crate::validation::ValidatorResult;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

/// Shared per-run state handed to every validator.
///
/// Service clients are built lazily: each slot permits exactly one
/// construction attempt for the whole run, even under concurrent access
/// from validators in the same execution group, and every caller
/// observes the cached outcome. A disabled validator therefore never
/// causes authentication against its service.
pub struct Context {
    config: Config,
    factory: Arc<dyn ClientFactory>,
    logger: SharedEventLogger,

    /// Written only by the executor, exactly once per validator.
    results: Mutex<HashMap<String, ValidatorResult>>,

    /// Scratch shared between validators once resolved.
    project_number: Mutex<Option<i64>>,

    service_usage: OnceCell<Result<Arc<dyn ServiceUsageApi>, GcpError>>,
    compute: OnceCell<Result<Arc<dyn ComputeApi>, GcpError>>,
    iam: OnceCell<Result<Arc<dyn IamApi>, GcpError>>,
    resource_manager: OnceCell<Result<Arc<dyn ResourceManagerApi>, GcpError>>,
    monitoring: OnceCell<Result<Arc<dyn MonitoringApi>, GcpError>>,
}

impl Context {
    pub fn new(config: Config, factory: Arc<dyn ClientFactory>, logger: SharedEventLogger) -> Self {
        Self {
            config,
            factory,
            logger,
            results: Mutex::new(HashMap::new()),
            project_number: Mutex::new(None),
            service_usage: OnceCell::new(),
            compute: OnceCell::new(),
            iam: OnceCell::new(),
            resource_manager: OnceCell::new(),
            monitoring: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn logger(&self) -> &SharedEventLogger {
        &self.logger
    }

    /// Publish a validator's result. Results are append-only during a
    /// run: each name is written once and never updated.
    pub fn store_result(&self, result: ValidatorResult) {
        self.results
            .lock()
            .unwrap()
            .insert(result.validator_name.clone(), result);
    }

    /// A completed validator's result, if it ran in this run. Intended
    /// for validators inspecting upstream outcomes; results of the
    /// currently executing group are not visible until it completes.
    pub fn result(&self, name: &str) -> Option<ValidatorResult> {
        self.results.lock().unwrap().get(name).cloned()
    }

    pub fn results_snapshot(&self) -> HashMap<String, ValidatorResult> {
        self.results.lock().unwrap().clone()
    }

    pub fn set_project_number(&self, number: i64) {
        *self.project_number.lock().unwrap() = Some(number);
    }

    pub fn project_number(&self) -> Option<i64> {
        *self.project_number.lock().unwrap()
    }

    pub async fn service_usage(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn ServiceUsageApi>, GcpError> {
        self.service_usage
            .get_or_init(|| async { self.factory.create_service_usage(cancel).await })
            .await
            .clone()
    }

    pub async fn compute(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn ComputeApi>, GcpError> {
        self.compute
            .get_or_init(|| async { self.factory.create_compute(cancel).await })
            .await
            .clone()
    }

    pub async fn iam(&self, cancel: &CancellationToken) -> Result<Arc<dyn IamApi>, GcpError> {
        self.iam
            .get_or_init(|| async { self.factory.create_iam(cancel).await })
            .await
            .clone()
    }

    pub async fn resource_manager(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn ResourceManagerApi>, GcpError> {
        self.resource_manager
            .get_or_init(|| async { self.factory.create_resource_manager(cancel).await })
            .await
            .clone()
    }

    pub async fn monitoring(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn MonitoringApi>, GcpError> {
        self.monitoring
            .get_or_init(|| async { self.factory.create_monitoring(cancel).await })
            .await
            .clone()
    }
}
