//! Built-in validators. Each announces itself through
//! [`register_builtins`] during startup.

use crate::context::Context;
use crate::gcp::extract_error_reason;
use crate::logging::{LogEvent, LogLevel};
use crate::registry;
use crate::validation::{Validator, ValidatorMetadata, ValidatorResult};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Cap for the whole api-enabled validator.
const API_VALIDATION_TIMEOUT: Duration = Duration::from_secs(120);
/// Cap for each individual API check request.
const API_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Checks that every required GCP API is enabled in the target project.
pub struct ApiEnabledValidator;

impl ApiEnabledValidator {
    async fn run(&self, cancel: CancellationToken, ctx: Arc<Context>) -> ValidatorResult {
        ctx.logger().log(LogEvent::new(
            LogLevel::Info,
            "Checking if required GCP APIs are enabled",
        ));

        let project_id = ctx.config().project_id.clone();

        let svc = match ctx.service_usage(&cancel).await {
            Ok(svc) => svc,
            Err(err) => {
                ctx.logger().log(
                    LogEvent::new(LogLevel::Error, "Failed to create Service Usage client")
                        .with_validator("api-enabled")
                        .with_field("error", err.to_string())
                        .with_field("project_id", project_id.clone()),
                );
                let reason = extract_error_reason(&err, "ServiceUsageClientError");
                return ValidatorResult::failure(
                    reason,
                    format!(
                        "Failed to create Service Usage client (check workload identity configuration): {err}"
                    ),
                )
                .with_details(json!({
                    "error_type": err.kind(),
                    "project_id": project_id,
                    "hint": "Verify the workload identity annotation on the KSA and the IAM bindings for the GSA",
                }));
            }
        };

        let mut enabled_apis: Vec<String> = Vec::new();
        let mut disabled_apis: Vec<String> = Vec::new();

        for api in &ctx.config().required_apis {
            ctx.logger().log(
                LogEvent::new(LogLevel::Debug, "Checking API").with_field("api", api.clone()),
            );

            let checked = tokio::time::timeout(
                API_REQUEST_TIMEOUT,
                svc.get_service(&cancel, &project_id, api),
            )
            .await;

            let service = match checked {
                Ok(Ok(service)) => service,
                Ok(Err(err)) => {
                    ctx.logger().log(
                        LogEvent::new(LogLevel::Error, "Failed to check API")
                            .with_validator("api-enabled")
                            .with_field("api", api.clone())
                            .with_field("error", err.to_string())
                            .with_field("project_id", project_id.clone()),
                    );
                    let reason = extract_error_reason(&err, "APICheckFailed");
                    return ValidatorResult::failure(
                        reason,
                        format!("Failed to check API {api}: {err}"),
                    )
                    .with_details(json!({
                        "api": api,
                        "error_type": err.kind(),
                        "project_id": project_id,
                    }));
                }
                Err(_) => {
                    return ValidatorResult::failure(
                        "APICheckFailed",
                        format!(
                            "Timed out checking API {api} after {}s",
                            API_REQUEST_TIMEOUT.as_secs()
                        ),
                    )
                    .with_details(json!({
                        "api": api,
                        "project_id": project_id,
                    }));
                }
            };

            if service.state == "ENABLED" {
                ctx.logger().log(
                    LogEvent::new(LogLevel::Debug, "API is enabled")
                        .with_field("api", api.clone()),
                );
                enabled_apis.push(api.clone());
            } else {
                ctx.logger().log(
                    LogEvent::new(LogLevel::Warn, "API is NOT enabled")
                        .with_field("api", api.clone())
                        .with_field("state", service.state.clone()),
                );
                disabled_apis.push(api.clone());
            }
        }

        if !disabled_apis.is_empty() {
            return ValidatorResult::failure(
                "RequiredAPIsDisabled",
                format!("{} required API(s) are not enabled", disabled_apis.len()),
            )
            .with_details(json!({
                "disabled_apis": disabled_apis,
                "enabled_apis": enabled_apis,
                "project_id": project_id,
                "hint": "Enable APIs with: gcloud services enable <api-name>",
            }));
        }

        ctx.logger().log(
            LogEvent::new(LogLevel::Info, "All required APIs are enabled")
                .with_field("count", enabled_apis.len().to_string()),
        );

        ValidatorResult::success(
            "AllAPIsEnabled",
            format!("All {} required APIs are enabled", enabled_apis.len()),
        )
        .with_details(json!({
            "enabled_apis": enabled_apis,
            "project_id": project_id,
        }))
    }
}

#[async_trait]
impl Validator for ApiEnabledValidator {
    fn metadata(&self) -> ValidatorMetadata {
        ValidatorMetadata {
            name: "api-enabled".to_string(),
            description: "Verify required GCP APIs are enabled in the target project".to_string(),
            // No dependencies: workload identity is implicitly validated
            // when the API calls succeed.
            run_after: vec![],
            tags: vec!["mvp".to_string(), "gcp-api".to_string()],
        }
    }

    fn enabled(&self, ctx: &Context) -> bool {
        ctx.config().is_validator_enabled("api-enabled")
    }

    async fn validate(&self, cancel: CancellationToken, ctx: Arc<Context>) -> ValidatorResult {
        let project_id = ctx.config().project_id.clone();
        match tokio::time::timeout(API_VALIDATION_TIMEOUT, self.run(cancel, ctx)).await {
            Ok(result) => result,
            Err(_) => ValidatorResult::failure(
                "ValidationTimeout",
                format!(
                    "API enablement validation timed out after {}s",
                    API_VALIDATION_TIMEOUT.as_secs()
                ),
            )
            .with_details(json!({ "project_id": project_id })),
        }
    }
}

/// Verifies sufficient GCP quota is available.
///
/// TODO: compare Compute Engine quotas (CPUS, disks, in-use addresses)
/// against the `required_vcpus` / `required_disk_gb` /
/// `required_ip_addresses` knobs via [`Context::compute`].
pub struct QuotaCheckValidator;

#[async_trait]
impl Validator for QuotaCheckValidator {
    fn metadata(&self) -> ValidatorMetadata {
        ValidatorMetadata {
            name: "quota-check".to_string(),
            description: "Verify sufficient GCP quota is available (stub - requires implementation)"
                .to_string(),
            // Runs after api-enabled so GCP access is known to work.
            run_after: vec!["api-enabled".to_string()],
            tags: vec![
                "post-mvp".to_string(),
                "quota".to_string(),
                "stub".to_string(),
            ],
        }
    }

    fn enabled(&self, ctx: &Context) -> bool {
        ctx.config().is_validator_enabled("quota-check")
    }

    async fn validate(&self, _cancel: CancellationToken, ctx: Arc<Context>) -> ValidatorResult {
        ctx.logger().log(
            LogEvent::new(
                LogLevel::Warn,
                "Quota check not yet implemented - returning success by default",
            )
            .with_validator("quota-check"),
        );

        ValidatorResult::success(
            "QuotaCheckStub",
            "Quota check validation not yet implemented (stub returning success)",
        )
        .with_details(json!({
            "stub": true,
            "implemented": false,
            "project_id": ctx.config().project_id,
            "note": "This validator needs to be implemented to check actual GCP quotas",
        }))
    }
}

/// Register every built-in validator with the global registry. Called
/// once from the entrypoint during startup.
pub fn register_builtins() {
    registry::register(Arc::new(ApiEnabledValidator));
    registry::register(Arc::new(QuotaCheckValidator));
}
