use preflight_core::config::Config;
use preflight_core::context::Context;
use preflight_core::executor::Executor;
use preflight_core::gcp::{GcpError, MockClientFactory};
use preflight_core::logging::NoopEventLogger;
use preflight_core::metrics::InMemoryMetrics;
use preflight_core::validation::{aggregate, Status, Validator};
use preflight_core::validators::{ApiEnabledValidator, QuotaCheckValidator};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn context_with(config: Config, factory: Arc<MockClientFactory>) -> Arc<Context> {
    Arc::new(Context::new(config, factory, Arc::new(NoopEventLogger)))
}

fn test_config() -> Config {
    Config {
        project_id: "test-project".to_string(),
        ..Config::default()
    }
}

fn factory_with_default_apis(state: &str) -> MockClientFactory {
    MockClientFactory::new()
        .with_service("compute.googleapis.com", state)
        .with_service("iam.googleapis.com", state)
        .with_service("cloudresourcemanager.googleapis.com", state)
}

#[tokio::test]
async fn api_enabled_succeeds_when_all_apis_are_enabled() {
    let factory = Arc::new(factory_with_default_apis("ENABLED"));
    let ctx = context_with(test_config(), factory);

    let result = ApiEnabledValidator
        .validate(CancellationToken::new(), ctx)
        .await;

    assert_eq!(result.status, Status::Success);
    assert_eq!(result.reason, "AllAPIsEnabled");
    assert_eq!(result.message, "All 3 required APIs are enabled");
    let details = result.details.unwrap();
    assert_eq!(details["enabled_apis"].as_array().unwrap().len(), 3);
    assert_eq!(details["project_id"], "test-project");
}

#[tokio::test]
async fn api_enabled_reports_disabled_apis() {
    let factory = Arc::new(
        MockClientFactory::new()
            .with_service("compute.googleapis.com", "ENABLED")
            .with_service("iam.googleapis.com", "DISABLED")
            .with_service("cloudresourcemanager.googleapis.com", "ENABLED"),
    );
    let ctx = context_with(test_config(), factory);

    let result = ApiEnabledValidator
        .validate(CancellationToken::new(), ctx)
        .await;

    assert_eq!(result.status, Status::Failure);
    assert_eq!(result.reason, "RequiredAPIsDisabled");
    assert_eq!(result.message, "1 required API(s) are not enabled");
    let details = result.details.unwrap();
    assert_eq!(
        details["disabled_apis"],
        serde_json::json!(["iam.googleapis.com"])
    );
    assert_eq!(details["enabled_apis"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn api_enabled_uses_gcp_reason_on_client_construction_failure() {
    let factory = Arc::new(MockClientFactory::new().failing_with(GcpError::Api {
        status: 403,
        reason: "accessNotConfigured".to_string(),
        message: "Service Usage API has not been used".to_string(),
    }));
    let ctx = context_with(test_config(), factory);

    let result = ApiEnabledValidator
        .validate(CancellationToken::new(), ctx)
        .await;

    assert_eq!(result.status, Status::Failure);
    assert_eq!(result.reason, "accessNotConfigured");
    assert!(result.message.contains("Service Usage client"));
    let details = result.details.unwrap();
    assert_eq!(details["error_type"], "Api");
    assert!(details.get("hint").is_some());
}

#[tokio::test]
async fn api_enabled_falls_back_to_http_code_for_unknown_api() {
    let config = Config {
        required_apis: vec!["nonexistent.googleapis.com".to_string()],
        ..test_config()
    };
    // The mock reports 404 with no GCP reason for unknown services.
    let ctx = context_with(config, Arc::new(MockClientFactory::new()));

    let result = ApiEnabledValidator
        .validate(CancellationToken::new(), ctx)
        .await;

    assert_eq!(result.status, Status::Failure);
    assert_eq!(result.reason, "HTTP_404");
    assert!(result.message.contains("nonexistent.googleapis.com"));
}

#[tokio::test]
async fn builtins_honour_the_disabled_list() {
    let config = Config {
        disabled_validators: vec!["api-enabled".to_string()],
        ..test_config()
    };
    let ctx = context_with(config, Arc::new(MockClientFactory::new()));

    assert!(!ApiEnabledValidator.enabled(&ctx));
    assert!(QuotaCheckValidator.enabled(&ctx));
}

#[tokio::test]
async fn quota_check_is_a_stub_success() {
    let ctx = context_with(test_config(), Arc::new(MockClientFactory::new()));

    let result = QuotaCheckValidator
        .validate(CancellationToken::new(), ctx)
        .await;

    assert_eq!(result.status, Status::Success);
    assert_eq!(result.reason, "QuotaCheckStub");
    let details = result.details.unwrap();
    assert_eq!(details["stub"], true);
    assert_eq!(details["implemented"], false);
}

#[tokio::test]
async fn quota_check_declares_its_dependency() {
    let meta = QuotaCheckValidator.metadata();
    assert_eq!(meta.run_after, vec!["api-enabled"]);
    assert_eq!(ApiEnabledValidator.metadata().run_after.len(), 0);
}

#[tokio::test]
async fn full_engine_run_writes_a_passing_document() {
    let factory = Arc::new(factory_with_default_apis("ENABLED"));
    let ctx = context_with(test_config(), factory.clone());
    let executor = Executor::new(
        ctx,
        Arc::new(NoopEventLogger),
        Arc::new(InMemoryMetrics::new()),
    );

    let validators: Vec<Arc<dyn Validator>> =
        vec![Arc::new(ApiEnabledValidator), Arc::new(QuotaCheckValidator)];
    let results = executor
        .execute_all(CancellationToken::new(), validators)
        .await
        .unwrap();

    // api-enabled at level 0, quota-check after it.
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].validator_name, "api-enabled");
    assert_eq!(results[1].validator_name, "quota-check");

    let aggregated = aggregate(&results);
    assert_eq!(aggregated.status, Status::Success);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("adapter-result.json");
    let document = serde_json::to_string_pretty(&aggregated).unwrap();
    std::fs::write(&path, &document).unwrap();

    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(parsed["status"], "success");
    assert_eq!(parsed["reason"], "ValidationPassed");
    assert_eq!(parsed["details"]["checks_run"], 2);
    assert_eq!(parsed["details"]["checks_passed"], 2);

    // Only one Service Usage client for the whole run.
    assert_eq!(factory.counts.service_usage.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn disabling_a_validator_prevents_its_client_construction() {
    let factory = Arc::new(factory_with_default_apis("ENABLED"));
    let config = Config {
        disabled_validators: vec!["api-enabled".to_string()],
        ..test_config()
    };
    let ctx = context_with(config, factory.clone());
    let executor = Executor::new(
        ctx,
        Arc::new(NoopEventLogger),
        Arc::new(InMemoryMetrics::new()),
    );

    let validators: Vec<Arc<dyn Validator>> =
        vec![Arc::new(ApiEnabledValidator), Arc::new(QuotaCheckValidator)];
    let results = executor
        .execute_all(CancellationToken::new(), validators)
        .await
        .unwrap();

    // quota-check loses its dependency edge and runs at level 0.
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].validator_name, "quota-check");
    assert_eq!(results[0].status, Status::Success);

    // The disabled validator never authenticated against its service.
    assert_eq!(factory.attempts.load(Ordering::Relaxed), 0);
}
