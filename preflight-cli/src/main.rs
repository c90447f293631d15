//! gcp-preflight entry point.
//!
//! Loads configuration from the environment, runs every enabled
//! validator, writes the aggregated verdict to the results path and
//! exits 0 only when all checks passed.

use preflight_core::config::Config;
use preflight_core::context::Context;
use preflight_core::executor::Executor;
use preflight_core::gcp::HttpClientFactory;
use preflight_core::logging::{LogEvent, LogLevel, SharedEventLogger, StderrEventLogger};
use preflight_core::metrics::{InMemoryMetrics, Metrics};
use preflight_core::registry;
use preflight_core::resolver::render_dependency_graph;
use preflight_core::validation::{aggregate, Status};
use preflight_core::validators;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Maximum time for all validators to complete.
const VALIDATION_TIMEOUT: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> ExitCode {
    // Config must load before the real logger exists; report load
    // failures through a default-level logger.
    let bootstrap: SharedEventLogger = Arc::new(StderrEventLogger::new(LogLevel::Info));
    let cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            bootstrap.log(
                LogEvent::new(LogLevel::Error, "Configuration error")
                    .with_field("error", err.to_string()),
            );
            return ExitCode::from(1);
        }
    };

    let logger: SharedEventLogger =
        Arc::new(StderrEventLogger::new(LogLevel::parse(&cfg.log_level)));

    logger.log(LogEvent::new(LogLevel::Info, "Starting GCP preflight validator"));
    logger.log(
        LogEvent::new(LogLevel::Info, "Loaded configuration")
            .with_field("gcp_project", cfg.project_id.clone())
            .with_field("results_path", cfg.results_path.clone())
            .with_field("log_level", cfg.log_level.clone()),
    );

    validators::register_builtins();

    if !cfg.disabled_validators.is_empty() {
        logger.log(
            LogEvent::new(LogLevel::Info, "Disabled validators")
                .with_field("validators", cfg.disabled_validators.join(",")),
        );
        for name in &cfg.disabled_validators {
            if registry::get(name).is_none() {
                logger.log(
                    LogEvent::new(
                        LogLevel::Warn,
                        "Unknown validator in DISABLED_VALIDATORS - will be ignored",
                    )
                    .with_validator(name.clone())
                    .with_field(
                        "hint",
                        "Check for typos. Run without DISABLED_VALIDATORS to see available validators.",
                    ),
                );
            }
        }
    }

    logger.log(
        LogEvent::new(LogLevel::Debug, "Dependency graph")
            .with_field("graph", render_dependency_graph(&registry::get_all())),
    );

    let factory = Arc::new(HttpClientFactory::new(logger.clone()));
    let ctx = Arc::new(Context::new(cfg.clone(), factory, logger.clone()));

    let cancel = CancellationToken::new();
    spawn_global_timeout(cancel.clone(), logger.clone());
    spawn_signal_handler(cancel.clone(), logger.clone());

    let metrics = Arc::new(InMemoryMetrics::new());
    let executor = Executor::new(ctx, logger.clone(), metrics.clone());

    let results = match executor.execute_all(cancel.clone(), registry::get_all()).await {
        Ok(results) => results,
        Err(err) => {
            logger.log(
                LogEvent::new(LogLevel::Error, "Validator execution failed")
                    .with_field("error", format!("{err:#}")),
            );
            return ExitCode::from(1);
        }
    };
    // Release the timeout and signal tasks.
    cancel.cancel();

    let aggregated = aggregate(&results);

    let data = match serde_json::to_string_pretty(&aggregated) {
        Ok(data) => data,
        Err(err) => {
            logger.log(
                LogEvent::new(LogLevel::Error, "Failed to marshal results")
                    .with_field("error", err.to_string()),
            );
            return ExitCode::from(1);
        }
    };

    logger.log(
        LogEvent::new(LogLevel::Info, "Writing results")
            .with_field("path", cfg.results_path.clone()),
    );
    if let Err(err) = write_results(&cfg.results_path, &data) {
        logger.log(
            LogEvent::new(LogLevel::Error, "Failed to write results")
                .with_field("error", err.to_string())
                .with_field("path", cfg.results_path.clone()),
        );
        return ExitCode::from(1);
    }

    // Echo the document so it is reachable through container logs.
    logger.log(
        LogEvent::new(LogLevel::Info, "Results written successfully")
            .with_field("path", cfg.results_path.clone())
            .with_field("content", data),
    );

    let snapshot = metrics.snapshot();
    logger.log(
        LogEvent::new(LogLevel::Info, "Run metrics")
            .with_field("started", snapshot.validators_started.to_string())
            .with_field("succeeded", snapshot.validators_succeeded.to_string())
            .with_field("failed", snapshot.validators_failed.to_string())
            .with_field("skipped", snapshot.validators_skipped.to_string())
            .with_field("panicked", snapshot.validators_panicked.to_string()),
    );

    logger.log(
        LogEvent::new(LogLevel::Info, "Validation completed")
            .with_field("status", aggregated.status.as_str())
            .with_field("message", aggregated.message.clone()),
    );

    if aggregated.status == Status::Failure {
        logger.log(LogEvent::new(
            LogLevel::Warn,
            "Validation FAILED - exiting with code 1",
        ));
        return ExitCode::from(1);
    }

    logger.log(LogEvent::new(
        LogLevel::Info,
        "Validation PASSED - exiting with code 0",
    ));
    ExitCode::SUCCESS
}

fn spawn_global_timeout(cancel: CancellationToken, logger: SharedEventLogger) {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(VALIDATION_TIMEOUT) => {
                logger.log(
                    LogEvent::new(LogLevel::Warn, "Global validation timeout reached, cancelling")
                        .with_field("timeout_secs", VALIDATION_TIMEOUT.as_secs().to_string()),
                );
                cancel.cancel();
            }
            _ = cancel.cancelled() => {}
        }
    });
}

/// Interrupt and terminate both request cancellation of the run.
fn spawn_signal_handler(cancel: CancellationToken, logger: SharedEventLogger) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut terminate = match signal(SignalKind::terminate()) {
                Ok(terminate) => terminate,
                Err(_) => return,
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
                _ = cancel.cancelled() => return,
            }
        }
        #[cfg(not(unix))]
        {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = cancel.cancelled() => return,
            }
        }
        logger.log(LogEvent::new(
            LogLevel::Warn,
            "Received shutdown signal, cancelling validation",
        ));
        cancel.cancel();
    });
}

fn write_results(path: &str, data: &str) -> std::io::Result<()> {
    std::fs::write(path, data)?;
    // World-readable so the sidecar tailing the document can consume it.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644))?;
    }
    Ok(())
}
