use crate::context::Context;
use crate::logging::{LogEvent, LogLevel, SharedEventLogger};
use crate::metrics::Metrics;
use crate::resolver::{DependencyResolver, ExecutionGroup};
use crate::validation::{Status, Validator, ValidatorResult};
use anyhow::Context as _;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once, OnceLock};
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

tokio::task_local! {
    /// Name of the validator running on the current task. Lets the
    /// panic hook attribute a captured backtrace to its validator.
    static CURRENT_VALIDATOR: String;
}

static PANIC_TRACES: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
static INSTALL_PANIC_HOOK: Once = Once::new();

fn panic_traces() -> &'static Mutex<HashMap<String, String>> {
    PANIC_TRACES.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Install a process-wide panic hook that records a backtrace for the
/// validator whose task panicked. The previous hook still runs.
fn install_panic_capture() {
    INSTALL_PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let trace = std::backtrace::Backtrace::force_capture().to_string();
            let _ = CURRENT_VALIDATOR.try_with(|name| {
                panic_traces().lock().unwrap().insert(name.clone(), trace);
            });
            previous(info);
        }));
    });
}

fn take_panic_trace(name: &str) -> Option<String> {
    panic_traces().lock().unwrap().remove(name)
}

/// Turn a task join failure into a synthetic failure result so one
/// crashing validator cannot take down its group.
fn panic_result(name: &str, err: JoinError) -> ValidatorResult {
    let (payload, payload_type) = if err.is_panic() {
        let panic = err.into_panic();
        if let Some(s) = panic.downcast_ref::<&str>() {
            ((*s).to_string(), "&str")
        } else if let Some(s) = panic.downcast_ref::<String>() {
            (s.clone(), "String")
        } else {
            ("non-string panic payload".to_string(), "unknown")
        }
    } else {
        (format!("validator task aborted: {err}"), "JoinError")
    };

    let stack = take_panic_trace(name).unwrap_or_default();

    ValidatorResult {
        validator_name: name.to_string(),
        status: Status::Failure,
        reason: "ValidatorPanic".to_string(),
        message: format!("Validator crashed: {payload}"),
        details: Some(json!({
            "panic": payload,
            "panic_type": payload_type,
            "stack": stack,
        })),
        duration: Duration::ZERO,
        timestamp: Utc::now(),
    }
}

/// Orchestrates validator execution: filters enabled validators,
/// resolves the plan, runs each group concurrently and publishes
/// results into the [`Context`].
pub struct Executor {
    ctx: Arc<Context>,
    logger: SharedEventLogger,
    metrics: Arc<dyn Metrics>,
}

impl Executor {
    pub fn new(ctx: Arc<Context>, logger: SharedEventLogger, metrics: Arc<dyn Metrics>) -> Self {
        Self {
            ctx,
            logger,
            metrics,
        }
    }

    /// Run every enabled validator, level by level. Validator failures
    /// are reported in the returned results; an `Err` is reserved for
    /// orchestration faults (no work to do, unresolvable plan).
    pub async fn execute_all(
        &self,
        cancel: CancellationToken,
        validators: Vec<Arc<dyn Validator>>,
    ) -> anyhow::Result<Vec<ValidatorResult>> {
        install_panic_capture();

        let mut enabled = Vec::new();
        for v in validators {
            if v.enabled(&self.ctx) {
                enabled.push(v);
            } else {
                self.logger.log(
                    LogEvent::new(LogLevel::Info, "Validator disabled, skipping")
                        .with_validator(v.metadata().name),
                );
            }
        }

        if enabled.is_empty() {
            anyhow::bail!("no validators enabled");
        }

        self.logger.log(
            LogEvent::new(LogLevel::Info, "Found enabled validators")
                .with_field("count", enabled.len().to_string()),
        );

        let resolver = DependencyResolver::new(enabled);
        let groups = resolver
            .resolve_execution_groups()
            .context("dependency resolution failed")?;

        self.logger.log(
            LogEvent::new(LogLevel::Info, "Execution plan created")
                .with_field("groups", groups.len().to_string()),
        );
        for group in &groups {
            self.logger.log(
                LogEvent::new(LogLevel::Debug, "Execution group")
                    .with_field("level", group.level.to_string())
                    .with_field("validators", group.validators.len().to_string())
                    .with_field("mode", "parallel"),
            );
        }

        let mut all_results = Vec::new();
        for group in &groups {
            self.logger.log(
                LogEvent::new(LogLevel::Info, "Executing level")
                    .with_field("level", group.level.to_string())
                    .with_field("validators", group.validators.len().to_string()),
            );

            let group_results = self.execute_group(&cancel, group).await;
            all_results.extend(group_results.iter().cloned());

            if self.ctx.config().stop_on_first_failure {
                if let Some(failed) = group_results.iter().find(|r| r.status == Status::Failure) {
                    self.logger.log(
                        LogEvent::new(LogLevel::Warn, "Stopping due to failure")
                            .with_validator(failed.validator_name.clone()),
                    );
                    return Ok(all_results);
                }
            }
        }

        Ok(all_results)
    }

    /// Run one group: every member starts concurrently, the group is a
    /// barrier, and results come back in the group's input order.
    async fn execute_group(
        &self,
        cancel: &CancellationToken,
        group: &ExecutionGroup,
    ) -> Vec<ValidatorResult> {
        let mut slots: Vec<Option<ValidatorResult>> = vec![None; group.validators.len()];
        let mut join_set: JoinSet<(usize, ValidatorResult)> = JoinSet::new();
        let mut spawned: HashMap<tokio::task::Id, (usize, String)> = HashMap::new();

        for (index, v) in group.validators.iter().enumerate() {
            let name = v.metadata().name;
            self.metrics.inc_validator_started();
            self.logger.log(
                LogEvent::new(LogLevel::Info, "Running validator").with_validator(name.clone()),
            );

            let validator = Arc::clone(v);
            let ctx = Arc::clone(&self.ctx);
            let cancel = cancel.clone();
            let task_name = name.clone();
            let handle = join_set.spawn(CURRENT_VALIDATOR.scope(task_name, async move {
                let meta = validator.metadata();
                let start = Instant::now();
                let mut result = validator.validate(cancel, ctx).await;
                result.duration = start.elapsed();
                result.timestamp = Utc::now();
                result.validator_name = meta.name;
                (index, result)
            }));
            spawned.insert(handle.id(), (index, name));
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => {
                    self.ctx.store_result(result.clone());
                    self.log_result(&result);
                    slots[index] = Some(result);
                }
                Err(err) => {
                    let Some((index, name)) = spawned.remove(&err.id()) else {
                        continue;
                    };
                    let result = panic_result(&name, err);
                    self.metrics.inc_validator_panicked();
                    self.logger.log(
                        LogEvent::new(LogLevel::Error, "Validator panicked")
                            .with_validator(name)
                            .with_field("message", result.message.clone()),
                    );
                    self.ctx.store_result(result.clone());
                    slots[index] = Some(result);
                }
            }
        }

        slots.into_iter().flatten().collect()
    }

    fn log_result(&self, result: &ValidatorResult) {
        let event = LogEvent::new(LogLevel::Info, "Validator completed")
            .with_validator(result.validator_name.clone())
            .with_field("status", result.status.as_str())
            .with_field("duration", format!("{:?}", result.duration));
        match result.status {
            Status::Failure => {
                self.metrics.inc_validator_failed();
                self.logger.log(
                    LogEvent {
                        message: "Validator completed with failure".to_string(),
                        level: LogLevel::Warn,
                        ..event
                    }
                    .with_field("reason", result.reason.clone())
                    .with_field("message", result.message.clone()),
                );
            }
            Status::Skipped => {
                self.metrics.inc_validator_skipped();
                self.logger.log(
                    LogEvent {
                        message: "Validator skipped".to_string(),
                        ..event
                    }
                    .with_field("reason", result.reason.clone()),
                );
            }
            Status::Success => {
                self.metrics.inc_validator_succeeded();
                self.logger.log(event);
            }
        }
    }
}
