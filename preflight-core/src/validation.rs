use crate::context::Context;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const MAX_REASON_LEN: usize = 128;
const MAX_MESSAGE_LEN: usize = 1024;

/// Validator configuration. This is the single source of truth for a
/// validator's name, dependencies and tags.
#[derive(Clone, Debug)]
pub struct ValidatorMetadata {
    pub name: String,
    pub description: String,
    /// Names of validators this one must run after. Unknown names are
    /// ignored during dependency resolution.
    pub run_after: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failure,
    Skipped,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Failure => "failure",
            Status::Skipped => "skipped",
        }
    }
}

/// Outcome of a single validator run. The executor stamps
/// `validator_name`, `duration` and `timestamp` after the validator
/// returns, overwriting whatever the validator set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidatorResult {
    pub validator_name: String,
    pub status: Status,
    pub reason: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(rename = "duration_ns", with = "duration_ns")]
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
}

impl ValidatorResult {
    pub fn new(status: Status, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            validator_name: String::new(),
            status,
            reason: reason.into(),
            message: message.into(),
            details: None,
            duration: Duration::ZERO,
            timestamp: Utc::now(),
        }
    }

    pub fn success(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Status::Success, reason, message)
    }

    pub fn failure(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Status::Failure, reason, message)
    }

    pub fn skipped(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Status::Skipped, reason, message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

mod duration_ns {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_nanos().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let nanos = u64::deserialize(d)?;
        Ok(Duration::from_nanos(nanos))
    }
}

/// The core capability every validator implements. Validators are
/// stateless across runs; all shared state lives in the [`Context`].
#[async_trait]
pub trait Validator: Send + Sync {
    fn metadata(&self) -> ValidatorMetadata;

    /// Whether this validator should run for the current configuration.
    fn enabled(&self, ctx: &Context) -> bool;

    /// Perform the validation. Long-running work must observe `cancel`.
    async fn validate(&self, cancel: CancellationToken, ctx: Arc<Context>) -> ValidatorResult;
}

/// Top-level verdict written to the results document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub status: Status,
    pub reason: String,
    pub message: String,
    pub details: Value,
}

fn clamp(text: &str, fallback: &str, max: usize) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return fallback.to_string();
    }
    trimmed.chars().take(max).collect()
}

fn normalize(result: &ValidatorResult) -> ValidatorResult {
    let mut r = result.clone();
    r.reason = clamp(&r.reason, "NoReasonProvided", MAX_REASON_LEN);
    r.message = clamp(&r.message, "No message provided", MAX_MESSAGE_LEN);
    r
}

/// Combine per-validator results into the final verdict.
///
/// Skipped results count towards `checks_run` but not `checks_passed`,
/// so a run containing skips aggregates to failure. An empty input also
/// aggregates to failure: a run that checked nothing proves nothing.
pub fn aggregate(results: &[ValidatorResult]) -> AggregatedResult {
    let normalized: Vec<ValidatorResult> = results.iter().map(normalize).collect();

    let checks_run = normalized.len();
    let mut checks_passed = 0usize;
    let mut failed_checks = Vec::new();
    let mut failure_descriptions = Vec::new();

    for r in &normalized {
        match r.status {
            Status::Success => checks_passed += 1,
            Status::Failure => {
                failed_checks.push(r.validator_name.clone());
                failure_descriptions.push(format!("{} ({})", r.validator_name, r.reason));
            }
            Status::Skipped => {}
        }
    }

    let mut details = serde_json::Map::new();
    details.insert("checks_run".to_string(), json!(checks_run));
    details.insert("checks_passed".to_string(), json!(checks_passed));
    details.insert(
        "timestamp".to_string(),
        json!(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
    );
    details.insert(
        "validators".to_string(),
        serde_json::to_value(&normalized).unwrap_or_default(),
    );

    if checks_passed == checks_run && checks_run > 0 {
        return AggregatedResult {
            status: Status::Success,
            reason: "ValidationPassed".to_string(),
            message: "All GCP validation checks passed successfully".to_string(),
            details: Value::Object(details),
        };
    }

    details.insert("failed_checks".to_string(), json!(failed_checks));

    let message = format!(
        "{} validation check(s) failed: {}. Passed: {}/{}",
        failure_descriptions.len(),
        failure_descriptions.join(", "),
        checks_passed,
        checks_run
    );

    AggregatedResult {
        status: Status::Failure,
        reason: "ValidationFailed".to_string(),
        message,
        details: Value::Object(details),
    }
}
