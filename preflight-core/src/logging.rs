use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse a configured level string, defaulting to `Info`.
    pub fn parse(level: &str) -> LogLevel {
        match level.to_lowercase().as_str() {
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogEvent {
    pub ts: DateTime<Utc>,
    pub level: LogLevel,
    pub validator: Option<String>,
    pub message: String,
    pub fields: HashMap<String, String>,
}

impl LogEvent {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            level,
            validator: None,
            message: message.into(),
            fields: HashMap::new(),
        }
    }

    pub fn with_validator(mut self, validator: impl Into<String>) -> Self {
        self.validator = Some(validator.into());
        self
    }

    pub fn with_field(mut self, k: impl Into<String>, v: impl Into<String>) -> Self {
        self.fields.insert(k.into(), v.into());
        self
    }
}

pub trait EventLogger: Send + Sync {
    fn log(&self, event: LogEvent);
}

pub type SharedEventLogger = Arc<dyn EventLogger>;

#[derive(Default)]
pub struct NoopEventLogger;

impl EventLogger for NoopEventLogger {
    fn log(&self, _event: LogEvent) {}
}

/// Structured key/value logger writing one line per event to stderr.
/// Output is operational only and not meant to be parsed.
pub struct StderrEventLogger {
    min_level: LogLevel,
}

impl StderrEventLogger {
    pub fn new(min_level: LogLevel) -> Self {
        Self { min_level }
    }

    fn render(event: &LogEvent) -> String {
        let mut line = format!(
            "{} {:5} {}",
            event.ts.to_rfc3339_opts(SecondsFormat::Millis, true),
            event.level.label(),
            event.message
        );
        if let Some(validator) = &event.validator {
            line.push_str(&format!(" validator={validator}"));
        }
        // Sort for a stable field order across runs.
        let mut keys: Vec<&String> = event.fields.keys().collect();
        keys.sort();
        for key in keys {
            let value = &event.fields[key];
            if value.contains(char::is_whitespace) || value.contains('"') {
                line.push_str(&format!(" {key}={value:?}"));
            } else {
                line.push_str(&format!(" {key}={value}"));
            }
        }
        line
    }
}

impl EventLogger for StderrEventLogger {
    fn log(&self, event: LogEvent) {
        if event.level < self.min_level {
            return;
        }
        let line = Self::render(&event);
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{line}");
    }
}
