use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub validators_started: u64,
    pub validators_succeeded: u64,
    pub validators_failed: u64,
    pub validators_skipped: u64,
    pub validators_panicked: u64,
}

pub trait Metrics: Send + Sync {
    fn inc_validator_started(&self);
    fn inc_validator_succeeded(&self);
    fn inc_validator_failed(&self);
    fn inc_validator_skipped(&self);
    fn inc_validator_panicked(&self);
    fn snapshot(&self) -> MetricsSnapshot;
}

pub struct InMemoryMetrics {
    validators_started: AtomicU64,
    validators_succeeded: AtomicU64,
    validators_failed: AtomicU64,
    validators_skipped: AtomicU64,
    validators_panicked: AtomicU64,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self {
            validators_started: AtomicU64::new(0),
            validators_succeeded: AtomicU64::new(0),
            validators_failed: AtomicU64::new(0),
            validators_skipped: AtomicU64::new(0),
            validators_panicked: AtomicU64::new(0),
        }
    }
}

impl Default for InMemoryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics for InMemoryMetrics {
    fn inc_validator_started(&self) {
        self.validators_started.fetch_add(1, Ordering::Relaxed);
    }
    fn inc_validator_succeeded(&self) {
        self.validators_succeeded.fetch_add(1, Ordering::Relaxed);
    }
    fn inc_validator_failed(&self) {
        self.validators_failed.fetch_add(1, Ordering::Relaxed);
    }
    fn inc_validator_skipped(&self) {
        self.validators_skipped.fetch_add(1, Ordering::Relaxed);
    }
    fn inc_validator_panicked(&self) {
        self.validators_panicked.fetch_add(1, Ordering::Relaxed);
    }
    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            validators_started: self.validators_started.load(Ordering::Relaxed),
            validators_succeeded: self.validators_succeeded.load(Ordering::Relaxed),
            validators_failed: self.validators_failed.load(Ordering::Relaxed),
            validators_skipped: self.validators_skipped.load(Ordering::Relaxed),
            validators_panicked: self.validators_panicked.load(Ordering::Relaxed),
        }
    }
}
