//! Health check result records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use fleetwatch_core::{CheckStatus, HealthStatus, Level, Timestamped, WorkerName, composite_status};

/// Outcome of one named check inside a health evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub status: CheckStatus,
    /// Threshold band, for checks classified against a threshold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,
    pub message: String,
    /// Check-specific measurements.
    pub metrics: Value,
}

impl CheckOutcome {
    pub fn new(status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            level: None,
            message: message.into(),
            metrics: Value::Null,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_metrics(mut self, metrics: Value) -> Self {
        self.metrics = metrics;
        self
    }
}

/// One full evaluation of a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub worker: WorkerName,
    pub timestamp: DateTime<Utc>,
    pub status: HealthStatus,
    pub checks: BTreeMap<String, CheckOutcome>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Headline latency in milliseconds, when it could be measured.
    pub response_time: Option<f64>,
}

impl HealthCheckResult {
    /// An empty result; status stays `unknown` until [`finish`](Self::finish).
    pub fn new(worker: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            worker: worker.to_string(),
            timestamp,
            status: HealthStatus::Unknown,
            checks: BTreeMap::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            response_time: None,
        }
    }

    /// Synthetic result for an evaluation that could not run at all.
    pub fn aggregate_failure(worker: &str, timestamp: DateTime<Utc>, reason: &str) -> Self {
        let mut result = Self::new(worker, timestamp);
        result.status = HealthStatus::Critical;
        result.errors.push(format!("Health check failed: {reason}"));
        result
    }

    pub fn check(&self, name: &str) -> Option<&CheckOutcome> {
        self.checks.get(name)
    }

    pub(crate) fn record(&mut self, name: &str, outcome: CheckOutcome) {
        self.checks.insert(name.to_string(), outcome);
    }

    /// Derive the composite status from the recorded checks (worst wins).
    pub(crate) fn finish(mut self) -> Self {
        self.status = composite_status(self.checks.values().map(|c| c.status));
        self
    }
}

impl Timestamped for HealthCheckResult {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
