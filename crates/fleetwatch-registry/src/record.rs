//! Per-worker records kept by the registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use fleetwatch_core::{BoundedHistory, HealthStatus, LifecycleState, Timestamped, WorkerName};

/// Rolling request counters for a worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Running mean over successful requests (milliseconds).
    pub avg_response_time: f64,
    /// Latency of the most recent successful request (milliseconds).
    pub last_response_time: Option<f64>,
}

impl WorkerMetrics {
    pub fn record_success(&mut self, response_time_ms: f64) {
        self.total_requests += 1;
        self.successful_requests += 1;
        let n = self.successful_requests as f64;
        self.avg_response_time += (response_time_ms - self.avg_response_time) / n;
        self.last_response_time = Some(response_time_ms);
    }

    /// Failures leave the response-time fields untouched.
    pub fn record_failure(&mut self) {
        self.total_requests += 1;
        self.failed_requests += 1;
    }

    /// Fraction of failed requests; zero with no traffic.
    pub fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.failed_requests as f64 / self.total_requests as f64
        }
    }
}

/// Result of one registry-level health probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub timestamp: DateTime<Utc>,
    pub status: HealthStatus,
    pub response_time: Option<f64>,
    pub message: String,
}

impl Timestamped for HealthSnapshot {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Everything the registry knows about a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub name: WorkerName,
    /// Opaque configuration handed to the driver on launch.
    pub config: Value,
    pub state: LifecycleState,
    pub registered_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub metrics: WorkerMetrics,
    pub last_health: Option<HealthSnapshot>,
    pub restart_count: u32,
    pub last_error: Option<String>,
}

impl WorkerRecord {
    pub fn new(name: &str, config: Value, now: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            config,
            state: LifecycleState::Registered,
            registered_at: now,
            started_at: None,
            stopped_at: None,
            metrics: WorkerMetrics::default(),
            last_health: None,
            restart_count: 0,
            last_error: None,
        }
    }

    pub fn health_status(&self) -> HealthStatus {
        self.last_health
            .as_ref()
            .map(|h| h.status)
            .unwrap_or(HealthStatus::Unknown)
    }
}

/// A state change, published on the registry's broadcast channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub worker: WorkerName,
    pub from: LifecycleState,
    pub to: LifecycleState,
    pub timestamp: DateTime<Utc>,
}

/// Registry-internal slot: the record plus its snapshot history.
#[derive(Debug)]
pub(crate) struct WorkerSlot {
    pub(crate) record: WorkerRecord,
    pub(crate) snapshots: BoundedHistory<HealthSnapshot>,
}

impl WorkerSlot {
    pub(crate) fn new(record: WorkerRecord, snapshot_capacity: usize) -> Self {
        Self {
            record,
            snapshots: BoundedHistory::new(snapshot_capacity),
        }
    }
}
