//! Fleet-wide views derived from worker records.
//!
//! Both the overview and the alerts are recomputed on every call; nothing
//! here is cached or persisted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleetwatch_core::{
    Alert, AlertKind, AlertSeverity, HealthStatus, HealthThresholds, LifecycleState,
};

use crate::record::WorkerRecord;

/// Number of workers in each lifecycle state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateCounts {
    pub registered: usize,
    pub starting: usize,
    pub running: usize,
    pub stopping: usize,
    pub stopped: usize,
    pub error: usize,
}

impl StateCounts {
    fn add(&mut self, state: LifecycleState) {
        let slot = match state {
            LifecycleState::Registered => &mut self.registered,
            LifecycleState::Starting => &mut self.starting,
            LifecycleState::Running => &mut self.running,
            LifecycleState::Stopping => &mut self.stopping,
            LifecycleState::Stopped => &mut self.stopped,
            LifecycleState::Error => &mut self.error,
        };
        *slot += 1;
    }

    pub fn get(&self, state: LifecycleState) -> usize {
        match state {
            LifecycleState::Registered => self.registered,
            LifecycleState::Starting => self.starting,
            LifecycleState::Running => self.running,
            LifecycleState::Stopping => self.stopping,
            LifecycleState::Stopped => self.stopped,
            LifecycleState::Error => self.error,
        }
    }
}

/// Number of workers by their last health snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthCounts {
    pub healthy: usize,
    pub warning: usize,
    pub critical: usize,
    pub unknown: usize,
}

impl HealthCounts {
    fn add(&mut self, status: HealthStatus) {
        match status {
            HealthStatus::Healthy => self.healthy += 1,
            HealthStatus::Warning => self.warning += 1,
            HealthStatus::Critical => self.critical += 1,
            HealthStatus::Unknown => self.unknown += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemOverview {
    pub total_workers: usize,
    pub by_state: StateCounts,
    pub by_health: HealthCounts,
    pub total_requests: u64,
    pub failed_requests: u64,
    /// Mean of per-worker averages, over workers that have served traffic.
    pub avg_response_time: f64,
    /// Lifecycle state of every worker, keyed by name.
    pub workers: BTreeMap<String, LifecycleState>,
    pub timestamp: DateTime<Utc>,
}

pub(crate) fn system_overview(records: &[WorkerRecord], now: DateTime<Utc>) -> SystemOverview {
    let mut by_state = StateCounts::default();
    let mut by_health = HealthCounts::default();
    let mut total_requests = 0;
    let mut failed_requests = 0;
    let mut latency_sum = 0.0;
    let mut latency_count = 0usize;
    let mut workers = BTreeMap::new();

    for record in records {
        by_state.add(record.state);
        by_health.add(record.health_status());
        total_requests += record.metrics.total_requests;
        failed_requests += record.metrics.failed_requests;
        if record.metrics.avg_response_time > 0.0 {
            latency_sum += record.metrics.avg_response_time;
            latency_count += 1;
        }
        workers.insert(record.name.clone(), record.state);
    }

    SystemOverview {
        total_workers: records.len(),
        by_state,
        by_health,
        total_requests,
        failed_requests,
        avg_response_time: if latency_count == 0 {
            0.0
        } else {
            latency_sum / latency_count as f64
        },
        workers,
        timestamp: now,
    }
}

/// Compare each worker's latest numbers against static thresholds.
pub(crate) fn active_alerts(
    records: &[WorkerRecord],
    thresholds: &HealthThresholds,
    now: DateTime<Utc>,
) -> Vec<Alert> {
    let mut alerts = Vec::new();
    let latency = thresholds.response_time;
    // Error-rate bands are compared in percent.
    let error_warning = thresholds.error_rate.warning * 100.0;
    let error_critical = thresholds.error_rate.critical * 100.0;

    for record in records {
        let worker = Some(record.name.clone());

        if let Some(last) = record.metrics.last_response_time {
            if last > latency.warning {
                let (severity, threshold) = if last > latency.critical {
                    (AlertSeverity::Critical, latency.critical)
                } else {
                    (AlertSeverity::Warning, latency.warning)
                };
                alerts.push(Alert {
                    kind: AlertKind::Performance,
                    severity,
                    worker: worker.clone(),
                    message: format!("{} last response took {last:.0}ms", record.name),
                    threshold,
                    actual: last,
                    timestamp: now,
                });
            }
        }

        if record.metrics.total_requests > 0 {
            let error_pct = record.metrics.error_rate() * 100.0;
            if error_pct > error_warning {
                let (severity, threshold) = if error_pct > error_critical {
                    (AlertSeverity::Critical, error_critical)
                } else {
                    (AlertSeverity::Warning, error_warning)
                };
                alerts.push(Alert {
                    kind: AlertKind::Reliability,
                    severity,
                    worker: worker.clone(),
                    message: format!("{} error rate at {error_pct:.1}%", record.name),
                    threshold,
                    actual: error_pct,
                    timestamp: now,
                });
            }
        }

        let severity = match record.health_status() {
            HealthStatus::Critical => Some(AlertSeverity::Critical),
            HealthStatus::Warning => Some(AlertSeverity::Warning),
            HealthStatus::Healthy | HealthStatus::Unknown => None,
        };
        if let Some(severity) = severity {
            let status = record.health_status();
            alerts.push(Alert {
                kind: AlertKind::Health,
                severity,
                worker,
                message: format!("{} reported {status}", record.name),
                threshold: HealthStatus::Healthy.score(),
                actual: status.score(),
                timestamp: now,
            });
        }
    }

    alerts
}
