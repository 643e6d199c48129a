//! System-wide roll-ups across workers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleetwatch_core::{Alert, HealthStatus, Timeframe, WorkerName, stats};

use crate::alerts::generate_metric_alerts;
use crate::analysis::performance_score;
use crate::entry::MetricEntry;
use crate::summary::{CostSummary, MetricsSummary, summarize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overview {
    pub total_workers: usize,
    /// Workers with at least one entry in the window.
    pub active_workers: usize,
    pub total_requests: u64,
    pub total_errors: u64,
    /// Request-weighted mean of the per-worker averages.
    pub avg_response_time: f64,
    pub total_cost: f64,
    /// Percent of successful requests; 100 with no requests.
    pub availability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedMetrics {
    pub timeframe: Timeframe,
    pub timestamp: DateTime<Utc>,
    pub overview: Overview,
    pub by_worker: BTreeMap<WorkerName, MetricsSummary>,
    pub alerts: Vec<Alert>,
}

/// Roll up windowed series. Every key counts toward `total_workers`.
pub fn aggregate(
    timeframe: Timeframe,
    now: DateTime<Utc>,
    windowed: &BTreeMap<WorkerName, Vec<MetricEntry>>,
) -> AggregatedMetrics {
    let by_worker: BTreeMap<WorkerName, MetricsSummary> = windowed
        .iter()
        .filter(|(_, entries)| !entries.is_empty())
        .map(|(name, entries)| (name.clone(), summarize(entries)))
        .collect();

    let mut overview = Overview {
        total_workers: windowed.len(),
        active_workers: by_worker.len(),
        total_requests: 0,
        total_errors: 0,
        avg_response_time: 0.0,
        total_cost: 0.0,
        availability: 100.0,
    };

    let (mut weighted_time, mut weighted_requests) = (0.0, 0u64);
    for summary in by_worker.values() {
        overview.total_requests += summary.total_requests;
        overview.total_errors += summary.total_errors;
        overview.total_cost += summary.total_cost;
        if summary.avg_response_time > 0.0 && summary.total_requests > 0 {
            weighted_time += summary.avg_response_time * summary.total_requests as f64;
            weighted_requests += summary.total_requests;
        }
    }
    if weighted_requests > 0 {
        overview.avg_response_time = weighted_time / weighted_requests as f64;
    }
    if overview.total_requests > 0 {
        let successful = overview.total_requests.saturating_sub(overview.total_errors);
        overview.availability = successful as f64 / overview.total_requests as f64 * 100.0;
    }

    let mut aggregated = AggregatedMetrics {
        timeframe,
        timestamp: now,
        overview,
        by_worker,
        alerts: Vec::new(),
    };
    aggregated.alerts = generate_metric_alerts(&aggregated);
    aggregated
}

// ── System summary ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerTally {
    pub total: usize,
    pub active: usize,
    pub healthy: usize,
    pub warning: usize,
    pub critical: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemPerformance {
    pub avg_response_time: f64,
    pub total_requests: u64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostOverview {
    pub total_cost: f64,
    pub avg_cost_per_request: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityOverview {
    pub overall: f64,
    pub reliability: f64,
    pub performance: f64,
}

/// Dashboard view built from each worker's most recent entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMetricsSummary {
    pub timestamp: DateTime<Utc>,
    pub workers: WorkerTally,
    pub performance: SystemPerformance,
    pub costs: CostOverview,
    pub quality: QualityOverview,
}

/// Mean of the response-time score and the success rate.
pub fn server_health_score(summary: &MetricsSummary) -> f64 {
    let response_score = match summary.avg_response_time {
        ms if ms <= 1000.0 => 100.0,
        ms if ms <= 3000.0 => 80.0,
        ms if ms <= 5000.0 => 60.0,
        _ => 40.0,
    };
    (response_score + summary.success_rate) / 2.0
}

pub fn health_band(score: f64) -> HealthStatus {
    if score >= 95.0 {
        HealthStatus::Healthy
    } else if score >= 80.0 {
        HealthStatus::Warning
    } else {
        HealthStatus::Critical
    }
}

pub fn system_summary(
    now: DateTime<Utc>,
    recent: &BTreeMap<WorkerName, Vec<MetricEntry>>,
    costs: &CostSummary,
) -> SystemMetricsSummary {
    let mut workers = WorkerTally {
        total: recent.len(),
        ..WorkerTally::default()
    };
    let mut averages = Vec::new();
    let (mut requests, mut errors) = (0u64, 0u64);

    for entries in recent.values().filter(|e| !e.is_empty()) {
        workers.active += 1;
        let summary = summarize(entries);
        match health_band(server_health_score(&summary)) {
            HealthStatus::Healthy => workers.healthy += 1,
            HealthStatus::Warning => workers.warning += 1,
            _ => workers.critical += 1,
        }
        averages.push(summary.avg_response_time);
        requests += summary.total_requests;
        errors += summary.total_errors;
    }

    let avg_response_time = stats::mean(&averages).unwrap_or(0.0);
    let success_rate = crate::summary::success_rate(requests, errors);
    let performance = performance_score(avg_response_time);

    SystemMetricsSummary {
        timestamp: now,
        workers,
        performance: SystemPerformance {
            avg_response_time,
            total_requests: requests,
            success_rate,
        },
        costs: CostOverview {
            total_cost: costs.total_cost,
            avg_cost_per_request: costs.avg_cost_per_request,
        },
        quality: QualityOverview {
            overall: (success_rate + performance) / 2.0,
            reliability: success_rate,
            performance,
        },
    }
}
