//! Window summaries and thirds trends over metric and cost series.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleetwatch_core::stats::{self, ThirdsTrend, thirds_trend};

use crate::entry::{CostEntry, MetricEntry};

/// Totals and response-time extremes over a set of entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total_requests: u64,
    pub total_errors: u64,
    /// Rounded to whole milliseconds; zero without response times.
    pub avg_response_time: f64,
    pub min_response_time: f64,
    pub max_response_time: f64,
    /// Percent, two decimals; 100 when nothing was requested.
    pub success_rate: f64,
    pub total_cost: f64,
    pub data_points: usize,
}

impl MetricsSummary {
    pub fn empty() -> Self {
        Self {
            total_requests: 0,
            total_errors: 0,
            avg_response_time: 0.0,
            min_response_time: 0.0,
            max_response_time: 0.0,
            success_rate: 100.0,
            total_cost: 0.0,
            data_points: 0,
        }
    }
}

pub fn summarize(entries: &[MetricEntry]) -> MetricsSummary {
    if entries.is_empty() {
        return MetricsSummary::empty();
    }

    let total_requests: u64 = entries.iter().map(MetricEntry::request_count).sum();
    let total_errors: u64 = entries.iter().map(MetricEntry::error_count).sum();
    let total_cost: f64 = entries.iter().map(MetricEntry::cost).sum();
    let latencies = response_times(entries);

    MetricsSummary {
        total_requests,
        total_errors,
        avg_response_time: stats::mean(&latencies).map_or(0.0, f64::round),
        min_response_time: stats::min(&latencies).unwrap_or(0.0),
        max_response_time: stats::max(&latencies).unwrap_or(0.0),
        success_rate: success_rate(total_requests, total_errors),
        total_cost: stats::round_to(total_cost, 2),
        data_points: entries.len(),
    }
}

/// Percent of successful requests, two decimals; 100 with no requests.
pub fn success_rate(requests: u64, errors: u64) -> f64 {
    if requests == 0 {
        return 100.0;
    }
    let successful = requests.saturating_sub(errors);
    stats::round_to(successful as f64 / requests as f64 * 100.0, 2)
}

pub(crate) fn response_times(entries: &[MetricEntry]) -> Vec<f64> {
    entries.iter().filter_map(MetricEntry::response_time).collect()
}

/// First and last timestamps of a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timespan {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub data_points: usize,
}

/// Early-vs-late trends of the headline series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsTrends {
    pub response_time: ThirdsTrend,
    pub requests: ThirdsTrend,
    pub errors: ThirdsTrend,
    /// `None` when there are too few entries to speak of a trend.
    pub timespan: Option<Timespan>,
}

pub fn trends(entries: &[MetricEntry]) -> MetricsTrends {
    let requests: Vec<f64> = entries.iter().map(|e| e.request_count() as f64).collect();
    let errors: Vec<f64> = entries.iter().map(|e| e.error_count() as f64).collect();

    let timespan = match (entries.first(), entries.last()) {
        (Some(first), Some(last)) if entries.len() >= 3 => Some(Timespan {
            start: first.timestamp,
            end: last.timestamp,
            data_points: entries.len(),
        }),
        _ => None,
    };

    MetricsTrends {
        response_time: thirds_trend(&response_times(entries)),
        requests: thirds_trend(&requests),
        errors: thirds_trend(&errors),
        timespan,
    }
}

/// Cost totals over a set of cost entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    pub total_cost: f64,
    pub total_requests: u64,
    pub avg_cost_per_request: f64,
    pub data_points: usize,
}

pub fn summarize_costs(entries: &[CostEntry]) -> CostSummary {
    let total_cost: f64 = entries.iter().map(CostEntry::cost).sum();
    let total_requests: u64 = entries.iter().map(CostEntry::request_count).sum();
    CostSummary {
        total_cost: stats::round_to(total_cost, 2),
        total_requests,
        avg_cost_per_request: per_request(total_cost, total_requests),
        data_points: entries.len(),
    }
}

pub(crate) fn per_request(cost: f64, requests: u64) -> f64 {
    if requests == 0 {
        0.0
    } else {
        cost / requests as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{CostInfo, MetricFields};
    use chrono::TimeDelta;
    use fleetwatch_core::stats::TrendDirection;

    fn entry(at: DateTime<Utc>, fields: MetricFields) -> MetricEntry {
        MetricEntry {
            timestamp: at,
            fields,
        }
    }

    #[test]
    fn empty_summary_is_fully_successful() {
        let summary = summarize(&[]);
        assert_eq!(summary, MetricsSummary::empty());
        assert_eq!(summary.success_rate, 100.0);
    }

    #[test]
    fn summary_totals() {
        let now = Utc::now();
        let entries: Vec<MetricEntry> = (0..3)
            .map(|_| {
                entry(
                    now,
                    MetricFields::new()
                        .response_time(100.0)
                        .requests(10)
                        .errors(1)
                        .cost(0.11),
                )
            })
            .collect();

        let summary = summarize(&entries);
        assert_eq!(summary.total_requests, 30);
        assert_eq!(summary.total_errors, 3);
        assert_eq!(summary.success_rate, 90.0);
        assert_eq!(summary.avg_response_time, 100.0);
        assert_eq!(summary.total_cost, 0.33);
        assert_eq!(summary.data_points, 3);
    }

    #[test]
    fn missing_request_count_is_one_request() {
        let now = Utc::now();
        let entries = vec![
            entry(now, MetricFields::new().response_time(90.0)),
            entry(now, MetricFields::new().response_time(110.5).requests(0)),
        ];
        let summary = summarize(&entries);
        assert_eq!(summary.total_requests, 1);
        assert_eq!(summary.min_response_time, 90.0);
        assert_eq!(summary.max_response_time, 110.5);
        assert_eq!(summary.avg_response_time, 100.0);
    }

    #[test]
    fn success_rate_rounds_to_two_places() {
        assert_eq!(success_rate(3, 1), 66.67);
        assert_eq!(success_rate(0, 0), 100.0);
        assert_eq!(success_rate(5, 9), 0.0);
    }

    #[test]
    fn trends_need_three_entries() {
        let now = Utc::now();
        let entries = vec![
            entry(now, MetricFields::new().response_time(100.0)),
            entry(now, MetricFields::new().response_time(900.0)),
        ];
        let t = trends(&entries);
        assert_eq!(t.response_time.direction, TrendDirection::Unknown);
        assert!(t.timespan.is_none());
    }

    #[test]
    fn rising_latency_trend() {
        let start = Utc::now();
        let entries: Vec<MetricEntry> = (0..9)
            .map(|i| {
                entry(
                    start + TimeDelta::minutes(i),
                    MetricFields::new()
                        .response_time(100.0 + 50.0 * i as f64)
                        .requests(10),
                )
            })
            .collect();

        let t = trends(&entries);
        assert_eq!(t.response_time.direction, TrendDirection::Increasing);
        assert_eq!(t.requests.direction, TrendDirection::Stable);
        let span = t.timespan.unwrap();
        assert_eq!(span.end - span.start, TimeDelta::minutes(8));
        assert_eq!(span.data_points, 9);
    }

    #[test]
    fn cost_summary_divides_by_requests() {
        let now = Utc::now();
        let entries = vec![
            CostEntry {
                timestamp: now,
                info: CostInfo::for_requests(1.0, 4),
            },
            CostEntry {
                timestamp: now,
                info: CostInfo::new(0.5),
            },
        ];
        let summary = summarize_costs(&entries);
        assert_eq!(summary.total_cost, 1.5);
        assert_eq!(summary.total_requests, 5);
        assert!((summary.avg_cost_per_request - 0.3).abs() < 1e-12);
    }
}
