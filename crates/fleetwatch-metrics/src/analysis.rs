//! Detailed per-worker analyses: performance, reliability, usage, quality.
//!
//! Each analysis works on the entries of one query window, oldest first,
//! and returns `None` when the window holds nothing it can use.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use fleetwatch_core::stats::{self, ThirdsTrend, thirds_trend};

use crate::entry::MetricEntry;
use crate::summary::{response_times, success_rate};

/// Entries per throughput window.
const THROUGHPUT_WINDOW: usize = 5;

// ── Performance ───────────────────────────────────────────────────

/// Response-time distribution in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Requests per minute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Throughput {
    pub avg: f64,
    pub peak: f64,
    pub min: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub response_time: LatencyStats,
    pub throughput: Throughput,
    pub score: f64,
    pub recommendations: Vec<String>,
}

/// Step score of an average response time.
pub fn performance_score(avg_response_time: f64) -> f64 {
    match avg_response_time {
        ms if ms <= 500.0 => 100.0,
        ms if ms <= 1000.0 => 90.0,
        ms if ms <= 2000.0 => 80.0,
        ms if ms <= 3000.0 => 70.0,
        ms if ms <= 5000.0 => 60.0,
        _ => 40.0,
    }
}

/// `None` when no entry in the window carries a response time.
pub fn performance_report(entries: &[MetricEntry]) -> Option<PerformanceReport> {
    let latencies = response_times(entries);
    let avg = stats::mean(&latencies)?;
    let pct = |p| stats::percentile(&latencies, p).unwrap_or(0.0);

    let response_time = LatencyStats {
        avg,
        min: stats::min(&latencies).unwrap_or(0.0),
        max: stats::max(&latencies).unwrap_or(0.0),
        p50: pct(50.0),
        p90: pct(90.0),
        p95: pct(95.0),
        p99: pct(99.0),
    };
    let recommendations = performance_recommendations(&response_time);

    Some(PerformanceReport {
        score: performance_score(avg),
        throughput: throughput(entries),
        response_time,
        recommendations,
    })
}

fn performance_recommendations(latency: &LatencyStats) -> Vec<String> {
    let mut recommendations = Vec::new();
    if latency.avg > 3000.0 {
        recommendations.extend(
            [
                "Consider optimizing database queries",
                "Review server resource allocation",
                "Implement response caching",
            ]
            .map(String::from),
        );
    }
    if latency.max > 10_000.0 {
        recommendations.push("Investigate outlier requests causing high response times".into());
    }
    recommendations
}

/// Requests per minute between the first and last entry; zero for a zero span.
fn requests_per_minute(entries: &[MetricEntry]) -> f64 {
    let (Some(first), Some(last)) = (entries.first(), entries.last()) else {
        return 0.0;
    };
    let minutes = (last.timestamp - first.timestamp).num_milliseconds() as f64 / 60_000.0;
    if minutes <= 0.0 {
        return 0.0;
    }
    let requests: u64 = entries.iter().map(MetricEntry::request_count).sum();
    requests as f64 / minutes
}

fn throughput(entries: &[MetricEntry]) -> Throughput {
    let windows: Vec<f64> = entries
        .windows(THROUGHPUT_WINDOW)
        .map(requests_per_minute)
        .collect();
    Throughput {
        avg: requests_per_minute(entries),
        peak: stats::max(&windows).unwrap_or(0.0),
        min: stats::min(&windows).unwrap_or(0.0),
    }
}

// ── Reliability ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl Rating {
    /// Rate `value` against the excellent/good/fair floors.
    fn from_floors(value: f64, excellent: f64, good: f64, fair: f64) -> Rating {
        if value >= excellent {
            Rating::Excellent
        } else if value >= good {
            Rating::Good
        } else if value >= fair {
            Rating::Fair
        } else {
            Rating::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::Excellent => "excellent",
            Rating::Good => "good",
            Rating::Fair => "fair",
            Rating::Poor => "poor",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityReport {
    /// Percent, two decimals.
    pub success_rate: f64,
    /// Percent of entries without errors, two decimals.
    pub uptime: f64,
    /// Percent of requests that failed.
    pub error_rate: f64,
    pub total_requests: u64,
    pub total_errors: u64,
    /// Mean minutes between failure onsets; `None` without failures.
    pub mtbf_minutes: Option<f64>,
    /// Mean minutes from failure onset to the next clean entry; `None`
    /// when no failure has recovered.
    pub mttr_minutes: Option<f64>,
    pub score: f64,
    pub status: Rating,
}

pub fn reliability_report(entries: &[MetricEntry]) -> Option<ReliabilityReport> {
    if entries.is_empty() {
        return None;
    }
    let total_requests: u64 = entries.iter().map(MetricEntry::request_count).sum();
    let total_errors: u64 = entries.iter().map(MetricEntry::error_count).sum();
    let success_rate = success_rate(total_requests, total_errors);

    let clean = entries.iter().filter(|e| !e.has_errors()).count();
    let uptime = stats::round_to(clean as f64 / entries.len() as f64 * 100.0, 2);
    let error_rate = if total_requests == 0 {
        0.0
    } else {
        total_errors as f64 / total_requests as f64 * 100.0
    };

    let incidents = incidents(entries);

    Some(ReliabilityReport {
        success_rate,
        uptime,
        error_rate,
        total_requests,
        total_errors,
        mtbf_minutes: mtbf_minutes(entries, &incidents),
        mttr_minutes: mttr_minutes(&incidents),
        score: success_rate.min(uptime),
        status: Rating::from_floors(success_rate, 99.0, 95.0, 90.0),
    })
}

/// A run of consecutive entries with errors.
struct Incident {
    onset: DateTime<Utc>,
    /// First clean entry after the run.
    recovered: Option<DateTime<Utc>>,
}

fn incidents(entries: &[MetricEntry]) -> Vec<Incident> {
    let mut incidents: Vec<Incident> = Vec::new();
    let mut failing = false;
    for entry in entries {
        match (failing, entry.has_errors()) {
            (false, true) => {
                incidents.push(Incident {
                    onset: entry.timestamp,
                    recovered: None,
                });
                failing = true;
            }
            (true, false) => {
                if let Some(open) = incidents.last_mut() {
                    open.recovered = Some(entry.timestamp);
                }
                failing = false;
            }
            _ => {}
        }
    }
    incidents
}

fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 60_000.0
}

/// Observed span divided by the number of failures.
fn mtbf_minutes(entries: &[MetricEntry], incidents: &[Incident]) -> Option<f64> {
    if incidents.is_empty() {
        return None;
    }
    let (first, last) = (entries.first()?, entries.last()?);
    Some(minutes_between(first.timestamp, last.timestamp) / incidents.len() as f64)
}

fn mttr_minutes(incidents: &[Incident]) -> Option<f64> {
    let repairs: Vec<f64> = incidents
        .iter()
        .filter_map(|i| i.recovered.map(|at| minutes_between(i.onset, at)))
        .collect();
    stats::mean(&repairs)
}

// ── Usage ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    /// Requests by UTC hour of day.
    pub hourly: BTreeMap<u32, u64>,
    /// Requests by UTC day (`YYYY-MM-DD`).
    pub daily: BTreeMap<String, u64>,
    pub peak_hour: u32,
    pub peak_usage: u64,
    /// Hours that saw less than half the peak.
    pub off_peak_hours: Vec<u32>,
    /// Trend of per-entry request counts.
    pub growth: ThirdsTrend,
    pub recommendations: Vec<String>,
}

pub fn usage_report(entries: &[MetricEntry]) -> Option<UsageReport> {
    if entries.is_empty() {
        return None;
    }
    let mut hourly: BTreeMap<u32, u64> = BTreeMap::new();
    let mut daily: BTreeMap<String, u64> = BTreeMap::new();
    for entry in entries {
        *hourly.entry(entry.timestamp.hour()).or_default() += entry.request_count();
        *daily.entry(day_label(entry.timestamp)).or_default() += entry.request_count();
    }

    let (peak_hour, peak_usage) = hourly
        .iter()
        .fold((0, 0), |(best_hour, best), (&hour, &usage)| {
            if usage > best { (hour, usage) } else { (best_hour, best) }
        });
    let off_peak_hours: Vec<u32> = hourly
        .iter()
        .filter(|&(_, &usage)| (usage as f64) < peak_usage as f64 * 0.5)
        .map(|(&hour, _)| hour)
        .collect();

    let mut recommendations = Vec::new();
    if peak_usage > 1000 {
        recommendations.push("Consider load balancing during peak hours".to_string());
        recommendations.push("Implement auto-scaling for peak traffic".to_string());
    }
    if off_peak_hours.len() > 12 {
        recommendations.push("Consider scaling down resources during off-peak hours".to_string());
    }

    let requests: Vec<f64> = entries.iter().map(|e| e.request_count() as f64).collect();

    Some(UsageReport {
        hourly,
        daily,
        peak_hour,
        peak_usage,
        off_peak_hours,
        growth: thirds_trend(&requests),
        recommendations,
    })
}

pub(crate) fn day_label(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

// ── Quality ───────────────────────────────────────────────────────

/// Letter grade of a quality score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    A,
    #[serde(rename = "B+")]
    BPlus,
    B,
    #[serde(rename = "C+")]
    CPlus,
    C,
    #[serde(rename = "D+")]
    DPlus,
    D,
    F,
}

impl Grade {
    pub fn from_score(score: f64) -> Grade {
        const FLOORS: [(f64, Grade); 8] = [
            (95.0, Grade::APlus),
            (90.0, Grade::A),
            (85.0, Grade::BPlus),
            (80.0, Grade::B),
            (75.0, Grade::CPlus),
            (70.0, Grade::C),
            (65.0, Grade::DPlus),
            (60.0, Grade::D),
        ];
        FLOORS
            .iter()
            .find(|(floor, _)| score >= *floor)
            .map_or(Grade::F, |(_, grade)| *grade)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::DPlus => "D+",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const PERFORMANCE_WEIGHT: f64 = 0.4;
pub const RELIABILITY_WEIGHT: f64 = 0.6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Weighted score, rounded.
    pub score: f64,
    pub grade: Grade,
    pub status: Rating,
    pub performance_score: f64,
    pub reliability_score: f64,
    pub recommendations: Vec<String>,
}

pub fn quality_report(
    performance: &PerformanceReport,
    reliability: &ReliabilityReport,
) -> QualityReport {
    let score =
        performance.score * PERFORMANCE_WEIGHT + reliability.score * RELIABILITY_WEIGHT;

    let mut recommendations = performance.recommendations.clone();
    if score < 80.0 {
        recommendations.push("Focus on improving system reliability".to_string());
        recommendations.push("Implement comprehensive monitoring".to_string());
    }
    if score < 70.0 {
        recommendations.push("Review architecture for performance bottlenecks".to_string());
        recommendations
            .push("Consider implementing redundancy for critical components".to_string());
    }

    QualityReport {
        score: score.round(),
        grade: Grade::from_score(score),
        status: Rating::from_floors(score, 90.0, 80.0, 70.0),
        performance_score: performance.score,
        reliability_score: reliability.score,
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::MetricFields;
    use chrono::TimeDelta;

    fn series(start: DateTime<Utc>, samples: &[(i64, f64, u64, u64)]) -> Vec<MetricEntry> {
        samples
            .iter()
            .map(|&(minute, latency, requests, errors)| MetricEntry {
                timestamp: start + TimeDelta::minutes(minute),
                fields: MetricFields::new()
                    .response_time(latency)
                    .requests(requests)
                    .errors(errors),
            })
            .collect()
    }

    fn start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn performance_score_steps() {
        assert_eq!(performance_score(500.0), 100.0);
        assert_eq!(performance_score(501.0), 90.0);
        assert_eq!(performance_score(2000.0), 80.0);
        assert_eq!(performance_score(3000.0), 70.0);
        assert_eq!(performance_score(5000.0), 60.0);
        assert_eq!(performance_score(5001.0), 40.0);
    }

    #[test]
    fn performance_percentiles_and_throughput() {
        let entries = series(
            start(),
            &[
                (0, 100.0, 10, 0),
                (1, 200.0, 10, 0),
                (2, 300.0, 10, 0),
                (3, 400.0, 10, 0),
                (4, 500.0, 10, 0),
                (6, 600.0, 10, 0),
            ],
        );
        let report = performance_report(&entries).unwrap();
        assert_eq!(report.response_time.avg, 350.0);
        assert_eq!(report.response_time.p50, 300.0);
        assert_eq!(report.response_time.p99, 600.0);
        assert_eq!(report.score, 100.0);

        // 60 requests over 6 minutes.
        assert_eq!(report.throughput.avg, 10.0);
        // Windows: 50 req / 4 min, then 50 req / 5 min.
        assert_eq!(report.throughput.peak, 12.5);
        assert_eq!(report.throughput.min, 10.0);
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn slow_outliers_get_recommendations() {
        let entries = series(start(), &[(0, 2500.0, 1, 0), (1, 12_000.0, 1, 0)]);
        let report = performance_report(&entries).unwrap();
        assert_eq!(report.response_time.avg, 7250.0);
        assert_eq!(report.score, 40.0);
        assert_eq!(report.recommendations.len(), 4);
        assert_eq!(
            report.recommendations.last().map(String::as_str),
            Some("Investigate outlier requests causing high response times")
        );
    }

    #[test]
    fn performance_without_latencies_is_none() {
        let entries = vec![MetricEntry {
            timestamp: start(),
            fields: MetricFields::new().requests(3),
        }];
        assert!(performance_report(&entries).is_none());
        assert!(performance_report(&[]).is_none());
    }

    #[test]
    fn reliability_mtbf_and_mttr() {
        // Failures at minute 10 (recovers at 20) and minute 40 (recovers at 45).
        let entries = series(
            start(),
            &[
                (0, 100.0, 10, 0),
                (10, 100.0, 10, 2),
                (15, 100.0, 10, 1),
                (20, 100.0, 10, 0),
                (40, 100.0, 10, 5),
                (45, 100.0, 10, 0),
                (60, 100.0, 10, 0),
            ],
        );
        let report = reliability_report(&entries).unwrap();
        assert_eq!(report.total_requests, 70);
        assert_eq!(report.total_errors, 8);
        assert_eq!(report.success_rate, 88.57);
        assert_eq!(report.uptime, 57.14);
        assert_eq!(report.score, 57.14);
        assert_eq!(report.status, Rating::Poor);
        assert_eq!(report.mtbf_minutes, Some(30.0));
        assert_eq!(report.mttr_minutes, Some(7.5));
    }

    #[test]
    fn clean_series_has_no_failure_times() {
        let entries = series(start(), &[(0, 100.0, 10, 0), (5, 100.0, 10, 0)]);
        let report = reliability_report(&entries).unwrap();
        assert_eq!(report.success_rate, 100.0);
        assert_eq!(report.uptime, 100.0);
        assert_eq!(report.status, Rating::Excellent);
        assert_eq!(report.mtbf_minutes, None);
        assert_eq!(report.mttr_minutes, None);
    }

    #[test]
    fn unrecovered_failure_has_no_repair_time() {
        let entries = series(start(), &[(0, 100.0, 10, 0), (5, 100.0, 10, 1)]);
        let report = reliability_report(&entries).unwrap();
        assert_eq!(report.mtbf_minutes, Some(5.0));
        assert_eq!(report.mttr_minutes, None);
    }

    #[test]
    fn usage_peaks_and_off_peak_hours() {
        let entries = series(
            start(),
            &[
                (0, 100.0, 400, 0),
                (30, 100.0, 800, 0),
                (60, 100.0, 300, 0),
                (120, 100.0, 900, 0),
            ],
        );
        let report = usage_report(&entries).unwrap();
        assert_eq!(report.hourly.get(&9), Some(&1200));
        assert_eq!(report.peak_hour, 9);
        assert_eq!(report.peak_usage, 1200);
        assert_eq!(report.off_peak_hours, vec![10]);
        assert_eq!(report.daily.get("2026-03-02"), Some(&2400));
        assert_eq!(report.recommendations.len(), 2);
    }

    #[test]
    fn grades() {
        assert_eq!(Grade::from_score(95.0), Grade::APlus);
        assert_eq!(Grade::from_score(89.9), Grade::BPlus);
        assert_eq!(Grade::from_score(60.0), Grade::D);
        assert_eq!(Grade::from_score(12.0), Grade::F);
        assert_eq!(serde_json::to_string(&Grade::CPlus).unwrap(), "\"C+\"");
    }

    #[test]
    fn quality_weights_reliability_higher() {
        let entries = series(
            start(),
            &[(0, 4000.0, 10, 1), (1, 4000.0, 10, 1), (2, 4000.0, 10, 1)],
        );
        let performance = performance_report(&entries).unwrap();
        let reliability = reliability_report(&entries).unwrap();
        assert_eq!(reliability.score, 0.0);

        let quality = quality_report(&performance, &reliability);
        // 60 * 0.4 + 0 * 0.6
        assert_eq!(quality.score, 24.0);
        assert_eq!(quality.grade, Grade::F);
        assert_eq!(quality.status, Rating::Poor);
        // Three performance recommendations, then four quality ones.
        assert_eq!(quality.recommendations.len(), 7);
        assert_eq!(
            quality.recommendations[3],
            "Focus on improving system reliability"
        );
    }
}
