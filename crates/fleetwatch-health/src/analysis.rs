//! Derived views over a worker's health history.
//!
//! Summaries, score-based trends, the response-time regression used by the
//! comprehensive check, and the checklist classification rules.

use serde::{Deserialize, Serialize};

use fleetwatch_core::stats::{self, RegressionTrend, regression_trend};
use fleetwatch_core::{ChecklistItem, HealthStatus, Level, ProbeError, Threshold};

use crate::result::HealthCheckResult;

/// Share of critical checks above which a history counts as critical.
const CRITICAL_SHARE: f64 = 0.1;
/// Share of warning checks above which a history counts as warning.
const WARNING_SHARE: f64 = 0.3;
/// Score delta that counts as a real change.
const TREND_DELTA: f64 = 0.1;

// ── Summary ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub overall_status: HealthStatus,
    /// `(healthy + warning) / total * 100`, two decimals.
    pub uptime_percentage: f64,
    /// Band of the uptime fraction; `None` without checks.
    pub uptime_level: Option<Level>,
    /// Whole milliseconds.
    pub avg_response_time: f64,
    pub healthy_checks: usize,
    pub warning_checks: usize,
    pub critical_checks: usize,
    pub total_checks: usize,
}

/// Summarise a history, banding its uptime with `uptime`.
pub fn health_summary(checks: &[HealthCheckResult], uptime: &Threshold) -> HealthSummary {
    let total = checks.len();
    if total == 0 {
        return HealthSummary {
            overall_status: HealthStatus::Unknown,
            uptime_percentage: 0.0,
            uptime_level: None,
            avg_response_time: 0.0,
            healthy_checks: 0,
            warning_checks: 0,
            critical_checks: 0,
            total_checks: 0,
        };
    }

    let count = |status: HealthStatus| checks.iter().filter(|c| c.status == status).count();
    let healthy = count(HealthStatus::Healthy);
    let warning = count(HealthStatus::Warning);
    let critical = count(HealthStatus::Critical);

    let overall_status = if critical as f64 > total as f64 * CRITICAL_SHARE {
        HealthStatus::Critical
    } else if warning as f64 > total as f64 * WARNING_SHARE {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    };

    let latencies: Vec<f64> = checks.iter().filter_map(|c| c.response_time).collect();
    let up_share = (healthy + warning) as f64 / total as f64;

    HealthSummary {
        overall_status,
        uptime_percentage: stats::round_to(up_share * 100.0, 2),
        uptime_level: Some(uptime.classify(up_share)),
        avg_response_time: stats::mean(&latencies).unwrap_or(0.0).round(),
        healthy_checks: healthy,
        warning_checks: warning,
        critical_checks: critical,
        total_checks: total,
    }
}

// ── Score trends ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendLabel {
    Improving,
    Stable,
    Degrading,
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthTrend {
    pub trend: TrendLabel,
    pub recent_score: Option<f64>,
    pub previous_score: Option<f64>,
    pub change: Option<f64>,
}

/// Mean status score; zero for an empty window.
pub fn health_score(checks: &[HealthCheckResult]) -> f64 {
    let scores: Vec<f64> = checks.iter().map(|c| c.status.score()).collect();
    stats::mean(&scores).unwrap_or(0.0)
}

fn classify_delta(delta: f64) -> TrendLabel {
    if delta > TREND_DELTA {
        TrendLabel::Improving
    } else if delta < -TREND_DELTA {
        TrendLabel::Degrading
    } else {
        TrendLabel::Stable
    }
}

/// Split `checks` into the last `window` entries and the `window` before.
fn windows(
    checks: &[HealthCheckResult],
    window: usize,
) -> (&[HealthCheckResult], &[HealthCheckResult]) {
    let n = checks.len();
    let recent_start = n.saturating_sub(window);
    let earlier_start = n.saturating_sub(window * 2);
    (&checks[recent_start..], &checks[earlier_start..recent_start])
}

/// Last 10 checks against the 10 before. Under 3 checks is not enough.
pub fn health_trend(checks: &[HealthCheckResult]) -> HealthTrend {
    if checks.len() < 3 {
        return HealthTrend {
            trend: TrendLabel::InsufficientData,
            recent_score: None,
            previous_score: None,
            change: None,
        };
    }
    let (recent, earlier) = windows(checks, 10);
    let recent_score = health_score(recent);
    let previous_score = health_score(earlier);
    let change = recent_score - previous_score;
    HealthTrend {
        trend: classify_delta(change),
        recent_score: Some(recent_score),
        previous_score: Some(previous_score),
        change: Some(change),
    }
}

/// Last 5 checks against the 5 before; under 5 checks reads as stable.
pub fn server_trend(checks: &[HealthCheckResult]) -> TrendLabel {
    if checks.len() < 5 {
        return TrendLabel::Stable;
    }
    let (recent, earlier) = windows(checks, 5);
    classify_delta(health_score(recent) - health_score(earlier))
}

// ── Performance ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceStatus {
    Analyzed,
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceAnalysis {
    pub status: PerformanceStatus,
    pub response_time_trend: Option<RegressionTrend>,
    pub avg_response_time: Option<f64>,
    pub min_response_time: Option<f64>,
    pub max_response_time: Option<f64>,
    pub message: String,
}

/// Regression over the response times of the last 10 checks.
pub fn performance_analysis(history: &[HealthCheckResult]) -> PerformanceAnalysis {
    let recent = &history[history.len().saturating_sub(10)..];
    if recent.len() < 2 {
        return PerformanceAnalysis {
            status: PerformanceStatus::InsufficientData,
            response_time_trend: None,
            avg_response_time: None,
            min_response_time: None,
            max_response_time: None,
            message: "Not enough data for trend analysis".to_string(),
        };
    }

    let latencies: Vec<f64> = recent.iter().filter_map(|c| c.response_time).collect();
    let trend = regression_trend(&latencies);

    PerformanceAnalysis {
        status: PerformanceStatus::Analyzed,
        response_time_trend: Some(trend),
        avg_response_time: stats::mean(&latencies),
        min_response_time: stats::min(&latencies),
        max_response_time: stats::max(&latencies),
        message: format!(
            "Response time trend: {} ({})",
            trend.direction.as_str(),
            trend.strength.as_str()
        ),
    }
}

// ── Checklists ────────────────────────────────────────────────────

/// Which checklist a report belongs to; each has its own pass rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecklistKind {
    ToolTests,
    Configuration,
    Security,
    Dependencies,
}

impl ChecklistKind {
    pub fn label(&self) -> &'static str {
        match self {
            ChecklistKind::ToolTests => "tool tests",
            ChecklistKind::Configuration => "configuration checks",
            ChecklistKind::Security => "security checks",
            ChecklistKind::Dependencies => "dependencies",
        }
    }

    /// Status when some, but not all, items passed.
    fn partial(&self, passed: usize, total: usize) -> ChecklistStatus {
        let passed = passed as f64;
        let total = total as f64;
        let warn = match self {
            ChecklistKind::ToolTests | ChecklistKind::Dependencies => passed > 0.0,
            ChecklistKind::Configuration => passed > total / 2.0,
            ChecklistKind::Security => passed > total * 0.8,
        };
        if warn {
            ChecklistStatus::Warning
        } else {
            ChecklistStatus::Failed
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecklistStatus {
    Passed,
    Warning,
    Failed,
    /// The prober had nothing to check.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistReport {
    pub kind: ChecklistKind,
    pub status: ChecklistStatus,
    pub items: Vec<ChecklistItem>,
    pub passed: usize,
    pub failed: usize,
    pub message: String,
}

pub fn checklist_report(
    kind: ChecklistKind,
    outcome: Result<Vec<ChecklistItem>, ProbeError>,
) -> ChecklistReport {
    let items = match outcome {
        Ok(items) => items,
        Err(e) => {
            return ChecklistReport {
                kind,
                status: ChecklistStatus::Failed,
                items: Vec::new(),
                passed: 0,
                failed: 0,
                message: format!("Could not run {}: {e}", kind.label()),
            };
        }
    };

    let total = items.len();
    let passed = items.iter().filter(|i| i.passed).count();
    let status = if total == 0 {
        ChecklistStatus::Skipped
    } else if passed == total {
        ChecklistStatus::Passed
    } else {
        kind.partial(passed, total)
    };

    ChecklistReport {
        kind,
        status,
        message: format!("{passed}/{total} {} passed", kind.label()),
        items,
        passed,
        failed: total - passed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fleetwatch_core::HealthThresholds;
    use fleetwatch_core::stats::{TrendDirection, TrendStrength};

    fn summarize(checks: &[HealthCheckResult]) -> HealthSummary {
        health_summary(checks, &HealthThresholds::default().uptime)
    }

    fn check(status: HealthStatus, response_time: Option<f64>) -> HealthCheckResult {
        let mut result = HealthCheckResult::new("svcA", Utc::now());
        result.status = status;
        result.response_time = response_time;
        result
    }

    fn items(results: &[bool]) -> Vec<ChecklistItem> {
        results
            .iter()
            .enumerate()
            .map(|(i, &passed)| ChecklistItem::new(format!("item{i}"), passed, ""))
            .collect()
    }

    #[test]
    fn empty_summary_is_unknown() {
        let summary = summarize(&[]);
        assert_eq!(summary.overall_status, HealthStatus::Unknown);
        assert_eq!(summary.uptime_level, None);
        assert_eq!(summary.total_checks, 0);
    }

    #[test]
    fn summary_counts_and_rounds() {
        let checks = vec![
            check(HealthStatus::Healthy, Some(100.0)),
            check(HealthStatus::Healthy, Some(201.0)),
            check(HealthStatus::Warning, None),
        ];
        let summary = summarize(&checks);
        assert_eq!(summary.uptime_percentage, 100.0);
        assert_eq!(summary.uptime_level, Some(Level::Good));
        assert_eq!(summary.avg_response_time, 151.0);
        assert_eq!(summary.warning_checks, 1);
        // One warning in three is above the 30% share.
        assert_eq!(summary.overall_status, HealthStatus::Warning);
    }

    #[test]
    fn one_critical_in_ten_is_tolerated() {
        let mut checks = vec![check(HealthStatus::Healthy, Some(100.0)); 9];
        checks.push(check(HealthStatus::Critical, None));
        let summary = summarize(&checks);
        assert_eq!(summary.overall_status, HealthStatus::Healthy);
        assert_eq!(summary.uptime_percentage, 90.0);
        // Exactly on the critical floor stays in the warning band.
        assert_eq!(summary.uptime_level, Some(Level::Warning));

        checks.push(check(HealthStatus::Critical, None));
        let summary = summarize(&checks);
        assert_eq!(summary.overall_status, HealthStatus::Critical);
        assert_eq!(summary.uptime_level, Some(Level::Critical));
    }

    #[test]
    fn trend_needs_three_checks() {
        let checks = vec![check(HealthStatus::Healthy, None); 2];
        assert_eq!(health_trend(&checks).trend, TrendLabel::InsufficientData);
    }

    #[test]
    fn degrading_trend() {
        let mut checks = vec![check(HealthStatus::Healthy, None); 10];
        checks.extend(vec![check(HealthStatus::Critical, None); 10]);
        let trend = health_trend(&checks);
        assert_eq!(trend.trend, TrendLabel::Degrading);
        assert!((trend.recent_score.unwrap() - 0.3).abs() < 1e-9);
        assert_eq!(trend.previous_score, Some(1.0));
    }

    #[test]
    fn server_trend_windows_of_five() {
        assert_eq!(
            server_trend(&vec![check(HealthStatus::Critical, None); 4]),
            TrendLabel::Stable
        );
        let mut checks = vec![check(HealthStatus::Critical, None); 5];
        checks.extend(vec![check(HealthStatus::Healthy, None); 5]);
        assert_eq!(server_trend(&checks), TrendLabel::Improving);
        assert_eq!(
            server_trend(&vec![check(HealthStatus::Warning, None); 10]),
            TrendLabel::Stable
        );
    }

    #[test]
    fn performance_needs_two_checks() {
        let analysis = performance_analysis(&[check(HealthStatus::Healthy, Some(100.0))]);
        assert_eq!(analysis.status, PerformanceStatus::InsufficientData);
    }

    #[test]
    fn performance_trend_over_last_ten() {
        // Older entries fall outside the window.
        let mut history = vec![check(HealthStatus::Healthy, Some(9000.0)); 5];
        history.extend(
            (0..10).map(|i| check(HealthStatus::Healthy, Some(100.0 + 50.0 * i as f64))),
        );

        let analysis = performance_analysis(&history);
        let trend = analysis.response_time_trend.unwrap();
        assert_eq!(trend.direction, TrendDirection::Increasing);
        assert_eq!(trend.strength, TrendStrength::Strong);
        assert_eq!(analysis.min_response_time, Some(100.0));
        assert_eq!(analysis.max_response_time, Some(550.0));
        assert_eq!(analysis.message, "Response time trend: increasing (strong)");
    }

    #[test]
    fn two_points_give_unknown_direction() {
        let history = vec![
            check(HealthStatus::Healthy, Some(100.0)),
            check(HealthStatus::Healthy, Some(200.0)),
        ];
        let analysis = performance_analysis(&history);
        assert_eq!(analysis.status, PerformanceStatus::Analyzed);
        assert_eq!(
            analysis.response_time_trend.unwrap().direction,
            TrendDirection::Unknown
        );
    }

    #[test]
    fn checklist_rules_differ_by_kind() {
        let three_of_four = items(&[true, true, true, false]);

        let config = checklist_report(ChecklistKind::Configuration, Ok(three_of_four.clone()));
        assert_eq!(config.status, ChecklistStatus::Warning);

        // Security needs more than 80% to merely warn.
        let security = checklist_report(ChecklistKind::Security, Ok(three_of_four));
        assert_eq!(security.status, ChecklistStatus::Failed);
        assert_eq!(security.message, "3/4 security checks passed");

        let deps = checklist_report(ChecklistKind::Dependencies, Ok(items(&[false, false, true])));
        assert_eq!(deps.status, ChecklistStatus::Warning);

        let tools = checklist_report(ChecklistKind::ToolTests, Ok(items(&[false, false])));
        assert_eq!(tools.status, ChecklistStatus::Failed);

        let all = checklist_report(ChecklistKind::ToolTests, Ok(items(&[true, true])));
        assert_eq!(all.status, ChecklistStatus::Passed);
    }

    #[test]
    fn empty_checklist_is_skipped_and_error_fails() {
        let empty = checklist_report(ChecklistKind::Security, Ok(Vec::new()));
        assert_eq!(empty.status, ChecklistStatus::Skipped);

        let failed = checklist_report(
            ChecklistKind::Dependencies,
            Err(ProbeError::Unsupported("dependencies")),
        );
        assert_eq!(failed.status, ChecklistStatus::Failed);
        assert!(failed.message.starts_with("Could not run dependencies"));
    }
}
