//! Domain types shared by the fleetwatch components.
//!
//! Lifecycle and health vocabularies, the query timeframes, and the
//! alert record emitted by both the registry and the metrics aggregator.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Unique name of a worker server.
pub type WorkerName = String;

// ── Lifecycle ─────────────────────────────────────────────────────

/// Lifecycle state of a worker.
///
/// `Registered → Starting → Running → Stopping → Stopped`, with `Error`
/// reachable whenever a transition or probe fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Registered,
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl LifecycleState {
    pub const ALL: [LifecycleState; 6] = [
        LifecycleState::Registered,
        LifecycleState::Starting,
        LifecycleState::Running,
        LifecycleState::Stopping,
        LifecycleState::Stopped,
        LifecycleState::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Registered => "registered",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Error => "error",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Health ────────────────────────────────────────────────────────

/// Composite health of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
    #[default]
    Unknown,
}

impl HealthStatus {
    /// Numeric score used by trend analysis.
    pub fn score(self) -> f64 {
        match self {
            HealthStatus::Healthy => 1.0,
            HealthStatus::Warning => 0.7,
            HealthStatus::Critical => 0.3,
            HealthStatus::Unknown => 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
            HealthStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one individual check.
///
/// Ordered so that `max()` yields the worst outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Passed,
    Warning,
    Failed,
}

impl CheckStatus {
    /// Worst-of rule: `Failed` beats `Warning` beats `Passed`.
    pub fn worst<I>(statuses: I) -> CheckStatus
    where
        I: IntoIterator<Item = CheckStatus>,
    {
        statuses.into_iter().max().unwrap_or(CheckStatus::Passed)
    }
}

impl From<CheckStatus> for HealthStatus {
    fn from(status: CheckStatus) -> Self {
        match status {
            CheckStatus::Passed => HealthStatus::Healthy,
            CheckStatus::Warning => HealthStatus::Warning,
            CheckStatus::Failed => HealthStatus::Critical,
        }
    }
}

/// Derive the composite health of a set of checks.
pub fn composite_status<I>(statuses: I) -> HealthStatus
where
    I: IntoIterator<Item = CheckStatus>,
{
    CheckStatus::worst(statuses).into()
}

// ── Timeframes ────────────────────────────────────────────────────

/// Recency window used to filter time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Timeframe {
    #[serde(rename = "1h")]
    Hour,
    #[default]
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Hour => "1h",
            Timeframe::Day => "24h",
            Timeframe::Week => "7d",
            Timeframe::Month => "30d",
        }
    }

    pub fn duration(&self) -> TimeDelta {
        match self {
            Timeframe::Hour => TimeDelta::hours(1),
            Timeframe::Day => TimeDelta::hours(24),
            Timeframe::Week => TimeDelta::days(7),
            Timeframe::Month => TimeDelta::days(30),
        }
    }

    /// `now - duration`; entries at or after the cutoff are in the window.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.duration()
    }

    /// Parse a label, falling back to `24h` for anything unrecognised.
    pub fn from_label(label: &str) -> Timeframe {
        label.parse().unwrap_or_default()
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1h" => Ok(Timeframe::Hour),
            "24h" => Ok(Timeframe::Day),
            "7d" => Ok(Timeframe::Week),
            "30d" => Ok(Timeframe::Month),
            other => Err(format!("unknown timeframe: {other}")),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Alerts ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Performance,
    Reliability,
    Health,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// A threshold breach. Alerts are computed on demand and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    /// Worker the alert concerns; `None` for system-wide alerts.
    pub worker: Option<WorkerName>,
    pub message: String,
    pub threshold: f64,
    pub actual: f64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_of_prefers_failed() {
        let status = CheckStatus::worst([
            CheckStatus::Passed,
            CheckStatus::Failed,
            CheckStatus::Warning,
        ]);
        assert_eq!(status, CheckStatus::Failed);
    }

    #[test]
    fn composite_maps_to_health() {
        assert_eq!(
            composite_status([CheckStatus::Passed, CheckStatus::Passed]),
            HealthStatus::Healthy
        );
        assert_eq!(
            composite_status([CheckStatus::Passed, CheckStatus::Warning]),
            HealthStatus::Warning
        );
        assert_eq!(
            composite_status([CheckStatus::Warning, CheckStatus::Failed]),
            HealthStatus::Critical
        );
        assert_eq!(composite_status([]), HealthStatus::Healthy);
    }

    #[test]
    fn timeframe_labels_round_trip() {
        for tf in [Timeframe::Hour, Timeframe::Day, Timeframe::Week, Timeframe::Month] {
            assert_eq!(tf.as_str().parse::<Timeframe>().unwrap(), tf);
        }
    }

    #[test]
    fn unknown_timeframe_falls_back_to_day() {
        assert_eq!(Timeframe::from_label("90m"), Timeframe::Day);
        assert!("90m".parse::<Timeframe>().is_err());
    }

    #[test]
    fn cutoff_subtracts_window() {
        let now = DateTime::parse_from_rfc3339("2026-01-10T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let cutoff = Timeframe::Week.cutoff(now);
        assert_eq!(cutoff.to_rfc3339(), "2026-01-03T12:00:00+00:00");
    }

    #[test]
    fn health_scores() {
        assert_eq!(HealthStatus::Healthy.score(), 1.0);
        assert_eq!(HealthStatus::Warning.score(), 0.7);
        assert_eq!(HealthStatus::Critical.score(), 0.3);
        assert_eq!(HealthStatus::Unknown.score(), 0.0);
    }

    #[test]
    fn lifecycle_serializes_snake_case() {
        let json = serde_json::to_string(&LifecycleState::Running).unwrap();
        assert_eq!(json, "\"running\"");
        assert_eq!(LifecycleState::Stopping.to_string(), "stopping");
    }
}
