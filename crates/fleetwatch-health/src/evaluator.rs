//! The health evaluator: runs checks and keeps per-worker history.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error};

use fleetwatch_core::{
    AuditSink, BoundedHistory, Clock, HealthStatus, HealthThresholds, Prober, SystemClock,
    Timeframe, TracingAudit, WorkerName,
};

use crate::analysis::{
    self, ChecklistKind, ChecklistReport, HealthSummary, HealthTrend, PerformanceAnalysis,
    TrendLabel,
};
use crate::checks;
use crate::result::HealthCheckResult;

type History = Arc<Mutex<BoundedHistory<HealthCheckResult>>>;

/// A basic evaluation plus the deeper, individually fail-soft analyses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComprehensiveHealthCheck {
    #[serde(flatten)]
    pub basic: HealthCheckResult,
    pub performance: PerformanceAnalysis,
    pub tool_tests: ChecklistReport,
    pub configuration: ChecklistReport,
    pub security: ChecklistReport,
    pub dependencies: ChecklistReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthHistory {
    pub worker: WorkerName,
    pub timeframe: Timeframe,
    pub checks: Vec<HealthCheckResult>,
    pub summary: HealthSummary,
    pub trend: HealthTrend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerHealthStatus {
    pub status: HealthStatus,
    pub last_check: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendTally {
    pub improving: usize,
    pub stable: usize,
    pub degrading: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealthSummary {
    pub timestamp: DateTime<Utc>,
    pub overall_status: HealthStatus,
    pub workers: BTreeMap<WorkerName, WorkerHealthStatus>,
    pub total_workers: usize,
    pub healthy_workers: usize,
    pub warning_workers: usize,
    pub critical_workers: usize,
    pub offline_workers: usize,
    pub trends: TrendTally,
}

/// Evaluates worker health through a [`Prober`] and remembers the results.
pub struct HealthEvaluator {
    /// Check history: worker name → bounded history.
    histories: RwLock<HashMap<String, History>>,
    prober: Arc<dyn Prober>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    thresholds: HealthThresholds,
    capacity: usize,
}

impl HealthEvaluator {
    /// `capacity` bounds the number of results kept per worker.
    pub fn new(prober: Arc<dyn Prober>, capacity: usize) -> Self {
        Self {
            histories: RwLock::new(HashMap::new()),
            prober,
            clock: Arc::new(SystemClock),
            audit: Arc::new(TracingAudit),
            thresholds: HealthThresholds::default(),
            capacity,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_thresholds(mut self, thresholds: HealthThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    /// Run the five checks and store the result. Never fails.
    ///
    /// The checks run on their own task; if that task dies, the caller
    /// gets a synthetic critical result instead (not added to history).
    pub async fn check_server_health(&self, name: &str) -> HealthCheckResult {
        let now = self.clock.now();
        let prober = self.prober.clone();
        let thresholds = self.thresholds.clone();
        let worker = name.to_string();

        let task = tokio::spawn(async move {
            checks::evaluate(prober.as_ref(), &thresholds, &worker, now).await
        });

        match task.await {
            Ok(result) => {
                self.store(name, result.clone()).await;
                self.audit.log(
                    "health_check",
                    name,
                    json!({
                        "status": result.status,
                        "checks_performed": result.checks.len(),
                        "errors": result.errors.len(),
                        "warnings": result.warnings.len(),
                    }),
                );
                result
            }
            Err(e) => {
                error!(worker = %name, error = %e, "health check failed");
                self.audit.error(
                    "Health check failed",
                    json!({ "worker": name, "error": e.to_string() }),
                );
                HealthCheckResult::aggregate_failure(name, now, &e.to_string())
            }
        }
    }

    /// Basic evaluation followed by trend analysis and the four checklists.
    pub async fn run_comprehensive_health_check(&self, name: &str) -> ComprehensiveHealthCheck {
        let basic = self.check_server_health(name).await;
        let history = self.history_of(name).await;

        let check = ComprehensiveHealthCheck {
            basic,
            performance: analysis::performance_analysis(&history),
            tool_tests: analysis::checklist_report(
                ChecklistKind::ToolTests,
                self.prober.tool_tests(name).await,
            ),
            configuration: analysis::checklist_report(
                ChecklistKind::Configuration,
                self.prober.configuration(name).await,
            ),
            security: analysis::checklist_report(
                ChecklistKind::Security,
                self.prober.security(name).await,
            ),
            dependencies: analysis::checklist_report(
                ChecklistKind::Dependencies,
                self.prober.dependencies(name).await,
            ),
        };
        debug!(worker = %name, status = %check.basic.status, "comprehensive health check complete");
        check
    }

    /// Checks recorded within `timeframe`, with summary and trend.
    ///
    /// Unknown workers yield an empty history.
    pub async fn get_health_history(&self, name: &str, timeframe: Timeframe) -> HealthHistory {
        let cutoff = timeframe.cutoff(self.clock.now());
        let history = self.histories.read().await.get(name).cloned();
        let checks = match history {
            Some(history) => history.lock().await.since(cutoff),
            None => Vec::new(),
        };

        HealthHistory {
            worker: name.to_string(),
            timeframe,
            summary: analysis::health_summary(&checks, &self.thresholds.uptime),
            trend: analysis::health_trend(&checks),
            checks,
        }
    }

    /// Bucket each tracked worker by its latest result.
    pub async fn get_system_health_summary(&self) -> SystemHealthSummary {
        let mut workers = BTreeMap::new();
        let (mut healthy, mut warning, mut critical, mut offline) = (0, 0, 0, 0);
        let mut trends = TrendTally::default();

        for (name, history) in self.snapshot().await {
            let latest = history.last();
            let status = latest.map(|c| c.status).unwrap_or_default();
            match status {
                HealthStatus::Healthy => healthy += 1,
                HealthStatus::Warning => warning += 1,
                HealthStatus::Critical => critical += 1,
                HealthStatus::Unknown => offline += 1,
            }
            match analysis::server_trend(&history) {
                TrendLabel::Improving => trends.improving += 1,
                TrendLabel::Degrading => trends.degrading += 1,
                TrendLabel::Stable | TrendLabel::InsufficientData => trends.stable += 1,
            }
            workers.insert(
                name,
                WorkerHealthStatus {
                    status,
                    last_check: latest.map(|c| c.timestamp),
                },
            );
        }

        let total = workers.len();
        let overall_status = if total == 0 {
            HealthStatus::Unknown
        } else if critical > 0 || healthy == 0 {
            HealthStatus::Critical
        } else if warning as f64 > healthy as f64 / 2.0 {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };

        SystemHealthSummary {
            timestamp: self.clock.now(),
            overall_status,
            workers,
            total_workers: total,
            healthy_workers: healthy,
            warning_workers: warning,
            critical_workers: critical,
            offline_workers: offline,
            trends,
        }
    }

    /// Most recent stored result for a worker.
    pub async fn latest(&self, name: &str) -> Option<HealthCheckResult> {
        let history = self.histories.read().await.get(name).cloned()?;
        let guard = history.lock().await;
        guard.latest().cloned()
    }

    /// Workers with at least one stored result, sorted.
    pub async fn tracked_workers(&self) -> Vec<WorkerName> {
        let mut names: Vec<_> = self.histories.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop a worker's history. Returns whether there was one.
    pub async fn forget(&self, name: &str) -> bool {
        let removed = self.histories.write().await.remove(name).is_some();
        if removed {
            debug!(worker = %name, "health history dropped");
        }
        removed
    }

    async fn store(&self, name: &str, result: HealthCheckResult) {
        let history = {
            let mut histories = self.histories.write().await;
            histories
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(BoundedHistory::new(self.capacity))))
                .clone()
        };
        history.lock().await.push(result);
    }

    async fn history_of(&self, name: &str) -> Vec<HealthCheckResult> {
        let history = self.histories.read().await.get(name).cloned();
        match history {
            Some(history) => history.lock().await.to_vec(),
            None => Vec::new(),
        }
    }

    async fn snapshot(&self) -> Vec<(WorkerName, Vec<HealthCheckResult>)> {
        let histories: Vec<(WorkerName, History)> = self
            .histories
            .read()
            .await
            .iter()
            .map(|(name, history)| (name.clone(), history.clone()))
            .collect();

        let mut out = Vec::with_capacity(histories.len());
        for (name, history) in histories {
            out.push((name, history.lock().await.to_vec()));
        }
        out
    }
}
