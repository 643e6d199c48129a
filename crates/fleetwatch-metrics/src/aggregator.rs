//! The metrics aggregator: bounded per-worker series and the queries over them.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use fleetwatch_core::config::MetricsConfig;
use fleetwatch_core::{
    AuditSink, BoundedHistory, Clock, ConfigError, FleetError, FleetResult, HostSampler,
    ProbeError, SystemClock, Timeframe, Timestamped, TracingAudit, WorkerName, stats,
};

use crate::aggregate::{self, AggregatedMetrics, SystemMetricsSummary};
use crate::analysis::{
    self, PerformanceReport, QualityReport, ReliabilityReport, UsageReport,
};
use crate::cost::{self, CostAnalysis};
use crate::entry::{CostEntry, CostInfo, MetricEntry, MetricFields};
use crate::summary::{self, CostSummary, MetricsSummary, MetricsTrends};

/// Reserved series that holds host self-collection samples.
pub const SYSTEM_SERIES: &str = "system";

pub const DEFAULT_RECENT_TIMEFRAME: Timeframe = Timeframe::Hour;
pub const DEFAULT_DETAILED_TIMEFRAME: Timeframe = Timeframe::Day;
pub const DEFAULT_COST_TIMEFRAME: Timeframe = Timeframe::Week;

/// Entries per worker used by the system summary and the aggregate refresh.
const SUMMARY_WINDOW: usize = 10;
/// Cost entries per worker used by the cost summary.
const COST_SUMMARY_WINDOW: usize = 100;

#[derive(Debug, Clone)]
pub struct MetricsOptions {
    pub series_capacity: usize,
    pub cost_capacity: usize,
    pub collection_interval: Duration,
    pub aggregation_interval: Duration,
}

impl Default for MetricsOptions {
    fn default() -> Self {
        Self {
            series_capacity: 1000,
            cost_capacity: 1000,
            collection_interval: Duration::from_secs(60),
            aggregation_interval: Duration::from_secs(300),
        }
    }
}

impl MetricsOptions {
    pub fn from_config(config: &MetricsConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            series_capacity: config.series_capacity,
            cost_capacity: config.cost_capacity,
            collection_interval: config.collection_interval()?,
            aggregation_interval: config.aggregation_interval()?,
        })
    }
}

/// Windowed entries of one worker with their summary and trends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentMetrics {
    pub worker: WorkerName,
    pub timeframe: Timeframe,
    pub metrics: Vec<MetricEntry>,
    pub summary: MetricsSummary,
    pub trends: MetricsTrends,
}

/// Every per-worker analysis over one window.
///
/// Analyses that need data the window lacks are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedMetrics {
    pub worker: WorkerName,
    pub timeframe: Timeframe,
    pub summary: MetricsSummary,
    pub trends: MetricsTrends,
    pub performance: Option<PerformanceReport>,
    pub reliability: Option<ReliabilityReport>,
    pub cost: CostSummary,
    pub usage: Option<UsageReport>,
    pub quality: Option<QualityReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetCostSummary {
    pub total_cost: f64,
    pub total_requests: u64,
    pub avg_cost_per_request: f64,
    pub currency: String,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerAggregate {
    pub latest: Option<MetricEntry>,
    pub summary: MetricsSummary,
}

/// Result of the periodic aggregate refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    pub last_updated: DateTime<Utc>,
    pub total_requests: u64,
    pub total_errors: u64,
    /// Mean of the per-worker averages that are above zero.
    pub avg_response_time: f64,
    pub workers: BTreeMap<WorkerName, WorkerAggregate>,
}

type Series<T> = Arc<Mutex<BoundedHistory<T>>>;
type SeriesMap<T> = RwLock<HashMap<String, Series<T>>>;

/// Accumulates metric and cost series per worker and answers queries over them.
pub struct MetricsAggregator {
    /// Metric series: worker name → bounded history.
    metrics: SeriesMap<MetricEntry>,
    /// Cost series: worker name → bounded history.
    costs: SeriesMap<CostEntry>,
    latest: RwLock<Option<AggregateSnapshot>>,
    sampler: Arc<dyn HostSampler>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    options: MetricsOptions,
}

impl MetricsAggregator {
    pub fn new(options: MetricsOptions, sampler: Arc<dyn HostSampler>) -> Self {
        Self {
            metrics: RwLock::new(HashMap::new()),
            costs: RwLock::new(HashMap::new()),
            latest: RwLock::new(None),
            sampler,
            clock: Arc::new(SystemClock),
            audit: Arc::new(TracingAudit),
            options,
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

    pub fn options(&self) -> &MetricsOptions {
        &self.options
    }

    // ── Recording ─────────────────────────────────────────────────

    /// Append a timestamped sample to the worker's series.
    pub async fn record_metrics(&self, name: &str, fields: MetricFields) -> FleetResult<()> {
        validate_name(name)?;
        let series = series_for(&self.metrics, name, self.options.series_capacity).await;
        // Stamped under the series lock so entries stay in time order.
        let mut history = series.lock().await;
        let entry = MetricEntry {
            timestamp: self.clock.now(),
            fields,
        };
        let evicted = history.push(entry).is_some();
        drop(history);
        debug!(worker = %name, evicted, "metrics recorded");
        Ok(())
    }

    pub async fn record_cost(&self, name: &str, info: CostInfo) -> FleetResult<()> {
        validate_name(name)?;
        let series = series_for(&self.costs, name, self.options.cost_capacity).await;
        let mut history = series.lock().await;
        history.push(CostEntry {
            timestamp: self.clock.now(),
            info,
        });
        drop(history);
        debug!(worker = %name, cost = info.cost, "cost recorded");
        Ok(())
    }

    // ── Per-worker queries ────────────────────────────────────────

    /// Entries within `timeframe` plus summary and trends. Unknown workers
    /// yield an empty window.
    pub async fn get_recent_metrics(&self, name: &str, timeframe: Timeframe) -> RecentMetrics {
        let cutoff = timeframe.cutoff(self.clock.now());
        let metrics = window_of(&self.metrics, name, cutoff).await;
        RecentMetrics {
            worker: name.to_string(),
            timeframe,
            summary: summary::summarize(&metrics),
            trends: summary::trends(&metrics),
            metrics,
        }
    }

    pub async fn get_detailed_metrics(&self, name: &str, timeframe: Timeframe) -> DetailedMetrics {
        let cutoff = timeframe.cutoff(self.clock.now());
        let metrics = window_of(&self.metrics, name, cutoff).await;
        let costs = window_of(&self.costs, name, cutoff).await;

        let performance = analysis::performance_report(&metrics);
        let reliability = analysis::reliability_report(&metrics);
        let quality = match (&performance, &reliability) {
            (Some(p), Some(r)) => Some(analysis::quality_report(p, r)),
            _ => None,
        };

        DetailedMetrics {
            worker: name.to_string(),
            timeframe,
            summary: summary::summarize(&metrics),
            trends: summary::trends(&metrics),
            usage: analysis::usage_report(&metrics),
            cost: summary::summarize_costs(&costs),
            performance,
            reliability,
            quality,
        }
    }

    // ── System-wide queries ───────────────────────────────────────

    /// Per-worker summaries within `timeframe`, overview, and alerts.
    ///
    /// The reserved `system` series is not a worker and is left out.
    pub async fn get_aggregated_metrics(&self, timeframe: Timeframe) -> AggregatedMetrics {
        let now = self.clock.now();
        let windowed = windows_of(&self.metrics, timeframe.cutoff(now)).await;
        aggregate::aggregate(timeframe, now, &workers_only(windowed))
    }

    pub async fn get_cost_analysis(
        &self,
        timeframe: Timeframe,
        include_breakdown: bool,
    ) -> CostAnalysis {
        let now = self.clock.now();
        let windowed = windows_of(&self.costs, timeframe.cutoff(now)).await;
        cost::cost_analysis(timeframe, now, &windowed, include_breakdown)
    }

    /// Dashboard summary over each worker's last ten entries.
    pub async fn get_system_metrics_summary(&self) -> SystemMetricsSummary {
        let recent = workers_only(latest_of(&self.metrics, SUMMARY_WINDOW).await);
        let costs = self.cost_totals().await;
        aggregate::system_summary(self.clock.now(), &recent, &costs)
    }

    /// Cost totals over each worker's last hundred cost entries.
    pub async fn get_cost_summary(&self) -> FleetCostSummary {
        let totals = self.cost_totals().await;
        FleetCostSummary {
            total_cost: totals.total_cost,
            total_requests: totals.total_requests,
            avg_cost_per_request: totals.avg_cost_per_request,
            currency: "USD".to_string(),
            last_updated: self.clock.now(),
        }
    }

    /// Most recent result of [`refresh_aggregates`](Self::refresh_aggregates).
    pub async fn latest_aggregate(&self) -> Option<AggregateSnapshot> {
        self.latest.read().await.clone()
    }

    /// Drop every series of a worker.
    pub async fn forget(&self, name: &str) -> bool {
        let metrics = self.metrics.write().await.remove(name).is_some();
        let costs = self.costs.write().await.remove(name).is_some();
        let removed = metrics || costs;
        if removed {
            debug!(worker = %name, "metric series dropped");
        }
        removed
    }

    /// Names of every series, sorted.
    pub async fn tracked_workers(&self) -> Vec<WorkerName> {
        let mut names: Vec<WorkerName> = self.metrics.read().await.keys().cloned().collect();
        for name in self.costs.read().await.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names.sort();
        names
    }

    // ── Background ────────────────────────────────────────────────

    /// Sample the host and record it under the `system` series.
    pub async fn collect_system_metrics(&self) -> FleetResult<()> {
        let sampler = self.sampler.clone();
        let sample = tokio::task::spawn_blocking(move || sampler.sample())
            .await
            .map_err(|e| ProbeError::Sampler(e.to_string()))??;

        let fields = MetricFields::new()
            .with("cpu_usage", sample.cpu_usage)
            .with("memory_usage", sample.memory_usage)
            .with("disk_usage", sample.disk_usage)
            .with("load_average", sample.load_average)
            .with("process_count", sample.process_count as f64);
        self.record_metrics(SYSTEM_SERIES, fields).await
    }

    /// Recompute the system aggregate from each worker's latest entries.
    pub async fn refresh_aggregates(&self) -> AggregateSnapshot {
        let recent = workers_only(latest_of(&self.metrics, SUMMARY_WINDOW).await);

        let mut workers = BTreeMap::new();
        let (mut total_requests, mut total_errors) = (0, 0);
        let mut averages = Vec::new();
        for (name, entries) in recent {
            let summary = summary::summarize(&entries);
            total_requests += summary.total_requests;
            total_errors += summary.total_errors;
            if summary.avg_response_time > 0.0 {
                averages.push(summary.avg_response_time);
            }
            workers.insert(
                name,
                WorkerAggregate {
                    latest: entries.last().cloned(),
                    summary,
                },
            );
        }

        let snapshot = AggregateSnapshot {
            last_updated: self.clock.now(),
            total_requests,
            total_errors,
            avg_response_time: stats::mean(&averages).unwrap_or(0.0),
            workers,
        };
        *self.latest.write().await = Some(snapshot.clone());
        snapshot
    }

    /// Drive host collection and aggregate refresh until `shutdown` flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let collect_every = self.options.collection_interval.max(Duration::from_millis(1));
        let aggregate_every = self.options.aggregation_interval.max(Duration::from_millis(1));

        let mut collect = tokio::time::interval_at(Instant::now() + collect_every, collect_every);
        collect.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut refresh =
            tokio::time::interval_at(Instant::now() + aggregate_every, aggregate_every);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

        debug!(collect = ?collect_every, aggregate = ?aggregate_every, "metrics loop starting");
        while !*shutdown.borrow() {
            tokio::select! {
                _ = collect.tick() => {
                    if let Err(e) = self.collect_system_metrics().await {
                        warn!(error = %e, "system metrics collection failed");
                        self.audit.error(
                            "system metrics collection failed",
                            json!({ "error": e.to_string() }),
                        );
                    }
                }
                _ = refresh.tick() => {
                    let snapshot = self.refresh_aggregates().await;
                    debug!(
                        workers = snapshot.workers.len(),
                        total_requests = snapshot.total_requests,
                        "aggregates refreshed"
                    );
                }
                _ = shutdown.changed() => {
                    debug!("metrics loop shutting down");
                    break;
                }
            }
        }
    }

    async fn cost_totals(&self) -> CostSummary {
        let recent = latest_of(&self.costs, COST_SUMMARY_WINDOW).await;
        let all: Vec<CostEntry> = recent.into_values().flatten().collect();
        summary::summarize_costs(&all)
    }
}

fn validate_name(name: &str) -> FleetResult<()> {
    if name.trim().is_empty() {
        return Err(FleetError::InvalidArgument(
            "worker name must not be empty".into(),
        ));
    }
    Ok(())
}

fn workers_only<T>(mut series: BTreeMap<WorkerName, Vec<T>>) -> BTreeMap<WorkerName, Vec<T>> {
    series.remove(SYSTEM_SERIES);
    series
}

async fn series_for<T>(map: &SeriesMap<T>, name: &str, capacity: usize) -> Series<T> {
    if let Some(series) = map.read().await.get(name) {
        return series.clone();
    }
    map.write()
        .await
        .entry(name.to_string())
        .or_insert_with(|| Arc::new(Mutex::new(BoundedHistory::new(capacity))))
        .clone()
}

async fn snapshot_of<T>(map: &SeriesMap<T>) -> Vec<(WorkerName, Series<T>)> {
    map.read()
        .await
        .iter()
        .map(|(name, series)| (name.clone(), series.clone()))
        .collect()
}

async fn window_of<T: Timestamped + Clone>(
    map: &SeriesMap<T>,
    name: &str,
    cutoff: DateTime<Utc>,
) -> Vec<T> {
    let series = map.read().await.get(name).cloned();
    match series {
        Some(series) => series.lock().await.since(cutoff),
        None => Vec::new(),
    }
}

async fn windows_of<T: Timestamped + Clone>(
    map: &SeriesMap<T>,
    cutoff: DateTime<Utc>,
) -> BTreeMap<WorkerName, Vec<T>> {
    let mut out = BTreeMap::new();
    for (name, series) in snapshot_of(map).await {
        let entries = series.lock().await.since(cutoff);
        out.insert(name, entries);
    }
    out
}

async fn latest_of<T: Clone>(map: &SeriesMap<T>, n: usize) -> BTreeMap<WorkerName, Vec<T>> {
    let mut out = BTreeMap::new();
    for (name, series) in snapshot_of(map).await {
        let entries = series.lock().await.recent_vec(n);
        out.insert(name, entries);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use fleetwatch_core::{FixedSampler, ManualClock, MemoryAudit};

    fn options() -> MetricsOptions {
        MetricsOptions {
            series_capacity: 1000,
            cost_capacity: 1000,
            collection_interval: Duration::from_millis(20),
            aggregation_interval: Duration::from_millis(30),
        }
    }

    fn aggregator() -> MetricsAggregator {
        MetricsAggregator::new(options(), Arc::new(FixedSampler::default()))
    }

    fn sample(latency: f64, requests: u64, errors: u64) -> MetricFields {
        MetricFields::new()
            .response_time(latency)
            .requests(requests)
            .errors(errors)
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let agg = aggregator();
        assert!(matches!(
            agg.record_metrics("", sample(1.0, 1, 0)).await,
            Err(FleetError::InvalidArgument(_))
        ));
        assert!(matches!(
            agg.record_cost("  ", CostInfo::new(1.0)).await,
            Err(FleetError::InvalidArgument(_))
        ));
        assert!(agg.tracked_workers().await.is_empty());
    }

    #[tokio::test]
    async fn one_entry_in_one_entry_out() {
        let agg = aggregator();
        agg.record_metrics("svcA", sample(120.0, 4, 0)).await.unwrap();

        let recent = agg.get_recent_metrics("svcA", DEFAULT_RECENT_TIMEFRAME).await;
        assert_eq!(recent.metrics.len(), 1);
        assert_eq!(recent.metrics[0].fields, sample(120.0, 4, 0));
        assert_eq!(recent.summary.total_requests, 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_are_all_kept_in_order() {
        let agg = Arc::new(aggregator());
        let tasks: Vec<_> = (0..64u64)
            .map(|i| {
                let agg = agg.clone();
                tokio::spawn(async move { agg.record_metrics("svcA", sample(10.0, i, 0)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let recent = agg.get_recent_metrics("svcA", Timeframe::Hour).await;
        assert_eq!(recent.metrics.len(), 64);
        assert_eq!(recent.summary.total_requests, (0..64).sum::<u64>());
        assert!(
            recent
                .metrics
                .windows(2)
                .all(|pair| pair[0].timestamp <= pair[1].timestamp)
        );

        let mut seen: Vec<u64> = recent
            .metrics
            .iter()
            .filter_map(|m| m.fields.requests)
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..64).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn unknown_worker_has_empty_window() {
        let agg = aggregator();
        let recent = agg.get_recent_metrics("ghost", Timeframe::Day).await;
        assert!(recent.metrics.is_empty());
        assert_eq!(recent.summary.success_rate, 100.0);

        let detailed = agg.get_detailed_metrics("ghost", Timeframe::Day).await;
        assert!(detailed.performance.is_none());
        assert!(detailed.quality.is_none());
    }

    #[tokio::test]
    async fn window_excludes_old_entries() {
        let clock = Arc::new(ManualClock::starting_now());
        let agg = aggregator().with_clock(clock.clone());

        agg.record_metrics("svcA", sample(100.0, 1, 0)).await.unwrap();
        clock.advance(TimeDelta::hours(2));
        agg.record_metrics("svcA", sample(200.0, 1, 0)).await.unwrap();

        let hour = agg.get_recent_metrics("svcA", Timeframe::Hour).await;
        assert_eq!(hour.metrics.len(), 1);
        assert_eq!(hour.summary.avg_response_time, 200.0);

        let day = agg.get_recent_metrics("svcA", Timeframe::Day).await;
        assert_eq!(day.metrics.len(), 2);
    }

    #[tokio::test]
    async fn series_are_capped() {
        let agg = MetricsAggregator::new(
            MetricsOptions {
                series_capacity: 3,
                ..options()
            },
            Arc::new(FixedSampler::default()),
        );
        for i in 0..5 {
            agg.record_metrics("svcA", sample(100.0 * (i + 1) as f64, 1, 0))
                .await
                .unwrap();
        }
        let recent = agg.get_recent_metrics("svcA", Timeframe::Day).await;
        assert_eq!(recent.metrics.len(), 3);
        assert_eq!(recent.metrics[0].response_time(), Some(300.0));
    }

    #[tokio::test]
    async fn detailed_metrics_totals() {
        let agg = aggregator();
        for _ in 0..3 {
            agg.record_metrics("svcA", sample(100.0, 10, 1)).await.unwrap();
        }
        agg.record_cost("svcA", CostInfo::for_requests(0.5, 10)).await.unwrap();

        let detailed = agg.get_detailed_metrics("svcA", DEFAULT_DETAILED_TIMEFRAME).await;
        assert_eq!(detailed.summary.total_requests, 30);
        assert_eq!(detailed.summary.total_errors, 3);
        assert_eq!(detailed.summary.success_rate, 90.0);

        let reliability = detailed.reliability.unwrap();
        assert_eq!(reliability.success_rate, 90.0);
        assert_eq!(reliability.status, analysis::Rating::Fair);
        assert_eq!(detailed.performance.unwrap().score, 100.0);
        assert_eq!(detailed.cost.total_cost, 0.5);
        assert!(detailed.quality.is_some());
    }

    #[tokio::test]
    async fn aggregated_metrics_skip_system_series() {
        let agg = aggregator();
        agg.record_metrics("svcA", sample(100.0, 10, 0)).await.unwrap();
        agg.collect_system_metrics().await.unwrap();

        let aggregated = agg.get_aggregated_metrics(Timeframe::Hour).await;
        assert_eq!(aggregated.overview.total_workers, 1);
        assert_eq!(aggregated.overview.total_requests, 10);
        assert!(!aggregated.by_worker.contains_key(SYSTEM_SERIES));
    }

    #[tokio::test]
    async fn system_collection_records_host_sample() {
        let agg = aggregator();
        agg.collect_system_metrics().await.unwrap();

        let recent = agg.get_recent_metrics(SYSTEM_SERIES, Timeframe::Hour).await;
        assert_eq!(recent.metrics.len(), 1);
        let extra = &recent.metrics[0].fields.extra;
        assert_eq!(extra.get("cpu_usage"), Some(&0.25));
        assert_eq!(extra.get("process_count"), Some(&150.0));
    }

    #[tokio::test]
    async fn failing_sampler_surfaces_an_error() {
        let agg = MetricsAggregator::new(
            options(),
            Arc::new(FixedSampler::failing(ProbeError::Sampler("no /proc".into()))),
        );
        assert!(matches!(
            agg.collect_system_metrics().await,
            Err(FleetError::Probe(ProbeError::Sampler(_)))
        ));
        assert!(agg.tracked_workers().await.is_empty());
    }

    #[tokio::test]
    async fn cost_queries() {
        let clock = Arc::new(ManualClock::starting_now());
        let agg = aggregator().with_clock(clock.clone());

        agg.record_cost("svcA", CostInfo::for_requests(3.0, 10)).await.unwrap();
        clock.advance(TimeDelta::days(8));
        agg.record_cost("svcA", CostInfo::for_requests(1.0, 5)).await.unwrap();
        agg.record_cost("svcB", CostInfo::new(1.0)).await.unwrap();

        let analysis = agg.get_cost_analysis(DEFAULT_COST_TIMEFRAME, true).await;
        assert_eq!(analysis.total.cost, 2.0);
        assert_eq!(analysis.total.requests, 6);
        assert_eq!(analysis.by_worker.len(), 2);
        assert!(analysis.breakdown.is_some());

        // The summary is count-bounded, not time-bounded.
        let summary = agg.get_cost_summary().await;
        assert_eq!(summary.total_cost, 5.0);
        assert_eq!(summary.total_requests, 16);
        assert_eq!(summary.currency, "USD");
    }

    #[tokio::test]
    async fn system_summary_uses_latest_ten() {
        let agg = aggregator();
        for _ in 0..10 {
            agg.record_metrics("svcA", sample(100.0, 1, 1)).await.unwrap();
        }
        for _ in 0..10 {
            agg.record_metrics("svcA", sample(100.0, 1, 0)).await.unwrap();
        }
        agg.record_metrics("svcB", sample(100.0, 1, 0)).await.unwrap();

        let summary = agg.get_system_metrics_summary().await;
        assert_eq!(summary.workers.total, 2);
        assert_eq!(summary.workers.healthy, 2);
        assert_eq!(summary.performance.total_requests, 11);
        assert_eq!(summary.performance.success_rate, 100.0);
    }

    #[tokio::test]
    async fn refresh_aggregates_stores_snapshot() {
        let agg = aggregator();
        assert!(agg.latest_aggregate().await.is_none());
        agg.record_metrics("svcA", sample(100.0, 10, 2)).await.unwrap();
        agg.record_metrics("svcB", sample(300.0, 5, 0)).await.unwrap();
        agg.record_metrics("svcC", MetricFields::new().requests(1)).await.unwrap();

        let snapshot = agg.refresh_aggregates().await;
        assert_eq!(snapshot.total_requests, 16);
        assert_eq!(snapshot.total_errors, 2);
        assert_eq!(snapshot.avg_response_time, 200.0);
        assert_eq!(snapshot.workers.len(), 3);
        assert_eq!(agg.latest_aggregate().await, Some(snapshot));
    }

    #[tokio::test]
    async fn forget_drops_both_series() {
        let agg = aggregator();
        agg.record_metrics("svcA", sample(100.0, 1, 0)).await.unwrap();
        agg.record_cost("svcA", CostInfo::new(1.0)).await.unwrap();
        assert_eq!(agg.tracked_workers().await, vec!["svcA".to_string()]);

        assert!(agg.forget("svcA").await);
        assert!(!agg.forget("svcA").await);
        assert!(agg.get_recent_metrics("svcA", Timeframe::Day).await.metrics.is_empty());
        assert_eq!(agg.get_cost_summary().await.total_requests, 0);
    }

    #[tokio::test]
    async fn run_loop_collects_until_shutdown() {
        let audit = Arc::new(MemoryAudit::new());
        let agg = Arc::new(aggregator().with_audit(audit.clone()));

        let (tx, rx) = watch::channel(false);
        let runner = agg.clone();
        let handle = tokio::spawn(async move { runner.run(rx).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        let system = agg.get_recent_metrics(SYSTEM_SERIES, Timeframe::Hour).await;
        assert!(!system.metrics.is_empty());
        assert!(agg.latest_aggregate().await.is_some());
        assert!(audit.errors().is_empty());
    }
}
