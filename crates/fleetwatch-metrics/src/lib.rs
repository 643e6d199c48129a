//! fleetwatch-metrics — bounded metric and cost series per worker.
//!
//! Callers append samples with [`MetricsAggregator::record_metrics`] and
//! [`MetricsAggregator::record_cost`]; every query filters a recency window
//! and computes its statistics on the spot. Nothing is persisted.
//!
//! # Architecture
//!
//! ```text
//! MetricsAggregator
//!   ├── metrics: name → BoundedHistory<MetricEntry> (1000)
//!   ├── costs:   name → BoundedHistory<CostEntry>   (1000)
//!   ├── summary    totals, success rate, thirds trends
//!   ├── analysis   performance / reliability / usage / quality reports
//!   ├── cost       breakdowns, cost trend, projections
//!   ├── aggregate  system roll-ups  ──►  alerts
//!   └── run()      host self-collection ("system" series) + aggregate refresh
//! ```

pub mod aggregate;
pub mod aggregator;
pub mod alerts;
pub mod analysis;
pub mod cost;
pub mod entry;
pub mod summary;

pub use aggregate::{AggregatedMetrics, Overview, SystemMetricsSummary};
pub use aggregator::{
    AggregateSnapshot, DetailedMetrics, FleetCostSummary, MetricsAggregator, MetricsOptions,
    RecentMetrics, SYSTEM_SERIES, WorkerAggregate,
};
pub use alerts::generate_metric_alerts;
pub use analysis::{
    Grade, PerformanceReport, QualityReport, Rating, ReliabilityReport, UsageReport,
};
pub use cost::{CostAnalysis, CostBreakdown, CostProjections};
pub use entry::{CostEntry, CostInfo, MetricEntry, MetricFields};
pub use summary::{CostSummary, MetricsSummary, MetricsTrends};
