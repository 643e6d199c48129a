//! fleetwatch-health — multi-check health evaluation for worker servers.
//!
//! Every evaluation runs five checks through the injected [`Prober`]
//! (connectivity, response time, resource usage, error rate, tool
//! availability) and folds them into one [`HealthCheckResult`]. A failing
//! probe never fails the evaluation; it becomes a failed check and an
//! entry in the result's error list.
//!
//! # Architecture
//!
//! ```text
//! HealthEvaluator
//!   ├── histories: name → BoundedHistory<HealthCheckResult> (1000)
//!   ├── Prober                (HttpProber in production, ScriptedProber in tests)
//!   ├── check_server_health   five checks → worst-of composite
//!   ├── comprehensive check   + performance trend and four checklists
//!   └── history / system summary with trend scoring
//! ```
//!
//! [`Prober`]: fleetwatch_core::Prober

pub mod analysis;
pub mod checks;
pub mod evaluator;
pub mod http;
pub mod result;

pub use analysis::{
    ChecklistKind, ChecklistReport, ChecklistStatus, HealthSummary, HealthTrend,
    PerformanceAnalysis, TrendLabel,
};
pub use evaluator::{
    ComprehensiveHealthCheck, HealthEvaluator, HealthHistory, SystemHealthSummary, TrendTally,
    WorkerHealthStatus,
};
pub use http::{HttpProber, HttpTarget};
pub use result::{CheckOutcome, HealthCheckResult};
