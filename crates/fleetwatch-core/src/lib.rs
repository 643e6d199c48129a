//! fleetwatch-core — shared building blocks for the fleetwatch components.
//!
//! The registry, health evaluator, and metrics aggregator never depend on
//! each other; everything they share lives here.
//!
//! # Architecture
//!
//! ```text
//! fleetwatch-core
//!   ├── types      LifecycleState, HealthStatus, Timeframe, Alert
//!   ├── error      FleetError (operation errors), ProbeError (sub-checks)
//!   ├── history    BoundedHistory<T> (FIFO eviction at capacity)
//!   ├── stats      percentile, thirds trend, regression trend
//!   ├── threshold  three-tier thresholds with a "better" direction
//!   ├── clock      Clock seam (SystemClock, ManualClock)
//!   ├── audit      AuditSink seam (TracingAudit, MemoryAudit)
//!   ├── prober     Prober seam (ScriptedProber test double)
//!   ├── sampler    HostSampler seam (SysinfoSampler, FixedSampler)
//!   └── config     fleetwatch.toml
//! ```

pub mod audit;
pub mod clock;
pub mod config;
pub mod error;
pub mod history;
pub mod prober;
pub mod sampler;
pub mod stats;
pub mod threshold;
pub mod types;

pub use audit::{AuditRecord, AuditSink, MemoryAudit, TracingAudit};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, FleetConfig, parse_duration};
pub use error::{FleetError, FleetResult, ProbeError};
pub use history::{BoundedHistory, Timestamped};
pub use prober::{
    ChecklistItem, ProbeFuture, ProbeScript, Prober, RequestCounts, ResourceUsage,
    ScriptedProber, ToolStatus,
};
pub use sampler::{FixedSampler, HostSample, HostSampler, SysinfoSampler};
pub use threshold::{Direction, HealthThresholds, Level, Threshold};
pub use types::*;
