//! fleetwatchd — the process that composes the fleetwatch components.
//!
//! [`FleetContext`] is the one per-process object: it builds the registry,
//! health evaluator, and metrics aggregator from a [`FleetConfig`], owns
//! their background loops, and stops them together.
//!
//! ```text
//! FleetContext
//!   ├── Registry           health sweep loop
//!   ├── HealthEvaluator    evaluation loop (feeds check latency into metrics)
//!   ├── MetricsAggregator  host collection + aggregate refresh loop
//!   ├── HttpProber         shared by the registry and the evaluator
//!   └── watch::Sender      shutdown for every loop
//! ```
//!
//! [`FleetConfig`]: fleetwatch_core::FleetConfig

pub mod context;

pub use context::{Fleet, FleetContext};
