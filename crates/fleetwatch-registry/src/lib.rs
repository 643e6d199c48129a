//! fleetwatch-registry — lifecycle management for worker servers.
//!
//! Owns one state machine per worker and is the only component allowed
//! to change it. Tool invocations are proxied through the registry so
//! that it can keep rolling latency and success counters.
//!
//! # Architecture
//!
//! ```text
//! Registry
//!   ├── workers: name → Arc<Mutex<WorkerSlot>>
//!   │   ├── WorkerRecord (state, timestamps, rolling metrics)
//!   │   └── BoundedHistory<HealthSnapshot> (100 per worker)
//!   ├── WorkerDriver   (launch / shutdown / invoke; SimulatedDriver)
//!   ├── Prober         (connectivity for the health sweep)
//!   ├── broadcast      (LifecycleEvent push channel)
//!   └── run() → periodic health sweep over running workers
//! ```
//!
//! # State machine
//!
//! ```text
//! registered → starting → running → stopping → stopped
//!                  │          │          │
//!                  └──────────┴──────────┴──→ error
//! ```
//!
//! Locks are never held across the startup delay, the drain delay, or
//! driver calls, so a slow worker never blocks operations on another.

pub mod driver;
pub mod overview;
pub mod record;
pub mod registry;

pub use driver::{DriverFuture, SimulatedDriver, WorkerDriver};
pub use overview::{HealthCounts, StateCounts, SystemOverview};
pub use record::{HealthSnapshot, LifecycleEvent, WorkerMetrics, WorkerRecord};
pub use registry::{Registry, RegistryOptions};
