//! Prober seam: how health checks observe a worker.
//!
//! Core logic is probe-agnostic: production wires a network prober, tests
//! wire [`ScriptedProber`]. Methods return boxed futures so the trait stays
//! object-safe behind `Arc<dyn Prober>`.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ProbeError;

/// Boxed future returned by every probe.
pub type ProbeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProbeError>> + Send + 'a>>;

/// Memory and CPU usage as fractions in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub memory: f64,
    pub cpu: f64,
}

/// Request tallies observed for a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestCounts {
    pub total: u64,
    pub failed: u64,
}

impl RequestCounts {
    /// Fraction of failed requests; zero when nothing was observed.
    pub fn error_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failed as f64 / self.total as f64
        }
    }
}

/// Availability of one tool exposed by a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolStatus {
    pub name: String,
    pub available: bool,
}

/// One line of a pass/fail checklist (tool tests, config, security, deps).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub name: String,
    pub passed: bool,
    pub message: String,
}

impl ChecklistItem {
    pub fn new(name: impl Into<String>, passed: bool, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed,
            message: message.into(),
        }
    }
}

/// Observes workers on behalf of the health checks.
pub trait Prober: Send + Sync {
    /// Round-trip a connectivity probe and return its latency.
    fn connectivity<'a>(&'a self, worker: &'a str) -> ProbeFuture<'a, Duration>;

    /// Measure response time when no connectivity latency is at hand.
    fn measure_response_time<'a>(&'a self, worker: &'a str) -> ProbeFuture<'a, Duration> {
        self.connectivity(worker)
    }

    /// Current memory/CPU usage of the worker's host.
    fn resources<'a>(&'a self, worker: &'a str) -> ProbeFuture<'a, ResourceUsage>;

    /// Requests and failures observed for the worker.
    fn request_counts<'a>(&'a self, worker: &'a str) -> ProbeFuture<'a, RequestCounts>;

    /// Tools the worker is expected to expose, with availability.
    fn tools<'a>(&'a self, worker: &'a str) -> ProbeFuture<'a, Vec<ToolStatus>>;

    fn tool_tests<'a>(&'a self, _worker: &'a str) -> ProbeFuture<'a, Vec<ChecklistItem>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn configuration<'a>(&'a self, _worker: &'a str) -> ProbeFuture<'a, Vec<ChecklistItem>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn security<'a>(&'a self, _worker: &'a str) -> ProbeFuture<'a, Vec<ChecklistItem>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn dependencies<'a>(&'a self, _worker: &'a str) -> ProbeFuture<'a, Vec<ChecklistItem>> {
        Box::pin(async { Ok(Vec::new()) })
    }
}

// ── Test double ───────────────────────────────────────────────────

/// Canned probe answers for one worker.
#[derive(Debug, Clone)]
pub struct ProbeScript {
    pub latency: Result<Duration, ProbeError>,
    pub resources: Result<ResourceUsage, ProbeError>,
    pub counts: Result<RequestCounts, ProbeError>,
    pub tools: Result<Vec<ToolStatus>, ProbeError>,
    pub tool_tests: Result<Vec<ChecklistItem>, ProbeError>,
    pub configuration: Result<Vec<ChecklistItem>, ProbeError>,
    pub security: Result<Vec<ChecklistItem>, ProbeError>,
    pub dependencies: Result<Vec<ChecklistItem>, ProbeError>,
}

impl Default for ProbeScript {
    /// A worker that passes every check.
    fn default() -> Self {
        Self {
            latency: Ok(Duration::from_millis(120)),
            resources: Ok(ResourceUsage {
                memory: 0.40,
                cpu: 0.30,
            }),
            counts: Ok(RequestCounts {
                total: 500,
                failed: 0,
            }),
            tools: Ok(vec![
                ToolStatus {
                    name: "generate".to_string(),
                    available: true,
                },
                ToolStatus {
                    name: "analyze".to_string(),
                    available: true,
                },
            ]),
            tool_tests: Ok(Vec::new()),
            configuration: Ok(Vec::new()),
            security: Ok(Vec::new()),
            dependencies: Ok(Vec::new()),
        }
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    scripts: HashMap<String, ProbeScript>,
    /// Latencies served before falling back to the script's `latency`.
    queued_latencies: HashMap<String, VecDeque<Duration>>,
    connectivity_calls: HashMap<String, usize>,
}

/// Deterministic prober driven by per-worker scripts.
///
/// Workers without a script get [`ProbeScript::default`].
#[derive(Debug, Default)]
pub struct ScriptedProber {
    state: Mutex<ScriptState>,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a worker's script.
    pub fn set(&self, worker: &str, script: ProbeScript) {
        self.lock().scripts.insert(worker.to_string(), script);
    }

    /// Modify a worker's script in place.
    pub fn update(&self, worker: &str, f: impl FnOnce(&mut ProbeScript)) {
        let mut state = self.lock();
        f(state.scripts.entry(worker.to_string()).or_default());
    }

    /// Serve these latencies (in order) from the next connectivity probes.
    pub fn queue_latencies(&self, worker: &str, latencies: impl IntoIterator<Item = Duration>) {
        self.lock()
            .queued_latencies
            .entry(worker.to_string())
            .or_default()
            .extend(latencies);
    }

    /// How many connectivity probes have targeted `worker`.
    pub fn connectivity_calls(&self, worker: &str) -> usize {
        self.lock()
            .connectivity_calls
            .get(worker)
            .copied()
            .unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn script(&self, worker: &str) -> ProbeScript {
        self.lock().scripts.get(worker).cloned().unwrap_or_default()
    }

    fn next_latency(&self, worker: &str) -> Result<Duration, ProbeError> {
        let mut state = self.lock();
        *state
            .connectivity_calls
            .entry(worker.to_string())
            .or_default() += 1;
        if let Some(latency) = state
            .queued_latencies
            .get_mut(worker)
            .and_then(VecDeque::pop_front)
        {
            return Ok(latency);
        }
        state
            .scripts
            .get(worker)
            .map(|s| s.latency.clone())
            .unwrap_or_else(|| ProbeScript::default().latency)
    }
}

impl Prober for ScriptedProber {
    fn connectivity<'a>(&'a self, worker: &'a str) -> ProbeFuture<'a, Duration> {
        let result = self.next_latency(worker);
        Box::pin(async move { result })
    }

    fn resources<'a>(&'a self, worker: &'a str) -> ProbeFuture<'a, ResourceUsage> {
        let result = self.script(worker).resources;
        Box::pin(async move { result })
    }

    fn request_counts<'a>(&'a self, worker: &'a str) -> ProbeFuture<'a, RequestCounts> {
        let result = self.script(worker).counts;
        Box::pin(async move { result })
    }

    fn tools<'a>(&'a self, worker: &'a str) -> ProbeFuture<'a, Vec<ToolStatus>> {
        let result = self.script(worker).tools;
        Box::pin(async move { result })
    }

    fn tool_tests<'a>(&'a self, worker: &'a str) -> ProbeFuture<'a, Vec<ChecklistItem>> {
        let result = self.script(worker).tool_tests;
        Box::pin(async move { result })
    }

    fn configuration<'a>(&'a self, worker: &'a str) -> ProbeFuture<'a, Vec<ChecklistItem>> {
        let result = self.script(worker).configuration;
        Box::pin(async move { result })
    }

    fn security<'a>(&'a self, worker: &'a str) -> ProbeFuture<'a, Vec<ChecklistItem>> {
        let result = self.script(worker).security;
        Box::pin(async move { result })
    }

    fn dependencies<'a>(&'a self, worker: &'a str) -> ProbeFuture<'a, Vec<ChecklistItem>> {
        let result = self.script(worker).dependencies;
        Box::pin(async move { result })
    }
}
