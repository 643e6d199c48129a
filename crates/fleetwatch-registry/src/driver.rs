//! Worker driver seam: the part that actually runs a worker.
//!
//! Tool execution is outside fleetwatch; the registry only needs to
//! launch, shut down, and forward invocations. `SimulatedDriver` stands in
//! for a real backend during local runs and tests.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde_json::{Value, json};

/// Boxed future returned by driver calls. Errors are plain messages.
pub type DriverFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send + 'a>>;

/// Launches, stops, and forwards tool calls to worker servers.
pub trait WorkerDriver: Send + Sync {
    fn launch<'a>(&'a self, worker: &'a str, config: &'a Value) -> DriverFuture<'a, ()>;

    fn shutdown<'a>(&'a self, worker: &'a str) -> DriverFuture<'a, ()>;

    fn invoke<'a>(
        &'a self,
        worker: &'a str,
        tool: &'a str,
        args: &'a Value,
    ) -> DriverFuture<'a, Value>;
}

#[derive(Debug, Default)]
struct Faults {
    launch: HashSet<String>,
    shutdown: HashSet<String>,
    tools: HashSet<String>,
}

/// In-process driver with configurable latency and injectable faults.
#[derive(Debug)]
pub struct SimulatedDriver {
    launch_delay: Duration,
    shutdown_delay: Duration,
    invoke_latency: Duration,
    faults: Mutex<Faults>,
}

impl SimulatedDriver {
    pub fn new(invoke_latency: Duration) -> Self {
        Self {
            launch_delay: Duration::ZERO,
            shutdown_delay: Duration::ZERO,
            invoke_latency,
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Extra time spent inside `launch` (on top of the registry's startup delay).
    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = delay;
        self
    }

    /// Time spent inside `shutdown` before it returns.
    pub fn with_shutdown_delay(mut self, delay: Duration) -> Self {
        self.shutdown_delay = delay;
        self
    }

    /// Make launches of `worker` fail.
    pub fn fail_launch(&self, worker: &str) {
        self.faults().launch.insert(worker.to_string());
    }

    /// Make shutdowns of `worker` fail.
    pub fn fail_shutdown(&self, worker: &str) {
        self.faults().shutdown.insert(worker.to_string());
    }

    /// Make every invocation of `tool` fail.
    pub fn fail_tool(&self, tool: &str) {
        self.faults().tools.insert(tool.to_string());
    }

    /// Remove all injected faults.
    pub fn heal(&self) {
        *self.faults() = Faults::default();
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::new(Duration::from_millis(5))
    }
}

impl WorkerDriver for SimulatedDriver {
    fn launch<'a>(&'a self, worker: &'a str, _config: &'a Value) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            if !self.launch_delay.is_zero() {
                tokio::time::sleep(self.launch_delay).await;
            }
            if self.faults().launch.contains(worker) {
                return Err(format!("{worker} failed to launch"));
            }
            Ok(())
        })
    }

    fn shutdown<'a>(&'a self, worker: &'a str) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            if !self.shutdown_delay.is_zero() {
                tokio::time::sleep(self.shutdown_delay).await;
            }
            if self.faults().shutdown.contains(worker) {
                return Err(format!("{worker} did not shut down cleanly"));
            }
            Ok(())
        })
    }

    fn invoke<'a>(
        &'a self,
        worker: &'a str,
        tool: &'a str,
        args: &'a Value,
    ) -> DriverFuture<'a, Value> {
        Box::pin(async move {
            if !self.invoke_latency.is_zero() {
                tokio::time::sleep(self.invoke_latency).await;
            }
            if self.faults().tools.contains(tool) {
                return Err(format!("tool {tool} failed on {worker}"));
            }
            Ok(json!({
                "worker": worker,
                "tool": tool,
                "args": args,
                "status": "ok",
            }))
        })
    }
}
