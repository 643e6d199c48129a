//! The registry: one lifecycle state machine per worker.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::{Mutex, RwLock, broadcast, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use fleetwatch_core::config::RegistryConfig;
use fleetwatch_core::{
    Alert, AuditSink, CheckStatus, Clock, ConfigError, FleetError, FleetResult, HealthStatus,
    HealthThresholds, LifecycleState, Prober, SystemClock, TracingAudit,
};

use crate::driver::WorkerDriver;
use crate::overview::{self, SystemOverview};
use crate::record::{HealthSnapshot, LifecycleEvent, WorkerRecord, WorkerSlot};

/// Buffered lifecycle events per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 256;

/// Timing and retention knobs for the registry.
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    pub health_interval: Duration,
    pub startup_delay: Duration,
    pub drain_delay: Duration,
    pub operation_timeout: Duration,
    pub snapshot_history: usize,
    pub thresholds: HealthThresholds,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            health_interval: Duration::from_secs(30),
            startup_delay: Duration::from_secs(1),
            drain_delay: Duration::from_millis(500),
            operation_timeout: Duration::from_secs(30),
            snapshot_history: 100,
            thresholds: HealthThresholds::default(),
        }
    }
}

impl RegistryOptions {
    pub fn from_config(config: &RegistryConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            health_interval: config.health_interval()?,
            startup_delay: config.startup_delay()?,
            drain_delay: config.drain_delay()?,
            operation_timeout: config.operation_timeout()?,
            snapshot_history: config.snapshot_history,
            thresholds: HealthThresholds::default(),
        })
    }
}

type Slot = Arc<Mutex<WorkerSlot>>;

/// Owns every worker record and is the only writer of lifecycle state.
pub struct Registry {
    /// Registered workers: name → slot.
    workers: RwLock<HashMap<String, Slot>>,
    driver: Arc<dyn WorkerDriver>,
    prober: Arc<dyn Prober>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    options: RegistryOptions,
    events: broadcast::Sender<LifecycleEvent>,
}

impl Registry {
    pub fn new(
        options: RegistryOptions,
        driver: Arc<dyn WorkerDriver>,
        prober: Arc<dyn Prober>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            workers: RwLock::new(HashMap::new()),
            driver,
            prober,
            clock: Arc::new(SystemClock),
            audit: Arc::new(TracingAudit),
            options,
            events,
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

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    /// Receive every lifecycle transition from now on.
    ///
    /// Slow receivers lose the oldest events rather than blocking the registry.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    // ── Lifecycle ─────────────────────────────────────────────────

    /// Add a worker in `registered`, starting it right away if asked to.
    pub async fn register(
        &self,
        name: &str,
        config: Value,
        auto_start: bool,
    ) -> FleetResult<WorkerRecord> {
        if name.trim().is_empty() {
            return Err(FleetError::InvalidArgument(
                "worker name must not be empty".into(),
            ));
        }

        let record = WorkerRecord::new(name, config, self.clock.now());
        {
            let mut workers = self.workers.write().await;
            if workers.contains_key(name) {
                return Err(FleetError::AlreadyExists(name.to_string()));
            }
            workers.insert(
                name.to_string(),
                Arc::new(Mutex::new(WorkerSlot::new(
                    record.clone(),
                    self.options.snapshot_history,
                ))),
            );
        }

        info!(worker = %name, auto_start, "worker registered");
        self.audit
            .log("worker_registered", name, json!({ "auto_start": auto_start }));

        if auto_start {
            return self.start(name).await;
        }
        Ok(record)
    }

    /// Launch a worker. Rejected while it is starting, running, or stopping.
    pub async fn start(&self, name: &str) -> FleetResult<WorkerRecord> {
        let slot = self.slot(name).await?;
        let config = {
            let mut guard = slot.lock().await;
            let state = guard.record.state;
            if matches!(
                state,
                LifecycleState::Starting | LifecycleState::Running | LifecycleState::Stopping
            ) {
                return Err(invalid_state(name, state, "start"));
            }
            self.transition(&mut guard, LifecycleState::Starting);
            guard.record.last_error = None;
            guard.record.config.clone()
        };

        let startup_delay = self.options.startup_delay;
        let launch = async {
            if !startup_delay.is_zero() {
                tokio::time::sleep(startup_delay).await;
            }
            self.driver.launch(name, &config).await
        };
        let outcome = tokio::time::timeout(self.options.operation_timeout, launch).await;

        let mut guard = slot.lock().await;
        if guard.record.state != LifecycleState::Starting {
            // Stopped or failed by someone else while launching.
            return Err(invalid_state(name, guard.record.state, "finish starting"));
        }
        match outcome {
            Ok(Ok(())) => {
                guard.record.started_at = Some(self.clock.now());
                self.transition(&mut guard, LifecycleState::Running);
                info!(worker = %name, "worker started");
                self.audit.log(
                    "worker_started",
                    name,
                    json!({ "startup_delay_ms": startup_delay.as_millis() as u64 }),
                );
                Ok(guard.record.clone())
            }
            Ok(Err(message)) => Err(self.fail(
                &mut guard,
                FleetError::Driver {
                    worker: name.to_string(),
                    message,
                },
            )),
            Err(_) => Err(self.fail(
                &mut guard,
                FleetError::Timeout {
                    worker: name.to_string(),
                    operation: "start",
                    timeout: self.options.operation_timeout,
                },
            )),
        }
    }

    /// Shut a worker down. A graceful stop drains for `drain_delay` first.
    pub async fn stop(&self, name: &str, graceful: bool) -> FleetResult<WorkerRecord> {
        let slot = self.slot(name).await?;
        {
            let guard = slot.lock().await;
            ensure_stoppable(name, guard.record.state)?;
        }

        if graceful && !self.options.drain_delay.is_zero() {
            tokio::time::sleep(self.options.drain_delay).await;
        }

        {
            let mut guard = slot.lock().await;
            ensure_stoppable(name, guard.record.state)?;
            self.transition(&mut guard, LifecycleState::Stopping);
        }

        let outcome =
            tokio::time::timeout(self.options.operation_timeout, self.driver.shutdown(name)).await;

        let mut guard = slot.lock().await;
        if guard.record.state != LifecycleState::Stopping {
            // Failed by someone else while shutting down.
            return Err(invalid_state(name, guard.record.state, "finish stopping"));
        }
        match outcome {
            Ok(Ok(())) => {
                guard.record.stopped_at = Some(self.clock.now());
                self.transition(&mut guard, LifecycleState::Stopped);
                info!(worker = %name, graceful, "worker stopped");
                self.audit
                    .log("worker_stopped", name, json!({ "graceful": graceful }));
                Ok(guard.record.clone())
            }
            Ok(Err(message)) => Err(self.fail(
                &mut guard,
                FleetError::Driver {
                    worker: name.to_string(),
                    message,
                },
            )),
            Err(_) => Err(self.fail(
                &mut guard,
                FleetError::Timeout {
                    worker: name.to_string(),
                    operation: "stop",
                    timeout: self.options.operation_timeout,
                },
            )),
        }
    }

    /// `stop(!force)` followed by `start`.
    ///
    /// The stop step only runs for workers that may still be up (running,
    /// starting, or errored). `stopped_at < started_at` holds as long as the
    /// clock moves between the two steps; a frozen clock stamps both equal.
    pub async fn restart(&self, name: &str, force: bool) -> FleetResult<WorkerRecord> {
        let state = self.get_worker(name).await?.state;
        if matches!(
            state,
            LifecycleState::Running | LifecycleState::Starting | LifecycleState::Error
        ) {
            self.stop(name, !force).await?;
        }
        self.start(name).await?;

        let slot = self.slot(name).await?;
        let mut guard = slot.lock().await;
        guard.record.restart_count += 1;
        self.audit.log(
            "worker_restarted",
            name,
            json!({ "force": force, "restart_count": guard.record.restart_count }),
        );
        Ok(guard.record.clone())
    }

    /// Stop (if up) and forget a worker along with its snapshot history.
    ///
    /// A failing stop is reported but does not prevent removal.
    pub async fn unregister(&self, name: &str, graceful_shutdown: bool) -> FleetResult<()> {
        let state = self.get_worker(name).await?.state;
        if matches!(state, LifecycleState::Running | LifecycleState::Starting) {
            if let Err(e) = self.stop(name, graceful_shutdown).await {
                warn!(worker = %name, error = %e, "stop before unregister failed");
                self.audit.error(
                    "stop before unregister failed",
                    json!({ "worker": name, "error": e.to_string() }),
                );
            }
        }

        if self.workers.write().await.remove(name).is_none() {
            return Err(FleetError::NotFound(name.to_string()));
        }
        info!(worker = %name, "worker unregistered");
        self.audit.log("worker_unregistered", name, json!({}));
        Ok(())
    }

    // ── Tool invocation ───────────────────────────────────────────

    /// Forward a tool call to a running worker and record its latency.
    pub async fn invoke_tool(&self, name: &str, tool: &str, args: Value) -> FleetResult<Value> {
        let slot = self.slot(name).await?;
        {
            let guard = slot.lock().await;
            if guard.record.state != LifecycleState::Running {
                return Err(invalid_state(name, guard.record.state, "invoke tool on"));
            }
        }

        let started = Instant::now();
        let result = self.driver.invoke(name, tool, &args).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let mut guard = slot.lock().await;
        match result {
            Ok(output) => {
                guard.record.metrics.record_success(elapsed_ms);
                debug!(worker = %name, %tool, elapsed_ms, "tool invoked");
                Ok(output)
            }
            Err(message) => {
                guard.record.metrics.record_failure();
                warn!(worker = %name, %tool, error = %message, "tool invocation failed");
                Err(FleetError::Driver {
                    worker: name.to_string(),
                    message,
                })
            }
        }
    }

    // ── Health ────────────────────────────────────────────────────

    /// Probe connectivity and classify the latency.
    ///
    /// A probe failure is recorded as a critical snapshot, and a running
    /// worker moves to `error`.
    pub async fn perform_health_check(&self, name: &str) -> FleetResult<HealthSnapshot> {
        let slot = self.slot(name).await?;
        let probe = self.prober.connectivity(name).await;
        let now = self.clock.now();

        let snapshot = match &probe {
            Ok(latency) => {
                let ms = latency.as_secs_f64() * 1000.0;
                let level = self.options.thresholds.response_time.classify(ms);
                HealthSnapshot {
                    timestamp: now,
                    status: CheckStatus::from(level).into(),
                    response_time: Some(ms),
                    message: format!("responded in {ms:.0}ms"),
                }
            }
            Err(e) => HealthSnapshot {
                timestamp: now,
                status: HealthStatus::Critical,
                response_time: None,
                message: e.to_string(),
            },
        };

        let mut guard = slot.lock().await;
        guard.snapshots.push(snapshot.clone());
        guard.record.last_health = Some(snapshot.clone());
        if let Err(e) = probe {
            if guard.record.state == LifecycleState::Running {
                self.fail(&mut guard, FleetError::Probe(e));
            }
        }
        self.audit.log(
            "health_check",
            name,
            json!({
                "status": snapshot.status,
                "response_time": snapshot.response_time,
            }),
        );
        Ok(snapshot)
    }

    /// Check every running worker once. Returns how many were checked.
    ///
    /// Per-worker failures are logged and do not stop the sweep.
    pub async fn run_health_sweep(&self) -> usize {
        let slots: Vec<(String, Slot)> = self
            .workers
            .read()
            .await
            .iter()
            .map(|(name, slot)| (name.clone(), slot.clone()))
            .collect();

        let mut checked = 0;
        for (name, slot) in slots {
            if slot.lock().await.record.state != LifecycleState::Running {
                continue;
            }
            match self.perform_health_check(&name).await {
                Ok(_) => checked += 1,
                Err(FleetError::NotFound(_)) => {
                    debug!(worker = %name, "worker unregistered during sweep");
                }
                Err(e) => {
                    warn!(worker = %name, error = %e, "health sweep check failed");
                    self.audit.error(
                        "health sweep check failed",
                        json!({ "worker": name, "error": e.to_string() }),
                    );
                }
            }
        }
        checked
    }

    /// Sweep every `health_interval` until `shutdown` flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let period = self.options.health_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        debug!(interval = ?period, "health sweep loop starting");
        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    let checked = self.run_health_sweep().await;
                    debug!(checked, "health sweep complete");
                }
                _ = shutdown.changed() => {
                    debug!("health sweep loop shutting down");
                    break;
                }
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────────

    pub async fn get_worker(&self, name: &str) -> FleetResult<WorkerRecord> {
        let slot = self.slot(name).await?;
        let guard = slot.lock().await;
        Ok(guard.record.clone())
    }

    /// All workers, sorted by name.
    pub async fn list_workers(&self) -> Vec<WorkerRecord> {
        let mut records = Vec::new();
        for slot in self.slots().await {
            records.push(slot.lock().await.record.clone());
        }
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    /// Monitor-level snapshots for a worker, oldest first.
    pub async fn health_snapshots(&self, name: &str) -> FleetResult<Vec<HealthSnapshot>> {
        let slot = self.slot(name).await?;
        let guard = slot.lock().await;
        Ok(guard.snapshots.to_vec())
    }

    pub async fn get_system_overview(&self) -> SystemOverview {
        let records = self.list_workers().await;
        overview::system_overview(&records, self.clock.now())
    }

    pub async fn get_active_alerts(&self) -> Vec<Alert> {
        let records = self.list_workers().await;
        overview::active_alerts(&records, &self.options.thresholds, self.clock.now())
    }

    // ── Internals ─────────────────────────────────────────────────

    async fn slot(&self, name: &str) -> FleetResult<Slot> {
        self.workers
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| FleetError::NotFound(name.to_string()))
    }

    async fn slots(&self) -> Vec<Slot> {
        self.workers.read().await.values().cloned().collect()
    }

    fn transition(&self, slot: &mut WorkerSlot, to: LifecycleState) {
        let from = slot.record.state;
        slot.record.state = to;
        debug!(worker = %slot.record.name, from = %from, to = %to, "state transition");
        // No subscribers is fine.
        let _ = self.events.send(LifecycleEvent {
            worker: slot.record.name.clone(),
            from,
            to,
            timestamp: self.clock.now(),
        });
    }

    /// Move a worker to `error`, remember why, and hand the error back.
    fn fail(&self, slot: &mut WorkerSlot, error: FleetError) -> FleetError {
        let message = error.to_string();
        warn!(worker = %slot.record.name, error = %message, "worker failed");
        slot.record.last_error = Some(message.clone());
        self.transition(slot, LifecycleState::Error);
        self.audit.error(
            "worker failed",
            json!({ "worker": slot.record.name, "error": message }),
        );
        error
    }
}

fn invalid_state(name: &str, state: LifecycleState, operation: &'static str) -> FleetError {
    FleetError::InvalidState {
        worker: name.to_string(),
        state,
        operation,
    }
}

fn ensure_stoppable(name: &str, state: LifecycleState) -> FleetResult<()> {
    if matches!(state, LifecycleState::Stopped | LifecycleState::Stopping) {
        Err(invalid_state(name, state, "stop"))
    } else {
        Ok(())
    }
}
