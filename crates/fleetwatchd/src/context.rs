//! The per-process fleet context.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use serde_json::Value;
use tokio::sync::{RwLock, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use fleetwatch_core::config::WorkerSpec;
use fleetwatch_core::{
    FleetConfig, FleetError, FleetResult, HealthStatus, HostSampler, LifecycleState,
    SysinfoSampler,
};
use fleetwatch_health::{HealthEvaluator, HttpProber, HttpTarget};
use fleetwatch_metrics::{MetricFields, MetricsAggregator, MetricsOptions};
use fleetwatch_registry::{
    LifecycleEvent, Registry, RegistryOptions, SimulatedDriver, WorkerRecord,
};

/// Latency the simulated driver adds to every tool call.
const SIMULATED_INVOKE_LATENCY: Duration = Duration::from_millis(25);

/// Shared handles to the three components. Cheap to clone.
#[derive(Clone)]
pub struct Fleet {
    pub registry: Arc<Registry>,
    pub health: Arc<HealthEvaluator>,
    pub metrics: Arc<MetricsAggregator>,
    prober: Arc<HttpProber>,
    /// Held shared by each per-worker evaluation and exclusively by
    /// `unregister`, so no evaluation outlives the worker's removal.
    gate: Arc<RwLock<()>>,
}

impl Fleet {
    /// Register every worker declared in the config.
    ///
    /// A worker that fails to auto-start stays registered in `error`; the
    /// failure is logged and the remaining workers are still registered.
    pub async fn register_workers(&self, specs: &[WorkerSpec]) -> FleetResult<Vec<WorkerRecord>> {
        let mut records = Vec::with_capacity(specs.len());
        for spec in specs {
            match self.register_worker(spec).await {
                Ok(record) => records.push(record),
                Err(e @ (FleetError::AlreadyExists(_) | FleetError::InvalidArgument(_))) => {
                    return Err(e);
                }
                Err(e) => {
                    warn!(worker = %spec.name, error = %e, "worker failed to start");
                    records.push(self.registry.get_worker(&spec.name).await?);
                }
            }
        }
        Ok(records)
    }

    /// Point the prober at the worker and register it.
    pub async fn register_worker(&self, spec: &WorkerSpec) -> FleetResult<WorkerRecord> {
        let config = match &spec.config {
            Some(value) => serde_json::to_value(value).map_err(|e| {
                FleetError::InvalidArgument(format!("config of worker {}: {e}", spec.name))
            })?,
            None => Value::Null,
        };
        let result = self
            .registry
            .register(&spec.name, config, spec.auto_start)
            .await;
        // A failed auto-start still leaves the worker registered.
        if !matches!(
            result,
            Err(FleetError::AlreadyExists(_) | FleetError::InvalidArgument(_))
        ) {
            self.prober.add_target(&spec.name, HttpTarget::from(spec));
        }
        result
    }

    /// Unregister a worker and drop everything the other components hold for it.
    pub async fn unregister(&self, name: &str, graceful_shutdown: bool) -> FleetResult<()> {
        let _exclusive = self.gate.write().await;
        self.registry.unregister(name, graceful_shutdown).await?;
        self.health.forget(name).await;
        self.metrics.forget(name).await;
        self.prober.remove_target(name);
        info!(worker = %name, "worker removed from fleet");
        Ok(())
    }

    /// Evaluate every running worker once and feed the outcome into its
    /// metric series (one request; an error when the result is critical).
    ///
    /// Workers unregistered or stopped while the pass is under way are
    /// skipped.
    pub async fn evaluate_fleet(&self) -> usize {
        let mut evaluated = 0;
        for record in self.registry.list_workers().await {
            if record.state != LifecycleState::Running {
                continue;
            }
            if self.evaluate_worker(&record.name).await {
                evaluated += 1;
            }
        }
        evaluated
    }

    async fn evaluate_worker(&self, name: &str) -> bool {
        let _shared = self.gate.read().await;
        match self.registry.get_worker(name).await {
            Ok(record) if record.state == LifecycleState::Running => {}
            _ => {
                debug!(worker = %name, "worker left the fleet before evaluation");
                return false;
            }
        }

        let result = self.health.check_server_health(name).await;
        let critical = result.status == HealthStatus::Critical;
        let mut fields = MetricFields::new().requests(1).errors(u64::from(critical));
        if let Some(ms) = result.response_time {
            fields = fields.response_time(ms);
        }
        if let Err(e) = self.metrics.record_metrics(name, fields).await {
            warn!(worker = %name, error = %e, "failed to record evaluation");
        }
        true
    }

    async fn run_evaluations(self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let period = period.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        debug!(interval = ?period, "evaluation loop starting");
        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    let evaluated = self.evaluate_fleet().await;
                    debug!(evaluated, "fleet evaluation complete");
                }
                _ = shutdown.changed() => {
                    debug!("evaluation loop shutting down");
                    break;
                }
            }
        }
    }
}

/// Builds the fleet from configuration and owns its background loops.
pub struct FleetContext {
    fleet: Fleet,
    health_interval: Duration,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl FleetContext {
    /// Build every component from `config`. Nothing runs until [`spawn`](Self::spawn).
    pub fn build(config: &FleetConfig) -> anyhow::Result<Self> {
        let registry_options =
            RegistryOptions::from_config(&config.registry).context("registry config")?;
        let metrics_options =
            MetricsOptions::from_config(&config.metrics).context("metrics config")?;
        let probe_timeout = config.health.probe_timeout().context("health config")?;

        let sampler: Arc<dyn HostSampler> = Arc::new(SysinfoSampler::new());
        let prober = Arc::new(HttpProber::new(probe_timeout, sampler.clone()));
        let driver = Arc::new(SimulatedDriver::new(SIMULATED_INVOKE_LATENCY));
        let health_interval = registry_options.health_interval;

        let fleet = Fleet {
            registry: Arc::new(Registry::new(registry_options, driver, prober.clone())),
            health: Arc::new(HealthEvaluator::new(
                prober.clone(),
                config.health.history_capacity,
            )),
            metrics: Arc::new(MetricsAggregator::new(metrics_options, sampler)),
            prober,
            gate: Arc::new(RwLock::new(())),
        };
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            fleet,
            health_interval,
            shutdown,
            tasks: Vec::new(),
        })
    }

    pub fn fleet(&self) -> &Fleet {
        &self.fleet
    }

    /// Start the registry sweep, the metrics loop, the evaluation loop,
    /// and the lifecycle event log.
    pub fn spawn(&mut self) {
        let registry = self.fleet.registry.clone();
        let rx = self.shutdown.subscribe();
        self.tasks
            .push(tokio::spawn(async move { registry.run(rx).await }));

        let metrics = self.fleet.metrics.clone();
        let rx = self.shutdown.subscribe();
        self.tasks
            .push(tokio::spawn(async move { metrics.run(rx).await }));

        let fleet = self.fleet.clone();
        let rx = self.shutdown.subscribe();
        self.tasks
            .push(tokio::spawn(fleet.run_evaluations(self.health_interval, rx)));

        let events = self.fleet.registry.subscribe();
        let rx = self.shutdown.subscribe();
        self.tasks.push(tokio::spawn(log_events(events, rx)));

        info!(tasks = self.tasks.len(), "background loops started");
    }

    /// Background tasks still running.
    pub fn running_tasks(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_finished()).count()
    }

    /// Signal every loop to stop and wait for them.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "background task ended abnormally");
            }
        }
        info!("fleet context stopped");
    }
}

async fn log_events(
    mut events: broadcast::Receiver<LifecycleEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    while !*shutdown.borrow() {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => info!(
                    worker = %event.worker,
                    from = %event.from,
                    to = %event.to,
                    "lifecycle transition"
                ),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "lifecycle event log lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown.changed() => break,
        }
    }
}
