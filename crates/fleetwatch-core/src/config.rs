//! fleetwatch.toml configuration parser.
//!
//! Durations are written as strings (`"500ms"`, `"5s"`, `"2m"`) and every
//! field has a default, so an empty file is a valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration for {field}: {value:?}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub registry: RegistryConfig,
    pub health: HealthConfig,
    pub metrics: MetricsConfig,
    pub workers: Vec<WorkerSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Interval of the health sweep over running workers.
    pub health_interval: String,
    /// Simulated startup delay of a worker.
    pub startup_delay: String,
    /// Drain delay applied on graceful stop.
    pub drain_delay: String,
    /// Upper bound on start/stop before the worker is marked errored.
    pub operation_timeout: String,
    /// Monitor-level health snapshots kept per worker.
    pub snapshot_history: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            health_interval: "30s".to_string(),
            startup_delay: "1s".to_string(),
            drain_delay: "500ms".to_string(),
            operation_timeout: "30s".to_string(),
            snapshot_history: 100,
        }
    }
}

impl RegistryConfig {
    pub fn health_interval(&self) -> Result<Duration, ConfigError> {
        field_duration("registry.health_interval", &self.health_interval)
    }

    pub fn startup_delay(&self) -> Result<Duration, ConfigError> {
        field_duration("registry.startup_delay", &self.startup_delay)
    }

    pub fn drain_delay(&self) -> Result<Duration, ConfigError> {
        field_duration("registry.drain_delay", &self.drain_delay)
    }

    pub fn operation_timeout(&self) -> Result<Duration, ConfigError> {
        field_duration("registry.operation_timeout", &self.operation_timeout)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Health check results kept per worker.
    pub history_capacity: usize,
    /// Timeout of a single network probe.
    pub probe_timeout: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            history_capacity: 1000,
            probe_timeout: "2s".to_string(),
        }
    }
}

impl HealthConfig {
    pub fn probe_timeout(&self) -> Result<Duration, ConfigError> {
        field_duration("health.probe_timeout", &self.probe_timeout)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Metric entries kept per worker.
    pub series_capacity: usize,
    /// Cost entries kept per worker.
    pub cost_capacity: usize,
    /// Interval of host self-collection.
    pub collection_interval: String,
    /// Interval of the system-wide aggregate refresh.
    pub aggregation_interval: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            series_capacity: 1000,
            cost_capacity: 1000,
            collection_interval: "60s".to_string(),
            aggregation_interval: "5m".to_string(),
        }
    }
}

impl MetricsConfig {
    pub fn collection_interval(&self) -> Result<Duration, ConfigError> {
        field_duration("metrics.collection_interval", &self.collection_interval)
    }

    pub fn aggregation_interval(&self) -> Result<Duration, ConfigError> {
        field_duration("metrics.aggregation_interval", &self.aggregation_interval)
    }
}

/// A worker declared up front in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub name: String,
    /// `host:port` of the worker's HTTP endpoint.
    pub address: String,
    #[serde(default = "default_health_path")]
    pub health_path: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub auto_start: bool,
    /// `host:port` of services the worker depends on.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Opaque per-worker configuration handed to the registry.
    #[serde(default)]
    pub config: Option<toml::Value>,
}

fn default_health_path() -> String {
    "/healthz".to_string()
}

impl FleetConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: FleetConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every duration parses and worker names are unique.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.registry.health_interval()?;
        self.registry.startup_delay()?;
        self.registry.drain_delay()?;
        self.registry.operation_timeout()?;
        self.health.probe_timeout()?;
        self.metrics.collection_interval()?;
        self.metrics.aggregation_interval()?;

        let mut seen = std::collections::HashSet::new();
        for worker in &self.workers {
            if worker.name.trim().is_empty() {
                return Err(ConfigError::Invalid("worker name must not be empty".into()));
            }
            if !seen.insert(worker.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate worker name: {}",
                    worker.name
                )));
            }
        }
        Ok(())
    }
}

fn field_duration(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).ok_or_else(|| ConfigError::InvalidDuration {
        field,
        value: value.to_string(),
    })
}

/// Parse a duration string like "5s", "500ms", "1m".
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        hours
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(|h| h.checked_mul(3600))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
