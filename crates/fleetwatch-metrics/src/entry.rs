//! Recorded metric and cost entries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleetwatch_core::Timestamped;

/// Fields reported with one metric sample.
///
/// The well-known fields are typed; anything else goes into `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricFields {
    /// Milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, f64>,
}

impl MetricFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn response_time(mut self, ms: f64) -> Self {
        self.response_time = Some(ms);
        self
    }

    pub fn requests(mut self, n: u64) -> Self {
        self.requests = Some(n);
        self
    }

    pub fn errors(mut self, n: u64) -> Self {
        self.errors = Some(n);
        self
    }

    pub fn cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Attach a named field outside the typed set.
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.extra.insert(name.into(), value);
        self
    }

    /// Number of fields carried by this sample.
    pub fn len(&self) -> usize {
        [
            self.response_time.is_some(),
            self.requests.is_some(),
            self.errors.is_some(),
            self.cost.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
            + self.extra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A timestamped metric sample. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: MetricFields,
}

impl MetricEntry {
    /// Requests represented by this sample; a sample without a count is one request.
    pub fn request_count(&self) -> u64 {
        self.fields.requests.unwrap_or(1)
    }

    pub fn error_count(&self) -> u64 {
        self.fields.errors.unwrap_or(0)
    }

    pub fn cost(&self) -> f64 {
        self.fields.cost.unwrap_or(0.0)
    }

    pub fn response_time(&self) -> Option<f64> {
        self.fields.response_time
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }
}

impl Timestamped for MetricEntry {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Cost reported for a unit of work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostInfo {
    pub cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<u64>,
}

impl CostInfo {
    pub fn new(cost: f64) -> Self {
        Self {
            cost,
            requests: None,
        }
    }

    pub fn for_requests(cost: f64, requests: u64) -> Self {
        Self {
            cost,
            requests: Some(requests),
        }
    }
}

/// A timestamped cost record. Immutable once recorded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub info: CostInfo,
}

impl CostEntry {
    pub fn cost(&self) -> f64 {
        self.info.cost
    }

    pub fn request_count(&self) -> u64 {
        self.info.requests.unwrap_or(1)
    }
}

impl Timestamped for CostEntry {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
