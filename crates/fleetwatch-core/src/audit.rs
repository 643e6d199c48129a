//! Audit sink seam.
//!
//! Domain events (`worker_registered`, `health_check`, ...) are reported
//! through an injected `AuditSink`, separate from diagnostic tracing.

use std::sync::{Mutex, PoisonError};

use serde_json::Value;
use tracing::{error, info};

/// Receives lifecycle and monitoring events.
pub trait AuditSink: Send + Sync {
    /// Record a domain event about a worker.
    fn log(&self, event: &str, worker: &str, details: Value);

    /// Record a failure that was handled (and not propagated).
    fn error(&self, message: &str, context: Value);
}

/// Forwards audit events to `tracing` under the `fleetwatch::audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAudit;

impl AuditSink for TracingAudit {
    fn log(&self, event: &str, worker: &str, details: Value) {
        info!(target: "fleetwatch::audit", %event, %worker, %details, "audit event");
    }

    fn error(&self, message: &str, context: Value) {
        error!(target: "fleetwatch::audit", %context, "{message}");
    }
}

/// One captured audit call.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditRecord {
    Event {
        event: String,
        worker: String,
        details: Value,
    },
    Error {
        message: String,
        context: Value,
    },
}

/// Keeps every audit call in memory (for tests).
#[derive(Debug, Default)]
pub struct MemoryAudit {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Names of events logged for a worker, in order.
    pub fn events_for(&self, worker: &str) -> Vec<String> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                AuditRecord::Event { event, worker: w, .. } if w == worker => Some(event),
                _ => None,
            })
            .collect()
    }

    /// Messages of every recorded error.
    pub fn errors(&self) -> Vec<String> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                AuditRecord::Error { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    fn push(&self, record: AuditRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}

impl AuditSink for MemoryAudit {
    fn log(&self, event: &str, worker: &str, details: Value) {
        self.push(AuditRecord::Event {
            event: event.to_string(),
            worker: worker.to_string(),
            details,
        });
    }

    fn error(&self, message: &str, context: Value) {
        self.push(AuditRecord::Error {
            message: message.to_string(),
            context,
        });
    }
}
