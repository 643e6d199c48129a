//! The five checks that make up a health evaluation.
//!
//! Each check asks the prober for one observation, classifies it, and
//! records a [`CheckOutcome`]. Probe errors are folded into the result as
//! a failed check plus an error line; nothing here returns an error.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use tracing::debug;

use fleetwatch_core::{CheckStatus, HealthThresholds, Level, Prober};

use crate::result::{CheckOutcome, HealthCheckResult};

pub const CONNECTIVITY: &str = "connectivity";
pub const RESPONSE_TIME: &str = "response_time";
pub const RESOURCE_USAGE: &str = "resource_usage";
pub const ERROR_RATE: &str = "error_rate";
pub const TOOL_AVAILABILITY: &str = "tool_availability";

/// Run every check against `worker` and derive the composite status.
pub async fn evaluate(
    prober: &dyn Prober,
    thresholds: &HealthThresholds,
    worker: &str,
    now: DateTime<Utc>,
) -> HealthCheckResult {
    let mut result = HealthCheckResult::new(worker, now);

    let latency = check_connectivity(prober, worker, &mut result).await;
    check_response_time(prober, thresholds, worker, latency, &mut result).await;
    check_resource_usage(prober, thresholds, worker, &mut result).await;
    check_error_rate(prober, thresholds, worker, &mut result).await;
    check_tool_availability(prober, worker, &mut result).await;

    let result = result.finish();
    debug!(
        %worker,
        status = %result.status,
        errors = result.errors.len(),
        warnings = result.warnings.len(),
        "health evaluation complete"
    );
    result
}

/// Returns the measured latency in milliseconds when the worker answered.
pub async fn check_connectivity(
    prober: &dyn Prober,
    worker: &str,
    result: &mut HealthCheckResult,
) -> Option<f64> {
    match prober.connectivity(worker).await {
        Ok(latency) => {
            let ms = millis(latency);
            result.record(
                CONNECTIVITY,
                CheckOutcome::new(CheckStatus::Passed, "Server is reachable")
                    .with_metrics(json!({ "response_time": ms })),
            );
            Some(ms)
        }
        Err(e) => {
            result.record(
                CONNECTIVITY,
                CheckOutcome::new(CheckStatus::Failed, "Server is not reachable")
                    .with_metrics(json!({ "error": e.to_string() })),
            );
            result.errors.push(format!("Connectivity check failed: {e}"));
            None
        }
    }
}

/// Classify latency, reusing the connectivity measurement when there is one.
pub async fn check_response_time(
    prober: &dyn Prober,
    thresholds: &HealthThresholds,
    worker: &str,
    connectivity_ms: Option<f64>,
    result: &mut HealthCheckResult,
) {
    let measured = match connectivity_ms {
        Some(ms) => Ok(ms),
        None => prober.measure_response_time(worker).await.map(millis),
    };

    let ms = match measured {
        Ok(ms) => ms,
        Err(e) => {
            result.record(
                RESPONSE_TIME,
                CheckOutcome::new(CheckStatus::Failed, "Could not measure response time")
                    .with_metrics(json!({ "error": e.to_string() })),
            );
            result.errors.push(format!("Response time check failed: {e}"));
            return;
        }
    };

    let threshold = thresholds.response_time;
    let level = threshold.classify(ms);
    match level {
        Level::Critical => result
            .errors
            .push(format!("Response time too high: {ms:.0}ms")),
        Level::Warning => result
            .warnings
            .push(format!("Response time elevated: {ms:.0}ms")),
        Level::Good => {}
    }
    result.record(
        RESPONSE_TIME,
        CheckOutcome::new(level.into(), format!("Response time: {ms:.0}ms"))
            .with_level(level)
            .with_metrics(json!({ "response_time": ms, "threshold": threshold })),
    );
    result.response_time = Some(ms);
}

pub async fn check_resource_usage(
    prober: &dyn Prober,
    thresholds: &HealthThresholds,
    worker: &str,
    result: &mut HealthCheckResult,
) {
    let usage = match prober.resources(worker).await {
        Ok(usage) => usage,
        Err(e) => {
            result.record(
                RESOURCE_USAGE,
                CheckOutcome::new(CheckStatus::Failed, "Could not check resource usage")
                    .with_metrics(json!({ "error": e.to_string() })),
            );
            result.errors.push(format!("Resource usage check failed: {e}"));
            return;
        }
    };

    let memory = thresholds.memory_usage.classify(usage.memory);
    let cpu = thresholds.cpu_usage.classify(usage.cpu);
    for (label, level, value) in [("memory", memory, usage.memory), ("CPU", cpu, usage.cpu)] {
        let pct = value * 100.0;
        match level {
            Level::Critical => result.errors.push(format!("High {label} usage: {pct:.1}%")),
            Level::Warning => result
                .warnings
                .push(format!("Elevated {label} usage: {pct:.1}%")),
            Level::Good => {}
        }
    }

    let level = memory.max(cpu);
    result.record(
        RESOURCE_USAGE,
        CheckOutcome::new(
            level.into(),
            format!(
                "Memory: {:.1}%, CPU: {:.1}%",
                usage.memory * 100.0,
                usage.cpu * 100.0
            ),
        )
        .with_level(level)
        .with_metrics(json!({
            "memory_usage": usage.memory,
            "cpu_usage": usage.cpu,
            "memory_level": memory,
            "cpu_level": cpu,
            "memory_available": (1.0 - usage.memory) * 100.0,
            "cpu_available": (1.0 - usage.cpu) * 100.0,
        })),
    );
}

pub async fn check_error_rate(
    prober: &dyn Prober,
    thresholds: &HealthThresholds,
    worker: &str,
    result: &mut HealthCheckResult,
) {
    let counts = match prober.request_counts(worker).await {
        Ok(counts) => counts,
        Err(e) => {
            result.record(
                ERROR_RATE,
                CheckOutcome::new(CheckStatus::Failed, "Could not check error rate")
                    .with_metrics(json!({ "error": e.to_string() })),
            );
            result.errors.push(format!("Error rate check failed: {e}"));
            return;
        }
    };

    let rate = counts.error_rate();
    let pct = rate * 100.0;
    let level = thresholds.error_rate.classify(rate);
    match level {
        Level::Critical => result.errors.push(format!("High error rate: {pct:.2}%")),
        Level::Warning => result.warnings.push(format!("Elevated error rate: {pct:.2}%")),
        Level::Good => {}
    }
    result.record(
        ERROR_RATE,
        CheckOutcome::new(
            level.into(),
            format!("Error rate: {pct:.2}% ({}/{})", counts.failed, counts.total),
        )
        .with_level(level)
        .with_metrics(json!({
            "error_rate": rate,
            "success_rate": 1.0 - rate,
            "total_requests": counts.total,
            "failed_requests": counts.failed,
            "successful_requests": counts.total.saturating_sub(counts.failed),
        })),
    );
}

/// All tools up passes; fewer than half down warns; otherwise fails.
pub async fn check_tool_availability(
    prober: &dyn Prober,
    worker: &str,
    result: &mut HealthCheckResult,
) {
    let tools = match prober.tools(worker).await {
        Ok(tools) => tools,
        Err(e) => {
            result.record(
                TOOL_AVAILABILITY,
                CheckOutcome::new(CheckStatus::Failed, "Could not check tool availability")
                    .with_metrics(json!({ "error": e.to_string() })),
            );
            result
                .errors
                .push(format!("Tool availability check failed: {e}"));
            return;
        }
    };

    let total = tools.len();
    let unavailable: Vec<&str> = tools
        .iter()
        .filter(|t| !t.available)
        .map(|t| t.name.as_str())
        .collect();
    let available = total - unavailable.len();

    let status = if unavailable.is_empty() {
        CheckStatus::Passed
    } else if (unavailable.len() as f64) < total as f64 / 2.0 {
        CheckStatus::Warning
    } else {
        CheckStatus::Failed
    };

    if !unavailable.is_empty() {
        let names = unavailable.join(", ");
        if status == CheckStatus::Failed {
            result
                .errors
                .push(format!("Critical tools unavailable: {names}"));
        } else {
            result.warnings.push(format!("Some tools unavailable: {names}"));
        }
    }

    let statuses: Map<String, Value> = tools
        .iter()
        .map(|t| {
            let label = if t.available { "available" } else { "unavailable" };
            (t.name.clone(), Value::from(label))
        })
        .collect();
    let availability_rate = if total == 0 {
        1.0
    } else {
        available as f64 / total as f64
    };

    result.record(
        TOOL_AVAILABILITY,
        CheckOutcome::new(status, format!("{available}/{total} tools available")).with_metrics(
            json!({
                "total_tools": total,
                "available_tools": available,
                "unavailable_tools": unavailable.len(),
                "availability_rate": availability_rate,
                "tools": statuses,
            }),
        ),
    );
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
