//! Threshold alerts over aggregated metrics.

use fleetwatch_core::{Alert, AlertKind, AlertSeverity};

use crate::aggregate::AggregatedMetrics;

/// System mean response time (ms) above which a performance warning fires.
pub const SLOW_SYSTEM_MS: f64 = 5000.0;
/// System availability (%) below which a reliability alert fires.
pub const MIN_AVAILABILITY_PCT: f64 = 95.0;
/// Per-worker success rate (%) below which a reliability alert fires.
pub const MIN_SUCCESS_RATE_PCT: f64 = 90.0;

/// Derive alerts from an aggregate. Never fails; alerts are stamped with
/// the aggregate's timestamp.
pub fn generate_metric_alerts(aggregated: &AggregatedMetrics) -> Vec<Alert> {
    let overview = &aggregated.overview;
    let mut alerts = Vec::new();

    if overview.avg_response_time > SLOW_SYSTEM_MS {
        alerts.push(Alert {
            kind: AlertKind::Performance,
            severity: AlertSeverity::Warning,
            worker: None,
            message: format!(
                "System average response time is high: {}ms",
                overview.avg_response_time.round()
            ),
            threshold: SLOW_SYSTEM_MS,
            actual: overview.avg_response_time,
            timestamp: aggregated.timestamp,
        });
    }

    if overview.total_requests > 0 && overview.availability < MIN_AVAILABILITY_PCT {
        alerts.push(Alert {
            kind: AlertKind::Reliability,
            severity: AlertSeverity::Critical,
            worker: None,
            message: format!("System availability is low: {:.1}%", overview.availability),
            threshold: MIN_AVAILABILITY_PCT,
            actual: overview.availability,
            timestamp: aggregated.timestamp,
        });
    }

    for (name, summary) in &aggregated.by_worker {
        if summary.success_rate < MIN_SUCCESS_RATE_PCT {
            alerts.push(Alert {
                kind: AlertKind::Reliability,
                severity: AlertSeverity::Critical,
                worker: Some(name.clone()),
                message: format!("{name} success rate is low: {}%", summary.success_rate),
                threshold: MIN_SUCCESS_RATE_PCT,
                actual: summary.success_rate,
                timestamp: aggregated.timestamp,
            });
        }
    }

    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Overview;
    use crate::summary::MetricsSummary;
    use chrono::Utc;
    use fleetwatch_core::Timeframe;
    use std::collections::BTreeMap;

    fn aggregated(
        overview: Overview,
        by_worker: BTreeMap<String, MetricsSummary>,
    ) -> AggregatedMetrics {
        AggregatedMetrics {
            timeframe: Timeframe::Hour,
            timestamp: Utc::now(),
            overview,
            by_worker,
            alerts: Vec::new(),
        }
    }

    fn overview(avg_response_time: f64, total_requests: u64, availability: f64) -> Overview {
        Overview {
            total_workers: 1,
            active_workers: 1,
            total_requests,
            total_errors: 0,
            avg_response_time,
            total_cost: 0.0,
            availability,
        }
    }

    #[test]
    fn quiet_system_has_no_alerts() {
        let a = aggregated(overview(0.0, 0, 100.0), BTreeMap::new());
        assert!(generate_metric_alerts(&a).is_empty());
    }

    #[test]
    fn slow_system_warns() {
        let a = aggregated(overview(5200.4, 10, 100.0), BTreeMap::new());
        let alerts = generate_metric_alerts(&a);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Performance);
        assert_eq!(alerts[0].severity, AlertSeverity::Warning);
        assert_eq!(alerts[0].message, "System average response time is high: 5200ms");
        assert_eq!(alerts[0].threshold, 5000.0);
    }

    #[test]
    fn availability_alert_needs_traffic() {
        let idle = aggregated(overview(0.0, 0, 0.0), BTreeMap::new());
        assert!(generate_metric_alerts(&idle).is_empty());

        let busy = aggregated(overview(0.0, 100, 93.04), BTreeMap::new());
        let alerts = generate_metric_alerts(&busy);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].message, "System availability is low: 93.0%");
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
    }

    #[test]
    fn per_worker_success_rate() {
        let mut by_worker = BTreeMap::new();
        let mut flaky = MetricsSummary::empty();
        flaky.success_rate = 85.5;
        by_worker.insert("svcB".to_string(), flaky);
        by_worker.insert("svcA".to_string(), MetricsSummary::empty());

        let alerts = generate_metric_alerts(&aggregated(overview(0.0, 100, 99.0), by_worker));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].worker.as_deref(), Some("svcB"));
        assert_eq!(alerts[0].message, "svcB success rate is low: 85.5%");
    }
}
