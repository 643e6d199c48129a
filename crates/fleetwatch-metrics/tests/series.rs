use std::sync::Arc;

use chrono::TimeDelta;

use fleetwatch_core::{AlertKind, FixedSampler, ManualClock, Timeframe};
use fleetwatch_metrics::{CostInfo, MetricFields, MetricsAggregator, MetricsOptions};

fn aggregator(clock: Arc<ManualClock>) -> MetricsAggregator {
    MetricsAggregator::new(MetricsOptions::default(), Arc::new(FixedSampler::default()))
        .with_clock(clock)
}

#[tokio::test]
async fn three_samples_roll_up() {
    let clock = Arc::new(ManualClock::starting_now());
    let metrics = aggregator(clock.clone());

    for _ in 0..3 {
        metrics
            .record_metrics(
                "svcA",
                MetricFields::new().response_time(100.0).requests(10).errors(1),
            )
            .await
            .unwrap();
        clock.advance(TimeDelta::minutes(1));
    }

    let detailed = metrics.get_detailed_metrics("svcA", Timeframe::Day).await;
    assert_eq!(detailed.summary.total_requests, 30);
    assert_eq!(detailed.summary.total_errors, 3);
    assert_eq!(detailed.summary.success_rate, 90.0);
    assert_eq!(detailed.summary.data_points, 3);

    // Every sample had errors, so no clean entry counts toward uptime.
    let reliability = detailed.reliability.unwrap();
    assert_eq!(reliability.uptime, 0.0);
    assert_eq!(reliability.mttr_minutes, None);

    // 90% success sits right at the per-worker alert line, so only the
    // system availability alert fires.
    let aggregated = metrics.get_aggregated_metrics(Timeframe::Hour).await;
    assert_eq!(aggregated.alerts.len(), 1);
    assert_eq!(aggregated.alerts[0].kind, AlertKind::Reliability);
    assert_eq!(aggregated.alerts[0].worker, None);
}

#[tokio::test]
async fn windows_slide_with_the_clock() {
    let clock = Arc::new(ManualClock::starting_now());
    let metrics = aggregator(clock.clone());

    metrics
        .record_metrics("svcA", MetricFields::new().response_time(250.0))
        .await
        .unwrap();
    metrics.record_cost("svcA", CostInfo::new(2.0)).await.unwrap();

    clock.advance(TimeDelta::minutes(59));
    assert_eq!(
        metrics
            .get_recent_metrics("svcA", Timeframe::Hour)
            .await
            .metrics
            .len(),
        1
    );

    clock.advance(TimeDelta::minutes(2));
    assert!(
        metrics
            .get_recent_metrics("svcA", Timeframe::Hour)
            .await
            .metrics
            .is_empty()
    );
    let aggregated = metrics.get_aggregated_metrics(Timeframe::Hour).await;
    assert_eq!(aggregated.overview.total_workers, 1);
    assert_eq!(aggregated.overview.active_workers, 0);

    let costs = metrics.get_cost_analysis(Timeframe::Day, false).await;
    assert_eq!(costs.total.cost, 2.0);
}
