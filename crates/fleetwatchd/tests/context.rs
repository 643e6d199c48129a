//! Fleet context tests.
//!
//! Most workers point at a closed local port, so every probe fails fast
//! and deterministically; lifecycle runs through the simulated driver.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use fleetwatch_core::{FleetConfig, FleetError, HealthStatus, LifecycleState, Timeframe};
use fleetwatch_metrics::SYSTEM_SERIES;
use fleetwatchd::FleetContext;

const CONFIG: &str = r#"
[registry]
health_interval = "40ms"
startup_delay = "0ms"
drain_delay = "0ms"
operation_timeout = "2s"

[health]
probe_timeout = "500ms"

[metrics]
collection_interval = "20ms"
aggregation_interval = "30ms"

[[workers]]
name = "svcA"
address = "127.0.0.1:1"
tools = ["generate"]
auto_start = true

[workers.config]
model = "small"

[[workers]]
name = "svcB"
address = "127.0.0.1:1"
"#;

fn load_config() -> FleetConfig {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fleetwatch.toml");
    std::fs::write(&path, CONFIG).unwrap();
    FleetConfig::from_file(&path).unwrap()
}

#[tokio::test]
async fn workers_from_config_are_registered() {
    let config = load_config();
    let context = FleetContext::build(&config).unwrap();
    let fleet = context.fleet();

    let records = fleet.register_workers(&config.workers).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].state, LifecycleState::Running);
    assert_eq!(records[0].config["model"], "small");
    assert_eq!(records[1].state, LifecycleState::Registered);

    let again = fleet.register_worker(&config.workers[1]).await;
    assert!(matches!(again, Err(FleetError::AlreadyExists(_))));
}

#[tokio::test]
async fn evaluation_feeds_metrics_and_unregister_cascades() {
    let config = load_config();
    let context = FleetContext::build(&config).unwrap();
    let fleet = context.fleet();
    fleet.register_workers(&config.workers).await.unwrap();

    // Only the running worker is evaluated.
    assert_eq!(fleet.evaluate_fleet().await, 1);
    let latest = fleet.health.latest("svcA").await.unwrap();
    assert_eq!(latest.status, HealthStatus::Critical);
    assert!(fleet.health.latest("svcB").await.is_none());

    let recent = fleet.metrics.get_recent_metrics("svcA", Timeframe::Hour).await;
    assert_eq!(recent.metrics.len(), 1);
    assert_eq!(recent.summary.total_errors, 1);

    fleet.unregister("svcA", true).await.unwrap();
    assert!(fleet.health.tracked_workers().await.is_empty());
    assert!(fleet.metrics.tracked_workers().await.is_empty());
    assert!(matches!(
        fleet.registry.get_worker("svcA").await,
        Err(FleetError::NotFound(_))
    ));
    assert!(matches!(
        fleet.unregister("svcA", true).await,
        Err(FleetError::NotFound(_))
    ));
}

/// Answers every request with 200 after `delay`.
async fn spawn_slow_worker(delay: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let _ = socket.read(&mut buf).await;
                tokio::time::sleep(delay).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                    .await;
            });
        }
    });
    address
}

#[tokio::test]
async fn unregister_during_evaluation_leaves_no_history_behind() {
    let slow = spawn_slow_worker(Duration::from_millis(300)).await;
    let config = FleetConfig::from_toml_str(&format!(
        r#"
[registry]
startup_delay = "0ms"
drain_delay = "0ms"

[health]
probe_timeout = "2s"

[[workers]]
name = "a"
address = "{slow}"
auto_start = true

[[workers]]
name = "b"
address = "127.0.0.1:1"
auto_start = true
"#
    ))
    .unwrap();
    let context = FleetContext::build(&config).unwrap();
    let fleet = context.fleet().clone();
    fleet.register_workers(&config.workers).await.unwrap();

    // "a" is evaluated first and holds the pass for ~300ms.
    let evaluating = fleet.clone();
    let pass = tokio::spawn(async move { evaluating.evaluate_fleet().await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    fleet.unregister("b", false).await.unwrap();

    assert_eq!(pass.await.unwrap(), 1);
    assert!(matches!(
        fleet.registry.get_worker("b").await,
        Err(FleetError::NotFound(_))
    ));
    assert_eq!(fleet.health.tracked_workers().await, vec!["a".to_string()]);
    assert_eq!(fleet.metrics.tracked_workers().await, vec!["a".to_string()]);
    assert!(fleet.health.latest("b").await.is_none());
}

#[tokio::test]
async fn background_loops_run_until_shutdown() {
    let config = load_config();
    let mut context = FleetContext::build(&config).unwrap();
    context.spawn();
    assert_eq!(context.running_tasks(), 4);

    context
        .fleet()
        .register_workers(&config.workers)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let fleet = context.fleet().clone();
    let system = fleet
        .metrics
        .get_recent_metrics(SYSTEM_SERIES, Timeframe::Hour)
        .await;
    assert!(!system.metrics.is_empty());
    assert!(fleet.metrics.latest_aggregate().await.is_some());

    // The sweep sees the unreachable worker and moves it to error.
    let svc_a = fleet.registry.get_worker("svcA").await.unwrap();
    assert_eq!(svc_a.state, LifecycleState::Error);

    tokio::time::timeout(Duration::from_secs(5), context.shutdown())
        .await
        .unwrap();
}
