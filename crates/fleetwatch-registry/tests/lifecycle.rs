//! End-to-end lifecycle scenarios against the simulated driver.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use fleetwatch_core::{Clock, FleetError, LifecycleState, ManualClock, ScriptedProber};
use fleetwatch_registry::{Registry, RegistryOptions, SimulatedDriver};

fn registry() -> Registry {
    let options = RegistryOptions {
        startup_delay: Duration::from_millis(5),
        drain_delay: Duration::from_millis(5),
        ..RegistryOptions::default()
    };
    Registry::new(
        options,
        Arc::new(SimulatedDriver::new(Duration::from_millis(1))),
        Arc::new(ScriptedProber::new()),
    )
}

#[tokio::test]
async fn autostart_stop_then_invoke_is_rejected() {
    let registry = registry();
    let mut events = registry.subscribe();

    let record = registry
        .register("svcA", json!({"model": "small"}), true)
        .await
        .unwrap();
    assert_eq!(record.state, LifecycleState::Running);

    registry.stop("svcA", true).await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event.to);
    }
    assert_eq!(
        seen,
        vec![
            LifecycleState::Starting,
            LifecycleState::Running,
            LifecycleState::Stopping,
            LifecycleState::Stopped,
        ]
    );

    let err = registry
        .invoke_tool("svcA", "generate", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FleetError::InvalidState {
            state: LifecycleState::Stopped,
            ..
        }
    ));
}

#[tokio::test]
async fn repeated_restarts_keep_timestamps_ordered() {
    let registry = registry();
    registry.register("svcA", json!({}), true).await.unwrap();

    for round in 1..=3 {
        let force = round % 2 == 0;
        let record = registry.restart("svcA", force).await.unwrap();
        assert_eq!(record.state, LifecycleState::Running);
        assert_eq!(record.restart_count, round);
        assert!(record.stopped_at.unwrap() < record.started_at.unwrap());
    }
}

#[tokio::test]
async fn registered_at_comes_from_injected_clock() {
    let clock = Arc::new(ManualClock::starting_now());
    let registry = registry().with_clock(clock.clone());

    let at = clock.now();
    let record = registry.register("svcA", json!({}), false).await.unwrap();
    assert_eq!(record.registered_at, at);
}

#[tokio::test]
async fn concurrent_invocations_are_all_counted() {
    let registry = Arc::new(registry());
    registry.register("svcA", json!({}), true).await.unwrap();
    registry.register("svcB", json!({}), true).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..20 {
        let registry = registry.clone();
        let worker = if i % 2 == 0 { "svcA" } else { "svcB" };
        handles.push(tokio::spawn(async move {
            registry.invoke_tool(worker, "generate", json!({ "i": i })).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let overview = registry.get_system_overview().await;
    assert_eq!(overview.total_requests, 20);
    assert_eq!(overview.failed_requests, 0);
    for record in registry.list_workers().await {
        assert_eq!(record.metrics.successful_requests, 10);
    }
}
