//! End-to-end failure detection and recovery
//!
//! Scenarios:
//! - Two failing rounds with `allowed_fails = 2` produce exactly one alert
//! - The next healthy round produces exactly one recovery
//! - State is queryable through the processor handle
//! - `probe_now` triggers a round outside the schedule

use std::time::Duration;

use tokio::time::Instant;
use vigil::Daemon;
use vigil::actors::messages::NotificationKind;

use crate::helpers::*;

#[tokio::test(start_paused = true)]
async fn test_failure_then_recovery() {
    let executor = ScriptedExecutor::new();
    executor.queue("api", [failing(), failing()]);

    let config = config(
        2,
        vec![web_check("api", Duration::from_secs(1), 2, &["ops"])],
        vec![notifier("ops", &[60], &[300, 0])],
    );
    let (notifiers, mut receiver) = collecting(&["ops"]);
    let start = Instant::now();
    let daemon = Daemon::start(&config, executors(executor.clone()), notifiers).unwrap();

    let alert = next_message(&mut receiver).await;
    assert_eq!(alert.kind, NotificationKind::Fail);
    assert_eq!(alert.check_id, "api");
    assert_eq!(alert.notifier_id, "ops");
    assert_eq!(alert.subject, "http://api.test/health problem");
    assert!(start.elapsed() >= Duration::from_secs(1));
    assert!(start.elapsed() < Duration::from_secs(2));

    let recovery = next_message(&mut receiver).await;
    assert_eq!(recovery.kind, NotificationKind::FailRecovered);
    assert_eq!(recovery.subject, "http://api.test/health ok");

    // No reminder is sent for an escalation that already recovered
    assert_quiet(&mut receiver, Duration::from_secs(600)).await;

    let state = daemon.processor().get_state("api").await.unwrap();
    assert!(state.is_healthy());
    assert!(!state.failure);
    assert!(state.rounds > 3);
    assert_eq!(daemon.processor().active_escalations().await, Some(0));

    daemon.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_flapping_check_never_alerts() {
    let executor = ScriptedExecutor::new();
    executor.queue("api", [failing(), healthy(), failing(), healthy(), failing(), healthy()]);

    let config = config(
        1,
        vec![web_check("api", Duration::from_secs(1), 2, &["ops"])],
        vec![notifier("ops", &[60], &[300, 0])],
    );
    let (notifiers, mut receiver) = collecting(&["ops"]);
    let daemon = Daemon::start(&config, executors(executor.clone()), notifiers).unwrap();

    assert_quiet(&mut receiver, Duration::from_secs(30)).await;
    assert!(executor.calls("api") > 6);

    daemon.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_state_reflects_latest_round() {
    let executor = ScriptedExecutor::new();
    executor.set_fallback("api", failing());

    let config = config(
        1,
        vec![web_check("api", Duration::from_secs(10), 3, &["ops"])],
        vec![notifier("ops", &[60], &[300, 0])],
    );
    let (notifiers, _receiver) = collecting(&["ops"]);
    let daemon = Daemon::start(&config, executors(executor.clone()), notifiers).unwrap();

    tokio::time::sleep(Duration::from_secs(15)).await;

    let state = daemon.processor().get_state("api").await.unwrap();
    assert_eq!(state.rounds, 2);
    assert_eq!(state.fail_streak, 2);
    assert!(!state.failure);
    assert_eq!(state.reason.as_deref(), Some("wrong response code"));

    assert!(daemon.processor().get_state("unknown").await.is_none());

    daemon.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_probe_now_runs_an_extra_round() {
    let executor = ScriptedExecutor::new();

    let config = config(
        1,
        vec![web_check("api", Duration::from_secs(3600), 1, &["ops"])],
        vec![notifier("ops", &[60], &[300, 0])],
    );
    let (notifiers, _receiver) = collecting(&["ops"]);
    let daemon = Daemon::start(&config, executors(executor.clone()), notifiers).unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(executor.calls("api"), 1);

    daemon.probe_now("api").await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(executor.calls("api"), 2);

    let state = daemon.processor().get_state("api").await.unwrap();
    assert_eq!(state.rounds, 2);

    assert!(daemon.probe_now("missing").await.is_err());

    daemon.shutdown().await;
}
