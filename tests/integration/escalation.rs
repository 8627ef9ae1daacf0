//! Escalation schedules driven by real check rounds
//!
//! Scenarios:
//! - Reminders follow the notifier's fail schedule and park on a trailing zero
//! - Several notifiers escalate independently, `no_recovery` suppresses recoveries
//! - Slowness escalates on its own schedule
//! - Shutdown cancels running escalations without recovery messages

use std::time::Duration;

use tokio::time::Instant;
use vigil::Daemon;
use vigil::actors::escalation::EscalationKey;
use vigil::actors::messages::NotificationKind;

use crate::helpers::*;

fn elapsed_minutes(start: Instant) -> u64 {
    start.elapsed().as_secs() / 60
}

#[tokio::test(start_paused = true)]
async fn test_reminders_follow_fail_schedule() {
    let executor = ScriptedExecutor::new();
    executor.set_fallback("api", failing());

    let config = config(
        1,
        vec![web_check("api", Duration::from_secs(10), 1, &["ops"])],
        vec![notifier("ops", &[60, 300, 0], &[300, 0])],
    );
    let (notifiers, mut receiver) = collecting(&["ops"]);
    let start = Instant::now();
    let daemon = Daemon::start(&config, executors(executor.clone()), notifiers).unwrap();

    let mut sent_at = vec![];
    for _ in 0..3 {
        let message = next_message(&mut receiver).await;
        assert_eq!(message.kind, NotificationKind::Fail);
        sent_at.push(elapsed_minutes(start));
    }
    assert_eq!(sent_at, vec![0, 1, 6]);

    // Parked on the trailing zero entry
    assert_quiet(&mut receiver, Duration::from_secs(1800)).await;
    assert!(daemon.escalations().is_active(&EscalationKey::new("api", "ops")));

    executor.set_fallback("api", healthy());
    let recovery = next_message(&mut receiver).await;
    assert_eq!(recovery.kind, NotificationKind::FailRecovered);
    assert!(!daemon.escalations().is_active(&EscalationKey::new("api", "ops")));

    assert_quiet(&mut receiver, Duration::from_secs(600)).await;

    daemon.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_notifiers_escalate_independently() {
    let executor = ScriptedExecutor::new();
    executor.set_fallback("api", failing());

    let mut pager = notifier("pager", &[0], &[0]);
    pager.no_recovery = true;

    let config = config(
        1,
        vec![web_check("api", Duration::from_secs(10), 1, &["ops", "pager"])],
        vec![notifier("ops", &[120], &[300, 0]), pager],
    );
    let (notifiers, mut receiver) = collecting(&["ops", "pager"]);
    let start = Instant::now();
    let daemon = Daemon::start(&config, executors(executor.clone()), notifiers).unwrap();

    let messages = collect_until(&mut receiver, start + Duration::from_secs(300)).await;
    let count = |notifier_id: &str| messages.iter().filter(|m| m.notifier_id == notifier_id).count();
    assert_eq!(count("ops"), 3);
    assert_eq!(count("pager"), 1);
    assert!(messages.iter().all(|m| m.kind == NotificationKind::Fail));
    assert_eq!(daemon.processor().active_escalations().await, Some(2));

    executor.set_fallback("api", healthy());
    let recovery = next_message(&mut receiver).await;
    assert_eq!(recovery.kind, NotificationKind::FailRecovered);
    assert_eq!(recovery.notifier_id, "ops");

    assert_quiet(&mut receiver, Duration::from_secs(600)).await;
    assert_eq!(daemon.processor().active_escalations().await, Some(0));

    daemon.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_slowness_escalates_on_slow_schedule() {
    let executor = ScriptedExecutor::new();
    executor.set_fallback("api", slow());

    // Web checks allow two slow rounds by default
    let config = config(
        1,
        vec![web_check("api", Duration::from_secs(5), 1, &["ops"])],
        vec![notifier("ops", &[60], &[300, 0])],
    );
    let (notifiers, mut receiver) = collecting(&["ops"]);
    let start = Instant::now();
    let daemon = Daemon::start(&config, executors(executor.clone()), notifiers).unwrap();

    let alert = next_message(&mut receiver).await;
    assert_eq!(alert.kind, NotificationKind::Slow);
    assert_eq!(start.elapsed(), Duration::from_secs(5));
    assert_eq!(alert.subject, "http://api.test/health slow");

    let reminder = next_message(&mut receiver).await;
    assert_eq!(reminder.kind, NotificationKind::Slow);
    assert_eq!(start.elapsed(), Duration::from_secs(305));

    assert_quiet(&mut receiver, Duration::from_secs(1200)).await;

    executor.set_fallback("api", healthy());
    let recovery = next_message(&mut receiver).await;
    assert_eq!(recovery.kind, NotificationKind::SlowRecovered);

    daemon.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_escalations_silently() {
    let executor = ScriptedExecutor::new();
    executor.set_fallback("api", failing());

    let config = config(
        1,
        vec![web_check("api", Duration::from_secs(10), 1, &["ops"])],
        vec![notifier("ops", &[60], &[300, 0])],
    );
    let (notifiers, mut receiver) = collecting(&["ops"]);
    let daemon = Daemon::start(&config, executors(executor.clone()), notifiers).unwrap();

    let alert = next_message(&mut receiver).await;
    assert_eq!(alert.kind, NotificationKind::Fail);

    daemon.shutdown().await;

    let mut remaining = vec![];
    while let Some(message) = receiver.recv().await {
        remaining.push(message);
    }
    assert!(remaining.iter().all(|m| m.kind == NotificationKind::Fail));
}
