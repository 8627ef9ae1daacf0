//! Isolation between check kinds
//!
//! Scenarios:
//! - A kind whose probes never finish does not delay rounds of another kind
//! - Every check of a kind shares that kind's pool but keeps its own state

use std::sync::Arc;
use std::time::Duration;

use vigil::Daemon;
use vigil::probes::{ProbeExecutors, ProbeKind};

use crate::helpers::*;

#[tokio::test(start_paused = true)]
async fn test_stuck_kind_does_not_block_other_kinds() {
    let executor = ScriptedExecutor::new();
    let executors = ProbeExecutors::new()
        .register(ProbeKind::Web, Arc::new(StuckExecutor))
        .register(ProbeKind::Cmd, executor.clone());

    let config = config(
        1,
        vec![
            web_check("stuck", Duration::from_secs(1), 1, &[]),
            cmd_check("fast", Duration::from_secs(1)),
        ],
        vec![],
    );
    let (notifiers, _receiver) = collecting(&[]);
    let daemon = Daemon::start(&config, executors, notifiers).unwrap();

    tokio::time::sleep(Duration::from_secs(30)).await;

    let fast = daemon.processor().get_state("fast").await.unwrap();
    assert!(fast.rounds >= 29, "fast check ran {} rounds", fast.rounds);
    assert!(fast.is_healthy());

    assert!(daemon.processor().get_state("stuck").await.is_none());

    // The stuck worker never returns, so the daemon is dropped rather than shut down
    drop(daemon);
}

#[tokio::test(start_paused = true)]
async fn test_checks_of_one_kind_keep_separate_state() {
    let executor = ScriptedExecutor::new();
    executor.set_fallback("down", failing());

    let config = config(
        1,
        vec![
            web_check("up", Duration::from_secs(5), 3, &[]),
            web_check("down", Duration::from_secs(5), 3, &[]),
        ],
        vec![],
    );
    let (notifiers, _receiver) = collecting(&[]);
    let daemon = Daemon::start(&config, executors(executor.clone()), notifiers).unwrap();

    tokio::time::sleep(Duration::from_secs(12)).await;

    let up = daemon.processor().get_state("up").await.unwrap();
    let down = daemon.processor().get_state("down").await.unwrap();
    assert_eq!(up.rounds, 3);
    assert_eq!(down.rounds, 3);
    assert!(up.is_healthy());
    assert_eq!(down.fail_streak, 3);
    assert!(down.failure);

    daemon.shutdown().await;
}
