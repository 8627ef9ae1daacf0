//! Per-round evaluation of probe results
//!
//! [`evaluate`] is a pure function from (previous state, new result) to the next
//! state plus the events the round produced. The processor actor owns the state
//! and acts on the events; keeping the arithmetic here makes it testable without
//! any channels or timers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::CheckDefinition;
use crate::probes::ProbeResult;

/// Debounced health of one check
///
/// Created with zero streaks on the first result and fully replaced on every
/// following one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckState {
    /// Consecutive failing rounds
    pub fail_streak: u32,

    /// Consecutive slow rounds
    pub slow_streak: u32,

    /// `fail_streak` reached `allowed_fails`
    pub failure: bool,

    /// `slow_streak` reached `allowed_slows`
    pub slow: bool,

    /// This round ended a failure
    pub recovered_from_failure: bool,

    /// This round ended a slowdown
    pub recovered_from_slow: bool,

    /// Last time `failure` or `slow` changed
    pub last_transition: Option<DateTime<Utc>>,

    /// When the latest result was evaluated
    pub checked_at: DateTime<Utc>,

    /// Results evaluated so far
    pub rounds: u64,

    /// Why the latest round was failing or slow
    pub reason: Option<String>,
}

impl CheckState {
    /// Both streaks are zero
    pub fn is_healthy(&self) -> bool {
        self.fail_streak == 0 && self.slow_streak == 0
    }
}

/// Which condition a round recovered from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    Failure,
    Slowness,
}

/// Classification of a single result, before streaks are applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round {
    pub failing: bool,
    pub slow: bool,
    pub reason: Option<String>,
}

/// Outcome of evaluating one result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub state: CheckState,

    /// `fail_streak` hit `allowed_fails` exactly in this round
    pub fail_crossed: bool,

    /// `slow_streak` hit `allowed_slows` exactly in this round
    pub slow_crossed: bool,

    pub recovery: Option<Recovery>,
}

/// Decide whether a single result is failing and/or slow
pub fn classify(check: &CheckDefinition, result: &ProbeResult) -> Round {
    let mut reason = result.error.clone();
    let mut failing = reason.is_some();

    if result.status_code != check.expected_code {
        failing = true;
        reason.get_or_insert_with(|| "wrong response code".to_string());
    }

    if let Some(look_for) = &check.look_for
        && !result.body.contains(look_for.as_str())
    {
        failing = true;
        reason.get_or_insert_with(|| format!("response does not contain: {look_for}"));
    }

    let slow = result.elapsed > check.expected_time;
    if slow {
        reason.get_or_insert_with(|| "slow response".to_string());
    }

    Round {
        failing,
        slow,
        reason,
    }
}

/// Fold a new result into the previous state
///
/// Crossings are edge-triggered: they fire only in the round where a streak becomes
/// equal to its threshold. A streak broken by a single good round starts from zero,
/// so a check that flaps faster than its threshold never crosses.
pub fn evaluate(
    previous: Option<&CheckState>,
    check: &CheckDefinition,
    result: &ProbeResult,
    now: DateTime<Utc>,
) -> Evaluation {
    let round = classify(check, result);

    let fail_streak = match (round.failing, previous) {
        (true, Some(prev)) => prev.fail_streak.saturating_add(1),
        (true, None) => 1,
        (false, _) => 0,
    };
    let slow_streak = match (round.slow, previous) {
        (true, Some(prev)) => prev.slow_streak.saturating_add(1),
        (true, None) => 1,
        (false, _) => 0,
    };

    let recovery = match previous {
        Some(prev) if fail_streak == 0 && slow_streak == 0 => {
            if prev.failure {
                Some(Recovery::Failure)
            } else if prev.slow {
                Some(Recovery::Slowness)
            } else {
                None
            }
        }
        _ => None,
    };

    let failure = fail_streak >= check.allowed_fails;
    let slow = slow_streak >= check.allowed_slows;

    let (was_failure, was_slow) = previous.map_or((false, false), |prev| (prev.failure, prev.slow));
    let last_transition = if failure != was_failure || slow != was_slow {
        Some(now)
    } else {
        previous.and_then(|prev| prev.last_transition)
    };

    let state = CheckState {
        fail_streak,
        slow_streak,
        failure,
        slow,
        recovered_from_failure: recovery == Some(Recovery::Failure),
        recovered_from_slow: recovery == Some(Recovery::Slowness),
        last_transition,
        checked_at: now,
        rounds: previous.map_or(0, |prev| prev.rounds) + 1,
        reason: round.reason,
    };

    Evaluation {
        fail_crossed: check.allowed_fails != 0 && fail_streak == check.allowed_fails,
        slow_crossed: check.allowed_slows != 0 && slow_streak == check.allowed_slows,
        recovery,
        state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CheckKind, PingTarget};
    use std::time::Duration;

    fn check(allowed_fails: u32, allowed_slows: u32) -> CheckDefinition {
        let mut check = CheckDefinition::new(
            "c1",
            CheckKind::Ping(PingTarget {
                host: "localhost".to_string(),
            }),
        );
        check.allowed_fails = allowed_fails;
        check.allowed_slows = allowed_slows;
        check.expected_time = Duration::from_millis(100);
        check
    }

    fn ok() -> ProbeResult {
        ProbeResult::ok(200, "pong", Duration::from_millis(10))
    }

    fn failing() -> ProbeResult {
        ProbeResult::ok(500, "", Duration::from_millis(10))
    }

    fn slow() -> ProbeResult {
        ProbeResult::ok(200, "pong", Duration::from_millis(500))
    }

    /// Feed results in order, returning every evaluation
    fn run(check: &CheckDefinition, results: &[ProbeResult]) -> Vec<Evaluation> {
        let mut state: Option<CheckState> = None;
        let mut out = Vec::new();
        for result in results {
            let evaluation = evaluate(state.as_ref(), check, result, Utc::now());
            state = Some(evaluation.state.clone());
            out.push(evaluation);
        }
        out
    }

    #[test]
    fn classify_reasons() {
        let mut definition = check(1, 1);

        let round = classify(&definition, &ok());
        assert!(!round.failing && !round.slow);
        assert_eq!(round.reason, None);

        let round = classify(&definition, &failing());
        assert!(round.failing);
        assert_eq!(round.reason.as_deref(), Some("wrong response code"));

        definition.look_for = Some("healthy".to_string());
        let round = classify(&definition, &ok());
        assert!(round.failing);
        assert_eq!(round.reason.as_deref(), Some("response does not contain: healthy"));

        definition.look_for = None;
        let round = classify(&definition, &slow());
        assert!(!round.failing && round.slow);
        assert_eq!(round.reason.as_deref(), Some("slow response"));
    }

    #[test]
    fn probe_error_fails_even_with_expected_code() {
        let definition = check(1, 1);
        let mut result = ok();
        result.error = Some("connection reset".to_string());

        let round = classify(&definition, &result);

        assert!(round.failing);
        assert_eq!(round.reason.as_deref(), Some("connection reset"));
    }

    #[test]
    fn crossing_fires_exactly_once() {
        let definition = check(3, 5);
        let evaluations = run(&definition, &vec![failing(); 6]);

        let crossed: Vec<bool> = evaluations.iter().map(|e| e.fail_crossed).collect();
        assert_eq!(crossed, vec![false, false, true, false, false, false]);
        assert!(!evaluations[1].state.failure);
        assert!(evaluations[2].state.failure);
        assert_eq!(evaluations[5].state.fail_streak, 6);
    }

    #[test]
    fn success_resets_streak_and_recovers() {
        let definition = check(2, 5);
        let evaluations = run(&definition, &[failing(), failing(), failing(), ok()]);

        let last = evaluations.last().unwrap();
        assert_eq!(last.state.fail_streak, 0);
        assert!(!last.state.failure);
        assert_eq!(last.recovery, Some(Recovery::Failure));
        assert!(last.state.recovered_from_failure);
        assert!(last.state.is_healthy());
    }

    #[test]
    fn flapping_never_crosses() {
        let definition = check(2, 5);
        let evaluations = run(&definition, &[failing(), ok(), failing(), ok(), failing(), ok()]);

        assert!(evaluations.iter().all(|e| !e.fail_crossed));
        assert!(evaluations.iter().all(|e| e.recovery.is_none()));
    }

    #[test]
    fn slowness_is_tracked_separately() {
        let definition = check(1, 2);
        let evaluations = run(&definition, &[slow(), slow(), failing(), ok()]);

        assert!(evaluations[1].slow_crossed);
        assert!(evaluations[1].state.slow);
        assert!(!evaluations[1].state.failure);

        // A fast failing round resets the slow streak but there is no recovery
        assert_eq!(evaluations[2].state.slow_streak, 0);
        assert!(evaluations[2].fail_crossed);
        assert_eq!(evaluations[2].recovery, None);

        // Failure takes precedence when both were set at some point
        assert_eq!(evaluations[3].recovery, Some(Recovery::Failure));
    }

    #[test]
    fn slow_recovery_when_not_failed() {
        let definition = check(1, 1);
        let evaluations = run(&definition, &[slow(), ok()]);

        assert_eq!(evaluations[1].recovery, Some(Recovery::Slowness));
        assert!(evaluations[1].state.recovered_from_slow);
    }

    #[test]
    fn zero_threshold_never_crosses() {
        let definition = check(0, 0);
        let evaluations = run(&definition, &[failing(), failing()]);

        assert!(evaluations.iter().all(|e| !e.fail_crossed));
        // The flag is still level-triggered
        assert!(evaluations[0].state.failure);
    }

    #[test]
    fn transition_timestamp_only_moves_on_flag_change() {
        let definition = check(1, 5);
        let first = evaluate(None, &definition, &failing(), Utc::now());
        let stamp = first.state.last_transition;
        assert!(stamp.is_some());

        let later = Utc::now() + chrono::Duration::seconds(30);
        let second = evaluate(Some(&first.state), &definition, &failing(), later);
        assert_eq!(second.state.last_transition, stamp);

        let third = evaluate(Some(&second.state), &definition, &ok(), later);
        assert_eq!(third.state.last_transition, Some(later));
        assert_eq!(third.state.rounds, 3);
    }
}
