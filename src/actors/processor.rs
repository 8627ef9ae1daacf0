//! ProcessorActor - Owns the state of every check
//!
//! This is the only place a [`CheckState`] is ever written. Results from all
//! worker pools arrive on one channel and are folded in one at a time, so each
//! check sees a linear history no matter which worker produced a result.
//!
//! ## Message Flow
//!
//! ```text
//! CheckResult → evaluate → commit state → publish snapshot (watch)
//!                                   │
//!                                   ├─ crossing  → EscalationRegistry::start
//!                                   └─ healthy   → EscalationRegistry::recover
//! ```

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::NotifierDefinition;
use crate::evaluation::{CheckState, evaluate};
use crate::util::millis;

use super::escalation::{Condition, EscalationKey, EscalationRegistry};
use super::messages::{CheckResult, CheckSnapshot, NotificationRequest, ProcessorCommand};

/// Per-check state plus the channel its escalations read snapshots from
struct CheckEntry {
    state: CheckState,
    snapshot_tx: watch::Sender<CheckSnapshot>,
}

/// Actor that evaluates results and drives escalations
pub struct ProcessorActor {
    /// State per check id, created on the first result
    checks: HashMap<String, CheckEntry>,

    /// Notifier schedules by id
    notifiers: HashMap<String, Arc<NotifierDefinition>>,

    /// Running escalations
    escalations: EscalationRegistry,

    /// Results from all worker pools
    results_rx: mpsc::Receiver<CheckResult>,

    /// Command receiver
    command_rx: mpsc::Receiver<ProcessorCommand>,

    /// Queue of the dispatcher, handed to every escalation
    notifications: mpsc::Sender<NotificationRequest>,
}

impl ProcessorActor {
    pub fn new(
        notifiers: &[Arc<NotifierDefinition>],
        escalations: EscalationRegistry,
        results_rx: mpsc::Receiver<CheckResult>,
        command_rx: mpsc::Receiver<ProcessorCommand>,
        notifications: mpsc::Sender<NotificationRequest>,
    ) -> Self {
        Self {
            checks: HashMap::new(),
            notifiers: notifiers
                .iter()
                .map(|notifier| (notifier.id.clone(), Arc::clone(notifier)))
                .collect(),
            escalations,
            results_rx,
            command_rx,
            notifications,
        }
    }

    /// Run the actor's main loop
    ///
    /// Runs until a Shutdown command is received or the results channel is closed.
    /// Escalations still running at that point are cancelled without notifying.
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting processor");

        loop {
            tokio::select! {
                // Results queued before a command are processed first
                biased;

                result = self.results_rx.recv() => {
                    match result {
                        Some(result) => self.handle_result(result),
                        None => {
                            debug!("results channel closed, shutting down");
                            break;
                        }
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        ProcessorCommand::GetState { check_id, respond_to } => {
                            let state = self.checks.get(&check_id).map(|entry| entry.state.clone());
                            let _ = respond_to.send(state);
                        }

                        ProcessorCommand::ActiveEscalations { respond_to } => {
                            let _ = respond_to.send(self.escalations.active_count());
                        }

                        ProcessorCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }
            }
        }

        self.escalations.shutdown();
        debug!("processor stopped");
    }

    fn handle_result(&mut self, result: CheckResult) {
        let CheckResult {
            definition,
            result,
            finished_at,
        } = result;
        let check_id = definition.id.clone();

        let previous = self.checks.get(&check_id).map(|entry| &entry.state);
        let evaluation = evaluate(previous, &definition, &result, finished_at);
        let state = &evaluation.state;

        info!(
            check_id = %check_id,
            check = %definition.kind.target(),
            code = result.status_code,
            time_ms = millis(result.elapsed),
            fails = state.fail_streak,
            allowed_fails = definition.allowed_fails,
            slows = state.slow_streak,
            allowed_slows = definition.allowed_slows,
            "check result"
        );

        if let Some(reason) = &state.reason {
            debug!(check_id = %check_id, "round not ok: {reason}");
        }

        let snapshot = CheckSnapshot {
            definition: Arc::clone(&definition),
            result,
            state: evaluation.state.clone(),
        };

        match self.checks.entry(check_id.clone()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.state = evaluation.state.clone();
                entry.snapshot_tx.send_replace(snapshot.clone());
            }
            Entry::Vacant(vacant) => {
                let (snapshot_tx, _) = watch::channel(snapshot.clone());
                vacant.insert(CheckEntry {
                    state: evaluation.state.clone(),
                    snapshot_tx,
                });
            }
        }

        if evaluation.fail_crossed {
            info!(check_id = %check_id, "failure threshold reached");
            self.escalate(&check_id, Condition::Failure, &definition.notify_fail);
        }

        if evaluation.slow_crossed {
            info!(check_id = %check_id, "slowness threshold reached");
            self.escalate(&check_id, Condition::Slowness, &definition.notify_slow);
        }

        if let Some(recovery) = evaluation.recovery {
            info!(check_id = %check_id, ?recovery, "check recovered");
        }

        if evaluation.state.is_healthy() {
            self.recover(&snapshot);
        }
    }

    fn escalate(&self, check_id: &str, condition: Condition, notifier_ids: &[String]) {
        let Some(entry) = self.checks.get(check_id) else {
            return;
        };

        for notifier_id in notifier_ids {
            let Some(notifier) = self.notifiers.get(notifier_id) else {
                warn!(check_id, notifier_id = %notifier_id, "unknown notifier, skipping");
                continue;
            };

            let schedule = match condition {
                Condition::Failure => notifier.fail_schedule.clone(),
                Condition::Slowness => notifier.slow_schedule.clone(),
            };

            self.escalations.start(
                EscalationKey::new(check_id, notifier_id.as_str()),
                condition,
                schedule,
                entry.snapshot_tx.subscribe(),
                self.notifications.clone(),
            );
        }
    }

    /// End every escalation of the check, each with its own recovery message
    fn recover(&self, snapshot: &CheckSnapshot) {
        let definition = &snapshot.definition;
        let mut notifier_ids: Vec<&String> =
            definition.notify_fail.iter().chain(definition.notify_slow.iter()).collect();
        notifier_ids.sort();
        notifier_ids.dedup();

        for notifier_id in notifier_ids {
            let key = EscalationKey::new(definition.id.as_str(), notifier_id.as_str());
            if self.escalations.recover(&key, snapshot.clone()) {
                debug!(check_id = %definition.id, notifier_id = %notifier_id, "escalation recovered");
            }
        }
    }
}

/// Handle for controlling the ProcessorActor
#[derive(Clone)]
pub struct ProcessorHandle {
    sender: mpsc::Sender<ProcessorCommand>,
}

impl ProcessorHandle {
    /// Spawn the processor
    ///
    /// Returns the handle and the actor's task so the caller can wait for it.
    pub fn spawn(
        notifiers: &[Arc<NotifierDefinition>],
        escalations: EscalationRegistry,
        results_rx: mpsc::Receiver<CheckResult>,
        notifications: mpsc::Sender<NotificationRequest>,
    ) -> (Self, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = ProcessorActor::new(notifiers, escalations, results_rx, cmd_rx, notifications);
        let task = tokio::spawn(actor.run());

        (Self { sender: cmd_tx }, task)
    }

    /// Current state of a check, `None` before its first result
    pub async fn get_state(&self, check_id: impl Into<String>) -> Option<CheckState> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ProcessorCommand::GetState {
                check_id: check_id.into(),
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Number of escalations currently running
    pub async fn active_escalations(&self) -> Option<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ProcessorCommand::ActiveEscalations { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()
    }

    /// Shutdown the processor
    pub async fn shutdown(&self) {
        let _ = self.sender.send(ProcessorCommand::Shutdown).await;
    }
}
