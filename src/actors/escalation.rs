//! Escalations - Repeating notifications for one (check, notifier) pair
//!
//! An escalation starts when a check crosses its failure or slowness threshold and
//! lives in its own task until the check recovers. The task owns the only path
//! to the notification queue for its pair, so the alert, every reminder and the
//! final recovery message are sent in order by one writer.
//!
//! ```text
//! crossing ──start──► [send now] ──► wait schedule[i] ──► send, advance ──┐
//!                                         ▲                                │
//!                                         └────────────────────────────────┘
//! recovery ──recover──► (oneshot) ──► send recovery, remove entry, exit
//! ```
//!
//! The registry is shared between the processor (inserts, recoveries) and the
//! escalation tasks (self-removal). Every access goes through its mutex. Entries
//! carry a generation so a finishing task never removes a newer escalation
//! registered for the same pair. A pair restarted while its previous task is
//! still sending the recovery waits for that task before sending its alert.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, instrument, trace, warn};

use super::messages::{CheckSnapshot, NotificationKind, NotificationRequest};

/// Identifies an escalation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EscalationKey {
    pub check_id: String,
    pub notifier_id: String,
}

impl EscalationKey {
    pub fn new(check_id: impl Into<String>, notifier_id: impl Into<String>) -> Self {
        Self {
            check_id: check_id.into(),
            notifier_id: notifier_id.into(),
        }
    }
}

/// The condition an escalation reports on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Failure,
    Slowness,
}

impl Condition {
    pub fn alert(&self) -> NotificationKind {
        match self {
            Condition::Failure => NotificationKind::Fail,
            Condition::Slowness => NotificationKind::Slow,
        }
    }

    pub fn recovered(&self) -> NotificationKind {
        match self {
            Condition::Failure => NotificationKind::FailRecovered,
            Condition::Slowness => NotificationKind::SlowRecovered,
        }
    }
}

/// Position in a notification schedule
///
/// The last entry repeats forever, unless it is zero, in which case the
/// escalation parks and only waits for recovery.
#[derive(Debug, Clone)]
pub struct ScheduleCursor {
    schedule: Vec<Duration>,
    index: usize,
}

impl ScheduleCursor {
    pub fn new(schedule: Vec<Duration>) -> Self {
        let schedule = if schedule.is_empty() {
            vec![Duration::ZERO]
        } else {
            schedule
        };
        Self { schedule, index: 0 }
    }

    fn is_last(&self) -> bool {
        self.index + 1 >= self.schedule.len()
    }

    /// Delay before the next reminder, `None` once parked
    pub fn next_delay(&self) -> Option<Duration> {
        let delay = self.schedule[self.index];
        if self.is_last() && delay.is_zero() {
            None
        } else {
            Some(delay)
        }
    }

    pub fn advance(&mut self) {
        if !self.is_last() {
            self.index += 1;
        }
    }
}

struct Entry {
    generation: u64,
    condition: Condition,
    recovery_tx: oneshot::Sender<CheckSnapshot>,

    /// Resolves once the task has exited
    finished_rx: oneshot::Receiver<()>,
}

#[derive(Default)]
struct Registry {
    entries: HashMap<EscalationKey, Entry>,

    /// Recovered escalations whose task may still be sending
    finishing: HashMap<EscalationKey, oneshot::Receiver<()>>,

    next_generation: u64,
}

/// All running escalations, at most one per (check, notifier) pair
#[derive(Clone, Default)]
pub struct EscalationRegistry {
    inner: Arc<Mutex<Registry>>,
}

impl EscalationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start an escalation for `key`
    ///
    /// Sends the first notification right away using the snapshot currently in
    /// `snapshots`, then follows `schedule`. Returns false (and does nothing) if the
    /// pair already has an active escalation.
    pub fn start(
        &self,
        key: EscalationKey,
        condition: Condition,
        schedule: Vec<Duration>,
        snapshots: watch::Receiver<CheckSnapshot>,
        notifications: mpsc::Sender<NotificationRequest>,
    ) -> bool {
        let mut registry = self.lock();

        if let Some(active) = registry.entries.get(&key) {
            warn!(
                check_id = %key.check_id,
                notifier_id = %key.notifier_id,
                active = ?active.condition,
                requested = ?condition,
                "escalation already active, ignoring"
            );
            return false;
        }

        let generation = registry.next_generation;
        registry.next_generation += 1;

        let (recovery_tx, recovery_rx) = oneshot::channel();
        let (finished_tx, finished_rx) = oneshot::channel();
        let previous = registry.finishing.remove(&key);
        registry.entries.insert(
            key.clone(),
            Entry {
                generation,
                condition,
                recovery_tx,
                finished_rx,
            },
        );

        let first = snapshots.borrow().clone();
        let task = EscalationTask {
            key,
            generation,
            condition,
            cursor: ScheduleCursor::new(schedule),
            snapshots,
            notifications,
            recovery_rx,
            registry: self.clone(),
            _finished_tx: finished_tx,
        };
        tokio::spawn(task.run(first, previous));

        true
    }

    /// End the escalation for `key` with a recovery message built from `snapshot`
    ///
    /// Returns false if there was nothing to recover, which is not an error.
    pub fn recover(&self, key: &EscalationKey, snapshot: CheckSnapshot) -> bool {
        let mut registry = self.lock();
        let Some(entry) = registry.entries.remove(key) else {
            trace!(check_id = %key.check_id, notifier_id = %key.notifier_id, "no active escalation to recover");
            return false;
        };

        if entry.recovery_tx.send(snapshot).is_err() {
            // Task already gone, e.g. the notification queue was closed
            debug!(check_id = %key.check_id, notifier_id = %key.notifier_id, "escalation task already stopped");
        }
        registry
            .finishing
            .retain(|_, finished| !matches!(finished.try_recv(), Err(TryRecvError::Closed)));
        registry.finishing.insert(key.clone(), entry.finished_rx);
        true
    }

    pub fn is_active(&self, key: &EscalationKey) -> bool {
        self.lock().entries.contains_key(key)
    }

    pub fn condition(&self, key: &EscalationKey) -> Option<Condition> {
        self.lock().entries.get(key).map(|entry| entry.condition)
    }

    pub fn active_count(&self) -> usize {
        self.lock().entries.len()
    }

    /// Stop every escalation without sending recovery messages
    pub fn shutdown(&self) {
        let mut registry = self.lock();
        registry.finishing.clear();
        let cancelled = std::mem::take(&mut registry.entries);
        debug!("cancelled {} escalations", cancelled.len());
    }

    fn remove_if_current(&self, key: &EscalationKey, generation: u64) {
        let mut registry = self.lock();
        if registry
            .entries
            .get(key)
            .is_some_and(|entry| entry.generation == generation)
        {
            registry.entries.remove(key);
        }
    }
}

struct EscalationTask {
    key: EscalationKey,
    generation: u64,
    condition: Condition,
    cursor: ScheduleCursor,
    snapshots: watch::Receiver<CheckSnapshot>,
    notifications: mpsc::Sender<NotificationRequest>,
    recovery_rx: oneshot::Receiver<CheckSnapshot>,
    registry: EscalationRegistry,

    /// Dropped when the task exits
    _finished_tx: oneshot::Sender<()>,
}

impl EscalationTask {
    #[instrument(
        skip_all,
        fields(check_id = %self.key.check_id, notifier_id = %self.key.notifier_id, condition = ?self.condition)
    )]
    async fn run(mut self, first: CheckSnapshot, previous: Option<oneshot::Receiver<()>>) {
        debug!("escalation started");

        if let Some(previous) = previous {
            // Sender is only ever dropped
            let _ = previous.await;
            trace!("previous escalation for the pair finished");
        }

        if self.send(first, self.condition.alert()).await {
            loop {
                let delay = self.cursor.next_delay();

                tokio::select! {
                    // Recovery always wins over a reminder that is due at the same time
                    biased;

                    signal = &mut self.recovery_rx => {
                        match signal {
                            Ok(snapshot) => {
                                self.send(snapshot, self.condition.recovered()).await;
                                debug!("escalation recovered");
                            }
                            Err(_) => debug!("escalation cancelled"),
                        }
                        break;
                    }

                    _ = wait(delay) => {
                        let snapshot = self.snapshots.borrow().clone();
                        if !self.send(snapshot, self.condition.alert()).await {
                            break;
                        }
                        self.cursor.advance();
                    }
                }
            }
        }

        self.registry.remove_if_current(&self.key, self.generation);
    }

    /// Returns false once the notification queue is closed
    async fn send(&self, snapshot: CheckSnapshot, kind: NotificationKind) -> bool {
        let request = NotificationRequest {
            snapshot,
            notifier_id: self.key.notifier_id.clone(),
            kind,
        };

        match self.notifications.send(request).await {
            Ok(()) => {
                trace!(%kind, "notification queued");
                true
            }
            Err(_) => {
                debug!("notification queue closed");
                false
            }
        }
    }
}

async fn wait(delay: Option<Duration>) {
    match delay {
        Some(delay) => tokio::time::sleep(delay).await,
        None => std::future::pending().await,
    }
}
