//! Message types for actor communication
//!
//! ## Design Principles
//!
//! 1. **Commands**: Control messages sent to a specific actor via mpsc
//! 2. **Data**: Probe requests, results and notification requests flow through bounded queues
//! 3. **Snapshots**: Anything that leaves the processor is an owned copy of the check state

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::config::CheckDefinition;
use crate::evaluation::CheckState;
use crate::probes::ProbeResult;

/// A probe result tagged with the check it belongs to
///
/// Produced by a worker, consumed exactly once by the processor.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub definition: Arc<CheckDefinition>,
    pub result: ProbeResult,
    pub finished_at: DateTime<Utc>,
}

/// Consistent view of a check at the end of one round
#[derive(Debug, Clone)]
pub struct CheckSnapshot {
    pub definition: Arc<CheckDefinition>,
    pub result: ProbeResult,
    pub state: CheckState,
}

impl CheckSnapshot {
    pub fn check_id(&self) -> &str {
        &self.definition.id
    }
}

/// What a notification is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Fail,
    Slow,
    FailRecovered,
    SlowRecovered,
}

impl NotificationKind {
    pub fn is_recovery(&self) -> bool {
        matches!(self, NotificationKind::FailRecovered | NotificationKind::SlowRecovered)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Fail => "fail",
            NotificationKind::Slow => "slow",
            NotificationKind::FailRecovered => "fail-recovered",
            NotificationKind::SlowRecovered => "slow-recovered",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message to deliver through one notifier
#[derive(Debug, Clone)]
pub struct NotificationRequest {
    pub snapshot: CheckSnapshot,
    pub notifier_id: String,
    pub kind: NotificationKind,
}

/// Commands that can be sent to a SchedulerActor
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Enqueue a probe right away, outside the regular interval
    ProbeNow,

    /// Stop the ticker and exit
    Shutdown,
}

/// Commands that can be sent to the ProcessorActor
#[derive(Debug)]
pub enum ProcessorCommand {
    /// Get the current state of a check
    GetState {
        check_id: String,
        respond_to: oneshot::Sender<Option<CheckState>>,
    },

    /// Number of escalations currently running
    ActiveEscalations { respond_to: oneshot::Sender<usize> },

    /// Stop processing and cancel every escalation without notifying
    Shutdown,
}
