//! SchedulerActor - Enqueues probe requests for one check
//!
//! Every check gets its own scheduler, so a slow or saturated worker pool only
//! delays the checks waiting on it.
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → enqueue CheckDefinition → per-kind probe queue → WorkerPool
//!     ↑
//!     └─── Commands (ProbeNow, Shutdown)
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, instrument, trace, warn};

use crate::config::CheckDefinition;

use super::messages::SchedulerCommand;

/// Used when a check is configured with a zero interval
pub const FALLBACK_INTERVAL: Duration = Duration::from_secs(60);

/// Actor that fires probe requests for a single check
pub struct SchedulerActor {
    /// The check to schedule
    definition: Arc<CheckDefinition>,

    /// Queue of the worker pool for this check's kind
    queue: mpsc::Sender<Arc<CheckDefinition>>,

    /// Command receiver for control messages
    command_rx: mpsc::Receiver<SchedulerCommand>,

    /// Time between two probes
    interval_duration: Duration,
}

impl SchedulerActor {
    pub fn new(
        definition: Arc<CheckDefinition>,
        queue: mpsc::Sender<Arc<CheckDefinition>>,
        command_rx: mpsc::Receiver<SchedulerCommand>,
    ) -> Self {
        let interval_duration = if definition.repeat.is_zero() {
            warn!(
                check_id = %definition.id,
                "repeat interval must be greater than 0, using {}s",
                FALLBACK_INTERVAL.as_secs()
            );
            FALLBACK_INTERVAL
        } else {
            definition.repeat
        };

        Self {
            definition,
            queue,
            command_rx,
            interval_duration,
        }
    }

    /// Run the actor's main loop
    ///
    /// The first probe is enqueued immediately. Runs until:
    /// - A Shutdown command is received
    /// - The command channel or the probe queue is closed
    #[instrument(skip(self), fields(check_id = %self.definition.id))]
    pub async fn run(mut self) {
        debug!("starting scheduler, interval {:?}", self.interval_duration);

        let mut ticker = interval(self.interval_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.enqueue().await {
                        break;
                    }
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(SchedulerCommand::ProbeNow) => {
                            debug!("received ProbeNow command");
                            if !self.enqueue().await {
                                break;
                            }
                        }

                        Some(SchedulerCommand::Shutdown) => {
                            debug!("received shutdown command");
                            break;
                        }

                        None => {
                            debug!("command channel closed, shutting down");
                            break;
                        }
                    }
                }
            }
        }

        debug!("scheduler stopped");
    }

    /// Push the check onto its probe queue
    ///
    /// Waits while the queue is full but still reacts to Shutdown. Returns false
    /// when the scheduler should stop.
    async fn enqueue(&mut self) -> bool {
        let send = self.queue.send(Arc::clone(&self.definition));
        tokio::pin!(send);

        loop {
            tokio::select! {
                sent = &mut send => {
                    return match sent {
                        Ok(()) => {
                            trace!("probe enqueued");
                            true
                        }
                        Err(_) => {
                            debug!("probe queue closed, shutting down");
                            false
                        }
                    };
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(SchedulerCommand::ProbeNow) => {
                            trace!("probe already waiting for a free slot");
                        }
                        Some(SchedulerCommand::Shutdown) | None => {
                            debug!("shutdown while waiting for a free slot");
                            return false;
                        }
                    }
                }
            }
        }
    }
}

/// Handle for controlling a SchedulerActor
pub struct SchedulerHandle {
    /// Command sender
    sender: mpsc::Sender<SchedulerCommand>,

    /// Actor task
    task: JoinHandle<()>,

    pub check_id: String,
}

impl SchedulerHandle {
    /// Spawn a scheduler feeding `queue`
    pub fn spawn(definition: Arc<CheckDefinition>, queue: mpsc::Sender<Arc<CheckDefinition>>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let check_id = definition.id.clone();

        let actor = SchedulerActor::new(definition, queue, cmd_rx);
        let task = tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            task,
            check_id,
        }
    }

    /// Enqueue an extra probe immediately
    pub async fn probe_now(&self) -> Result<()> {
        self.sender
            .send(SchedulerCommand::ProbeNow)
            .await
            .context("failed to send ProbeNow command")?;
        Ok(())
    }

    /// Stop the scheduler and wait for it to exit
    pub async fn shutdown(self) -> Result<()> {
        // The actor may already be gone if its queue was closed
        let _ = self.sender.send(SchedulerCommand::Shutdown).await;
        self.task.await.context("scheduler task panicked")?;
        Ok(())
    }
}
