//! Wiring of the whole pipeline
//!
//! [`Daemon::start`] checks that every check kind has an executor and every
//! referenced notifier has a transport, then spawns the actors in dependency
//! order: dispatcher, processor, worker pools, schedulers.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::actors::dispatcher::DispatcherHandle;
use crate::actors::escalation::EscalationRegistry;
use crate::actors::processor::ProcessorHandle;
use crate::actors::scheduler::SchedulerHandle;
use crate::actors::workers::{WorkerPool, pool_size};
use crate::config::{NotifierDefinition, ResolvedConfig};
use crate::error::StartupError;
use crate::notifiers::{Notifiers, build_notifiers};
use crate::probes::{ProbeExecutors, ProbeKind, default_executors};

/// Minimum capacity of the results and notification queues
const MIN_QUEUE_CAPACITY: usize = 16;

/// Queue slots per check for the results and notification queues
const SLOTS_PER_CHECK: usize = 4;

/// A running daemon
pub struct Daemon {
    schedulers: Vec<SchedulerHandle>,
    pools: Vec<WorkerPool>,
    processor: ProcessorHandle,
    processor_task: JoinHandle<()>,
    dispatcher: DispatcherHandle,
    escalations: EscalationRegistry,
}

impl Daemon {
    /// Start with the built-in executors and transports
    pub fn start_default(config: &ResolvedConfig) -> Result<Self, StartupError> {
        let executors = default_executors(&config.global);
        let notifiers = build_notifiers(&config.notifiers)?;
        Self::start(config, executors, notifiers)
    }

    /// Start every actor
    ///
    /// Fails before spawning anything if a check kind has no executor or a
    /// referenced notifier has no transport.
    pub fn start(config: &ResolvedConfig, executors: ProbeExecutors, notifiers: Notifiers) -> Result<Self, StartupError> {
        for check in &config.checks {
            let kind = check.kind.probe_kind();
            if executors.get(kind).is_none() {
                return Err(StartupError::NoExecutor {
                    check: check.id.clone(),
                    kind,
                });
            }

            let referenced: HashSet<&String> = check.notify_fail.iter().chain(check.notify_slow.iter()).collect();
            for notifier in referenced {
                if !notifiers.contains(notifier) {
                    return Err(StartupError::MissingTransport {
                        check: check.id.clone(),
                        notifier: notifier.clone(),
                    });
                }
            }
        }

        let capacity = (config.checks.len() * SLOTS_PER_CHECK).max(MIN_QUEUE_CAPACITY);
        let notifier_definitions: Vec<Arc<NotifierDefinition>> =
            config.notifiers.iter().cloned().map(Arc::new).collect();

        let dispatcher = DispatcherHandle::spawn(capacity, notifiers, &notifier_definitions);

        let escalations = EscalationRegistry::new();
        let (results_tx, results_rx) = mpsc::channel(capacity);
        let (processor, processor_task) = ProcessorHandle::spawn(
            &notifier_definitions,
            escalations.clone(),
            results_rx,
            dispatcher.sender(),
        );

        let mut pools = Vec::new();
        let mut schedulers = Vec::with_capacity(config.checks.len());

        for kind in ProbeKind::ALL {
            let checks: Vec<_> = config
                .checks
                .iter()
                .filter(|check| check.kind.probe_kind() == kind)
                .collect();

            // Checked above for every kind in use
            let Some(executor) = executors.get(kind) else {
                continue;
            };
            if checks.is_empty() {
                continue;
            }

            let (queue_tx, queue_rx) = mpsc::channel(checks.len());
            let size = pool_size(config.global.workers, checks.len());
            pools.push(WorkerPool::spawn(kind, size, queue_rx, executor, results_tx.clone()));

            for check in checks {
                schedulers.push(SchedulerHandle::spawn(Arc::new(check.clone()), queue_tx.clone()));
            }
        }

        info!(
            "started {} checks on {} worker pools with {} notifiers",
            schedulers.len(),
            pools.len(),
            notifier_definitions.len()
        );

        Ok(Self {
            schedulers,
            pools,
            processor,
            processor_task,
            dispatcher,
            escalations,
        })
    }

    pub fn processor(&self) -> &ProcessorHandle {
        &self.processor
    }

    pub fn escalations(&self) -> &EscalationRegistry {
        &self.escalations
    }

    /// Probe a check right away
    pub async fn probe_now(&self, check_id: &str) -> Result<()> {
        self.schedulers
            .iter()
            .find(|scheduler| scheduler.check_id == check_id)
            .with_context(|| format!("unknown check {check_id:?}"))?
            .probe_now()
            .await
    }

    /// Stop everything and wait for the tasks to finish
    ///
    /// Running escalations are cancelled without recovery messages. Notifications
    /// already queued are still delivered.
    pub async fn shutdown(self) {
        debug!("stopping schedulers");
        for outcome in join_all(self.schedulers.into_iter().map(SchedulerHandle::shutdown)).await {
            if let Err(e) = outcome {
                error!("{e:#}");
            }
        }

        debug!("stopping processor");
        self.processor.shutdown().await;
        if let Err(e) = self.processor_task.await {
            error!("processor task failed: {e}");
        }

        debug!("stopping workers");
        join_all(self.pools.into_iter().map(WorkerPool::join)).await;

        debug!("draining notifications");
        self.dispatcher.join().await;

        info!("daemon stopped");
    }
}
