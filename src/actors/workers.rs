//! WorkerPool - Runs probes for one check kind
//!
//! All workers of a pool share the kind's queue receiver behind an async mutex:
//! whoever holds the lock waits for the next request, the others wait for the lock.
//! Every dequeued request produces exactly one [`CheckResult`].

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use futures::future::join_all;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, trace};

use crate::config::CheckDefinition;
use crate::probes::{ProbeExecutor, ProbeKind, ProbeResult};

use super::messages::CheckResult;

/// Never more workers than checks, never more than the configured ceiling
pub fn pool_size(workers: usize, checks: usize) -> usize {
    workers.min(checks)
}

/// Fixed group of workers draining one probe queue
pub struct WorkerPool {
    pub kind: ProbeKind,
    tasks: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers
    ///
    /// The pool stops once the queue is closed and drained, or when the results
    /// channel is closed.
    pub fn spawn(
        kind: ProbeKind,
        size: usize,
        queue: mpsc::Receiver<Arc<CheckDefinition>>,
        executor: Arc<dyn ProbeExecutor>,
        results: mpsc::Sender<CheckResult>,
    ) -> Self {
        let queue = Arc::new(Mutex::new(queue));

        let tasks = (0..size)
            .map(|worker| {
                tokio::spawn(run_worker(
                    kind,
                    worker,
                    Arc::clone(&queue),
                    Arc::clone(&executor),
                    results.clone(),
                ))
            })
            .collect();

        debug!(%kind, "started {size} workers");

        Self { kind, tasks }
    }

    pub fn size(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every worker to exit
    pub async fn join(self) {
        for outcome in join_all(self.tasks).await {
            if let Err(e) = outcome {
                error!(kind = %self.kind, "worker task failed: {e}");
            }
        }
    }
}

#[instrument(skip(queue, executor, results))]
async fn run_worker(
    kind: ProbeKind,
    worker: usize,
    queue: Arc<Mutex<mpsc::Receiver<Arc<CheckDefinition>>>>,
    executor: Arc<dyn ProbeExecutor>,
    results: mpsc::Sender<CheckResult>,
) {
    loop {
        let next = {
            let mut queue = queue.lock().await;
            queue.recv().await
        };

        let Some(definition) = next else {
            trace!("probe queue closed");
            break;
        };

        let result = execute(executor.as_ref(), &definition).await;
        trace!(check_id = %definition.id, status = result.status_code, "probe finished");

        let check_result = CheckResult {
            definition,
            result,
            finished_at: Utc::now(),
        };

        if results.send(check_result).await.is_err() {
            debug!("results channel closed");
            break;
        }
    }
}

/// Run the executor, turning a panic into a failed result
async fn execute(executor: &dyn ProbeExecutor, definition: &CheckDefinition) -> ProbeResult {
    let start = Instant::now();
    match AssertUnwindSafe(executor.execute(definition)).catch_unwind().await {
        Ok(result) => result,
        Err(_) => {
            error!(check_id = %definition.id, "probe executor panicked");
            ProbeResult::failed("probe executor panicked", start.elapsed())
        }
    }
}
