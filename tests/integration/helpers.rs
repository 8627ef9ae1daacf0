//! Helper functions for integration tests

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use vigil::config::{
    CheckDefinition, CheckKind, CmdNotifierTarget, CmdTarget, NotifierDefinition, NotifierKind, ResolvedConfig,
    ResolvedGlobal, WebTarget,
};
use vigil::notifiers::{Notifier, Notifiers, RenderedMessage};
use vigil::probes::{ProbeExecutor, ProbeExecutors, ProbeKind, ProbeResult};

pub fn healthy() -> ProbeResult {
    ProbeResult::ok(200, "ok", Duration::from_millis(20))
}

pub fn failing() -> ProbeResult {
    ProbeResult::ok(500, "internal error", Duration::from_millis(20))
}

pub fn slow() -> ProbeResult {
    ProbeResult::ok(200, "ok", Duration::from_secs(30))
}

#[derive(Default)]
struct Script {
    queued: VecDeque<ProbeResult>,
    fallback: Option<ProbeResult>,
    calls: usize,
}

/// Executor returning scripted results per check id
///
/// Queued results are returned first, then the fallback (healthy by default).
#[derive(Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, Script>>,
}

impl ScriptedExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn queue(&self, check_id: &str, results: impl IntoIterator<Item = ProbeResult>) {
        let mut scripts = self.scripts.lock().unwrap();
        scripts.entry(check_id.to_string()).or_default().queued.extend(results);
    }

    pub fn set_fallback(&self, check_id: &str, result: ProbeResult) {
        let mut scripts = self.scripts.lock().unwrap();
        scripts.entry(check_id.to_string()).or_default().fallback = Some(result);
    }

    pub fn calls(&self, check_id: &str) -> usize {
        self.scripts.lock().unwrap().get(check_id).map_or(0, |script| script.calls)
    }
}

#[async_trait]
impl ProbeExecutor for ScriptedExecutor {
    async fn execute(&self, check: &CheckDefinition) -> ProbeResult {
        let mut scripts = self.scripts.lock().unwrap();
        let script = scripts.entry(check.id.clone()).or_default();
        script.calls += 1;
        script
            .queued
            .pop_front()
            .or_else(|| script.fallback.clone())
            .unwrap_or_else(healthy)
    }
}

/// Executor that never finishes a probe
pub struct StuckExecutor;

#[async_trait]
impl ProbeExecutor for StuckExecutor {
    async fn execute(&self, _check: &CheckDefinition) -> ProbeResult {
        std::future::pending().await
    }
}

/// Notifier forwarding every delivered message to a channel
pub struct CollectingNotifier {
    sender: mpsc::UnboundedSender<RenderedMessage>,
}

impl CollectingNotifier {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RenderedMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Arc::new(Self { sender }), receiver)
    }
}

#[async_trait]
impl Notifier for CollectingNotifier {
    async fn deliver(&self, message: &RenderedMessage) -> anyhow::Result<()> {
        self.sender.send(message.clone())?;
        Ok(())
    }
}

pub fn web_check(id: &str, repeat: Duration, allowed_fails: u32, notify: &[&str]) -> CheckDefinition {
    let mut check = CheckDefinition::new(id, CheckKind::Web(WebTarget::get(format!("http://{id}.test/health"))));
    check.repeat = repeat;
    check.allowed_fails = allowed_fails;
    check.expected_time = Duration::from_secs(1);
    check.notify_fail = notify.iter().map(|id| id.to_string()).collect();
    check.notify_slow = check.notify_fail.clone();
    check
}

pub fn cmd_check(id: &str, repeat: Duration) -> CheckDefinition {
    let mut check = CheckDefinition::new(
        id,
        CheckKind::Cmd(CmdTarget {
            command: "true".to_string(),
            params: None,
        }),
    );
    check.repeat = repeat;
    check
}

pub fn notifier(id: &str, fail_schedule: &[u64], slow_schedule: &[u64]) -> NotifierDefinition {
    let mut notifier = NotifierDefinition::new(
        id,
        NotifierKind::Cmd(CmdNotifierTarget {
            command: "true".to_string(),
        }),
    );
    notifier.fail_schedule = fail_schedule.iter().map(|secs| Duration::from_secs(*secs)).collect();
    notifier.slow_schedule = slow_schedule.iter().map(|secs| Duration::from_secs(*secs)).collect();
    notifier
}

pub fn config(workers: usize, checks: Vec<CheckDefinition>, notifiers: Vec<NotifierDefinition>) -> ResolvedConfig {
    ResolvedConfig {
        global: ResolvedGlobal {
            workers,
            ..Default::default()
        },
        checks,
        notifiers,
    }
}

/// Executors with `executor` registered for every kind
pub fn executors(executor: Arc<dyn ProbeExecutor>) -> ProbeExecutors {
    ProbeKind::ALL
        .into_iter()
        .fold(ProbeExecutors::new(), |executors, kind| executors.register(kind, Arc::clone(&executor)))
}

/// Notifiers that all forward to one collecting notifier
pub fn collecting(ids: &[&str]) -> (Notifiers, mpsc::UnboundedReceiver<RenderedMessage>) {
    let (collector, receiver) = CollectingNotifier::new();
    let notifiers = ids.iter().fold(Notifiers::new(), |notifiers, id| {
        notifiers.register(*id, collector.clone() as Arc<dyn Notifier>)
    });
    (notifiers, receiver)
}

/// Wait for the next delivered message, failing the test after an hour of silence
pub async fn next_message(receiver: &mut mpsc::UnboundedReceiver<RenderedMessage>) -> RenderedMessage {
    tokio::time::timeout(Duration::from_secs(3600), receiver.recv())
        .await
        .expect("no notification within an hour")
        .expect("notification channel closed")
}

/// Assert nothing is delivered for `period`
pub async fn assert_quiet(receiver: &mut mpsc::UnboundedReceiver<RenderedMessage>, period: Duration) {
    if let Ok(message) = tokio::time::timeout(period, receiver.recv()).await {
        panic!("unexpected notification: {message:?}");
    }
}

/// Collect everything delivered until `deadline`
pub async fn collect_until(
    receiver: &mut mpsc::UnboundedReceiver<RenderedMessage>,
    deadline: tokio::time::Instant,
) -> Vec<RenderedMessage> {
    let mut messages = vec![];
    while let Ok(Some(message)) = tokio::time::timeout_at(deadline, receiver.recv()).await {
        messages.push(message);
    }
    messages
}
