//! DispatcherActor - Renders and delivers notifications
//!
//! Requests are handled one at a time in arrival order, so the alert for an
//! escalation is always delivered before its recovery.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use crate::config::{MessageTemplates, NotifierDefinition};
use crate::notifiers::{Notifiers, RenderedMessage};
use crate::template::render;

use super::messages::{NotificationKind, NotificationRequest};

pub struct DispatcherActor {
    requests: mpsc::Receiver<NotificationRequest>,
    notifiers: Notifiers,
    definitions: HashMap<String, Arc<NotifierDefinition>>,
}

impl DispatcherActor {
    pub fn new(
        requests: mpsc::Receiver<NotificationRequest>,
        notifiers: Notifiers,
        definitions: &[Arc<NotifierDefinition>],
    ) -> Self {
        Self {
            requests,
            notifiers,
            definitions: definitions
                .iter()
                .map(|definition| (definition.id.clone(), Arc::clone(definition)))
                .collect(),
        }
    }

    /// Runs until every sender of the request queue is gone
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting dispatcher");

        while let Some(request) = self.requests.recv().await {
            self.dispatch(request).await;
        }

        debug!("dispatcher stopped");
    }

    async fn dispatch(&self, request: NotificationRequest) {
        let check_id = request.snapshot.check_id();
        let notifier_id = request.notifier_id.as_str();

        let Some(definition) = self.definitions.get(notifier_id) else {
            warn!(check_id, notifier_id, "notification for unknown notifier dropped");
            return;
        };

        if request.kind.is_recovery() && definition.no_recovery {
            debug!(check_id, notifier_id, kind = %request.kind, "recovery messages disabled for notifier");
            return;
        }

        let Some(notifier) = self.notifiers.get(notifier_id) else {
            error!(check_id, notifier_id, "no transport for notifier");
            return;
        };

        let (subject, text) = templates_for(&definition.templates, request.kind);
        let message = RenderedMessage {
            check_id: check_id.to_string(),
            notifier_id: notifier_id.to_string(),
            kind: request.kind,
            subject: render(subject, &request.snapshot),
            text: render(text, &request.snapshot),
        };

        debug!(check_id, notifier_id, kind = %request.kind, "delivering notification");

        if let Err(e) = notifier.deliver(&message).await {
            error!(check_id, notifier_id, kind = %request.kind, "failed to deliver notification: {e:#}");
        }
    }
}

fn templates_for(templates: &MessageTemplates, kind: NotificationKind) -> (&str, &str) {
    match kind {
        NotificationKind::Fail => (templates.fail_subject.as_str(), templates.fail_text.as_str()),
        NotificationKind::Slow => (templates.slow_subject.as_str(), templates.slow_text.as_str()),
        NotificationKind::FailRecovered => (templates.fail_ok_subject.as_str(), templates.fail_ok_text.as_str()),
        NotificationKind::SlowRecovered => (templates.slow_ok_subject.as_str(), templates.slow_ok_text.as_str()),
    }
}

/// Handle for the DispatcherActor
pub struct DispatcherHandle {
    sender: mpsc::Sender<NotificationRequest>,
    task: JoinHandle<()>,
}

impl DispatcherHandle {
    pub fn spawn(capacity: usize, notifiers: Notifiers, definitions: &[Arc<NotifierDefinition>]) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        let actor = DispatcherActor::new(receiver, notifiers, definitions);
        let task = tokio::spawn(actor.run());

        Self { sender, task }
    }

    /// Sender for the request queue
    pub fn sender(&self) -> mpsc::Sender<NotificationRequest> {
        self.sender.clone()
    }

    /// Drop this handle's sender and wait for the queue to drain
    ///
    /// Only returns once every other sender is gone too.
    pub async fn join(self) {
        drop(self.sender);
        if let Err(e) = self.task.await {
            error!("dispatcher task failed: {e}");
        }
    }
}
