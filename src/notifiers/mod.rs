//! Notification transports
//!
//! A transport only delivers an already rendered message. Scheduling, retries and
//! templating happen before it is called.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::actors::messages::NotificationKind;
use crate::config::{NotifierDefinition, NotifierKind};
use crate::error::StartupError;

pub mod cmd;
#[cfg(feature = "jabber")]
pub mod jabber;
#[cfg(feature = "mail")]
pub mod mail;
pub mod webhook;

pub use cmd::CmdNotifier;
#[cfg(feature = "jabber")]
pub use jabber::JabberNotifier;
#[cfg(feature = "mail")]
pub use mail::MailNotifier;
pub use webhook::WebhookNotifier;

/// A notification ready to be delivered
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedMessage {
    pub check_id: String,
    pub notifier_id: String,
    #[serde(serialize_with = "serialize_kind")]
    pub kind: NotificationKind,
    pub subject: String,
    pub text: String,
}

fn serialize_kind<S: serde::Serializer>(kind: &NotificationKind, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(kind.as_str())
}

/// Delivers messages through one channel
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, message: &RenderedMessage) -> Result<()>;
}

/// Transports by notifier id
#[derive(Clone, Default)]
pub struct Notifiers {
    notifiers: HashMap<String, Arc<dyn Notifier>>,
}

impl Notifiers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the transport for a notifier id
    pub fn register(mut self, id: impl Into<String>, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.insert(id.into(), notifier);
        self
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Notifier>> {
        self.notifiers.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.notifiers.contains_key(id)
    }
}

impl fmt::Debug for Notifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifiers")
            .field("ids", &self.notifiers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Build the transport for one notifier
pub fn build_notifier(definition: &NotifierDefinition) -> Result<Arc<dyn Notifier>, StartupError> {
    match &definition.kind {
        #[cfg(feature = "mail")]
        NotifierKind::Mail(target) => {
            let notifier = MailNotifier::new(target).map_err(|e| StartupError::NotifierSetup {
                id: definition.id.clone(),
                reason: format!("{e:#}"),
            })?;
            Ok(Arc::new(notifier))
        }
        #[cfg(not(feature = "mail"))]
        NotifierKind::Mail(_) => Err(StartupError::UnsupportedNotifier {
            id: definition.id.clone(),
            kind: definition.kind.name(),
        }),
        #[cfg(feature = "jabber")]
        NotifierKind::Jabber(target) => {
            let notifier = JabberNotifier::new(target).map_err(|e| StartupError::NotifierSetup {
                id: definition.id.clone(),
                reason: format!("{e:#}"),
            })?;
            Ok(Arc::new(notifier))
        }
        #[cfg(not(feature = "jabber"))]
        NotifierKind::Jabber(_) => Err(StartupError::UnsupportedNotifier {
            id: definition.id.clone(),
            kind: definition.kind.name(),
        }),
        NotifierKind::Cmd(target) => Ok(Arc::new(CmdNotifier::new(&target.command))),
        NotifierKind::Webhook(target) => Ok(Arc::new(WebhookNotifier::new(&target.url))),
    }
}

/// Build transports for every configured notifier
pub fn build_notifiers(definitions: &[NotifierDefinition]) -> Result<Notifiers, StartupError> {
    definitions.iter().try_fold(Notifiers::new(), |notifiers, definition| {
        Ok(notifiers.register(definition.id.clone(), build_notifier(definition)?))
    })
}
