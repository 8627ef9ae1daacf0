use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use futures::StreamExt;
use tokio_xmpp::parsers::message::{Body, Message, MessageType};
use tokio_xmpp::parsers::{Element, Jid};
use tokio_xmpp::{AsyncClient, AsyncConfig, AsyncServerConfig, Event};
use tracing::{debug, info, instrument, warn};

use crate::config::JabberTarget;

use super::{Notifier, RenderedMessage};

/// Upper bound for logging in, sending and logging out again
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends chat messages through an XMPP server
///
/// Every delivery logs in, sends one message per recipient and logs out.
pub struct JabberNotifier {
    jid: Jid,
    password: String,
    server: String,
    port: u16,
    to: Vec<Jid>,
}

impl JabberNotifier {
    pub fn new(target: &JabberTarget) -> Result<Self> {
        let jid = parse_jid(&target.user)?;
        let to = target
            .to
            .iter()
            .map(|recipient| parse_jid(recipient))
            .collect::<Result<Vec<_>>>()?;

        if target.ignore_cert {
            warn!(server = %target.server, "ignore_cert is not supported for jabber, certificates are verified");
        }

        Ok(Self {
            jid,
            password: target.pass.clone().unwrap_or_default(),
            server: target.server.clone(),
            port: target.port,
            to,
        })
    }

    async fn send(&self, text: &str) -> Result<()> {
        let mut client = AsyncClient::new_with_config(AsyncConfig {
            jid: self.jid.clone(),
            password: self.password.clone(),
            server: AsyncServerConfig::Manual {
                host: self.server.clone(),
                port: self.port,
            },
        });
        client.set_reconnect(false);

        loop {
            match client.next().await {
                Some(event) if event.is_online() => break,
                Some(Event::Disconnected(e)) => bail!("disconnected before login: {e}"),
                Some(_) => continue,
                None => bail!("connection closed before login"),
            }
        }
        debug!("logged in as {}", self.jid);

        for recipient in &self.to {
            client
                .send_stanza(chat_message(recipient, text))
                .await
                .map_err(|e| anyhow!("failed to send message to {recipient}: {e}"))?;
        }

        if let Err(e) = client.send_end().await {
            debug!("failed to close xmpp stream: {e}");
        }
        Ok(())
    }
}

fn parse_jid(address: &str) -> Result<Jid> {
    address
        .parse::<Jid>()
        .map_err(|e| anyhow!("invalid jabber id {address:?}: {e}"))
}

fn chat_message(to: &Jid, text: &str) -> Element {
    let mut message = Message::new(Some(to.clone()));
    message.type_ = MessageType::Chat;
    message.bodies.insert(String::new(), Body(text.to_string()));
    message.into()
}

#[async_trait]
impl Notifier for JabberNotifier {
    #[instrument(skip_all, fields(check_id = %message.check_id, notifier_id = %message.notifier_id))]
    async fn deliver(&self, message: &RenderedMessage) -> Result<()> {
        tokio::time::timeout(DELIVERY_TIMEOUT, self.send(&message.text))
            .await
            .with_context(|| format!("no answer from {}:{}", self.server, self.port))??;

        info!("sent jabber message to {} recipients", self.to.len());
        Ok(())
    }
}
