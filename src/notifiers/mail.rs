use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, instrument};

use crate::config::MailTarget;

use super::{Notifier, RenderedMessage};

/// Port on which SMTP servers expect TLS from the first byte
const SMTPS_PORT: u16 = 465;

/// Sends plain text mail through an SMTP relay
pub struct MailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl MailNotifier {
    pub fn new(target: &MailTarget) -> Result<Self> {
        let from = parse_mailbox(&target.from)?;
        let to = target
            .to
            .iter()
            .map(|address| parse_mailbox(address))
            .collect::<Result<Vec<_>>>()?;

        let tls = TlsParameters::builder(target.server.clone())
            .dangerous_accept_invalid_certs(target.ignore_cert)
            .build()
            .context("failed to set up TLS")?;

        let tls = if target.port == SMTPS_PORT {
            Tls::Wrapper(tls)
        } else {
            Tls::Opportunistic(tls)
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&target.server)
            .port(target.port)
            .tls(tls);

        if let Some(user) = &target.user {
            let pass = target.pass.clone().unwrap_or_default();
            builder = builder.credentials(Credentials::new(user.clone(), pass));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            to,
        })
    }

    fn build_message(&self, message: &RenderedMessage) -> Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN);

        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }

        builder.body(message.text.clone()).context("failed to build mail")
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse::<Mailbox>()
        .with_context(|| format!("invalid mail address {address:?}"))
}

#[async_trait]
impl Notifier for MailNotifier {
    #[instrument(skip_all, fields(check_id = %message.check_id, notifier_id = %message.notifier_id))]
    async fn deliver(&self, message: &RenderedMessage) -> Result<()> {
        let mail = self.build_message(message)?;

        self.transport.send(mail).await.context("failed to send mail")?;

        info!("sent mail to {} recipients", self.to.len());
        Ok(())
    }
}
