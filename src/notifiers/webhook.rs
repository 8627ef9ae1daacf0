use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use tracing::{info, instrument};

use super::{Notifier, RenderedMessage};

/// POSTs every message as JSON
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    #[instrument(skip_all, fields(check_id = %message.check_id, notifier_id = %message.notifier_id))]
    async fn deliver(&self, message: &RenderedMessage) -> Result<()> {
        let payload = json!({
            "check_id": message.check_id,
            "kind": message.kind.as_str(),
            "subject": message.subject,
            "text": message.text,
            "timestamp": Utc::now().to_rfc3339()
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .context("failed to send webhook request")?;

        if !response.status().is_success() {
            bail!("webhook responded with status {}", response.status());
        }

        info!("sent webhook notification");
        Ok(())
    }
}
