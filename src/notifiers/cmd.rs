use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, instrument};

use crate::template::render_with;

use super::{Notifier, RenderedMessage};

/// Runs a shell command per message
///
/// `{subject}`, `{text}`, `{check_id}` and `{kind}` in the command line are
/// replaced, and the same values are exported as `VIGIL_SUBJECT`, `VIGIL_TEXT`,
/// `VIGIL_CHECK_ID` and `VIGIL_KIND` for scripts that prefer the environment.
#[derive(Debug, Clone)]
pub struct CmdNotifier {
    command: String,
}

impl CmdNotifier {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
        }
    }

    fn command_line(&self, message: &RenderedMessage) -> String {
        render_with(
            &self.command,
            &[
                ("subject", message.subject.as_str()),
                ("text", message.text.as_str()),
                ("check_id", message.check_id.as_str()),
                ("kind", message.kind.as_str()),
            ],
        )
    }
}

#[async_trait]
impl Notifier for CmdNotifier {
    #[instrument(skip_all, fields(check_id = %message.check_id, notifier_id = %message.notifier_id))]
    async fn deliver(&self, message: &RenderedMessage) -> Result<()> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(self.command_line(message))
            .env("VIGIL_SUBJECT", &message.subject)
            .env("VIGIL_TEXT", &message.text)
            .env("VIGIL_CHECK_ID", &message.check_id)
            .env("VIGIL_KIND", message.kind.as_str())
            .kill_on_drop(true)
            .output()
            .await
            .context("failed to run notification command")?;

        if !output.status.success() {
            bail!(
                "notification command exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        info!("ran notification command");
        Ok(())
    }
}
