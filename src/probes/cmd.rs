//! Shell command probe

use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{instrument, trace};

use crate::config::{CheckDefinition, CheckKind};

use super::{ProbeExecutor, ProbeResult, STATUS_FAILED, STATUS_OK};

/// Runs `sh -c "<command> <params>"` per probe
#[derive(Default)]
pub struct CmdProbe;

impl CmdProbe {
    pub fn new() -> Self {
        Self
    }
}

fn command_line(command: &str, params: Option<&str>) -> String {
    match params {
        Some(params) if !params.is_empty() => format!("{command} {params}"),
        _ => command.to_string(),
    }
}

#[async_trait]
impl ProbeExecutor for CmdProbe {
    #[instrument(skip_all, fields(check_id = %check.id))]
    async fn execute(&self, check: &CheckDefinition) -> ProbeResult {
        let start = Instant::now();

        let CheckKind::Cmd(target) = &check.kind else {
            return ProbeResult::failed(
                format!("cmd probe cannot run a {} check", check.kind.probe_kind()),
                start.elapsed(),
            );
        };

        let line = command_line(&target.command, target.params.as_deref());
        trace!("running {line:?}");

        let output = Command::new("sh").arg("-c").arg(&line).kill_on_drop(true).output().await;
        let elapsed = start.elapsed();

        match output {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if output.status.success() {
                    ProbeResult::ok(STATUS_OK, stdout, elapsed)
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                    let reason = if stderr.is_empty() {
                        format!("command exited with {}", output.status)
                    } else {
                        format!("command exited with {}: {stderr}", output.status)
                    };
                    ProbeResult {
                        status_code: STATUS_FAILED,
                        body: stdout,
                        elapsed,
                        error: Some(reason),
                    }
                }
            }
            Err(e) => ProbeResult::failed(format!("failed to run command: {e}"), elapsed),
        }
    }
}
