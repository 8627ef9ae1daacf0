//! ICMP probe using the system `ping` binary

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{instrument, trace};

use crate::config::{CheckDefinition, CheckKind};

use super::{ProbeExecutor, ProbeResult, STATUS_OK};

/// Sends a single echo request per probe
pub struct PingProbe {
    timeout: Duration,
}

impl PingProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn command(&self, host: &str) -> Command {
        // -W takes whole seconds
        let wait = self.timeout.as_secs().max(1);

        let mut command = Command::new("ping");
        command
            .arg("-c")
            .arg("1")
            .arg("-W")
            .arg(wait.to_string())
            .arg(host)
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl ProbeExecutor for PingProbe {
    #[instrument(skip_all, fields(check_id = %check.id))]
    async fn execute(&self, check: &CheckDefinition) -> ProbeResult {
        let start = Instant::now();

        let CheckKind::Ping(target) = &check.kind else {
            return ProbeResult::failed(
                format!("ping probe cannot run a {} check", check.kind.probe_kind()),
                start.elapsed(),
            );
        };

        trace!("pinging {}", target.host);

        // Guard against a ping binary that ignores -W
        let deadline = self.timeout + Duration::from_secs(1);
        let output = tokio::time::timeout(deadline, self.command(&target.host).output()).await;
        let elapsed = start.elapsed();

        match output {
            Ok(Ok(output)) if output.status.success() => {
                ProbeResult::ok(STATUS_OK, String::from_utf8_lossy(&output.stdout).trim(), elapsed)
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let reason = match stderr.trim() {
                    "" => format!("ping {} failed: {}", target.host, output.status),
                    stderr => format!("ping {} failed: {}", target.host, stderr),
                };
                ProbeResult::failed(reason, elapsed)
            }
            Ok(Err(e)) => ProbeResult::failed(format!("failed to run ping: {e}"), elapsed),
            Err(_) => ProbeResult::failed(format!("ping {} timed out", target.host), elapsed),
        }
    }
}
