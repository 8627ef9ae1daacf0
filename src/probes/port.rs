//! TCP connect probe

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::{instrument, trace};

use crate::config::{CheckDefinition, CheckKind};

use super::{ProbeExecutor, ProbeResult, STATUS_OK};

/// Opens (and immediately drops) one TCP connection per probe
pub struct PortProbe {
    timeout: Duration,
}

impl PortProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ProbeExecutor for PortProbe {
    #[instrument(skip_all, fields(check_id = %check.id))]
    async fn execute(&self, check: &CheckDefinition) -> ProbeResult {
        let start = Instant::now();

        let CheckKind::Port(target) = &check.kind else {
            return ProbeResult::failed(
                format!("port probe cannot run a {} check", check.kind.probe_kind()),
                start.elapsed(),
            );
        };

        let address = format!("{}:{}", target.host, target.port);
        trace!("connecting to {address}");

        let connect = tokio::time::timeout(self.timeout, TcpStream::connect(&address)).await;
        let elapsed = start.elapsed();

        match connect {
            Ok(Ok(_stream)) => ProbeResult::ok(STATUS_OK, String::new(), elapsed),
            Ok(Err(e)) => ProbeResult::failed(format!("connect to {address} failed: {e}"), elapsed),
            Err(_) => ProbeResult::failed(format!("connect to {address} timed out"), elapsed),
        }
    }
}
