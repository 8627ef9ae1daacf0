//! Probe executors
//!
//! One executor per check kind. An executor never fails: whatever goes wrong while
//! probing is reported through [`ProbeResult::error`] so the worker always has a
//! result to hand to the processor.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{CheckDefinition, ResolvedGlobal};

pub mod cmd;
pub mod ping;
pub mod port;
pub mod web;

pub use cmd::CmdProbe;
pub use ping::PingProbe;
pub use port::PortProbe;
pub use web::WebProbe;

/// Status code reported by non-HTTP probes on success
pub const STATUS_OK: u16 = 200;

/// Status code reported by non-HTTP probes on failure
pub const STATUS_FAILED: u16 = 500;

/// The kinds of checks the daemon knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    Web,
    Ping,
    Port,
    Cmd,
}

impl ProbeKind {
    pub const ALL: [ProbeKind; 4] = [ProbeKind::Web, ProbeKind::Ping, ProbeKind::Port, ProbeKind::Cmd];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::Web => "web",
            ProbeKind::Ping => "ping",
            ProbeKind::Port => "port",
            ProbeKind::Cmd => "cmd",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single probe execution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeResult {
    /// HTTP status, or 200/500 for probes without a status of their own
    pub status_code: u16,

    /// Response body or command output (may be empty)
    pub body: String,

    /// Wall time the probe took
    pub elapsed: Duration,

    /// What went wrong, if anything
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn ok(status_code: u16, body: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            status_code,
            body: body.into(),
            elapsed,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            status_code: STATUS_FAILED,
            body: String::new(),
            elapsed,
            error: Some(error.into()),
        }
    }
}

/// Runs one kind of probe
#[async_trait]
pub trait ProbeExecutor: Send + Sync {
    /// Probe the check's target once
    async fn execute(&self, check: &CheckDefinition) -> ProbeResult;
}

/// Executors by check kind
#[derive(Clone, Default)]
pub struct ProbeExecutors {
    executors: HashMap<ProbeKind, Arc<dyn ProbeExecutor>>,
}

impl ProbeExecutors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the executor for a kind
    pub fn register(mut self, kind: ProbeKind, executor: Arc<dyn ProbeExecutor>) -> Self {
        self.executors.insert(kind, executor);
        self
    }

    pub fn get(&self, kind: ProbeKind) -> Option<Arc<dyn ProbeExecutor>> {
        self.executors.get(&kind).cloned()
    }

    pub fn kinds(&self) -> impl Iterator<Item = ProbeKind> + '_ {
        self.executors.keys().copied()
    }
}

impl fmt::Debug for ProbeExecutors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeExecutors")
            .field("kinds", &self.executors.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The built-in executors configured with the global timeouts
pub fn default_executors(global: &ResolvedGlobal) -> ProbeExecutors {
    ProbeExecutors::new()
        .register(ProbeKind::Web, Arc::new(WebProbe::new(global.http_timeout)))
        .register(ProbeKind::Ping, Arc::new(PingProbe::new(global.ping_timeout)))
        .register(ProbeKind::Port, Arc::new(PortProbe::new(global.port_timeout)))
        .register(ProbeKind::Cmd, Arc::new(CmdProbe::new()))
}
