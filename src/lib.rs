//! vigil - health-check daemon
//!
//! Runs web, ping, port and command probes on a schedule, debounces failures and
//! slowdowns, and keeps notifying on an escalating schedule until a check recovers.
//! See [`actors`] for how the pieces fit together and [`daemon::Daemon`] for the
//! entry point.

pub mod actors;
pub mod config;
pub mod daemon;
pub mod error;
pub mod evaluation;
pub mod notifiers;
pub mod probes;
pub mod template;
pub mod util;

pub use daemon::Daemon;
