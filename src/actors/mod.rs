//! Actor-based check pipeline
//!
//! Each actor runs as an independent async task communicating via Tokio channels.
//!
//! ## Architecture Overview
//!
//! ```text
//!   ┌─────────────┐ ┌─────────────┐      ┌─────────────┐
//!   │ Scheduler-1 │ │ Scheduler-2 │ ...  │ Scheduler-N │   one per check
//!   └──────┬──────┘ └──────┬──────┘      └──────┬──────┘
//!          │ enqueue       │                    │
//!   ┌──────▼───────────────▼────────────────────▼──────┐
//!   │  probe queues (bounded, one per check kind)       │
//!   └──────┬───────────────┬────────────────────┬──────┘
//!   ┌──────▼──────┐ ┌──────▼──────┐      ┌──────▼──────┐
//!   │ WorkerPool  │ │ WorkerPool  │ ...  │ WorkerPool  │   one per kind
//!   │   (web)     │ │   (ping)    │      │   (cmd)     │
//!   └──────┬──────┘ └──────┬──────┘      └──────┬──────┘
//!          └───────────────┼────────────────────┘
//!                   ┌──────▼──────┐
//!                   │  Processor  │ owns CheckState
//!                   └──────┬──────┘
//!                          │ start / recover
//!                   ┌──────▼──────┐
//!                   │ Escalations │ one task per (check, notifier)
//!                   └──────┬──────┘
//!                   ┌──────▼──────┐
//!                   │ Dispatcher  │ renders and delivers
//!                   └─────────────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Schedulers and the processor have an mpsc command channel
//! 2. **Queues**: Probe requests, results and notifications travel over bounded mpsc queues
//! 3. **Snapshots**: Escalations read check state from a `watch` channel, never from the processor's map
//! 4. **Request/Response**: oneshot channels for queries and recovery signals

pub mod dispatcher;
pub mod escalation;
pub mod messages;
pub mod processor;
pub mod scheduler;
pub mod workers;
