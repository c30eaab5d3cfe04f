//! Worker process management.
//!
//! The worker is a single external long-running process (the script speaking
//! the actual Telegram wire protocol). This module supervises its lifecycle,
//! exchanges correlated commands over its stdio, and caches which logical
//! sessions are currently attached inside it.

pub mod channel;
pub mod registry;
pub mod supervisor;

pub use channel::{ChannelConfig, CommandChannel};
pub use registry::SessionRegistry;
pub use supervisor::{SupervisorConfig, WorkerState, WorkerSupervisor};

use tgdeck_worker_protocol::WorkerEvent;

/// Notifications fanned out by the supervisor to interested consumers.
#[derive(Debug, Clone)]
pub enum WorkerSignal {
    /// Unsolicited event emitted by the worker.
    Event(WorkerEvent),
    /// The worker exited unexpectedly. All worker-side session state is lost;
    /// every session must be treated as implicitly disconnected.
    Crashed,
}
