//! Dialogue-run task lifecycle.
//!
//! A task is one execution instance of a dialogue chain, tracked as a small
//! monotonic state machine with an append-only log. Transitions are guarded
//! at the storage layer so illegal or duplicate transitions affect nothing.

mod models;
mod repository;
pub mod runner;

pub use models::{Task, TaskStatus};
pub use repository::TaskRepository;
pub use runner::RunDriverConfig;
