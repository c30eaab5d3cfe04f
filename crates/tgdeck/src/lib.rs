//! tgdeck backend library.
//!
//! Core components for the Telegram userbot operator dashboard: the worker
//! supervisor and command channel, the realtime WebSocket hub, the command
//! router, and the dialogue-run task lifecycle.

pub mod api;
pub mod auth;
pub mod chains;
pub mod db;
pub mod error;
pub mod gateway;
pub mod sessions;
pub mod settings;
pub mod tasks;
pub mod user;
pub mod worker;
pub mod ws;
