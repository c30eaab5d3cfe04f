//! Bot session management.
//!
//! A bot session is a user-owned Telegram identity (api id, api hash, session
//! string) that can be attached inside the worker process.

mod models;
mod repository;

pub use models::{BotSession, NewBotSession, SessionStatus};
pub use repository::SessionRepository;
