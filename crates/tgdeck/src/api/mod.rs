//! HTTP API module.
//!
//! A thin REST surface over the gateway service plus the WebSocket upgrade
//! endpoint. Realtime command semantics live in [`crate::ws`]; these routes
//! exist for the dashboard's CRUD needs and for health checks.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::create_router;
pub use state::AppState;
