//! Route table.

use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::ws::ws_handler;

use super::handlers;
use super::state::AppState;

/// Build the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/ws", get(ws_handler))
        .route("/api/users", post(handlers::create_user))
        .route(
            "/api/sessions",
            get(handlers::list_sessions).post(handlers::create_session),
        )
        .route("/api/sessions/{id}", delete(handlers::delete_session))
        .route(
            "/api/chains",
            get(handlers::list_chains).post(handlers::create_chain),
        )
        .route("/api/chains/{id}/start", post(handlers::start_chain))
        .route("/api/chains/{id}/stop", post(handlers::stop_chain))
        .route("/api/tasks/{id}", get(handlers::get_task))
        .route("/api/tasks/{id}/stop", post(handlers::stop_task))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
