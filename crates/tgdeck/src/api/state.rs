//! Shared application state for HTTP and WebSocket handlers.

use std::sync::Arc;

use crate::gateway::GatewayService;
use crate::ws::CommandRouter;

/// State threaded through every axum handler.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<GatewayService>,
    pub router: Arc<CommandRouter>,
}

impl AppState {
    /// Build the state, deriving the command router from the gateway.
    pub fn new(gateway: Arc<GatewayService>) -> Self {
        let router = Arc::new(CommandRouter::new(Arc::clone(&gateway)));
        Self { gateway, router }
    }
}
