//! Realtime WebSocket layer.
//!
//! Clients connect unauthenticated, present their identity in a first `auth`
//! message, and from then on exchange typed JSON frames. The hub tracks every
//! connection, fans server pushes out to all of a user's sockets, and sweeps
//! dead connections on a heartbeat.

pub mod handler;
pub mod hub;
pub mod router;
pub mod types;

pub use handler::ws_handler;
pub use hub::{ConnectionId, Hub, Outbound};
pub use router::CommandRouter;
pub use types::{ClientMessage, EditorAction, ServerMessage, TelegramAction};
