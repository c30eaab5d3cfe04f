//! WebSocket transport handler.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::sync::Arc;

use crate::api::AppState;

use super::hub::{ConnectionId, Hub, Outbound};
use super::router::CommandRouter;
use super::types::{ClientMessage, ServerMessage};

/// WebSocket upgrade handler.
///
/// GET /ws
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let hub = Arc::clone(state.gateway.hub());
    let router = Arc::clone(&state.router);
    ws.on_upgrade(move |socket| handle_connection(socket, hub, router))
}

async fn handle_connection(socket: WebSocket, hub: Arc<Hub>, router: Arc<CommandRouter>) {
    let (mut sender, mut receiver) = socket.split();
    let (conn_id, mut outbound_rx) = hub.register();
    info!("websocket connection {} opened", conn_id);

    // Everything outbound goes through one task so frames never interleave.
    // It ends when the hub drops this connection's sender.
    let mut send_task = tokio::spawn(async move {
        while let Some(outbound) = outbound_rx.recv().await {
            let frame = match outbound {
                Outbound::Message(message) => match serde_json::to_string(&message) {
                    Ok(json) => Message::Text(json.into()),
                    Err(e) => {
                        warn!("failed to serialize server message: {}", e);
                        continue;
                    }
                },
                Outbound::Ping => Message::Ping(Vec::new().into()),
            };
            if sender.send(frame).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            // Hub side is gone (liveness sweep or send failure): tear the
            // socket down rather than idling on a dead peer.
            _ = &mut send_task => break,

            frame = receiver.next() => {
                let Some(frame) = frame else { break };
                match frame {
                    Ok(Message::Text(text)) => {
                        handle_text(&hub, &router, conn_id, &text).await;
                    }
                    Ok(Message::Pong(_)) => hub.pong(conn_id),
                    Ok(Message::Ping(_)) => {
                        // Axum answers transport pings itself.
                        debug!("ping from connection {}", conn_id);
                    }
                    Ok(Message::Binary(_)) => {
                        debug!("ignoring binary frame from connection {}", conn_id);
                    }
                    Ok(Message::Close(_)) => break,
                    Err(e) => {
                        warn!("websocket error on connection {}: {}", conn_id, e);
                        break;
                    }
                }
            }
        }
    }

    send_task.abort();
    hub.unregister(conn_id);
    info!("websocket connection {} closed", conn_id);
}

/// Parse one text frame and route it. Frames the router cannot even parse
/// are answered with an error frame instead of being dropped on the floor.
async fn handle_text(hub: &Hub, router: &CommandRouter, conn_id: ConnectionId, text: &str) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => router.handle_message(conn_id, message).await,
        Err(e) => {
            warn!("unparseable frame on connection {}: {}", conn_id, e);
            hub.send_to_connection(
                conn_id,
                ServerMessage::Error {
                    message: "unrecognized message".to_string(),
                },
            )
            .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::gateway::GatewayService;
    use crate::tasks::RunDriverConfig;
    use crate::worker::{SupervisorConfig, WorkerSupervisor};

    async fn setup() -> (Arc<Hub>, Arc<CommandRouter>, Database) {
        let db = Database::in_memory().await.unwrap();
        let hub = Arc::new(Hub::new());
        let supervisor = WorkerSupervisor::new(SupervisorConfig::default());
        let gateway = Arc::new(GatewayService::new(
            &db,
            supervisor,
            Arc::clone(&hub),
            RunDriverConfig::default(),
        ));
        let router = Arc::new(CommandRouter::new(gateway));
        (hub, router, db)
    }

    #[tokio::test]
    async fn test_unparseable_frame_gets_an_error_reply() {
        let (hub, router, _db) = setup().await;
        let (conn, mut rx) = hub.register();

        handle_text(&hub, &router, conn, "this is not json").await;

        match rx.recv().await.unwrap() {
            Outbound::Message(ServerMessage::Error { message }) => {
                assert_eq!(message, "unrecognized message");
            }
            other => panic!("unexpected outbound: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_message_type_gets_an_error_reply() {
        let (hub, router, _db) = setup().await;
        let (conn, mut rx) = hub.register();

        handle_text(&hub, &router, conn, r#"{"type":"mystery","data":{}}"#).await;

        assert!(matches!(
            rx.recv().await.unwrap(),
            Outbound::Message(ServerMessage::Error { .. })
        ));
    }
}
