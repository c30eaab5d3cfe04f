//! Routing of client messages to gateway operations.
//!
//! The router is the only consumer of [`ClientMessage`]: it enforces the
//! auth-first rule, translates commands into gateway calls, and shapes the
//! per-command reply. It also hosts the event pump that turns worker signals
//! into per-user pushes.

use log::{info, warn};
use std::sync::Arc;

use crate::error::GatewayError;
use crate::gateway::GatewayService;
use crate::worker::WorkerSignal;

use super::hub::{ConnectionId, Hub};
use super::types::{ClientMessage, EditorAction, ServerMessage, TelegramAction};

/// Dispatches parsed client messages against the gateway.
pub struct CommandRouter {
    gateway: Arc<GatewayService>,
    hub: Arc<Hub>,
}

impl CommandRouter {
    /// Create a router over a gateway. The hub is shared with the gateway.
    pub fn new(gateway: Arc<GatewayService>) -> Self {
        let hub = Arc::clone(gateway.hub());
        Self { gateway, hub }
    }

    /// Handle one message from a connection.
    ///
    /// Never returns an error to the transport: failures become `error`
    /// or per-command response frames on the socket itself.
    pub async fn handle_message(&self, conn_id: ConnectionId, message: ClientMessage) {
        match message {
            ClientMessage::Auth { user_id } => self.handle_auth(conn_id, user_id).await,
            ClientMessage::TelegramCommand {
                action,
                session_id,
                params,
            } => {
                self.handle_telegram_command(conn_id, action, session_id, params)
                    .await
            }
            ClientMessage::EditorCommand {
                action,
                chain_id,
                task_id,
            } => {
                self.handle_editor_command(conn_id, action, chain_id, task_id)
                    .await
            }
        }
    }

    async fn handle_auth(&self, conn_id: ConnectionId, user_id: i64) {
        match self.gateway.authenticate(user_id).await {
            Ok(user) => {
                self.hub.authenticate(conn_id, user.id);
                self.hub
                    .send_to_connection(conn_id, ServerMessage::AuthSuccess { user_id: user.id })
                    .await;
            }
            Err(e) => {
                warn!("auth failed for connection {}: {}", conn_id, e);
                self.send_error(conn_id, "authentication failed").await;
            }
        }
    }

    /// The user this connection authenticated as, or an error frame.
    async fn require_user(&self, conn_id: ConnectionId) -> Option<i64> {
        match self.hub.user_of(conn_id) {
            Some(user_id) => Some(user_id),
            None => {
                self.send_error(conn_id, "not authenticated").await;
                None
            }
        }
    }

    async fn handle_telegram_command(
        &self,
        conn_id: ConnectionId,
        action: TelegramAction,
        session_id: i64,
        params: Option<serde_json::Value>,
    ) {
        let Some(user_id) = self.require_user(conn_id).await else {
            return;
        };

        let result = match action {
            TelegramAction::Connect => self.gateway.connect_session(user_id, session_id).await,
            TelegramAction::Disconnect => {
                self.gateway.disconnect_session(user_id, session_id).await
            }
            TelegramAction::SendMessage => {
                self.gateway.send_message(user_id, session_id, params).await
            }
        };

        let reply = match result {
            Ok(data) => ServerMessage::TelegramResponse {
                action,
                session_id,
                success: true,
                data,
                error: None,
            },
            Err(e) => ServerMessage::TelegramResponse {
                action,
                session_id,
                success: false,
                data: None,
                error: Some(e.to_string()),
            },
        };
        self.hub.send_to_connection(conn_id, reply).await;
    }

    async fn handle_editor_command(
        &self,
        conn_id: ConnectionId,
        action: EditorAction,
        chain_id: Option<i64>,
        task_id: Option<i64>,
    ) {
        let Some(user_id) = self.require_user(conn_id).await else {
            return;
        };

        let result = match action {
            EditorAction::StartTask => match chain_id {
                Some(chain_id) => self
                    .gateway
                    .start_task(user_id, chain_id)
                    .await
                    .map(Some),
                None => Err(GatewayError::CommandRejected(
                    "start_task requires chainId".to_string(),
                )),
            },
            EditorAction::StopTask => match task_id {
                Some(task_id) => self.gateway.stop_task(user_id, task_id).await.map(Some),
                None => Err(GatewayError::CommandRejected(
                    "stop_task requires taskId".to_string(),
                )),
            },
            EditorAction::StopChain => match chain_id {
                Some(chain_id) => self
                    .gateway
                    .stop_chain(user_id, chain_id)
                    .await
                    .map(|_| None),
                None => Err(GatewayError::CommandRejected(
                    "stop_chain requires chainId".to_string(),
                )),
            },
        };

        let reply = match result {
            Ok(task) => ServerMessage::EditorResponse {
                action,
                success: true,
                task,
                error: None,
            },
            Err(e) => ServerMessage::EditorResponse {
                action,
                success: false,
                task: None,
                error: Some(e.to_string()),
            },
        };
        self.hub.send_to_connection(conn_id, reply).await;
    }

    async fn send_error(&self, conn_id: ConnectionId, message: &str) {
        self.hub
            .send_to_connection(
                conn_id,
                ServerMessage::Error {
                    message: message.to_string(),
                },
            )
            .await;
    }
}

/// Pump worker signals into the realtime layer until the supervisor's
/// broadcast channel closes.
///
/// Events go only to the owner of the originating session. A crash marks
/// every session inactive and tells all clients.
pub async fn run_event_pump(gateway: Arc<GatewayService>) {
    let mut signals = gateway.supervisor().subscribe();
    let hub = Arc::clone(gateway.hub());

    loop {
        let signal = match signals.recv().await {
            Ok(signal) => signal,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("event pump lagged, {} worker signal(s) dropped", skipped);
                continue;
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        };

        match signal {
            WorkerSignal::Event(event) => {
                let owner = match gateway.session_owner(event.session_id).await {
                    Ok(Some(owner)) => owner,
                    Ok(None) => {
                        warn!("event for unknown session {}, dropping", event.session_id);
                        continue;
                    }
                    Err(e) => {
                        warn!("failed to resolve session owner: {:?}", e);
                        continue;
                    }
                };
                hub.send_to_user(
                    owner,
                    ServerMessage::TelegramEvent {
                        session_id: event.session_id,
                        event_type: event.event_type,
                        data: event.data,
                    },
                )
                .await;
            }
            WorkerSignal::Crashed => {
                if let Err(e) = gateway.handle_worker_crash().await {
                    warn!("worker crash handling failed: {:?}", e);
                }
            }
        }
    }
    info!("event pump stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::tasks::RunDriverConfig;
    use crate::user::UserRepository;
    use crate::worker::{SupervisorConfig, WorkerSupervisor};
    use crate::ws::Outbound;
    use tokio::sync::mpsc;

    async fn setup() -> (CommandRouter, Arc<Hub>, Database) {
        let db = Database::in_memory().await.unwrap();
        let hub = Arc::new(Hub::new());
        // Supervisor never started: the worker stays unavailable.
        let supervisor = WorkerSupervisor::new(SupervisorConfig::default());
        let gateway = Arc::new(GatewayService::new(
            &db,
            supervisor,
            Arc::clone(&hub),
            RunDriverConfig::default(),
        ));
        (CommandRouter::new(gateway), hub, db)
    }

    async fn next_message(rx: &mut mpsc::Receiver<Outbound>) -> ServerMessage {
        match rx.recv().await.unwrap() {
            Outbound::Message(msg) => msg,
            Outbound::Ping => panic!("unexpected ping"),
        }
    }

    #[tokio::test]
    async fn test_commands_require_auth_first() {
        let (router, hub, _db) = setup().await;
        let (conn, mut rx) = hub.register();

        router
            .handle_message(
                conn,
                ClientMessage::TelegramCommand {
                    action: TelegramAction::Connect,
                    session_id: 1,
                    params: None,
                },
            )
            .await;

        match next_message(&mut rx).await {
            ServerMessage::Error { message } => assert_eq!(message, "not authenticated"),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_auth_unknown_user_fails() {
        let (router, hub, _db) = setup().await;
        let (conn, mut rx) = hub.register();

        router
            .handle_message(conn, ClientMessage::Auth { user_id: 999 })
            .await;

        assert!(matches!(
            next_message(&mut rx).await,
            ServerMessage::Error { .. }
        ));
        assert_eq!(hub.user_of(conn), None);
    }

    #[tokio::test]
    async fn test_auth_success_binds_connection() {
        let (router, hub, db) = setup().await;
        let user = UserRepository::new(db.pool().clone())
            .create("alice")
            .await
            .unwrap();
        let (conn, mut rx) = hub.register();

        router
            .handle_message(conn, ClientMessage::Auth { user_id: user.id })
            .await;

        match next_message(&mut rx).await {
            ServerMessage::AuthSuccess { user_id } => assert_eq!(user_id, user.id),
            other => panic!("unexpected message: {:?}", other),
        }
        assert_eq!(hub.user_of(conn), Some(user.id));
    }

    #[tokio::test]
    async fn test_telegram_command_with_worker_down_reports_failure() {
        let (router, hub, db) = setup().await;
        let user = UserRepository::new(db.pool().clone())
            .create("alice")
            .await
            .unwrap();
        let (conn, mut rx) = hub.register();
        hub.authenticate(conn, user.id);

        router
            .handle_message(
                conn,
                ClientMessage::TelegramCommand {
                    action: TelegramAction::Connect,
                    session_id: 12345,
                    params: None,
                },
            )
            .await;

        match next_message(&mut rx).await {
            ServerMessage::TelegramResponse {
                success, error, ..
            } => {
                assert!(!success);
                assert!(error.is_some());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_editor_command_missing_id_is_rejected() {
        let (router, hub, db) = setup().await;
        let user = UserRepository::new(db.pool().clone())
            .create("alice")
            .await
            .unwrap();
        let (conn, mut rx) = hub.register();
        hub.authenticate(conn, user.id);

        router
            .handle_message(
                conn,
                ClientMessage::EditorCommand {
                    action: EditorAction::StartTask,
                    chain_id: None,
                    task_id: None,
                },
            )
            .await;

        match next_message(&mut rx).await {
            ServerMessage::EditorResponse { success, error, .. } => {
                assert!(!success);
                assert!(error.unwrap().contains("chainId"));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
