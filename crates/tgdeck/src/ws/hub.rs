//! Connection hub for the realtime layer.
//!
//! Tracks every open socket, indexes authenticated connections by user, and
//! enforces liveness with a ping sweep: a connection that misses one full
//! heartbeat interval without answering is dropped.

use dashmap::DashMap;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::types::ServerMessage;

/// Size of the per-connection send buffer.
const CONNECTION_BUFFER_SIZE: usize = 64;

/// Identifier for a single socket.
pub type ConnectionId = Uuid;

/// Frames the hub hands to a connection's send task.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// JSON payload for the client.
    Message(ServerMessage),
    /// Transport-level ping for the liveness sweep.
    Ping,
}

struct ConnectionEntry {
    tx: mpsc::Sender<Outbound>,
    user_id: Option<i64>,
    alive: AtomicBool,
}

/// Registry of live WebSocket connections.
#[derive(Default)]
pub struct Hub {
    connections: DashMap<ConnectionId, ConnectionEntry>,
    /// User id -> connection ids of their authenticated sockets.
    user_index: DashMap<i64, HashSet<ConnectionId>>,
}

impl Hub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new, not yet authenticated connection.
    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(CONNECTION_BUFFER_SIZE);
        let conn_id = Uuid::new_v4();
        self.connections.insert(
            conn_id,
            ConnectionEntry {
                tx,
                user_id: None,
                alive: AtomicBool::new(true),
            },
        );
        debug!("registered connection {}", conn_id);
        (conn_id, rx)
    }

    /// Bind a connection to a user after a successful auth handshake.
    pub fn authenticate(&self, conn_id: ConnectionId, user_id: i64) {
        let mut moved_from = None;
        if let Some(mut entry) = self.connections.get_mut(&conn_id) {
            moved_from = entry.user_id.replace(user_id);
        } else {
            return;
        }
        if let Some(previous) = moved_from {
            if let Some(mut conns) = self.user_index.get_mut(&previous) {
                conns.remove(&conn_id);
            }
            self.user_index.retain(|_, conns| !conns.is_empty());
        }
        self.user_index.entry(user_id).or_default().insert(conn_id);
        info!("connection {} authenticated as user {}", conn_id, user_id);
    }

    /// The user a connection authenticated as, if any.
    pub fn user_of(&self, conn_id: ConnectionId) -> Option<i64> {
        self.connections.get(&conn_id).and_then(|e| e.user_id)
    }

    /// Remove a connection and its user index entry.
    pub fn unregister(&self, conn_id: ConnectionId) {
        let Some((_, entry)) = self.connections.remove(&conn_id) else {
            return;
        };
        if let Some(user_id) = entry.user_id {
            if let Some(mut conns) = self.user_index.get_mut(&user_id) {
                conns.remove(&conn_id);
            }
            self.user_index.retain(|_, conns| !conns.is_empty());
        }
        debug!("unregistered connection {}", conn_id);
    }

    /// Record a pong from a connection.
    pub fn pong(&self, conn_id: ConnectionId) {
        if let Some(entry) = self.connections.get(&conn_id) {
            entry.alive.store(true, Ordering::Relaxed);
        }
    }

    /// Send a message to one connection. Returns `false` if it is gone or its
    /// buffer is full.
    pub async fn send_to_connection(&self, conn_id: ConnectionId, message: ServerMessage) -> bool {
        let tx = match self.connections.get(&conn_id) {
            Some(entry) => entry.tx.clone(),
            None => return false,
        };
        tx.send(Outbound::Message(message)).await.is_ok()
    }

    /// Send a message to every authenticated connection of a user.
    ///
    /// Returns the number of connections the message was queued for.
    pub async fn send_to_user(&self, user_id: i64, message: ServerMessage) -> usize {
        let conn_ids: Vec<ConnectionId> = match self.user_index.get(&user_id) {
            Some(conns) => conns.iter().copied().collect(),
            None => return 0,
        };
        let mut delivered = 0;
        for conn_id in conn_ids {
            if self.send_to_connection(conn_id, message.clone()).await {
                delivered += 1;
            } else {
                warn!("dropping send to stale connection {}", conn_id);
            }
        }
        delivered
    }

    /// One heartbeat round.
    ///
    /// Connections that never answered the previous round's ping are dropped;
    /// everyone else is marked unconfirmed and pinged again. Returns the ids
    /// of the connections that were dropped.
    pub async fn sweep(&self) -> Vec<ConnectionId> {
        let mut stale = Vec::new();
        let mut live = Vec::new();
        for entry in self.connections.iter() {
            if entry.alive.swap(false, Ordering::Relaxed) {
                live.push((*entry.key(), entry.tx.clone()));
            } else {
                stale.push(*entry.key());
            }
        }

        for conn_id in &stale {
            info!("dropping unresponsive connection {}", conn_id);
            self.unregister(*conn_id);
        }
        for (conn_id, tx) in live {
            if tx.send(Outbound::Ping).await.is_err() {
                self.unregister(conn_id);
            }
        }
        stale
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of authenticated connections for a user.
    pub fn user_connection_count(&self, user_id: i64) -> usize {
        self.user_index.get(&user_id).map(|c| c.len()).unwrap_or(0)
    }

    /// Number of users with at least one authenticated connection.
    pub fn user_count(&self) -> usize {
        self.user_index.len()
    }
}

/// Run the periodic liveness sweep until the hub is dropped.
pub async fn heartbeat_loop(hub: Arc<Hub>, interval: std::time::Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so fresh connections get a
    // full interval before their first ping.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        hub.sweep().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(outbound: Outbound) -> ServerMessage {
        match outbound {
            Outbound::Message(msg) => msg,
            Outbound::Ping => panic!("expected a message, got a ping"),
        }
    }

    #[tokio::test]
    async fn test_send_to_user_reaches_all_their_sockets() {
        let hub = Hub::new();
        let (conn_a, mut rx_a) = hub.register();
        let (conn_b, mut rx_b) = hub.register();
        let (_conn_other, mut rx_other) = hub.register();
        hub.authenticate(conn_a, 1);
        hub.authenticate(conn_b, 1);

        let delivered = hub
            .send_to_user(1, ServerMessage::AuthSuccess { user_id: 1 })
            .await;
        assert_eq!(delivered, 2);

        for rx in [&mut rx_a, &mut rx_b] {
            match text_of(rx.recv().await.unwrap()) {
                ServerMessage::AuthSuccess { user_id } => assert_eq!(user_id, 1),
                other => panic!("unexpected message: {:?}", other),
            }
        }
        // The unauthenticated socket sees nothing.
        assert!(rx_other.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_to_other_user_does_not_leak() {
        let hub = Hub::new();
        let (conn_a, mut rx_a) = hub.register();
        let (conn_b, mut rx_b) = hub.register();
        hub.authenticate(conn_a, 1);
        hub.authenticate(conn_b, 2);

        hub.send_to_user(2, ServerMessage::Error { message: "x".into() })
            .await;
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_unregister_removes_from_index() {
        let hub = Hub::new();
        let (conn, _rx) = hub.register();
        hub.authenticate(conn, 1);
        assert_eq!(hub.user_connection_count(1), 1);

        hub.unregister(conn);
        assert_eq!(hub.user_connection_count(1), 0);
        assert_eq!(hub.connection_count(), 0);
        assert_eq!(
            hub.send_to_user(1, ServerMessage::AuthSuccess { user_id: 1 })
                .await,
            0
        );
    }

    #[tokio::test]
    async fn test_reauthenticating_prunes_previous_user_entry() {
        let hub = Hub::new();
        let (conn, _rx) = hub.register();
        hub.authenticate(conn, 1);
        assert_eq!(hub.user_count(), 1);

        hub.authenticate(conn, 2);
        assert_eq!(hub.user_count(), 1);
        assert_eq!(hub.user_connection_count(1), 0);
        assert_eq!(hub.user_connection_count(2), 1);
        assert_eq!(
            hub.send_to_user(1, ServerMessage::AuthSuccess { user_id: 1 })
                .await,
            0
        );
    }

    #[tokio::test]
    async fn test_swept_connection_channel_closes() {
        let hub = Hub::new();
        let (_conn, mut rx) = hub.register();

        // Never answers a ping, so the second sweep drops it.
        hub.sweep().await;
        hub.sweep().await;

        // Drain the queued ping, then the channel itself must be closed so
        // the connection's send task (and with it the socket) shuts down.
        while let Some(outbound) = rx.recv().await {
            assert!(matches!(outbound, Outbound::Ping));
        }
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_sweep_drops_silent_connections() {
        let hub = Hub::new();
        let (conn_quiet, _rx_quiet) = hub.register();
        let (conn_chatty, mut rx_chatty) = hub.register();

        // Round one: both get pinged, nobody is dropped yet.
        assert!(hub.sweep().await.is_empty());
        assert!(matches!(rx_chatty.recv().await.unwrap(), Outbound::Ping));

        // Only one connection answers.
        hub.pong(conn_chatty);

        let dropped = hub.sweep().await;
        assert_eq!(dropped, vec![conn_quiet]);
        assert_eq!(hub.connection_count(), 1);
        assert!(matches!(rx_chatty.recv().await.unwrap(), Outbound::Ping));
    }
}
