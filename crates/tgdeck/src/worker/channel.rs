//! Correlated command channel to the worker process.
//!
//! Turns the worker's line-oriented stdio into addressable async calls: every
//! outbound command carries a unique request id, and responses are matched
//! against a pending map keyed by that id. A single writer task owns stdin so
//! concurrent senders can never interleave partial lines.

use anyhow::Context;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};

use tgdeck_worker_protocol::{WorkerAction, WorkerCommand, WorkerMessage, WorkerResponse};

use super::WorkerSignal;
use super::registry::SessionRegistry;
use crate::error::{GatewayError, GatewayResult};

/// Configuration for the command channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Buffer size for the serialized-command queue feeding the writer task.
    pub command_buffer_size: usize,
    /// How long to wait for a correlated response before failing the call.
    pub command_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 64,
            command_timeout: Duration::from_secs(30),
        }
    }
}

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<WorkerResponse>>>>;

/// Channel for exchanging correlated request/response pairs with the worker.
pub struct CommandChannel {
    command_tx: mpsc::Sender<String>,
    pending: PendingMap,
    registry: SessionRegistry,
    request_counter: AtomicU64,
    command_timeout: Duration,
}

impl CommandChannel {
    /// Attach a channel to the worker's stdio streams.
    ///
    /// Spawns the stdin writer and stdout reader tasks. Returns the channel
    /// and a receiver resolved once the worker emits its readiness line.
    pub fn attach<W, R>(
        stdin: W,
        stdout: R,
        registry: SessionRegistry,
        signal_tx: broadcast::Sender<WorkerSignal>,
        config: ChannelConfig,
    ) -> (Arc<Self>, oneshot::Receiver<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::channel::<String>(config.command_buffer_size);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (ready_tx, ready_rx) = oneshot::channel();

        tokio::spawn(Self::stdin_writer_task(stdin, command_rx));
        tokio::spawn(Self::stdout_reader_task(
            stdout,
            signal_tx,
            Arc::clone(&pending),
            ready_tx,
        ));

        let channel = Arc::new(Self {
            command_tx,
            pending,
            registry,
            request_counter: AtomicU64::new(0),
            command_timeout: config.command_timeout,
        });

        (channel, ready_rx)
    }

    /// Generate a unique request id.
    fn next_request_id(&self) -> String {
        let n = self.request_counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("req-{}", n)
    }

    /// Send a command to the worker and wait for its correlated response.
    ///
    /// On success, connect/disconnect commands update the session registry —
    /// exactly once, never speculatively on send. A timed-out call removes
    /// its pending entry so a late response is discarded with no effect.
    pub async fn send(
        &self,
        action: WorkerAction,
        session_id: Option<i64>,
        params: Option<serde_json::Value>,
    ) -> GatewayResult<Option<serde_json::Value>> {
        let request_id = self.next_request_id();
        let command = WorkerCommand {
            action,
            session_id,
            params,
            request_id: request_id.clone(),
        };
        let line = serde_json::to_string(&command).context("serializing worker command")?;

        let (response_tx, response_rx) = oneshot::channel();
        self.pending
            .lock()
            .await
            .insert(request_id.clone(), response_tx);

        if self.command_tx.send(line).await.is_err() {
            // Writer task is gone, so the worker is too.
            self.pending.lock().await.remove(&request_id);
            return Err(GatewayError::WorkerUnavailable);
        }

        let response = match tokio::time::timeout(self.command_timeout, response_rx).await {
            Ok(Ok(response)) => response,
            // Reader task dropped the pending map: worker died mid-flight.
            Ok(Err(_)) => return Err(GatewayError::WorkerUnavailable),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                debug!("command {} ({}) timed out", request_id, action);
                return Err(GatewayError::CommandTimeout);
            }
        };

        if !response.success {
            return Err(GatewayError::CommandRejected(
                response.error.unwrap_or_else(|| "command failed".to_string()),
            ));
        }

        if let Some(session_id) = session_id {
            match action {
                WorkerAction::Connect => self.registry.insert(session_id),
                WorkerAction::Disconnect => self.registry.remove(session_id),
                WorkerAction::SendMessage => {}
            }
        }

        Ok(response.data)
    }

    /// Number of commands currently awaiting a response.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    async fn stdin_writer_task(mut stdin: impl AsyncWrite + Unpin, mut command_rx: mpsc::Receiver<String>) {
        debug!("worker stdin writer task started");
        while let Some(command) = command_rx.recv().await {
            let line = format!("{}\n", command);
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                error!("failed to write to worker stdin: {:?}", e);
                break;
            }
            if let Err(e) = stdin.flush().await {
                error!("failed to flush worker stdin: {:?}", e);
                break;
            }
        }
        debug!("worker stdin writer task ended");
    }

    async fn stdout_reader_task(
        stdout: impl AsyncRead + Unpin,
        signal_tx: broadcast::Sender<WorkerSignal>,
        pending: PendingMap,
        ready_tx: oneshot::Sender<()>,
    ) {
        let reader = BufReader::new(stdout);
        let mut lines = reader.lines();
        let mut ready_tx = Some(ready_tx);

        debug!("worker stdout reader task started");

        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }

            match WorkerMessage::parse(&line) {
                Ok(WorkerMessage::Status(status)) => {
                    if status.is_ready() {
                        info!("worker reported ready");
                        if let Some(tx) = ready_tx.take() {
                            let _ = tx.send(());
                        }
                    } else {
                        debug!("worker status: {}", status.status);
                    }
                }
                Ok(WorkerMessage::Response(response)) => {
                    let Some(request_id) = response.request_id.clone() else {
                        warn!("worker response without request id, discarding");
                        continue;
                    };
                    if let Some(tx) = pending.lock().await.remove(&request_id) {
                        let _ = tx.send(response);
                    } else {
                        // Late reply for a timed-out command, or an id we
                        // never issued. Either way it has no effect.
                        warn!("discarding response for unknown request id {}", request_id);
                    }
                }
                Ok(WorkerMessage::Event(event)) => {
                    let _ = signal_tx.send(WorkerSignal::Event(event));
                }
                Err(e) => {
                    let display: String = line.chars().take(200).collect();
                    warn!("skipping malformed worker output: {:?}, line: {}", e, display);
                }
            }
        }

        // EOF: the worker is gone. Fail every in-flight command by dropping
        // its oneshot sender.
        pending.lock().await.clear();
        debug!("worker stdout reader task ended");
    }
}
