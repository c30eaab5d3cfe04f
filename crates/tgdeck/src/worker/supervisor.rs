//! Worker process supervisor.
//!
//! Owns the external worker child process and keeps it alive: spawn, wait for
//! the readiness handshake, watch for exit, restart with bounded exponential
//! backoff. Commands only flow while the worker is `Ready`; everything else
//! fails fast with `WorkerUnavailable` instead of queueing into the void.

use anyhow::{Context, Result};
use log::{error, info, warn};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::{Mutex, Notify, broadcast};

use tgdeck_worker_protocol::WorkerAction;

use super::WorkerSignal;
use super::channel::{ChannelConfig, CommandChannel};
use super::registry::SessionRegistry;
use crate::error::{GatewayError, GatewayResult};

/// Configuration for the worker supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Program to execute.
    pub command: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// How long to wait for the readiness line after spawn.
    pub ready_timeout: Duration,
    /// Grace period between SIGTERM and SIGKILL on shutdown.
    pub shutdown_grace: Duration,
    /// First restart delay after a crash.
    pub backoff_initial: Duration,
    /// Upper bound for the restart delay.
    pub backoff_max: Duration,
    /// Consecutive failed starts before the supervisor gives up.
    pub max_restarts: u32,
    /// Command channel settings.
    pub channel: ChannelConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            command: "python3".to_string(),
            args: vec!["telethon_manager.py".to_string()],
            ready_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(5),
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            max_restarts: 5,
            channel: ChannelConfig::default(),
        }
    }
}

/// Lifecycle state of the supervised worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Not running and not restarting.
    Stopped,
    /// Spawned, waiting for the readiness handshake.
    Starting,
    /// Handshake complete, accepting commands.
    Ready,
    /// Exited unexpectedly, restart pending.
    Crashed,
    /// Sleeping out a restart delay.
    Backoff,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Stopped => write!(f, "stopped"),
            WorkerState::Starting => write!(f, "starting"),
            WorkerState::Ready => write!(f, "ready"),
            WorkerState::Crashed => write!(f, "crashed"),
            WorkerState::Backoff => write!(f, "backoff"),
        }
    }
}

/// Supervisor for the single external worker process.
///
/// Cheap to clone; all state lives behind shared handles.
#[derive(Clone)]
pub struct WorkerSupervisor {
    config: SupervisorConfig,
    state: Arc<StdMutex<WorkerState>>,
    channel: Arc<Mutex<Option<Arc<CommandChannel>>>>,
    registry: SessionRegistry,
    signal_tx: broadcast::Sender<WorkerSignal>,
    stopping: Arc<AtomicBool>,
    stop_notify: Arc<Notify>,
}

impl WorkerSupervisor {
    /// Create a supervisor. The worker is not started until [`start`] is
    /// called.
    ///
    /// [`start`]: WorkerSupervisor::start
    pub fn new(config: SupervisorConfig) -> Arc<Self> {
        let (signal_tx, _) = broadcast::channel(256);
        Arc::new(Self {
            config,
            state: Arc::new(StdMutex::new(WorkerState::Stopped)),
            channel: Arc::new(Mutex::new(None)),
            registry: SessionRegistry::new(),
            signal_tx,
            stopping: Arc::new(AtomicBool::new(false)),
            stop_notify: Arc::new(Notify::new()),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WorkerState {
        *self.state.lock().expect("state poisoned")
    }

    fn set_state(&self, state: WorkerState) {
        *self.state.lock().expect("state poisoned") = state;
    }

    /// Registry of sessions currently attached inside the worker.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Subscribe to worker events and crash notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerSignal> {
        self.signal_tx.subscribe()
    }

    /// Start the supervision loop in the background.
    pub fn start(&self) {
        self.stopping.store(false, Ordering::SeqCst);
        let this = self.clone();
        tokio::spawn(async move {
            this.supervise().await;
        });
    }

    /// Stop the worker and the supervision loop.
    ///
    /// Idempotent. Returns once the child has been reaped and the loop has
    /// parked in `Stopped`.
    pub async fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        // notify_one stores a permit, so a stop that lands between two waits
        // is picked up by the next one instead of being lost.
        self.stop_notify.notify_one();

        // Wait for the loop to drop the channel and settle.
        for _ in 0..600 {
            if self.state() == WorkerState::Stopped {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        warn!("worker supervisor did not reach stopped state in time");
    }

    /// Send a correlated command to the worker.
    ///
    /// Fails with `WorkerUnavailable` unless the worker is `Ready`.
    pub async fn send_command(
        &self,
        action: WorkerAction,
        session_id: Option<i64>,
        params: Option<serde_json::Value>,
    ) -> GatewayResult<Option<serde_json::Value>> {
        if self.state() != WorkerState::Ready {
            return Err(GatewayError::WorkerUnavailable);
        }
        let channel = {
            let guard = self.channel.lock().await;
            guard.clone().ok_or(GatewayError::WorkerUnavailable)?
        };
        channel.send(action, session_id, params).await
    }

    async fn supervise(&self) {
        let mut failures: u32 = 0;
        let mut backoff = self.config.backoff_initial;

        loop {
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }

            match self.run_once().await {
                Ok(clean_stop) => {
                    if clean_stop {
                        break;
                    }
                    // Exited after reaching ready: crash, restart from the
                    // initial delay.
                    failures = 0;
                    backoff = self.config.backoff_initial;
                }
                Err(e) => {
                    error!("worker start failed: {:?}", e);
                    failures += 1;
                }
            }

            self.on_worker_gone();

            if self.stopping.load(Ordering::SeqCst) {
                break;
            }
            if failures > self.config.max_restarts {
                error!(
                    "worker failed to start {} times in a row, giving up",
                    failures
                );
                break;
            }

            self.set_state(WorkerState::Backoff);
            info!("restarting worker in {:?}", backoff);
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = self.stop_notify.notified() => break,
            }
            backoff = (backoff * 2).min(self.config.backoff_max);
        }

        self.clear_channel().await;
        self.registry.clear();
        self.set_state(WorkerState::Stopped);
    }

    /// Spawn the worker once and wait until it exits or a stop is requested.
    ///
    /// Returns `Ok(true)` for a requested stop, `Ok(false)` for a crash after
    /// a successful handshake, and `Err` if the handshake itself failed.
    async fn run_once(&self) -> Result<bool> {
        self.set_state(WorkerState::Starting);
        info!(
            "starting worker: {} {}",
            self.config.command,
            self.config.args.join(" ")
        );

        let mut child = Command::new(&self.config.command)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning worker process '{}'", self.config.command))?;

        let stdin = child.stdin.take().context("worker stdin not piped")?;
        let stdout = child.stdout.take().context("worker stdout not piped")?;

        let (channel, ready_rx) = CommandChannel::attach(
            stdin,
            stdout,
            self.registry.clone(),
            self.signal_tx.clone(),
            self.config.channel.clone(),
        );

        let ready = tokio::select! {
            r = tokio::time::timeout(self.config.ready_timeout, ready_rx) => r,
            _ = self.stop_notify.notified() => {
                self.terminate(&mut child).await;
                return Ok(true);
            }
        };
        match ready {
            Ok(Ok(())) => {}
            Ok(Err(_)) | Err(_) => {
                self.terminate(&mut child).await;
                anyhow::bail!("worker exited or stalled before reporting ready");
            }
        }

        *self.channel.lock().await = Some(channel);
        self.set_state(WorkerState::Ready);
        info!("worker is ready");

        tokio::select! {
            status = child.wait() => {
                match status {
                    Ok(status) => warn!("worker exited unexpectedly: {}", status),
                    Err(e) => error!("failed to wait on worker: {:?}", e),
                }
                self.set_state(WorkerState::Crashed);
                let _ = self.signal_tx.send(WorkerSignal::Crashed);
                Ok(false)
            }
            _ = self.stop_notify.notified() => {
                self.disconnect_all().await;
                self.clear_channel().await;
                self.terminate(&mut child).await;
                Ok(true)
            }
        }
    }

    /// Best-effort detach of every registered session before shutdown, so
    /// the worker can close its Telegram connections cleanly. Failures are
    /// logged and do not delay the kill beyond the grace period per session.
    async fn disconnect_all(&self) {
        let channel = { self.channel.lock().await.clone() };
        let Some(channel) = channel else {
            return;
        };
        for session_id in self.registry.snapshot() {
            let result = tokio::time::timeout(
                self.config.shutdown_grace,
                channel.send(WorkerAction::Disconnect, Some(session_id), None),
            )
            .await;
            match result {
                Ok(Ok(_)) => info!("session {} detached before shutdown", session_id),
                Ok(Err(e)) => {
                    warn!("failed to detach session {} on shutdown: {}", session_id, e)
                }
                Err(_) => warn!("timed out detaching session {} on shutdown", session_id),
            }
        }
    }

    /// SIGTERM first, SIGKILL after the grace period.
    async fn terminate(&self, child: &mut tokio::process::Child) {
        if let Some(pid) = child.id() {
            // SAFETY: signalling our own child by pid.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
            match tokio::time::timeout(self.config.shutdown_grace, child.wait()).await {
                Ok(_) => return,
                Err(_) => warn!("worker ignored SIGTERM, killing"),
            }
        }
        if let Err(e) = child.kill().await {
            warn!("failed to kill worker: {:?}", e);
        }
        let _ = child.wait().await;
    }

    async fn clear_channel(&self) {
        self.channel.lock().await.take();
    }

    /// Worker-side state is gone with the process.
    fn on_worker_gone(&self) {
        self.registry.clear();
    }
}
