//! Gateway service: the single entry point for operator commands.
//!
//! Every operation takes the acting user's id and enforces ownership against
//! the database before anything reaches the worker or the task store. The
//! realtime layer and the HTTP surface are both thin shells over this type.

use anyhow::Result;
use log::{info, warn};
use std::sync::Arc;

use serde_json::{Value, json};
use tgdeck_worker_protocol::WorkerAction;

use crate::chains::{ChainRepository, DialogueChain};
use crate::db::Database;
use crate::error::{GatewayError, GatewayResult};
use crate::sessions::{BotSession, SessionRepository, SessionStatus};
use crate::tasks::{RunDriverConfig, Task, TaskRepository, TaskStatus, runner};
use crate::user::{User, UserRepository};
use crate::worker::WorkerSupervisor;
use crate::ws::{Hub, ServerMessage};

/// Core service wiring the database, the worker and the realtime hub.
pub struct GatewayService {
    users: UserRepository,
    sessions: SessionRepository,
    chains: ChainRepository,
    tasks: TaskRepository,
    supervisor: Arc<WorkerSupervisor>,
    hub: Arc<Hub>,
    run_driver: RunDriverConfig,
}

impl GatewayService {
    /// Assemble the service from its parts.
    pub fn new(
        db: &Database,
        supervisor: Arc<WorkerSupervisor>,
        hub: Arc<Hub>,
        run_driver: RunDriverConfig,
    ) -> Self {
        Self {
            users: UserRepository::new(db.pool().clone()),
            sessions: SessionRepository::new(db.pool().clone()),
            chains: ChainRepository::new(db.pool().clone()),
            tasks: TaskRepository::new(db.pool().clone()),
            supervisor,
            hub,
            run_driver,
        }
    }

    /// Realtime hub shared with the WebSocket layer.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Worker supervisor shared with the event pump.
    pub fn supervisor(&self) -> &Arc<WorkerSupervisor> {
        &self.supervisor
    }

    /// Session repository, for the HTTP surface.
    pub fn sessions(&self) -> &SessionRepository {
        &self.sessions
    }

    /// Chain repository, for the HTTP surface.
    pub fn chains(&self) -> &ChainRepository {
        &self.chains
    }

    /// Task repository, for the HTTP surface.
    pub fn tasks(&self) -> &TaskRepository {
        &self.tasks
    }

    /// User repository, for the HTTP surface.
    pub fn users(&self) -> &UserRepository {
        &self.users
    }

    /// Resolve a user for the auth handshake.
    pub async fn authenticate(&self, user_id: i64) -> GatewayResult<User> {
        self.users
            .get(user_id)
            .await?
            .ok_or(GatewayError::NotFound("user"))
    }

    /// Fetch a session and verify the acting user owns it.
    async fn owned_session(&self, user_id: i64, session_id: i64) -> GatewayResult<BotSession> {
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or(GatewayError::NotFound("session"))?;
        if session.owner_id != user_id {
            warn!(
                "user {} attempted to use session {} owned by {}",
                user_id, session_id, session.owner_id
            );
            return Err(GatewayError::Unauthorized);
        }
        Ok(session)
    }

    /// Fetch a chain and verify the acting user owns it.
    async fn owned_chain(&self, user_id: i64, chain_id: i64) -> GatewayResult<DialogueChain> {
        let chain = self
            .chains
            .get(chain_id)
            .await?
            .ok_or(GatewayError::NotFound("chain"))?;
        if chain.owner_id != user_id {
            warn!(
                "user {} attempted to use chain {} owned by {}",
                user_id, chain_id, chain.owner_id
            );
            return Err(GatewayError::Unauthorized);
        }
        Ok(chain)
    }

    /// Owner of a session, for routing unsolicited worker events.
    pub async fn session_owner(&self, session_id: i64) -> Result<Option<i64>> {
        Ok(self.sessions.get(session_id).await?.map(|s| s.owner_id))
    }

    /// Attach a session inside the worker and mark it active.
    pub async fn connect_session(
        &self,
        user_id: i64,
        session_id: i64,
    ) -> GatewayResult<Option<Value>> {
        let session = self.owned_session(user_id, session_id).await?;

        let params = json!({
            "apiId": session.api_id,
            "apiHash": session.api_hash,
            "sessionString": session.session_string,
        });
        let data = self
            .supervisor
            .send_command(WorkerAction::Connect, Some(session_id), Some(params))
            .await?;

        self.sessions
            .update_status(session_id, SessionStatus::Active)
            .await?;
        info!("session {} connected for user {}", session_id, user_id);
        Ok(data)
    }

    /// Detach a session from the worker and mark it inactive.
    pub async fn disconnect_session(
        &self,
        user_id: i64,
        session_id: i64,
    ) -> GatewayResult<Option<Value>> {
        self.owned_session(user_id, session_id).await?;

        let data = self
            .supervisor
            .send_command(WorkerAction::Disconnect, Some(session_id), None)
            .await?;

        self.sessions
            .update_status(session_id, SessionStatus::Inactive)
            .await?;
        info!("session {} disconnected for user {}", session_id, user_id);
        Ok(data)
    }

    /// Send a message through one of the user's connected sessions.
    pub async fn send_message(
        &self,
        user_id: i64,
        session_id: i64,
        params: Option<Value>,
    ) -> GatewayResult<Option<Value>> {
        self.owned_session(user_id, session_id).await?;

        if !self.supervisor.registry().contains(session_id) {
            return Err(GatewayError::CommandRejected(
                "session is not connected".to_string(),
            ));
        }

        self.supervisor
            .send_command(WorkerAction::SendMessage, Some(session_id), params)
            .await
    }

    /// Start a run of a dialogue chain. Returns the pending task.
    pub async fn start_task(&self, user_id: i64, chain_id: i64) -> GatewayResult<Task> {
        self.owned_chain(user_id, chain_id).await?;

        let task = self.tasks.create(chain_id).await?;
        self.chains.set_active(chain_id, true).await?;
        info!("task {} created for chain {}", task.id, chain_id);

        self.push_task_update(user_id, &task).await;
        runner::spawn_run(
            self.tasks.clone(),
            Arc::clone(&self.hub),
            user_id,
            task.id,
            self.run_driver.clone(),
        );
        Ok(task)
    }

    /// Stop a single task. Stopping an already finished task is a no-op that
    /// returns the task as it is.
    pub async fn stop_task(&self, user_id: i64, task_id: i64) -> GatewayResult<Task> {
        let task = self
            .tasks
            .get(task_id)
            .await?
            .ok_or(GatewayError::NotFound("task"))?;
        self.owned_chain(user_id, task.chain_id).await?;

        match self
            .tasks
            .finish(task_id, TaskStatus::Stopped, &["stopped by user"])
            .await?
        {
            Some(stopped) => {
                self.push_task_update(user_id, &stopped).await;
                Ok(stopped)
            }
            None => Ok(task),
        }
    }

    /// Stop every active task of a chain and deactivate the chain.
    pub async fn stop_chain(&self, user_id: i64, chain_id: i64) -> GatewayResult<Vec<Task>> {
        self.owned_chain(user_id, chain_id).await?;

        let mut stopped = Vec::new();
        for task in self.tasks.list_active_by_chain(chain_id).await? {
            if let Some(task) = self
                .tasks
                .finish(task.id, TaskStatus::Stopped, &["stopped by user"])
                .await?
            {
                self.push_task_update(user_id, &task).await;
                stopped.push(task);
            }
        }
        self.chains.set_active(chain_id, false).await?;
        info!(
            "stopped {} task(s) for chain {} on behalf of user {}",
            stopped.len(),
            chain_id,
            user_id
        );
        Ok(stopped)
    }

    /// The worker died: every session it held is implicitly disconnected.
    /// Clients are not told directly; they observe the restart through the
    /// sessions losing their active status.
    pub async fn handle_worker_crash(&self) -> Result<()> {
        let downgraded = self.sessions.mark_all_inactive().await?;
        warn!("worker crashed, marked {} session(s) inactive", downgraded);
        Ok(())
    }

    async fn push_task_update(&self, user_id: i64, task: &Task) {
        self.hub
            .send_to_user(user_id, ServerMessage::TaskUpdate { task: task.clone() })
            .await;
    }
}
