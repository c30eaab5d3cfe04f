//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tgdeck::chains::ChainRepository;
use tgdeck::db::Database;
use tgdeck::gateway::GatewayService;
use tgdeck::sessions::NewBotSession;
use tgdeck::tasks::RunDriverConfig;
use tgdeck::user::UserRepository;
use tgdeck::worker::{ChannelConfig, SupervisorConfig, WorkerState, WorkerSupervisor};
use tgdeck::ws::Hub;

/// Worker stand-in: reports ready, then acknowledges every command with a
/// success response carrying the command's own request id.
pub const ECHO_WORKER: &str = r#"
printf '{"type":"status","status":"ready"}\n'
while read line; do
  id=$(printf '%s' "$line" | sed 's/.*"requestId":"\([^"]*\)".*/\1/')
  printf '{"type":"response","requestId":"%s","success":true,"data":{}}\n' "$id"
done
"#;

/// Like [`ECHO_WORKER`], but the process dies right after its first response.
pub const DIES_AFTER_FIRST_COMMAND: &str = r#"
printf '{"type":"status","status":"ready"}\n'
read line
id=$(printf '%s' "$line" | sed 's/.*"requestId":"\([^"]*\)".*/\1/')
printf '{"type":"response","requestId":"%s","success":true,"data":{}}\n' "$id"
exit 1
"#;

pub fn worker_config(script: &str) -> SupervisorConfig {
    SupervisorConfig {
        command: "/bin/sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        ready_timeout: Duration::from_secs(2),
        shutdown_grace: Duration::from_millis(200),
        backoff_initial: Duration::from_millis(50),
        backoff_max: Duration::from_millis(200),
        max_restarts: 2,
        channel: ChannelConfig {
            command_buffer_size: 16,
            command_timeout: Duration::from_secs(2),
        },
    }
}

pub fn fast_driver() -> RunDriverConfig {
    RunDriverConfig {
        step_delay: Duration::from_millis(20),
        finish_delay: Duration::from_millis(40),
    }
}

pub struct TestApp {
    pub db: Database,
    pub gateway: Arc<GatewayService>,
    pub supervisor: Arc<WorkerSupervisor>,
    pub hub: Arc<Hub>,
}

impl TestApp {
    /// Spin up the full stack against an in-memory database and a shell
    /// script worker. Waits for the worker to come up.
    pub async fn start(worker_script: &str) -> Self {
        let db = Database::in_memory().await.unwrap();
        let supervisor = WorkerSupervisor::new(worker_config(worker_script));
        supervisor.start();

        let hub = Arc::new(Hub::new());
        let gateway = Arc::new(GatewayService::new(
            &db,
            Arc::clone(&supervisor),
            Arc::clone(&hub),
            fast_driver(),
        ));
        tokio::spawn(tgdeck::ws::router::run_event_pump(Arc::clone(&gateway)));

        let app = Self {
            db,
            gateway,
            supervisor,
            hub,
        };
        app.wait_for_worker(WorkerState::Ready).await;
        app
    }

    pub async fn wait_for_worker(&self, state: WorkerState) {
        for _ in 0..100 {
            if self.supervisor.state() == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!(
            "worker never reached {}, stuck in {}",
            state,
            self.supervisor.state()
        );
    }

    pub async fn create_user(&self, username: &str) -> i64 {
        UserRepository::new(self.db.pool().clone())
            .create(username)
            .await
            .unwrap()
            .id
    }

    pub async fn create_session(&self, owner_id: i64, name: &str) -> i64 {
        self.gateway
            .sessions()
            .create(&NewBotSession {
                owner_id,
                name: name.to_string(),
                api_id: 12345,
                api_hash: "hash".to_string(),
                session_string: "1Aa".to_string(),
            })
            .await
            .unwrap()
            .id
    }

    pub async fn create_chain(&self, owner_id: i64, name: &str) -> i64 {
        ChainRepository::new(self.db.pool().clone())
            .create(owner_id, name, "{}", None)
            .await
            .unwrap()
            .id
    }
}
