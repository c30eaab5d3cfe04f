use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{LevelFilter, info};
use tokio::net::TcpListener;

use tgdeck::api::{AppState, create_router};
use tgdeck::db::Database;
use tgdeck::gateway::GatewayService;
use tgdeck::settings::Settings;
use tgdeck::worker::WorkerSupervisor;
use tgdeck::ws::{self, Hub};

#[derive(Debug, Parser)]
#[command(author, version, about = "Realtime gateway for the userbot operator dashboard")]
struct Cli {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Reduce output to only errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the gateway server
    Serve(ServeCommand),
}

#[derive(Debug, Args)]
struct ServeCommand {
    /// Override the listen port
    #[arg(long)]
    port: Option<u16>,
}

fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        LevelFilter::Error
    } else {
        match cli.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .filter_level(level)
        .init();

    // TraceLayer emits tracing events, which the log facade does not see.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tower_http=info")),
        )
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let mut settings =
        Settings::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Command::Serve(cmd) => {
            if let Some(port) = cmd.port {
                settings.server.port = port;
            }
            serve(settings)
        }
    }
}

#[tokio::main]
async fn serve(settings: Settings) -> Result<()> {
    let db = Database::new(std::path::Path::new(&settings.database.path)).await?;

    let supervisor = WorkerSupervisor::new(settings.worker.supervisor_config());
    supervisor.start();

    let hub = Arc::new(Hub::new());
    let gateway = Arc::new(GatewayService::new(
        &db,
        Arc::clone(&supervisor),
        Arc::clone(&hub),
        settings.runner.driver_config(),
    ));

    tokio::spawn(ws::router::run_event_pump(Arc::clone(&gateway)));
    tokio::spawn(ws::hub::heartbeat_loop(
        Arc::clone(&hub),
        settings.realtime.heartbeat_interval(),
    ));

    let state = AppState::new(Arc::clone(&gateway));
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("parsing listen address")?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutting down, stopping worker");
    supervisor.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
