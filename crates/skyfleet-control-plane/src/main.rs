mod api;
mod config;
mod db;

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use clap::{Args, Parser, Subcommand};
use skyfleet_scheduler::{BroadcastSink, ExecutionEngine, SchedulingRegistry, SimulatedExecutor};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::api::AppState;
use crate::config::{Config, Overrides};
use crate::db::SqliteStore;

#[derive(Debug, Parser)]
#[command(name = "skyfleet-control-plane", about = "Skyfleet mission control-plane service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Serve(ServeArgs),
}

#[derive(Debug, Args)]
struct ServeArgs {
    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    db_path: Option<PathBuf>,
    /// Seconds each simulated mission run takes.
    #[arg(long)]
    work_duration_secs: Option<u64>,
}

impl From<ServeArgs> for Overrides {
    fn from(args: ServeArgs) -> Self {
        Self {
            config: args.config,
            port: args.port,
            db_path: args.db_path,
            work_duration_secs: args.work_duration_secs,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match Cli::parse().command {
        Command::Serve(args) => serve(Config::resolve(args.into())?).await?,
    }

    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    let store = SqliteStore::new(db::init_db(&config.db_path)?);
    let events = BroadcastSink::new(config.event_buffer);
    let engine = ExecutionEngine::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(SimulatedExecutor::new(config.work_duration)),
        Arc::new(events.clone()),
    );
    let registry = SchedulingRegistry::new(engine);
    restore_schedules(&store, &registry).await?;

    let state = AppState { store, registry: registry.clone(), events };
    let app = api::router(state).layer(cors_layer(config.cors_origin.as_deref())?);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("control-plane listening on http://{}", addr);
    info!("sqlite database at {}", config.db_path.display());
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    registry.shutdown().await;
    Ok(())
}

/// Re-registers jobs for missions that can still fire after a restart.
/// Stopped schedules stay stopped.
async fn restore_schedules(store: &SqliteStore, registry: &SchedulingRegistry) -> Result<()> {
    let missions = {
        let db = store.lock().await;
        db::query_restorable_missions(&db)?
    };

    let mut restored = 0usize;
    for mission in missions {
        let mission_id = mission.id;
        match registry.schedule(mission).await {
            Ok(_) => restored += 1,
            Err(err) => warn!(%mission_id, error = %err, "could not restore mission schedule"),
        }
    }
    info!(restored, "restored mission schedules");
    Ok(())
}

fn cors_layer(origin: Option<&str>) -> Result<CorsLayer> {
    let Some(origin) = origin else {
        return Ok(CorsLayer::permissive());
    };
    let origin = origin
        .parse::<HeaderValue>()
        .with_context(|| format!("invalid cors_origin {origin:?}"))?;
    Ok(CorsLayer::new().allow_origin(origin).allow_methods(Any).allow_headers(Any))
}
