use std::sync::Arc;

use routine_tracker::storage::{seed_item, SCHEDULE_KEY, TOC_KEY};
use routine_tracker::{Config, SqliteStorage, Storage, SystemClock, TrackerRuntime};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Routine tracker HTTP API
/// Schedule is read-only here; the tracker log is the only thing written
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,routine_tracker=debug")),
        )
        .with_target(true)
        .init();

    if let Err(e) = run().await {
        error!(error = %e, kind = e.label(), "routine_tracker_failed");
        std::process::exit(1);
    }
}

async fn run() -> routine_tracker::Result<()> {
    let config = Config::from_env()?;
    info!(?config, "config_loaded");

    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open(&config.database_path)?);
    if let Some(path) = &config.schedule_seed {
        seed_item(storage.as_ref(), SCHEDULE_KEY, path)?;
    }
    if let Some(path) = &config.toc_seed {
        seed_item(storage.as_ref(), TOC_KEY, path)?;
    }

    let runtime = TrackerRuntime::start(storage, Arc::new(SystemClock), config.tick_interval)?;
    let app = runtime.router();

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "server_listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "shutdown_signal_failed");
            }
        })
        .await?;

    runtime.shutdown().await;
    info!("server_stopped");
    Ok(())
}
