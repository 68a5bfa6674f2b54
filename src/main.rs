mod api;
mod client;
mod config;
mod db;
mod error;
mod markets;
mod state;
mod sync;
mod transform;
mod types;

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::{router, ApiState};
use crate::config::{Config, CHANNEL_CAPACITY};
use crate::db::DbWriter;
use crate::error::Result;
use crate::state::MatchStore;
use crate::sync::{SyncEngine, SyncScheduler};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database mirror ---
    let pool = sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", cfg.db_path)).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {}", cfg.db_path);

    // --- Canonical store ---
    let store = MatchStore::new();

    // --- Persistence side channel ---
    let (persist_tx, persist_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let writer = DbWriter::new(pool.clone(), persist_rx);
    tokio::spawn(async move { writer.run().await });

    // --- Sync engine + in-process scheduler ---
    let engine = Arc::new(SyncEngine::new(&cfg, Arc::clone(&store), Some(persist_tx))?);
    let scheduler = SyncScheduler::new(Arc::clone(&engine), cfg.sync_interval_secs);
    tokio::spawn(async move { scheduler.run().await });
    if cfg.sync_interval_secs > 0 {
        info!(
            "sync scheduler running every {}s (targets: live, upcoming, completed)",
            cfg.sync_interval_secs
        );
    }

    // --- HTTP API ---
    let api_state = ApiState {
        store: Arc::clone(&store),
        engine,
        cron_secret: cfg.cron_secret.clone(),
        operator_tokens: cfg.operator_tokens.clone(),
        admin_tokens: cfg.admin_tokens.clone(),
        started_at: Utc::now(),
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
