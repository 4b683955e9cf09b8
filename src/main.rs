mod aggregator;
mod api;
mod budget;
mod clock;
mod config;
mod db;
mod eligibility;
mod error;
mod fetcher;
mod overrides;
mod registry;
mod selector;
mod sentiment;
mod summarizer;
mod types;
mod verify;

use std::sync::Arc;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::aggregator::TickBuilder;
use crate::api::ApiState;
use crate::config::{Config, CHANNEL_CAPACITY};
use crate::db::{OverrideStore, TickWriter};
use crate::error::Result;
use crate::fetcher::BskyClient;
use crate::registry::RegistryRefresher;
use crate::sentiment::LexiconScorer;
use crate::summarizer::Summarizer;
use crate::verify::ChallengeStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cfg.log_level.clone())),
        )
        .init();

    info!("[BOOT] matchpulse starting on port {}", cfg.api_port);

    // SQLite is optional: without it, overrides and tick history are disabled
    // while the live stream and summaries keep working.
    let pool = match open_database(&cfg.db_path).await {
        Ok(pool) => Some(pool),
        Err(e) => {
            warn!("[BOOT] database unavailable, overrides/history disabled: {e}");
            None
        }
    };

    let client = Arc::new(BskyClient::new(&cfg)?);
    let store = OverrideStore::new(pool.clone());
    let scorer = Arc::new(LexiconScorer::new());
    let builder = Arc::new(TickBuilder::new(
        cfg.clone(),
        client.clone(),
        store.clone(),
        scorer,
    ));
    let summarizer = Arc::new(Summarizer::new(&cfg));
    let challenges = Arc::new(ChallengeStore::new(cfg.challenge_ttl_ms));

    let (tick_tx, tick_rx) = mpsc::channel(CHANNEL_CAPACITY);
    if let Some(pool) = pool.clone() {
        tokio::spawn(TickWriter::new(pool.clone(), tick_rx).run());
        tokio::spawn(RegistryRefresher::new(pool, client.clone(), &cfg).run());
    } else {
        // Drain the channel so stream sends never back up.
        tokio::spawn(async move {
            let mut rx = tick_rx;
            while rx.recv().await.is_some() {}
        });
    }

    let state = ApiState {
        cfg: Arc::new(cfg.clone()),
        pool,
        store,
        client,
        builder,
        summarizer,
        challenges,
        tick_tx,
    };

    let app = api::router(state);
    let addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("[BOOT] listening on {addr}");

    if let Err(e) = axum::serve(listener, app).await {
        error!("[BOOT] server error: {e}");
    }
    Ok(())
}

async fn open_database(db_path: &str) -> Result<sqlx::SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("[BOOT] database ready at {db_path}");
    Ok(pool)
}
