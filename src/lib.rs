pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use tokio::sync::watch;

use crate::core::clock::SystemClock;
use crate::core::{
    config::Settings,
    redis::RedisHandle,
    state::{AppState, Backends},
    telemetry,
};
use crate::repositories::PgCatalog;
use crate::services::session::{MemoryStore, PersistenceStore, RedisStore};
use crate::services::shuffle::SeededShuffle;

pub async fn run() -> anyhow::Result<()> {
    let (state, redis) = bootstrap().await?;

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        "LMS exam API listening"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ticker = tokio::spawn(tasks::scheduler::session_ticker(state.clone(), shutdown_rx));

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(core::shutdown::shutdown_and_notify(shutdown_tx))
        .await;

    // A failed serve never fires the shutdown signal.
    if result.is_err() {
        ticker.abort();
    } else if let Err(err) = ticker.await {
        tracing::error!(error = %err, "Session ticker join failed");
    }

    redis.disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}

pub async fn run_worker() -> anyhow::Result<()> {
    let (state, redis) = bootstrap().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweep = tokio::spawn(tasks::scheduler::assignment_sweep(state, shutdown_rx));

    core::shutdown::shutdown_and_notify(shutdown_tx).await;
    if let Err(err) = sweep.await {
        tracing::error!(error = %err, "Assignment sweep join failed");
    }

    redis.disconnect().await;
    tracing::info!("Redis disconnected");

    Ok(())
}

async fn bootstrap() -> anyhow::Result<(AppState, RedisHandle)> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let redis = RedisHandle::new(settings.redis().redis_url());
    let store: Arc<dyn PersistenceStore> = match redis.connect().await {
        Ok(()) => {
            tracing::info!("Redis connected successfully");
            Arc::new(RedisStore::new(redis.clone()))
        }
        Err(err) => {
            tracing::error!(
                error = %err,
                "Failed to connect to Redis; attempt state will not survive a restart"
            );
            Arc::new(MemoryStore::default())
        }
    };

    let state = AppState::new(
        settings,
        Backends {
            catalog: Arc::new(PgCatalog::new(db_pool)),
            store,
            redis: redis.clone(),
            clock: Arc::new(SystemClock),
            shuffle: Arc::new(SeededShuffle::from_entropy()),
        },
    );

    Ok((state, redis))
}
