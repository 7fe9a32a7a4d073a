//! Ingate event-ingestion gateway.
//!
//! Main entry point. Initializes tracing, loads configuration, establishes
//! the database pool and Redis connection, wires the ingestion pipeline,
//! and serves HTTP until shutdown.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use ingate_api::{config::CounterBackend, AppState, Config};
use ingate_core::Storage;
use ingate_pipeline::{
    CounterStore, EventPipeline, MemoryCounterStore, PostgresDirectory, PostgresEventStore,
    RedisCounterStore, RedisStreamBroker,
};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting Ingate event-ingestion gateway");

    let config = Config::load()?;
    info!(
        database_url = %config.database_url_masked(),
        host = %config.host,
        port = config.port,
        counter_backend = ?config.counter_backend,
        broker_channel = %config.broker_channel,
        "Configuration loaded"
    );

    let db_pool = create_database_pool(&config).await?;
    info!("Database connection pool established");

    run_migrations(&db_pool).await?;
    info!("Database migrations completed");

    let redis = redis::Client::open(config.redis_url.as_str())
        .context("Invalid Redis URL")?
        .get_connection_manager()
        .await
        .context("Failed to connect to Redis")?;
    info!("Redis connection established");

    let storage = Arc::new(Storage::new(db_pool.clone()));
    let counters: Arc<dyn CounterStore> = match config.counter_backend {
        CounterBackend::Memory => Arc::new(MemoryCounterStore::new()),
        CounterBackend::Redis => Arc::new(RedisCounterStore::new(redis.clone())),
    };

    let pipeline = EventPipeline::new(
        config.to_pipeline_config(),
        Arc::new(PostgresDirectory::new(storage.clone())),
        counters,
        Arc::new(PostgresEventStore::new(storage.clone())),
        Arc::new(RedisStreamBroker::new(redis)),
    )
    .map_err(|e| anyhow::anyhow!("{e}"))?;

    let state = AppState { pipeline: Arc::new(pipeline), storage };
    let addr = config.parse_server_addr()?;
    let request_timeout = Duration::from_secs(config.request_timeout);

    info!(addr = %addr, "Ingate is ready to receive events");
    ingate_api::start_server(state, addr, request_timeout).await?;

    db_pool.close().await;
    info!("Database connections closed");

    info!("Ingate shutdown complete");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,ingate=debug,tower_http=debug"))
        .expect("Invalid RUST_LOG environment variable");

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Creates the database connection pool with retry logic.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    let mut retries = 0;
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    loop {
        match PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connection_timeout))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => {
                sqlx::query("SELECT 1")
                    .fetch_one(&pool)
                    .await
                    .context("Failed to verify database connection")?;

                return Ok(pool);
            },
            Err(_e) if retries < MAX_RETRIES => {
                retries += 1;
                info!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    "Database connection failed, retrying..."
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("Failed to create database connection pool after retries");
            },
        }
    }
}

/// Runs database migrations.
async fn run_migrations(pool: &sqlx::PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS principals (
            id UUID PRIMARY KEY,
            owner_id UUID NOT NULL,
            label TEXT NOT NULL,
            active BOOLEAN NOT NULL DEFAULT TRUE,
            key_preview TEXT NOT NULL,
            key_digest TEXT NOT NULL,
            rate_limit_max BIGINT,
            rate_limit_window_secs BIGINT,
            last_used_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create principals table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS gateway_events (
            id UUID PRIMARY KEY,
            principal_id UUID NOT NULL,
            subject_id TEXT NOT NULL,
            event_type TEXT NOT NULL,
            payload JSONB NOT NULL,
            signature TEXT NOT NULL,
            received_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create gateway_events table")?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_principals_preview
        ON principals(key_preview)
        WHERE active = TRUE
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create principals preview index")?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_gateway_events_principal
        ON gateway_events(principal_id, received_at DESC)
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create gateway_events principal index")?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_gateway_events_subject
        ON gateway_events(subject_id, received_at DESC)
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create gateway_events subject index")?;

    Ok(())
}
