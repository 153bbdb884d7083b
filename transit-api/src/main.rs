use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transit_api::{app, worker, AppState};
use transit_core::notification::TracingNotifier;
use transit_core::Notifier;
use transit_store::app_config::Config;
use transit_store::{DbClient, EventProducer, KafkaNotifier, MemoryStore, RedisClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "transit_api=debug,transit_reservation=debug,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting transit booking API on port {}", config.server.port);

    // Postgres when configured, otherwise everything lives in memory.
    let (db, stores, business_rules) = match &config.database {
        Some(db_config) => {
            let db = DbClient::new(db_config)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            let rules = db
                .fetch_business_rules(config.business_rules.clone())
                .await
                .context("Failed to load business rules")?;
            let stores = db.stores();
            (Some(db), stores, rules)
        }
        None => {
            tracing::warn!("No [database] configured, using the in-memory store");
            (None, MemoryStore::new().stores(), config.business_rules.clone())
        }
    };

    let notifier: Arc<dyn Notifier> = match &config.kafka {
        Some(kafka) => {
            let producer = EventProducer::new(&kafka.brokers).context("Failed to create Kafka producer")?;
            Arc::new(KafkaNotifier::new(producer, kafka.notification_topic.clone()))
        }
        None => Arc::new(TracingNotifier),
    };

    let sweep_every = Duration::from_secs(business_rules.sweep_interval_seconds.max(1));
    let mut state = AppState::new(stores, notifier, &config.auth, business_rules)
        .context("Failed to register metrics")?;

    if let Some(redis) = &config.redis {
        match RedisClient::new(&redis.url).await {
            Ok(client) => state = state.with_redis(Arc::new(client)),
            Err(e) => tracing::warn!("Redis unavailable, rate limiting disabled: {}", e),
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(worker::start_reconciliation_worker(
        state.reconciler.clone(),
        sweep_every,
        shutdown_rx,
    ));

    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper.await {
        tracing::error!("Reconciliation worker panicked: {}", e);
    }
    if let Some(db) = db {
        db.close().await;
    }
    tracing::info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}
