use anyhow::Context;
use booking_api::state::{AppState, StoreReadiness};
use booking_api::worker::{start_booking_worker, WorkerDeps};
use booking_api::app;
use booking_core::{CancellationToken, ExhaustedPolicy, Metrics, Producer};
use booking_domain::{BookingRepository, UserRepository};
use booking_service::{BookingService, UserService};
use booking_store::app_config::{Config, LogConfig, LogFormat};
use booking_store::{
    DbClient, KafkaReader, KafkaWriter, PgBookingRepository, PgUserRepository, RedisClient,
    RedisProcessedEvents,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| log.level.as_str().into());
    let json = log.format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = shutdown.cancelled() => {},
    }

    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("Failed to load config")?;
    init_tracing(&config.log);
    tracing::info!("Starting {} on port {}", config.service.name, config.service.port);

    let shutdown = CancellationToken::new();
    let metrics = Arc::new(Metrics::new().context("Failed to register metrics")?);

    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let redis = RedisClient::new(&config.redis.url)
        .await
        .context("Failed to connect to Redis")?;

    let writer = KafkaWriter::new(&config.kafka).context("Failed to create Kafka producer")?;
    let producer = Producer::new(Arc::new(writer), metrics.clone())
        .with_retry_policy(config.kafka.retry_policy());

    let booking_repo: Arc<dyn BookingRepository> = Arc::new(PgBookingRepository::new(db.pool.clone()));
    let user_repo: Arc<dyn UserRepository> = Arc::new(PgUserRepository::new(db.pool.clone()));

    let worker = if config.service.run_consumer {
        let reader = KafkaReader::new(&config.kafka, &config.kafka.topics)
            .context("Failed to create Kafka consumer")?;
        let exhausted = match &config.kafka.dead_letter_topic {
            Some(topic) => ExhaustedPolicy::Forward {
                topic: topic.clone(),
                producer: producer.clone(),
            },
            None => ExhaustedPolicy::Drop,
        };
        let deps = WorkerDeps {
            repo: booking_repo.clone(),
            processed: Arc::new(RedisProcessedEvents::new(
                redis.clone(),
                config.redis.processed_ttl_secs,
            )),
            metrics: metrics.clone(),
            config: config.kafka.consumer_config(),
            exhausted,
        };
        Some(start_booking_worker(reader, deps, shutdown.clone()))
    } else {
        None
    };

    let state = AppState {
        users: Arc::new(UserService::new(user_repo, producer.clone(), shutdown.clone())),
        bookings: Arc::new(BookingService::new(booking_repo, producer, shutdown.clone())),
        metrics,
        readiness: Arc::new(StoreReadiness { db, redis }),
        request_timeout: Duration::from_secs(config.service.request_timeout_secs),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.service.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("HTTP server failed")?;

    shutdown.cancel();
    if let Some(handle) = worker {
        let grace = Duration::from_secs(config.service.shutdown_grace_secs);
        match tokio::time::timeout(grace, handle).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(err))) => tracing::error!(error = %err, "Booking worker exited with error"),
            Ok(Err(err)) => tracing::error!(error = %err, "Booking worker panicked"),
            Err(_) => tracing::warn!("Booking worker did not stop within the grace period"),
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
