//! Process wiring shared by both service binaries.
//!
//! Everything here is constructed once at startup and handed to the
//! routers and background tasks; nothing is stored globally.

use std::sync::Arc;

use discovery::{
    ConsulRegistry, DiscoveryError, RegisteredService, RetryPolicy, ServiceRegistry,
    register_with_retry,
};
use event_bus::{BusError, EventPublisher, EventSubscriber, InMemoryEventBus};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use orders::PaymentError;
use sqlx::PgPool;
use sqlx::migrate::MigrateError;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{Config, LogFormat};

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] MigrateError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("Event bus setup failed: {0}")]
    Bus(#[from] BusError),

    #[error("Payment gateway setup failed: {0}")]
    Payment(#[from] PaymentError),

    #[error("Metrics recorder setup failed: {0}")]
    Metrics(#[from] BuildError),

    #[error("HTTP client setup failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Installs the global subscriber: `RUST_LOG` filter, text or JSON lines.
pub fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Installs the Prometheus recorder and registers metric descriptions.
pub fn install_metrics_recorder() -> Result<PrometheusHandle, StartupError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    Ok(handle)
}

fn describe_metrics() {
    metrics::describe_counter!("checkout_requests_total", "Checkout attempts");
    metrics::describe_counter!("checkout_failures_total", "Failed checkouts by reason");
    metrics::describe_histogram!(
        "checkout_duration_seconds",
        metrics::Unit::Seconds,
        "End-to-end checkout latency"
    );
    metrics::describe_counter!("webhook_events_total", "Payment webhook events by type");
    metrics::describe_counter!("order_paid_published_total", "OrderPaid events published");
    metrics::describe_counter!(
        "order_paid_publish_failures_total",
        "OrderPaid events that failed to publish"
    );
    metrics::describe_counter!(
        "inventory_decrements_total",
        "OrderPaid records applied to stock by outcome"
    );
    metrics::describe_counter!(
        "discovery_resolutions_total",
        "Service lookups by outcome"
    );
}

/// Connects to PostgreSQL and applies pending migrations.
#[tracing::instrument(skip_all)]
pub async fn connect_database(url: &str) -> Result<PgPool, StartupError> {
    let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database connected and migrated");
    Ok(pool)
}

pub fn service_registry(config: &Config) -> Result<Arc<dyn ServiceRegistry>, StartupError> {
    Ok(Arc::new(ConsulRegistry::new(&config.consul_address)?))
}

/// Registers this process and publishes its endpoint prefix, retrying
/// with linear backoff.
pub async fn register(
    registry: Arc<dyn ServiceRegistry>,
    config: &Config,
) -> Result<RegisteredService, StartupError> {
    let prefix_key = config
        .endpoint_prefix
        .as_deref()
        .map(|prefix| (prefix, config.service_name.as_str()));

    let handle = register_with_retry(
        registry,
        &config.registration(),
        RetryPolicy::default(),
        prefix_key,
    )
    .await?;
    Ok(handle)
}

/// Removes the registry entry; failures are only logged since the
/// registry drops critical instances on its own.
pub async fn deregister(service: RegisteredService) {
    if let Err(e) = service.deregister().await {
        tracing::warn!(error = %e, "Failed to deregister from service registry");
    }
}

/// Publisher for `OrderPaid` events: Kafka when brokers are configured,
/// otherwise an in-process bus.
pub fn event_publisher(config: &Config) -> Result<Arc<dyn EventPublisher>, StartupError> {
    match config.kafka_brokers.as_deref() {
        #[cfg(feature = "kafka")]
        Some(brokers) => {
            let cfg = event_bus::KafkaConfig::publisher(brokers);
            Ok(Arc::new(event_bus::KafkaPublisher::new(&cfg)?))
        }
        #[cfg(not(feature = "kafka"))]
        Some(_) => {
            warn_kafka_disabled();
            Ok(Arc::new(InMemoryEventBus::new()))
        }
        None => Ok(Arc::new(InMemoryEventBus::new())),
    }
}

/// Subscription to `OrderPaid` events under the product-service group.
pub fn event_subscriber(config: &Config) -> Result<Arc<dyn EventSubscriber>, StartupError> {
    use event_bus::{PRODUCT_SERVICE_GROUP, TOPIC_ORDER_PAID};

    match config.kafka_brokers.as_deref() {
        #[cfg(feature = "kafka")]
        Some(brokers) => {
            let cfg =
                event_bus::KafkaConfig::subscriber(brokers, PRODUCT_SERVICE_GROUP, &[TOPIC_ORDER_PAID]);
            Ok(Arc::new(event_bus::KafkaSubscriber::new(&cfg)?))
        }
        #[cfg(not(feature = "kafka"))]
        Some(_) => {
            warn_kafka_disabled();
            Ok(Arc::new(
                InMemoryEventBus::new().subscriber(PRODUCT_SERVICE_GROUP, &[TOPIC_ORDER_PAID]),
            ))
        }
        None => Ok(Arc::new(
            InMemoryEventBus::new().subscriber(PRODUCT_SERVICE_GROUP, &[TOPIC_ORDER_PAID]),
        )),
    }
}

#[cfg(not(feature = "kafka"))]
fn warn_kafka_disabled() {
    tracing::warn!("KAFKA_BROKERS is set but the kafka feature is disabled; using in-memory bus");
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}
