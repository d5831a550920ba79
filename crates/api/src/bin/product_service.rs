//! Product-service entry point.
//!
//! Serves cart and stock endpoints and runs the inventory updater beside
//! the HTTP server. A shutdown signal stops both before deregistering.

use std::sync::Arc;
use std::time::Duration;

use api::bootstrap::{self, StartupError};
use api::config::Config;
use api::routes::products::ProductAppState;
use discovery::ServiceLocator;
use inventory::{
    CartAggregator, CartRepository, DedupPolicy, HttpOrderCheckout, InMemoryCartRepository,
    InMemoryProductStore, InventoryUpdater, PostgresCartRepository, PostgresProductStore,
    ProductStore, UpdaterConfig,
};
use tokio::sync::watch;

/// Upper bound for the cart to order checkout call.
const ORDER_CHECKOUT_TIMEOUT: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    let config = Config::from_env("products");
    bootstrap::init_tracing(&config);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "product service failed");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), StartupError> {
    let metrics_handle = bootstrap::install_metrics_recorder()?;

    let (carts, products): (Arc<dyn CartRepository>, Arc<dyn ProductStore>) =
        match config.database_url.as_deref() {
            Some(url) => {
                let pool = bootstrap::connect_database(url).await?;
                (
                    Arc::new(PostgresCartRepository::new(pool.clone())),
                    Arc::new(PostgresProductStore::new(pool)),
                )
            }
            None => {
                tracing::warn!("DATABASE_URL not set, carts and stock are kept in memory");
                (
                    Arc::new(InMemoryCartRepository::new()),
                    Arc::new(InMemoryProductStore::new()),
                )
            }
        };

    let registry = bootstrap::service_registry(&config)?;
    let locator = ServiceLocator::new(Arc::clone(&registry));
    let order_checkout =
        HttpOrderCheckout::new(locator, reqwest::Client::new(), ORDER_CHECKOUT_TIMEOUT);

    let updater = InventoryUpdater::new(
        bootstrap::event_subscriber(&config)?,
        Arc::clone(&products),
        Arc::clone(&carts),
        UpdaterConfig {
            dedup: DedupPolicy::from_flag(config.inventory_dedup),
            ..UpdaterConfig::default()
        },
    );
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let updater_task = tokio::spawn(async move {
        updater
            .run(async move {
                let _ = stop_rx.changed().await;
            })
            .await;
    });

    let state = Arc::new(ProductAppState {
        carts: CartAggregator::new(carts, Arc::new(order_checkout)),
        products,
    });
    let app = api::create_product_app(state, metrics_handle);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, dedup = config.inventory_dedup, "starting product service");

    let registration = bootstrap::register(registry, &config).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(bootstrap::shutdown_signal())
        .await?;

    let _ = stop_tx.send(true);
    if let Err(e) = updater_task.await {
        tracing::error!(error = %e, "inventory updater task failed");
    }

    bootstrap::deregister(registration).await;
    tracing::info!("server shut down gracefully");
    Ok(())
}
