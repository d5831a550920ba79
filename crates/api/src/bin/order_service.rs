//! Order-service entry point.

use std::sync::Arc;

use api::bootstrap::{self, StartupError};
use api::config::Config;
use api::routes::orders::OrderAppState;
use discovery::ServiceLocator;
use orders::{
    CheckoutOrchestrator, HttpProductCatalog, HttpUserDirectory, InMemoryOrderRepository,
    OrderRepository, PaymentWebhookHandler, PostgresOrderRepository, SignatureVerifier,
    StripeGateway,
};

#[tokio::main]
async fn main() {
    let config = Config::from_env("orders");
    bootstrap::init_tracing(&config);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "order service failed");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), StartupError> {
    let metrics_handle = bootstrap::install_metrics_recorder()?;

    let orders: Arc<dyn OrderRepository> = match config.database_url.as_deref() {
        Some(url) => Arc::new(PostgresOrderRepository::new(
            bootstrap::connect_database(url).await?,
        )),
        None => {
            tracing::warn!("DATABASE_URL not set, orders are kept in memory");
            Arc::new(InMemoryOrderRepository::new())
        }
    };

    let registry = bootstrap::service_registry(&config)?;
    let locator = ServiceLocator::new(Arc::clone(&registry));
    let client = reqwest::Client::builder()
        .timeout(config.peer_timeout)
        .build()?;

    let orchestrator = CheckoutOrchestrator::new(
        Arc::new(HttpUserDirectory::new(locator.clone(), client.clone())),
        Arc::new(HttpProductCatalog::new(locator, client)),
        Arc::new(StripeGateway::new(config.stripe.clone())?),
        Arc::clone(&orders),
        config.checkout(),
    );

    let mut webhook = PaymentWebhookHandler::new(
        Arc::clone(&orders),
        bootstrap::event_publisher(&config)?,
    );
    match config.stripe_webhook_secret.as_deref() {
        Some(secret) => webhook = webhook.with_verifier(SignatureVerifier::new(secret)),
        None => tracing::warn!("STRIPE_WEBHOOK_SECRET not set, webhook signatures are not checked"),
    }

    let state = Arc::new(OrderAppState {
        orchestrator,
        webhook,
        orders,
    });
    let app = api::create_order_app(state, metrics_handle);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, join = ?config.checkout_join, "starting order service");

    let registration = bootstrap::register(registry, &config).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(bootstrap::shutdown_signal())
        .await?;

    bootstrap::deregister(registration).await;
    tracing::info!("server shut down gracefully");
    Ok(())
}
