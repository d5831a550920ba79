//! HTTP surface of the order and product services.
//!
//! Each service gets its own router, built over shared state assembled in
//! its binary, with structured logging (tracing) and Prometheus metrics.

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use orders::MAX_WEBHOOK_BODY;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::cart::MAX_CART_BODY;
use routes::orders::OrderAppState;
use routes::products::ProductAppState;

/// Creates the order-service router.
pub fn create_order_app(state: Arc<OrderAppState>, metrics_handle: PrometheusHandle) -> Router {
    let webhook = Router::new()
        .route("/webhook", post(routes::webhook::receive))
        .layer(DefaultBodyLimit::max(MAX_WEBHOOK_BODY));

    let orders = Router::new()
        .route(
            "/orders/checkout/{product_id}",
            post(routes::orders::checkout_product),
        )
        .route(
            "/orders/cartcheckout",
            post(routes::orders::cart_checkout_new),
        )
        .route(
            "/orders/cartcheckout/{order_id}",
            post(routes::orders::cart_checkout),
        )
        .route("/orders/{id}", get(routes::orders::get))
        .merge(webhook)
        .with_state(state);

    with_common_layers(orders, metrics_handle)
}

/// Creates the product-service router.
pub fn create_product_app(state: Arc<ProductAppState>, metrics_handle: PrometheusHandle) -> Router {
    let cart = Router::new()
        .route("/cart", post(routes::cart::add).get(routes::cart::list))
        .route("/cart/{id}", delete(routes::cart::remove))
        .route("/cart/checkout", post(routes::cart::checkout))
        .layer(DefaultBodyLimit::max(MAX_CART_BODY));

    let products = Router::new()
        .route("/products/stock", post(routes::products::stock))
        .route(
            "/products/stock/{product_id}",
            get(routes::products::product_stock),
        )
        .merge(cart)
        .with_state(state);

    with_common_layers(products, metrics_handle)
}

fn with_common_layers(app: Router, metrics_handle: PrometheusHandle) -> Router {
    app.route("/ping", get(routes::health::ping))
        .route("/health", get(routes::health::check))
        .merge(routes::metrics::router(metrics_handle))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
