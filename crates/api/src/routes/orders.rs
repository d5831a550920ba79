//! Order-service checkout endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{CartOrderRequest, OrderId, ProductId};
use orders::{
    CheckoutOrchestrator, CheckoutOutcome, CheckoutRequest, OrderRepository,
    PaymentWebhookHandler,
};
use serde::Serialize;

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;

/// Shared state of the order service.
pub struct OrderAppState {
    pub orchestrator: CheckoutOrchestrator,
    pub webhook: PaymentWebhookHandler,
    pub orders: Arc<dyn OrderRepository>,
}

// -- Response types --

/// Returned by every checkout endpoint. The product service reads
/// `checkout_session_id` as the redirect URL.
#[derive(Serialize)]
pub struct CheckoutResponse {
    pub checkout_session_id: String,
    pub order_id: String,
    /// Session total in minor currency units.
    pub total_price: i64,
}

impl From<CheckoutOutcome> for CheckoutResponse {
    fn from(outcome: CheckoutOutcome) -> Self {
        Self {
            checkout_session_id: outcome.session_url,
            order_id: outcome.order_id.to_string(),
            total_price: outcome.total_price.minor_units(),
        }
    }
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub status: String,
    pub lines: Vec<OrderLineResponse>,
    pub total_price: i64,
    pub stripe_transaction_id: Option<String>,
}

#[derive(Serialize)]
pub struct OrderLineResponse {
    pub product_id: String,
    pub quantity: u32,
}

// -- Handlers --

/// POST /orders/checkout/{product_id}: buys one unit of a product.
#[tracing::instrument(skip(state, user), fields(user_id = %user.user_id))]
pub async fn checkout_product(
    State(state): State<Arc<OrderAppState>>,
    user: AuthenticatedUser,
    Path(product_id): Path<String>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    if product_id.trim().is_empty() {
        return Err(ApiError::BadRequest("product id is required".to_string()));
    }

    let request =
        CheckoutRequest::single_product(user.user_id, user.bearer, ProductId::new(product_id));
    let outcome = state.orchestrator.checkout(request).await?;
    Ok(Json(outcome.into()))
}

/// POST /orders/cartcheckout/{order_id}: checks out a cart under its
/// provisional order id.
#[tracing::instrument(skip(state, user, body), fields(user_id = %user.user_id))]
pub async fn cart_checkout(
    State(state): State<Arc<OrderAppState>>,
    user: AuthenticatedUser,
    Path(order_id): Path<String>,
    Json(body): Json<CartOrderRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let order_id = parse_order_id(&order_id)?;
    run_cart_checkout(&state, user, order_id, body).await
}

/// POST /orders/cartcheckout: cart checkout without a provisional id.
#[tracing::instrument(skip(state, user, body), fields(user_id = %user.user_id))]
pub async fn cart_checkout_new(
    State(state): State<Arc<OrderAppState>>,
    user: AuthenticatedUser,
    Json(body): Json<CartOrderRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    run_cart_checkout(&state, user, OrderId::new(), body).await
}

async fn run_cart_checkout(
    state: &OrderAppState,
    user: AuthenticatedUser,
    order_id: OrderId,
    body: CartOrderRequest,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let request = CheckoutRequest::cart(order_id, user.user_id, user.bearer, body.line_items);
    let outcome = state.orchestrator.checkout(request).await?;
    Ok(Json(outcome.into()))
}

/// GET /orders/{id}: the caller's own order.
#[tracing::instrument(skip(state, user), fields(user_id = %user.user_id))]
pub async fn get(
    State(state): State<Arc<OrderAppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .orders
        .get(order_id)
        .await?
        .filter(|order| order.user_id == user.user_id)
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;

    Ok(Json(OrderResponse {
        id: order.id.to_string(),
        status: order.status.to_string(),
        lines: order
            .lines
            .iter()
            .map(|line| OrderLineResponse {
                product_id: line.product_id.to_string(),
                quantity: line.quantity,
            })
            .collect(),
        total_price: order.total_price.minor_units(),
        stripe_transaction_id: order.stripe_transaction_id,
    }))
}

fn parse_order_id(s: &str) -> Result<OrderId, ApiError> {
    OrderId::parse(s).map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))
}
