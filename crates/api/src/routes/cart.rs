//! Product-service cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{CartLineId, OrderId, ProductId};
use inventory::{CartCheckout, CartLine};
use serde::{Deserialize, Serialize};

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::routes::products::ProductAppState;

/// Largest accepted cart request body.
pub const MAX_CART_BODY: usize = 5 * 1024;

#[derive(Deserialize)]
pub struct AddToCartRequest {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Serialize)]
pub struct CartResponse {
    /// Provisional order id shared by every line; absent for an empty cart.
    pub order_id: Option<OrderId>,
    pub lines: Vec<CartLine>,
}

/// Both fields are `null` when there was nothing to check out.
#[derive(Serialize)]
pub struct CartCheckoutResponse {
    pub checkout_session_id: Option<String>,
    pub order_id: Option<String>,
}

/// POST /cart: adds a product, or increases its quantity.
#[tracing::instrument(skip(state, user, req), fields(user_id = %user.user_id))]
pub async fn add(
    State(state): State<Arc<ProductAppState>>,
    user: AuthenticatedUser,
    Json(req): Json<AddToCartRequest>,
) -> Result<Json<CartLine>, ApiError> {
    let line = state
        .carts
        .add_to_cart(&user.user_id, &ProductId::new(req.product_id), req.quantity)
        .await?;
    Ok(Json(line))
}

/// GET /cart: the caller's in-progress lines.
#[tracing::instrument(skip(state, user), fields(user_id = %user.user_id))]
pub async fn list(
    State(state): State<Arc<ProductAppState>>,
    user: AuthenticatedUser,
) -> Result<Json<CartResponse>, ApiError> {
    let response = match state.carts.cart(&user.user_id).await? {
        Some(snapshot) => CartResponse {
            order_id: Some(snapshot.order_id),
            lines: snapshot.lines,
        },
        None => CartResponse {
            order_id: None,
            lines: Vec::new(),
        },
    };
    Ok(Json(response))
}

/// DELETE /cart/{id}: removes a line that is still in progress.
#[tracing::instrument(skip(state, user), fields(user_id = %user.user_id))]
pub async fn remove(
    State(state): State<Arc<ProductAppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let line_id = CartLineId::parse(&id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid cart item id: {e}")))?;
    state.carts.remove(&user.user_id, line_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /cart/checkout: hands the cart to the order service.
#[tracing::instrument(skip(state, user), fields(user_id = %user.user_id))]
pub async fn checkout(
    State(state): State<Arc<ProductAppState>>,
    user: AuthenticatedUser,
) -> Result<Json<CartCheckoutResponse>, ApiError> {
    match state.carts.checkout(&user.user_id, &user.bearer).await? {
        CartCheckout::Empty => Ok(Json(CartCheckoutResponse {
            checkout_session_id: None,
            order_id: None,
        })),
        CartCheckout::Started { order_id, url } => Ok(Json(CartCheckoutResponse {
            checkout_session_id: Some(url),
            order_id: Some(order_id.to_string()),
        })),
    }
}
