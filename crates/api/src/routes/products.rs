//! Product-service stock endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{ProductId, ProductStock, StockQuery};
use inventory::{CartAggregator, ProductStore};

use crate::error::ApiError;

/// Shared state of the product service.
pub struct ProductAppState {
    pub carts: CartAggregator,
    pub products: Arc<dyn ProductStore>,
}

/// POST /products/stock: batched stock and price lookup.
///
/// Results follow the request order; unknown ids are left out.
#[tracing::instrument(skip(state, query), fields(count = query.product_ids.len()))]
pub async fn stock(
    State(state): State<Arc<ProductAppState>>,
    Json(query): Json<StockQuery>,
) -> Result<Json<Vec<ProductStock>>, ApiError> {
    if query.product_ids.is_empty() {
        return Err(ApiError::BadRequest("productIds must not be empty".to_string()));
    }
    let found = state.products.stock(&query.product_ids).await?;
    Ok(Json(found))
}

/// GET /products/stock/{product_id}
#[tracing::instrument(skip(state))]
pub async fn product_stock(
    State(state): State<Arc<ProductAppState>>,
    Path(product_id): Path<String>,
) -> Result<Json<ProductStock>, ApiError> {
    state
        .products
        .product_stock(&ProductId::new(product_id.as_str()))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Product {product_id} not found")))
}
