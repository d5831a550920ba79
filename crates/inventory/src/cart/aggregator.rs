use std::sync::Arc;

use common::{CartLineId, CartOrderRequest, OrderId, ProductId, UserId};

use super::{CartLine, CartRepository, CartSnapshot};
use crate::checkout_client::OrderCheckout;
use crate::error::{CartError, InventoryError};

/// Result of a cart checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartCheckout {
    /// The user had nothing in progress.
    Empty,
    /// The order service opened a payment session for the cart.
    Started { order_id: OrderId, url: String },
}

/// Collapses a user's cart into line items and hands them to the order
/// service's multi-line checkout.
#[derive(Clone)]
pub struct CartAggregator {
    carts: Arc<dyn CartRepository>,
    orders: Arc<dyn OrderCheckout>,
}

impl CartAggregator {
    pub fn new(carts: Arc<dyn CartRepository>, orders: Arc<dyn OrderCheckout>) -> Self {
        Self { carts, orders }
    }

    #[tracing::instrument(skip(self), fields(user_id = %user_id, product_id = %product_id))]
    pub async fn add_to_cart(
        &self,
        user_id: &UserId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<CartLine, CartError> {
        if quantity == 0 {
            return Err(CartError::Validation("quantity must be positive".to_string()));
        }
        if product_id.as_str().is_empty() {
            return Err(CartError::Validation("product_id is required".to_string()));
        }

        let line = self
            .carts
            .add_or_increment(user_id, product_id, quantity)
            .await
            .map_err(|e| match e {
                InventoryError::InvalidQuantity(q) => {
                    CartError::Validation(format!("quantity {q} would exceed the cart limit"))
                }
                other => other.into(),
            })?;
        tracing::info!(order_id = %line.order_id, quantity = line.quantity, "Product added to cart");
        Ok(line)
    }

    pub async fn cart(&self, user_id: &UserId) -> Result<Option<CartSnapshot>, CartError> {
        Ok(self.carts.in_progress(user_id).await?)
    }

    pub async fn remove(&self, user_id: &UserId, line_id: CartLineId) -> Result<(), CartError> {
        if self.carts.remove_in_progress(user_id, line_id).await? {
            Ok(())
        } else {
            Err(CartError::NotFound(line_id))
        }
    }

    /// Checks out the user's in-progress cart.
    ///
    /// The rows are flipped to `pending` before the order service is
    /// called, so products added meanwhile land in a new cart. A failed
    /// order-service call leaves the rows pending.
    #[tracing::instrument(skip(self, bearer), fields(user_id = %user_id))]
    pub async fn checkout(&self, user_id: &UserId, bearer: &str) -> Result<CartCheckout, CartError> {
        let Some(snapshot) = self.carts.begin_checkout(user_id).await? else {
            tracing::debug!("Nothing to check out");
            return Ok(CartCheckout::Empty);
        };

        let order_id = snapshot.order_id;
        let request = CartOrderRequest::new(snapshot.line_items());
        tracing::info!(%order_id, lines = request.line_items.len(), "Handing cart to order service");

        let session = self
            .orders
            .cart_checkout(order_id, user_id, bearer, &request)
            .await
            .map_err(|e| {
                tracing::error!(%order_id, error = %e, "Order service checkout failed");
                e
            })?;

        Ok(CartCheckout::Started {
            order_id,
            url: session.url,
        })
    }
}
