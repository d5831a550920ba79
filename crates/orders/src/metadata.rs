//! Payment-session metadata.
//!
//! Metadata attached when the session is created is the only channel by
//! which the webhook later learns which order and lines to settle.

use std::collections::{BTreeMap, HashMap};

use common::{CartOrderRequest, LineItem, OrderId, ProductId, UserId};

use crate::error::WebhookError;

pub const ORDER_ID: &str = "order_id";
pub const USER_ID: &str = "user_id";
/// Present for single-product checkouts (quantity 1).
pub const PRODUCT_ID: &str = "product_id";
/// JSON-encoded [`CartOrderRequest`] for multi-line checkouts.
pub const PRODUCTS: &str = "products";

/// Which lines an order settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderLines {
    Single(ProductId),
    Cart(Vec<LineItem>),
}

impl OrderLines {
    pub fn line_items(&self) -> Vec<LineItem> {
        match self {
            OrderLines::Single(product_id) => vec![LineItem::new(product_id.clone(), 1)],
            OrderLines::Cart(lines) => lines.clone(),
        }
    }
}

/// Decoded session metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentMetadata {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub lines: OrderLines,
}

impl PaymentMetadata {
    pub fn encode(&self) -> serde_json::Result<BTreeMap<String, String>> {
        let mut map = BTreeMap::new();
        map.insert(ORDER_ID.to_string(), self.order_id.to_string());
        map.insert(USER_ID.to_string(), self.user_id.to_string());
        match &self.lines {
            OrderLines::Single(product_id) => {
                map.insert(PRODUCT_ID.to_string(), product_id.to_string());
            }
            OrderLines::Cart(lines) => {
                let products = CartOrderRequest::new(lines.clone());
                map.insert(PRODUCTS.to_string(), serde_json::to_string(&products)?);
            }
        }
        Ok(map)
    }

    /// Reads metadata back out of a payment object.
    ///
    /// A non-empty `product_id` wins over `products`.
    pub fn decode(metadata: &HashMap<String, String>) -> Result<Self, WebhookError> {
        let order_id = metadata
            .get(ORDER_ID)
            .filter(|s| !s.is_empty())
            .ok_or(WebhookError::MissingMetadata(ORDER_ID))?;
        let order_id = OrderId::parse(order_id)
            .map_err(|e| WebhookError::Malformed(format!("order_id: {e}")))?;
        let user_id = metadata
            .get(USER_ID)
            .map(|s| UserId::new(s.as_str()))
            .unwrap_or_else(|| UserId::new(""));

        let product_id = metadata.get(PRODUCT_ID).filter(|s| !s.is_empty());
        let products = metadata.get(PRODUCTS).filter(|s| !s.is_empty());

        let lines = match (product_id, products) {
            (Some(product_id), _) => OrderLines::Single(ProductId::new(product_id.as_str())),
            (None, Some(products)) => {
                let request: CartOrderRequest = serde_json::from_str(products)
                    .map_err(|e| WebhookError::Malformed(format!("products: {e}")))?;
                OrderLines::Cart(request.line_items)
            }
            (None, None) => return Err(WebhookError::MissingProductInfo),
        };

        Ok(Self {
            order_id,
            user_id,
            lines,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_hash(map: BTreeMap<String, String>) -> HashMap<String, String> {
        map.into_iter().collect()
    }

    #[test]
    fn single_product_metadata() {
        let meta = PaymentMetadata {
            order_id: OrderId::new(),
            user_id: UserId::new("u1"),
            lines: OrderLines::Single(ProductId::new("P1")),
        };

        let encoded = meta.encode().unwrap();
        assert_eq!(encoded.get(PRODUCT_ID).map(String::as_str), Some("P1"));
        assert!(!encoded.contains_key(PRODUCTS));

        let decoded = PaymentMetadata::decode(&to_hash(encoded)).unwrap();
        assert_eq!(decoded, meta);
        assert_eq!(decoded.lines.line_items(), vec![LineItem::new("P1", 1)]);
    }

    #[test]
    fn cart_metadata_carries_serialized_lines() {
        let meta = PaymentMetadata {
            order_id: OrderId::new(),
            user_id: UserId::new("u1"),
            lines: OrderLines::Cart(vec![LineItem::new("P1", 2), LineItem::new("P2", 1)]),
        };

        let encoded = meta.encode().unwrap();
        let products: serde_json::Value =
            serde_json::from_str(encoded.get(PRODUCTS).unwrap()).unwrap();
        assert_eq!(products["line_items"][0]["quantity"], 2);

        assert_eq!(PaymentMetadata::decode(&to_hash(encoded)).unwrap(), meta);
    }

    #[test]
    fn missing_product_info() {
        let mut metadata = HashMap::new();
        metadata.insert(ORDER_ID.to_string(), OrderId::new().to_string());
        metadata.insert(PRODUCT_ID.to_string(), String::new());

        assert!(matches!(
            PaymentMetadata::decode(&metadata),
            Err(WebhookError::MissingProductInfo)
        ));
    }

    #[test]
    fn missing_order_id() {
        let mut metadata = HashMap::new();
        metadata.insert(PRODUCT_ID.to_string(), "P1".to_string());

        assert!(matches!(
            PaymentMetadata::decode(&metadata),
            Err(WebhookError::MissingMetadata(ORDER_ID))
        ));
    }

    #[test]
    fn garbage_products_is_malformed() {
        let mut metadata = HashMap::new();
        metadata.insert(ORDER_ID.to_string(), OrderId::new().to_string());
        metadata.insert(PRODUCTS.to_string(), "{not json".to_string());

        assert!(matches!(
            PaymentMetadata::decode(&metadata),
            Err(WebhookError::Malformed(_))
        ));
    }
}
