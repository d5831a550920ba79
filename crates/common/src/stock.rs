//! Stock lookup wire types shared by the order and product services.

use serde::{Deserialize, Serialize};

use crate::types::ProductId;

/// Body of a batched stock lookup.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StockQuery {
    #[serde(rename = "productIds")]
    pub product_ids: Vec<ProductId>,
}

impl StockQuery {
    pub fn new(product_ids: Vec<ProductId>) -> Self {
        Self { product_ids }
    }
}

/// Stock and price reference for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductStock {
    pub product_id: ProductId,
    pub stock: i64,
    /// Payment-provider price reference; empty when the product has none.
    #[serde(default)]
    pub price_id: String,
}

impl ProductStock {
    /// Whether the product can be sold: some stock and a price reference.
    pub fn is_purchasable(&self) -> bool {
        self.stock > 0 && !self.price_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_uses_camel_case_key() {
        let query = StockQuery::new(vec![ProductId::new("P1"), ProductId::new("P2")]);
        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            serde_json::json!({"productIds": ["P1", "P2"]})
        );
    }

    #[test]
    fn purchasable_requires_stock_and_price() {
        let mut stock = ProductStock {
            product_id: ProductId::new("P1"),
            stock: 3,
            price_id: "price_1".to_string(),
        };
        assert!(stock.is_purchasable());

        stock.stock = 0;
        assert!(!stock.is_purchasable());

        stock.stock = 3;
        stock.price_id.clear();
        assert!(!stock.is_purchasable());
    }
}
