//! Clients for the peer services checkout depends on.

mod fake;
mod http;

pub use fake::{StaticProductCatalog, StaticUserDirectory};
pub use http::{HttpProductCatalog, HttpUserDirectory};

use async_trait::async_trait;
use common::{ProductId, ProductStock};

use crate::error::PeerError;

/// Logical registry names of the peer services.
pub const USERS_SERVICE: &str = "users";
pub const PRODUCTS_SERVICE: &str = "products";

/// Resolves the caller's billing identity (payment-provider customer id).
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// `bearer` is the caller's inbound `Authorization` header value and is
    /// forwarded unchanged. `Ok(None)` means the user has no billing identity.
    async fn billing_identity(&self, bearer: &str) -> Result<Option<String>, PeerError>;
}

/// Batched stock and price lookups.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Looks up every id in one call. Unknown ids are simply absent.
    async fn stock(&self, product_ids: &[ProductId]) -> Result<Vec<ProductStock>, PeerError>;
}
