//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use inventory::{CartError, InventoryError, OrderCheckoutError};
use orders::{CheckoutError, OrderError, WebhookError};

/// API-level error type that maps to HTTP responses.
///
/// Server-side variants carry the detailed cause for the log line; the
/// client only sees a short message.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Missing caller identity.
    Unauthorized(String),
    /// The request is valid but cannot be served in the current state.
    Conflict(String),
    PayloadTooLarge(String),
    /// An upstream service answered with an error.
    BadGateway { message: &'static str, detail: String },
    /// A required service could not be located.
    ServiceUnavailable { message: &'static str, detail: String },
    /// Internal server error.
    Internal { message: &'static str, detail: String },
}

impl ApiError {
    pub fn internal(message: &'static str, detail: impl ToString) -> Self {
        ApiError::Internal {
            message,
            detail: detail.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Conflict(msg)
            | ApiError::PayloadTooLarge(msg) => msg,
            ApiError::BadGateway { message, detail } => {
                tracing::warn!(error = %detail, "upstream failure");
                message.to_string()
            }
            ApiError::ServiceUnavailable { message, detail } => {
                tracing::warn!(error = %detail, "service unavailable");
                message.to_string()
            }
            ApiError::Internal { message, detail } => {
                tracing::error!(error = %detail, "internal server error");
                message.to_string()
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::Validation(msg) => ApiError::BadRequest(msg),
            CheckoutError::ServiceUnavailable(detail) => ApiError::ServiceUnavailable {
                message: "service unavailable",
                detail,
            },
            CheckoutError::BillingIdentityUnresolved => ApiError::BadGateway {
                message: "billing identity unresolved",
                detail: err.to_string(),
            },
            CheckoutError::ProductUnavailable(ref product_id) => {
                ApiError::Conflict(format!("product unavailable or out of stock: {product_id}"))
            }
            CheckoutError::PaymentSession(ref source) => ApiError::BadGateway {
                message: "payment session creation failed",
                detail: source.to_string(),
            },
            CheckoutError::OrderPersistence {
                order_id,
                ref session_id,
                session_expired,
                ref source,
            } => ApiError::Internal {
                message: "order persistence failed",
                detail: format!(
                    "order {order_id}, session {session_id} (expired: {session_expired}): {source}"
                ),
            },
        }
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::PayloadTooLarge(_) => ApiError::PayloadTooLarge(err.to_string()),
            WebhookError::Malformed(_)
            | WebhookError::InvalidSignature
            | WebhookError::MissingMetadata(_)
            | WebhookError::MissingProductInfo => ApiError::BadRequest(err.to_string()),
            WebhookError::Persistence(source) => {
                ApiError::internal("failed to update order", source)
            }
        }
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NotFound(id) => ApiError::NotFound(format!("order not found: {id}")),
            OrderError::AlreadyExists(id) => {
                ApiError::Conflict(format!("order already exists: {id}"))
            }
            OrderError::InvalidTransition { .. } => ApiError::Conflict(err.to_string()),
            other => ApiError::internal("order storage failure", other),
        }
    }
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::InvalidQuantity(_) => ApiError::BadRequest(err.to_string()),
            other => ApiError::internal("product storage failure", other),
        }
    }
}

impl From<CartError> for ApiError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::Validation(msg) => ApiError::BadRequest(msg),
            CartError::NotFound(_) => ApiError::NotFound("cart item not found".to_string()),
            CartError::Store(e) => e.into(),
            CartError::Checkout(OrderCheckoutError::Discovery(e)) => {
                ApiError::ServiceUnavailable {
                    message: "service unavailable",
                    detail: e.to_string(),
                }
            }
            CartError::Checkout(e) => ApiError::BadGateway {
                message: "error fetching checkout session",
                detail: e.to_string(),
            },
        }
    }
}
