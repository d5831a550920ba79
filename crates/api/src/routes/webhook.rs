//! Payment-provider webhook endpoint.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use orders::WebhookOutcome;
use serde::Serialize;

use crate::error::ApiError;
use crate::routes::orders::OrderAppState;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    pub outcome: &'static str,
}

/// POST /webhook: settles orders from payment notifications.
///
/// Every accepted event answers 200, including unknown orders, so the
/// provider stops redelivering. Only malformed events and failed order
/// updates answer non-2xx.
pub async fn receive(
    State(state): State<Arc<OrderAppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let outcome = state.webhook.handle(&body, signature).await?;
    let outcome = match outcome {
        WebhookOutcome::Ignored { .. } => "ignored",
        WebhookOutcome::Settled { .. } => "settled",
        WebhookOutcome::UnknownOrder { .. } => "unknown_order",
        WebhookOutcome::NotPending { .. } => "not_pending",
    };

    Ok(Json(WebhookResponse {
        received: true,
        outcome,
    }))
}
