//! Payment-provider webhook handling.

mod signature;

pub use signature::SignatureVerifier;

use std::collections::HashMap;
use std::sync::Arc;

use common::OrderId;
use event_bus::{EventPublisher, OrderPaidEvent};
use serde::Deserialize;

use crate::error::{OrderError, WebhookError};
use crate::metadata::PaymentMetadata;
use crate::repository::OrderRepository;

/// Largest accepted webhook body.
pub const MAX_WEBHOOK_BODY: usize = 64 * 1024;

/// The only event type acted upon.
pub const PAYMENT_SUCCEEDED: &str = "payment_intent.succeeded";

#[derive(Deserialize)]
struct EventEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: Option<EventData>,
}

#[derive(Deserialize)]
struct EventData {
    object: serde_json::Value,
}

#[derive(Deserialize)]
struct PaymentIntent {
    id: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

/// What the handler did with an accepted event. Every variant maps to 200.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Event type not handled.
    Ignored { event_type: String },
    /// Order marked paid; one publish task spawned per line.
    Settled { order_id: OrderId, lines: usize },
    /// No order with this id; logged and dropped.
    UnknownOrder { order_id: OrderId },
    /// The order is not pending (canceled, or paid by another transaction).
    NotPending { order_id: OrderId },
}

/// Settles orders from payment-succeeded notifications.
pub struct PaymentWebhookHandler {
    orders: Arc<dyn OrderRepository>,
    publisher: Arc<dyn EventPublisher>,
    verifier: Option<SignatureVerifier>,
}

impl PaymentWebhookHandler {
    pub fn new(orders: Arc<dyn OrderRepository>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            orders,
            publisher,
            verifier: None,
        }
    }

    /// Requires a valid `Stripe-Signature` on every event.
    pub fn with_verifier(mut self, verifier: SignatureVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Handles one raw event.
    ///
    /// The paid status is written before returning, so a persistence
    /// failure surfaces as an error and the provider retries. Event
    /// publication runs on detached tasks and never fails the call.
    #[tracing::instrument(skip_all, fields(bytes = payload.len()))]
    pub async fn handle(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, WebhookError> {
        if payload.len() > MAX_WEBHOOK_BODY {
            return Err(WebhookError::PayloadTooLarge(payload.len()));
        }
        if let Some(ref verifier) = self.verifier {
            let header = signature.ok_or(WebhookError::InvalidSignature)?;
            verifier.verify(payload, header, chrono::Utc::now().timestamp())?;
        }

        let envelope: EventEnvelope =
            serde_json::from_slice(payload).map_err(|e| WebhookError::Malformed(e.to_string()))?;
        metrics::counter!("webhook_events_total", "type" => envelope.event_type.clone())
            .increment(1);

        if envelope.event_type != PAYMENT_SUCCEEDED {
            tracing::debug!(event_type = %envelope.event_type, "Ignoring webhook event");
            return Ok(WebhookOutcome::Ignored {
                event_type: envelope.event_type,
            });
        }

        let object = envelope
            .data
            .map(|d| d.object)
            .ok_or_else(|| WebhookError::Malformed("missing data.object".to_string()))?;
        let intent: PaymentIntent =
            serde_json::from_value(object).map_err(|e| WebhookError::Malformed(e.to_string()))?;
        let metadata = PaymentMetadata::decode(&intent.metadata)?;
        let order_id = metadata.order_id;
        tracing::info!(
            %order_id,
            user_id = %metadata.user_id,
            payment_intent = %intent.id,
            "Payment succeeded"
        );

        match self.orders.mark_paid(order_id, &intent.id).await {
            Ok(_) => {}
            Err(OrderError::NotFound(_)) => {
                tracing::warn!(%order_id, "Payment succeeded for unknown order");
                return Ok(WebhookOutcome::UnknownOrder { order_id });
            }
            Err(OrderError::InvalidTransition { from, .. }) => {
                tracing::warn!(%order_id, status = %from, "Payment succeeded for order that is not pending");
                return Ok(WebhookOutcome::NotPending { order_id });
            }
            Err(e) => {
                tracing::error!(%order_id, error = %e, "Failed to mark order paid");
                return Err(WebhookError::Persistence(e));
            }
        }

        let lines = metadata.lines.line_items();
        for line in &lines {
            let event = OrderPaidEvent::new(order_id, line.product_id.clone(), line.quantity);
            self.spawn_publish(event);
        }

        Ok(WebhookOutcome::Settled {
            order_id,
            lines: lines.len(),
        })
    }

    fn spawn_publish(&self, event: OrderPaidEvent) {
        let publisher = Arc::clone(&self.publisher);
        tokio::spawn(async move {
            match publisher.publish_order_paid(&event).await {
                Ok(()) => {
                    metrics::counter!("order_paid_published_total").increment(1);
                    tracing::info!(
                        order_id = %event.order_id,
                        product_id = %event.product_id,
                        quantity = event.quantity,
                        "Published OrderPaid"
                    );
                }
                Err(e) => {
                    metrics::counter!("order_paid_publish_failures_total").increment(1);
                    tracing::error!(
                        order_id = %event.order_id,
                        product_id = %event.product_id,
                        error = %e,
                        "Failed to publish OrderPaid"
                    );
                }
            }
        });
    }
}
