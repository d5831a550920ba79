use std::time::Duration;

use async_trait::async_trait;
use common::Money;
use reqwest::Client;
use serde::Deserialize;

use super::{PaymentGateway, PaymentSession, SessionRequest};
use crate::error::PaymentError;

/// Stripe connection and session defaults.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub api_key: String,
    pub api_base: String,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: "https://api.stripe.com".to_string(),
            currency: "inr".to_string(),
            success_url: "https://example.com/success".to_string(),
            cancel_url: "https://example.com/cancel".to_string(),
        }
    }
}

#[derive(Deserialize)]
struct CheckoutSessionResponse {
    id: String,
    url: Option<String>,
    amount_total: Option<i64>,
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: String,
}

/// Stripe Checkout client speaking the form-encoded REST API.
#[derive(Clone)]
pub struct StripeGateway {
    client: Client,
    config: StripeConfig,
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> Result<Self, PaymentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PaymentError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn session_form(&self, request: &SessionRequest) -> Vec<(String, String)> {
        let mut form = vec![
            ("customer".to_string(), request.customer.clone()),
            ("mode".to_string(), "payment".to_string()),
            ("submit_type".to_string(), "pay".to_string()),
            ("currency".to_string(), self.config.currency.clone()),
            ("billing_address_collection".to_string(), "auto".to_string()),
            ("success_url".to_string(), self.config.success_url.clone()),
            ("cancel_url".to_string(), self.config.cancel_url.clone()),
        ];
        for (i, item) in request.line_items.iter().enumerate() {
            form.push((format!("line_items[{i}][price]"), item.price_id.clone()));
            form.push((format!("line_items[{i}][quantity]"), item.quantity.to_string()));
        }
        for (key, value) in &request.metadata {
            form.push((format!("payment_intent_data[metadata][{key}]"), value.clone()));
        }
        form
    }

    async fn rejection(response: reqwest::Response) -> PaymentError {
        let status = response.status().as_u16();
        let message = match response.json::<StripeErrorBody>().await {
            Ok(body) => body.error.message,
            Err(_) => String::new(),
        };
        PaymentError::Rejected { status, message }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[tracing::instrument(skip_all, fields(idempotency_key = %request.idempotency_key))]
    async fn create_session(&self, request: &SessionRequest) -> Result<PaymentSession, PaymentError> {
        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.config.api_base))
            .bearer_auth(&self.config.api_key)
            .header("Idempotency-Key", &request.idempotency_key)
            .form(&self.session_form(request))
            .send()
            .await
            .map_err(|e| PaymentError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let body: CheckoutSessionResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::InvalidResponse(e.to_string()))?;
        let url = body
            .url
            .ok_or_else(|| PaymentError::InvalidResponse("session has no url".to_string()))?;
        let amount_total = body
            .amount_total
            .ok_or_else(|| PaymentError::InvalidResponse("session has no amount_total".to_string()))?;

        Ok(PaymentSession {
            id: body.id,
            url,
            amount_total: Money::from_minor(amount_total),
        })
    }

    #[tracing::instrument(skip(self))]
    async fn expire_session(&self, session_id: &str) -> Result<(), PaymentError> {
        let response = self
            .client
            .post(format!(
                "{}/v1/checkout/sessions/{}/expire",
                self.config.api_base, session_id
            ))
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| PaymentError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }
        Ok(())
    }
}
