//! Checkout orchestration.
//!
//! A checkout resolves the caller's billing identity and the stock/price of
//! every requested product concurrently, opens a payment session only when
//! both succeed, and persists a pending order before handing the session URL
//! back.

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{LineItem, Money, OrderId, ProductId, ProductStock, UserId};
use discovery::DiscoveryError;
use tokio::sync::oneshot;
use tokio::task::JoinSet;

use crate::error::{CheckoutError, PeerError};
use crate::metadata::{OrderLines, PaymentMetadata};
use crate::order::Order;
use crate::payment::{PaymentGateway, SessionLineItem, SessionRequest};
use crate::peers::{ProductCatalog, UserDirectory};
use crate::repository::OrderRepository;

/// How the orchestrator waits for the two lookup branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinStrategy {
    /// One shared deadline across both branches; worst-case wait is the
    /// peer timeout.
    #[default]
    Multiplexed,
    /// Receive the user branch, then the product branch, each with its own
    /// timeout; worst-case wait is the sum of both.
    Sequential,
}

impl JoinStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "multiplexed" => Some(JoinStrategy::Multiplexed),
            "sequential" => Some(JoinStrategy::Sequential),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Deadline applied to each peer lookup.
    pub peer_timeout: Duration,
    pub join: JoinStrategy,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            peer_timeout: Duration::from_secs(50),
            join: JoinStrategy::default(),
        }
    }
}

/// An authenticated checkout request.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub order_id: OrderId,
    pub user_id: UserId,
    /// Inbound `Authorization` header, forwarded to the user service.
    pub bearer: String,
    pub lines: OrderLines,
}

impl CheckoutRequest {
    /// Buys one unit of a single product under a fresh order id.
    pub fn single_product(user_id: UserId, bearer: impl Into<String>, product_id: ProductId) -> Self {
        Self {
            order_id: OrderId::new(),
            user_id,
            bearer: bearer.into(),
            lines: OrderLines::Single(product_id),
        }
    }

    /// Checks out a cart under its provisional order id.
    pub fn cart(
        order_id: OrderId,
        user_id: UserId,
        bearer: impl Into<String>,
        lines: Vec<LineItem>,
    ) -> Self {
        Self {
            order_id,
            user_id,
            bearer: bearer.into(),
            lines: OrderLines::Cart(lines),
        }
    }
}

/// Result of a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutOutcome {
    pub order_id: OrderId,
    pub session_id: String,
    pub session_url: String,
    pub total_price: Money,
}

/// How one lookup branch settled.
#[derive(Debug)]
enum Branch<T> {
    Done(Result<T, PeerError>),
    TimedOut,
    /// The branch task ended without reporting.
    Lost,
}

impl<T> Branch<T> {
    fn from_recv(received: Result<Result<T, PeerError>, oneshot::error::RecvError>) -> Self {
        match received {
            Ok(result) => Branch::Done(result),
            Err(_) => Branch::Lost,
        }
    }

    fn discovery_error(&self) -> Option<&DiscoveryError> {
        match self {
            Branch::Done(Err(PeerError::Discovery(e))) => Some(e),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            Branch::Done(Ok(_)) => "ok".to_string(),
            Branch::Done(Err(e)) => e.to_string(),
            Branch::TimedOut => "timed out".to_string(),
            Branch::Lost => "task ended without a result".to_string(),
        }
    }
}

async fn recv_within<T>(
    rx: oneshot::Receiver<Result<T, PeerError>>,
    timeout: Duration,
) -> Branch<T> {
    match tokio::time::timeout(timeout, rx).await {
        Ok(received) => Branch::from_recv(received),
        Err(_) => Branch::TimedOut,
    }
}

async fn recv_both<U, P>(
    mut user_rx: oneshot::Receiver<Result<U, PeerError>>,
    mut product_rx: oneshot::Receiver<Result<P, PeerError>>,
    timeout: Duration,
) -> (Branch<U>, Branch<P>) {
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    let mut user = None;
    let mut product = None;
    while user.is_none() || product.is_none() {
        tokio::select! {
            r = &mut user_rx, if user.is_none() => user = Some(Branch::from_recv(r)),
            r = &mut product_rx, if product.is_none() => product = Some(Branch::from_recv(r)),
            _ = &mut deadline => break,
        }
    }
    (
        user.unwrap_or(Branch::TimedOut),
        product.unwrap_or(Branch::TimedOut),
    )
}

/// Collapses duplicate products into one line, keeping first-seen order.
pub fn normalize_lines(lines: &[LineItem]) -> Result<Vec<LineItem>, CheckoutError> {
    if lines.is_empty() {
        return Err(CheckoutError::Validation("no line items".to_string()));
    }

    let mut merged: Vec<LineItem> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.product_id.as_str().is_empty() {
            return Err(CheckoutError::Validation("empty product id".to_string()));
        }
        if line.quantity == 0 {
            return Err(CheckoutError::Validation(format!(
                "quantity for {} must be positive",
                line.product_id
            )));
        }
        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => {
                existing.quantity = existing.quantity.checked_add(line.quantity).ok_or_else(|| {
                    CheckoutError::Validation(format!(
                        "total quantity for {} is out of range",
                        line.product_id
                    ))
                })?;
            }
            None => merged.push(line.clone()),
        }
    }
    Ok(merged)
}

/// Coordinates a checkout across the user service, the product service,
/// the payment provider and order storage.
pub struct CheckoutOrchestrator {
    users: Arc<dyn UserDirectory>,
    products: Arc<dyn ProductCatalog>,
    payments: Arc<dyn PaymentGateway>,
    orders: Arc<dyn OrderRepository>,
    config: CheckoutConfig,
}

impl CheckoutOrchestrator {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        products: Arc<dyn ProductCatalog>,
        payments: Arc<dyn PaymentGateway>,
        orders: Arc<dyn OrderRepository>,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            users,
            products,
            payments,
            orders,
            config,
        }
    }

    pub fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    /// Runs a checkout end to end.
    ///
    /// No payment session is opened unless both lookups succeed, and no
    /// order row is written unless a session was opened. If the order write
    /// fails the session is expired before the error is returned.
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id, user_id = %request.user_id))]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutOutcome, CheckoutError> {
        metrics::counter!("checkout_requests_total").increment(1);
        let start = Instant::now();

        let result = self.run(request).await;

        metrics::histogram!("checkout_duration_seconds").record(start.elapsed().as_secs_f64());
        if let Err(ref e) = result {
            metrics::counter!("checkout_failures_total", "reason" => e.reason()).increment(1);
            tracing::warn!(error = %e, reason = e.reason(), "Checkout failed");
        }
        result
    }

    async fn run(&self, request: CheckoutRequest) -> Result<CheckoutOutcome, CheckoutError> {
        let lines = normalize_lines(&request.lines.line_items())?;
        let product_ids: Vec<ProductId> = lines.iter().map(|l| l.product_id.clone()).collect();

        let (user, product) = self.lookup(request.bearer.clone(), product_ids).await;
        let (customer, session_lines) = Self::evaluate(&lines, user, product)?;

        let order_lines = match request.lines {
            OrderLines::Single(product_id) => OrderLines::Single(product_id),
            OrderLines::Cart(_) => OrderLines::Cart(lines.clone()),
        };
        let metadata = PaymentMetadata {
            order_id: request.order_id,
            user_id: request.user_id.clone(),
            lines: order_lines,
        }
        .encode()
        .map_err(|e| CheckoutError::Validation(format!("cannot encode line items: {e}")))?;

        let session = self
            .payments
            .create_session(&SessionRequest {
                idempotency_key: request.order_id.to_string(),
                customer,
                line_items: session_lines,
                metadata,
            })
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Payment session creation failed");
                CheckoutError::PaymentSession(e)
            })?;
        tracing::info!(session_id = %session.id, "Payment session created");

        let order = Order::pending(request.order_id, request.user_id, lines, session.amount_total);
        if let Err(e) = self.orders.create(&order).await {
            tracing::error!(error = %e, session_id = %session.id, "Order persistence failed after session creation");
            let session_expired = match self.payments.expire_session(&session.id).await {
                Ok(()) => true,
                Err(expire_err) => {
                    tracing::error!(
                        error = %expire_err,
                        session_id = %session.id,
                        "Failed to expire dangling payment session"
                    );
                    false
                }
            };
            return Err(CheckoutError::OrderPersistence {
                order_id: request.order_id,
                session_id: session.id,
                session_expired,
                source: e,
            });
        }

        Ok(CheckoutOutcome {
            order_id: order.id,
            session_id: session.id,
            session_url: session.url,
            total_price: order.total_price,
        })
    }

    /// Runs both lookups as separate tasks reporting over one-slot channels.
    ///
    /// The tasks live in a `JoinSet`, so they are aborted when this future
    /// completes or is dropped.
    async fn lookup(
        &self,
        bearer: String,
        product_ids: Vec<ProductId>,
    ) -> (Branch<Option<String>>, Branch<Vec<ProductStock>>) {
        let mut tasks = JoinSet::new();

        let (user_tx, user_rx) = oneshot::channel();
        let users = Arc::clone(&self.users);
        tasks.spawn(async move {
            let _ = user_tx.send(users.billing_identity(&bearer).await);
        });

        let (product_tx, product_rx) = oneshot::channel();
        let products = Arc::clone(&self.products);
        tasks.spawn(async move {
            let _ = product_tx.send(products.stock(&product_ids).await);
        });

        let timeout = self.config.peer_timeout;
        let settled = match self.config.join {
            JoinStrategy::Sequential => {
                let user = recv_within(user_rx, timeout).await;
                let product = recv_within(product_rx, timeout).await;
                (user, product)
            }
            JoinStrategy::Multiplexed => recv_both(user_rx, product_rx, timeout).await,
        };

        tasks.abort_all();
        settled
    }

    fn evaluate(
        lines: &[LineItem],
        user: Branch<Option<String>>,
        product: Branch<Vec<ProductStock>>,
    ) -> Result<(String, Vec<SessionLineItem>), CheckoutError> {
        if let Some(e) = user.discovery_error().or(product.discovery_error()) {
            tracing::error!(error = %e, "Peer service resolution failed");
            return Err(CheckoutError::ServiceUnavailable(e.to_string()));
        }

        let customer = match user {
            Branch::Done(Ok(Some(id))) => id,
            other => {
                tracing::error!(branch = %other.describe(), "Billing identity lookup failed");
                return Err(CheckoutError::BillingIdentityUnresolved);
            }
        };

        let stock = match product {
            Branch::Done(Ok(stock)) => stock,
            other => {
                tracing::error!(branch = %other.describe(), "Stock lookup failed");
                let first = lines
                    .first()
                    .map(|l| l.product_id.clone())
                    .unwrap_or_else(|| ProductId::new(""));
                return Err(CheckoutError::ProductUnavailable(first));
            }
        };

        let mut session_lines = Vec::with_capacity(lines.len());
        for line in lines {
            let entry = stock
                .iter()
                .find(|s| s.product_id == line.product_id)
                .filter(|s| s.is_purchasable())
                .ok_or_else(|| CheckoutError::ProductUnavailable(line.product_id.clone()))?;
            session_lines.push(SessionLineItem {
                price_id: entry.price_id.clone(),
                quantity: line.quantity,
            });
        }

        Ok((customer, session_lines))
    }
}
