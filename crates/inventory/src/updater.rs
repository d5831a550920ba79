//! Consumer-group loop that applies `OrderPaidEvent`s to stock.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use event_bus::{BusRecord, EventSubscriber};
use tokio::sync::Mutex;

use crate::cart::CartRepository;
use crate::error::Result;
use crate::product::{DecrementOutcome, DedupPolicy, ProductStore};

/// Tuning for [`InventoryUpdater`].
#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    /// Most records taken per poll.
    pub batch_size: usize,
    /// How long one poll waits for records.
    pub poll_timeout: Duration,
    /// Fixed pause after a broker or store error.
    pub backoff: Duration,
    pub dedup: DedupPolicy,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            poll_timeout: Duration::from_secs(1),
            backoff: Duration::from_secs(10),
            dedup: DedupPolicy::Enabled,
        }
    }
}

/// How one record was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Decrement(DecrementOutcome),
    /// The payload is not an `OrderPaidEvent`; committed and skipped.
    Undecodable,
}

impl RecordOutcome {
    /// Metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordOutcome::Decrement(outcome) => outcome.as_str(),
            RecordOutcome::Undecodable => "undecodable",
        }
    }
}

/// Polls the `OrderPaid` subscription and decrements stock per record.
///
/// Records are committed one by one after they are applied. A record whose
/// store update fails stays at the head of the local backlog and is retried
/// after the backoff, so a failure never lets a later commit skip it.
pub struct InventoryUpdater {
    subscriber: Arc<dyn EventSubscriber>,
    products: Arc<dyn ProductStore>,
    carts: Arc<dyn CartRepository>,
    config: UpdaterConfig,
    backlog: Mutex<VecDeque<BusRecord>>,
}

impl InventoryUpdater {
    pub fn new(
        subscriber: Arc<dyn EventSubscriber>,
        products: Arc<dyn ProductStore>,
        carts: Arc<dyn CartRepository>,
        config: UpdaterConfig,
    ) -> Self {
        Self {
            subscriber,
            products,
            carts,
            config,
            backlog: Mutex::new(VecDeque::new()),
        }
    }

    /// Runs until `shutdown` resolves. Errors never end the loop.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        tracing::info!(dedup = ?self.config.dedup, "Inventory updater started");

        loop {
            let result = tokio::select! {
                _ = &mut shutdown => break,
                result = self.poll_once() => result,
            };

            if let Err(e) = result {
                tracing::warn!(
                    error = %e,
                    backoff_secs = self.config.backoff.as_secs(),
                    "Inventory update failed, backing off"
                );
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(self.config.backoff) => {}
                }
            }
        }

        tracing::info!("Inventory updater stopped");
    }

    /// Handles the backlog, polling for a new batch when it is empty.
    /// Returns how many records were handled and committed.
    pub async fn poll_once(&self) -> Result<usize> {
        let mut backlog = self.backlog.lock().await;
        if backlog.is_empty() {
            let batch = self
                .subscriber
                .poll(self.config.batch_size, self.config.poll_timeout)
                .await?;
            backlog.extend(batch);
        }

        let mut handled = 0;
        while let Some(record) = backlog.front() {
            self.handle_record(record).await?;
            self.subscriber.commit(record).await?;
            backlog.pop_front();
            handled += 1;
        }
        Ok(handled)
    }

    /// Applies one record. Store errors propagate; everything else is an
    /// outcome.
    #[tracing::instrument(skip(self, record), fields(partition = record.partition, offset = record.offset))]
    pub async fn handle_record(&self, record: &BusRecord) -> Result<RecordOutcome> {
        let event = match record.decode_order_paid() {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping undecodable record");
                metrics::counter!("inventory_decrements_total", "outcome" => "undecodable")
                    .increment(1);
                return Ok(RecordOutcome::Undecodable);
            }
        };

        let outcome = self
            .products
            .apply_order_paid(&event, self.config.dedup)
            .await?;
        metrics::counter!("inventory_decrements_total", "outcome" => outcome.as_str()).increment(1);

        match outcome {
            DecrementOutcome::Applied { remaining } => tracing::info!(
                order_id = %event.order_id,
                product_id = %event.product_id,
                quantity = event.quantity,
                remaining,
                "Stock decremented"
            ),
            DecrementOutcome::StockExhausted => tracing::warn!(
                order_id = %event.order_id,
                product_id = %event.product_id,
                "Stock already exhausted"
            ),
            DecrementOutcome::Duplicate => tracing::debug!(
                order_id = %event.order_id,
                product_id = %event.product_id,
                "Skipping already applied event"
            ),
            DecrementOutcome::UnknownProduct => tracing::warn!(
                order_id = %event.order_id,
                product_id = %event.product_id,
                "OrderPaid for unknown product"
            ),
        }

        let completed = self.carts.complete_order(event.order_id).await?;
        if completed > 0 {
            tracing::info!(order_id = %event.order_id, lines = completed, "Cart completed");
        }

        Ok(RecordOutcome::Decrement(outcome))
    }
}
