//! Inventory updater tests over the in-memory bus and stores.

use std::sync::Arc;
use std::time::Duration;

use common::{OrderId, ProductId, UserId};
use event_bus::{
    EventPublisher, InMemoryEventBus, OrderPaidEvent, PRODUCT_SERVICE_GROUP, TOPIC_ORDER_PAID,
};
use inventory::{
    CartAggregator, CartCheckout, CartRepository, CartStatus, DecrementOutcome, DedupPolicy,
    InMemoryCartRepository, InMemoryProductStore, InventoryUpdater, RecordOutcome,
    RecordingOrderCheckout, UpdaterConfig,
};
use tokio::time::Instant;

struct Harness {
    bus: InMemoryEventBus,
    products: InMemoryProductStore,
    carts: InMemoryCartRepository,
}

impl Harness {
    async fn new() -> Self {
        let products = InMemoryProductStore::new();
        products.upsert("P1", 10, "price_p1").await;
        Self {
            bus: InMemoryEventBus::new(),
            products,
            carts: InMemoryCartRepository::new(),
        }
    }

    fn updater(&self, dedup: DedupPolicy) -> InventoryUpdater {
        InventoryUpdater::new(
            Arc::new(self.bus.subscriber(PRODUCT_SERVICE_GROUP, &[TOPIC_ORDER_PAID])),
            Arc::new(self.products.clone()),
            Arc::new(self.carts.clone()),
            UpdaterConfig {
                poll_timeout: Duration::from_millis(50),
                dedup,
                ..UpdaterConfig::default()
            },
        )
    }

    async fn publish(&self, event: &OrderPaidEvent) {
        self.bus.publish_order_paid(event).await.unwrap();
    }
}

fn paid(product: &str, quantity: u32) -> OrderPaidEvent {
    OrderPaidEvent::new(OrderId::new(), ProductId::new(product), quantity)
}

#[tokio::test]
async fn order_paid_decrements_stock() {
    let h = Harness::new().await;
    h.publish(&paid("P1", 3)).await;

    let handled = h.updater(DedupPolicy::Enabled).poll_once().await.unwrap();

    assert_eq!(handled, 1);
    assert_eq!(h.products.stock_of("P1").await, Some(7));
    assert_eq!(
        h.bus.committed_offset(PRODUCT_SERVICE_GROUP, TOPIC_ORDER_PAID).await,
        1
    );
}

#[tokio::test]
async fn redelivery_without_dedup_decrements_twice() {
    let h = Harness::new().await;
    h.publish(&paid("P1", 3)).await;
    let updater = h.updater(DedupPolicy::Disabled);

    updater.poll_once().await.unwrap();
    h.bus.reset_offsets(PRODUCT_SERVICE_GROUP, TOPIC_ORDER_PAID).await;
    updater.poll_once().await.unwrap();

    assert_eq!(h.products.stock_of("P1").await, Some(4));
}

#[tokio::test]
async fn redelivery_with_dedup_decrements_once() {
    let h = Harness::new().await;
    h.publish(&paid("P1", 3)).await;
    let updater = h.updater(DedupPolicy::Enabled);

    updater.poll_once().await.unwrap();
    h.bus.reset_offsets(PRODUCT_SERVICE_GROUP, TOPIC_ORDER_PAID).await;
    updater.poll_once().await.unwrap();

    assert_eq!(h.products.stock_of("P1").await, Some(7));
}

#[tokio::test]
async fn zero_stock_stays_at_zero() {
    let h = Harness::new().await;
    h.products.upsert("P0", 0, "price_p0").await;
    let updater = h.updater(DedupPolicy::Enabled);
    h.publish(&paid("P0", 1)).await;

    let records = h.bus.published(TOPIC_ORDER_PAID).await;
    let outcome = updater.handle_record(&records[0]).await.unwrap();

    assert_eq!(
        outcome,
        RecordOutcome::Decrement(DecrementOutcome::StockExhausted)
    );
    assert_eq!(h.products.stock_of("P0").await, Some(0));
}

#[tokio::test]
async fn undecodable_record_is_committed_and_skipped() {
    let h = Harness::new().await;
    h.bus
        .publish(TOPIC_ORDER_PAID, "k", b"not json".to_vec())
        .await
        .unwrap();
    h.publish(&paid("P1", 2)).await;

    let handled = h.updater(DedupPolicy::Enabled).poll_once().await.unwrap();

    assert_eq!(handled, 2);
    assert_eq!(h.products.stock_of("P1").await, Some(8));
    assert_eq!(
        h.bus.committed_offset(PRODUCT_SERVICE_GROUP, TOPIC_ORDER_PAID).await,
        2
    );
}

#[tokio::test]
async fn store_failure_keeps_record_uncommitted_and_retries_it() {
    let h = Harness::new().await;
    h.publish(&paid("P1", 3)).await;
    let updater = h.updater(DedupPolicy::Enabled);
    h.products.set_fail_on_update(true).await;

    assert!(updater.poll_once().await.is_err());
    assert_eq!(
        h.bus.committed_offset(PRODUCT_SERVICE_GROUP, TOPIC_ORDER_PAID).await,
        0
    );

    h.products.set_fail_on_update(false).await;
    let handled = updater.poll_once().await.unwrap();

    assert_eq!(handled, 1);
    assert_eq!(h.products.stock_of("P1").await, Some(7));
}

#[tokio::test]
async fn paid_cart_order_completes_pending_lines() {
    let h = Harness::new().await;
    let orders = RecordingOrderCheckout::new();
    let aggregator = CartAggregator::new(Arc::new(h.carts.clone()), Arc::new(orders));
    let user = UserId::new("user-1");
    aggregator.add_to_cart(&user, &ProductId::new("P1"), 2).await.unwrap();
    let CartCheckout::Started { order_id, .. } =
        aggregator.checkout(&user, "Bearer t").await.unwrap()
    else {
        panic!("expected a started checkout");
    };

    h.publish(&OrderPaidEvent::new(order_id, ProductId::new("P1"), 2)).await;
    h.updater(DedupPolicy::Enabled).poll_once().await.unwrap();

    let lines = h.carts.all().await;
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].status, CartStatus::Completed);
    assert_eq!(h.products.stock_of("P1").await, Some(8));
}

#[tokio::test]
async fn cart_merge_keeps_one_row() {
    let h = Harness::new().await;
    let aggregator = CartAggregator::new(
        Arc::new(h.carts.clone()),
        Arc::new(RecordingOrderCheckout::new()),
    );
    let user = UserId::new("user-1");

    aggregator.add_to_cart(&user, &ProductId::new("A"), 2).await.unwrap();
    aggregator.add_to_cart(&user, &ProductId::new("A"), 2).await.unwrap();

    let cart = h.carts.in_progress(&user).await.unwrap().unwrap();
    assert_eq!(cart.lines.len(), 1);
    assert_eq!(cart.lines[0].quantity, 4);
}

#[tokio::test(start_paused = true)]
async fn broker_errors_back_off_and_the_loop_keeps_running() {
    let h = Harness::new().await;
    h.bus.fail_next_polls(2).await;
    h.publish(&paid("P1", 1)).await;
    let updater = Arc::new(h.updater(DedupPolicy::Enabled));
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let start = Instant::now();

    let task = {
        let updater = Arc::clone(&updater);
        tokio::spawn(async move {
            updater
                .run(async {
                    let _ = stop_rx.await;
                })
                .await
        })
    };

    while h.products.stock_of("P1").await != Some(9) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    let elapsed = start.elapsed();
    stop_tx.send(()).unwrap();
    task.await.unwrap();

    assert!(elapsed >= Duration::from_secs(20), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(21), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_backoff() {
    let h = Harness::new().await;
    h.bus.fail_next_polls(1).await;
    let updater = h.updater(DedupPolicy::Enabled);
    let start = Instant::now();

    updater.run(tokio::time::sleep(Duration::from_secs(1))).await;

    assert!(start.elapsed() < Duration::from_secs(2));
}
