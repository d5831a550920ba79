//! Order-service router tests over in-memory peers, gateway and bus.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use api::routes::orders::OrderAppState;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{LineItem, Money, OrderId, UserId};
use event_bus::{EventSubscriber, InMemoryEventBus, PRODUCT_SERVICE_GROUP, TOPIC_ORDER_PAID};
use hmac::{Hmac, Mac};
use metrics_exporter_prometheus::PrometheusHandle;
use orders::{
    CheckoutConfig, CheckoutOrchestrator, InMemoryOrderRepository, InMemoryPaymentGateway, Order,
    OrderRepository, OrderStatus, PaymentWebhookHandler, SignatureVerifier, StaticProductCatalog,
    StaticUserDirectory,
};
use serde_json::{Value, json};
use sha2::Sha256;
use tower::ServiceExt;

const BEARER: &str = "Bearer test-token";
const WEBHOOK_SECRET: &str = "whsec_test";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct Harness {
    app: axum::Router,
    orders: InMemoryOrderRepository,
    payments: InMemoryPaymentGateway,
    bus: InMemoryEventBus,
}

async fn setup_with(users: StaticUserDirectory, secret: Option<&str>) -> Harness {
    let products = StaticProductCatalog::new();
    products.insert("P1", 10, "price_p1").await;
    products.insert("P2", 3, "price_p2").await;
    products.insert("SOLDOUT", 0, "price_soldout").await;

    let payments = InMemoryPaymentGateway::new();
    payments.set_price("price_p1", Money::from_minor(25_000)).await;
    payments.set_price("price_p2", Money::from_minor(1_500)).await;

    let orders = InMemoryOrderRepository::new();
    let bus = InMemoryEventBus::new();

    let orchestrator = CheckoutOrchestrator::new(
        Arc::new(users),
        Arc::new(products),
        Arc::new(payments.clone()),
        Arc::new(orders.clone()),
        CheckoutConfig::default(),
    );
    let mut webhook = PaymentWebhookHandler::new(Arc::new(orders.clone()), Arc::new(bus.clone()));
    if let Some(secret) = secret {
        webhook = webhook.with_verifier(SignatureVerifier::new(secret));
    }

    let state = Arc::new(OrderAppState {
        orchestrator,
        webhook,
        orders: Arc::new(orders.clone()),
    });

    Harness {
        app: api::create_order_app(state, get_metrics_handle()),
        orders,
        payments,
        bus,
    }
}

async fn setup() -> Harness {
    setup_with(StaticUserDirectory::with_identity("cus_123"), None).await
}

fn authed(method: &str, uri: &str, user: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", BEARER)
        .header("x-user-id", user)
}

fn json_body(value: &Value) -> Body {
    Body::from(serde_json::to_vec(value).unwrap())
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn signed(payload: &[u8], secret: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp();
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

fn payment_succeeded(intent_id: &str, metadata: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": "evt_1",
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": intent_id, "metadata": metadata } }
    }))
    .unwrap()
}

#[tokio::test]
async fn test_health_and_ping() {
    let h = setup().await;

    let response = h
        .app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");

    let response = h
        .app
        .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let h = setup().await;

    let response = h
        .app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_single_product_checkout() {
    let h = setup().await;

    let response = h
        .app
        .oneshot(
            authed("POST", "/orders/checkout/P1", "user-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let url = json["checkout_session_id"].as_str().unwrap();
    assert!(url.starts_with("https://"));
    assert_eq!(json["total_price"], 25_000);

    let order_id = OrderId::parse(json["order_id"].as_str().unwrap()).unwrap();
    let order = h.orders.get(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.lines, vec![LineItem::new("P1", 1)]);
}

#[tokio::test]
async fn test_checkout_requires_identity_headers() {
    let h = setup().await;

    let response = h
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/orders/checkout/P1")
                .header("x-user-id", "user-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(h.payments.create_calls().await, 0);
}

#[tokio::test]
async fn test_cart_checkout_uses_provisional_order_id() {
    let h = setup().await;
    let order_id = OrderId::new();

    let response = h
        .app
        .oneshot(
            authed("POST", &format!("/orders/cartcheckout/{order_id}"), "user-1")
                .header("content-type", "application/json")
                .body(json_body(&json!({
                    "line_items": [
                        {"product_id": "P1", "quantity": 2},
                        {"product_id": "P2", "quantity": 1}
                    ]
                })))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["order_id"], order_id.to_string());
    assert_eq!(json["total_price"], 51_500);

    let order = h.orders.get(order_id).await.unwrap().unwrap();
    assert_eq!(order.lines.len(), 2);
}

#[tokio::test]
async fn test_cart_checkout_without_id_generates_one() {
    let h = setup().await;

    let response = h
        .app
        .oneshot(
            authed("POST", "/orders/cartcheckout", "user-1")
                .header("content-type", "application/json")
                .body(json_body(&json!({
                    "line_items": [{"product_id": "P2", "quantity": 3}]
                })))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(OrderId::parse(json["order_id"].as_str().unwrap()).is_ok());
    assert_eq!(h.orders.count().await, 1);
}

#[tokio::test]
async fn test_empty_cart_checkout_is_rejected() {
    let h = setup().await;

    let response = h
        .app
        .oneshot(
            authed("POST", "/orders/cartcheckout", "user-1")
                .header("content-type", "application/json")
                .body(json_body(&json!({ "line_items": [] })))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.payments.create_calls().await, 0);
}

#[tokio::test]
async fn test_overflowing_merged_quantity_is_rejected() {
    let h = setup().await;
    let order_id = OrderId::new();

    let response = h
        .app
        .oneshot(
            authed("POST", &format!("/orders/cartcheckout/{order_id}"), "user-1")
                .header("content-type", "application/json")
                .body(json_body(&json!({
                    "line_items": [
                        {"product_id": "P1", "quantity": u32::MAX},
                        {"product_id": "P1", "quantity": 1}
                    ]
                })))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.payments.create_calls().await, 0);
    assert!(h.orders.get(order_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_invalid_order_id_is_rejected() {
    let h = setup().await;

    let response = h
        .app
        .oneshot(
            authed("POST", "/orders/cartcheckout/not-a-uuid", "user-1")
                .header("content-type", "application/json")
                .body(json_body(&json!({
                    "line_items": [{"product_id": "P1", "quantity": 1}]
                })))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_out_of_stock_product_conflicts() {
    let h = setup().await;

    let response = h
        .app
        .oneshot(
            authed("POST", "/orders/checkout/SOLDOUT", "user-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(h.payments.create_calls().await, 0);
    assert_eq!(h.orders.count().await, 0);
}

#[tokio::test]
async fn test_unresolved_billing_identity_is_bad_gateway() {
    let h = setup_with(StaticUserDirectory::without_identity(), None).await;

    let response = h
        .app
        .oneshot(
            authed("POST", "/orders/checkout/P1", "user-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = body_json(response).await;
    assert_eq!(json["error"], "billing identity unresolved");
    assert_eq!(h.payments.create_calls().await, 0);
}

#[tokio::test]
async fn test_payment_failure_writes_no_order() {
    let h = setup().await;
    h.payments.set_fail_on_create(true).await;

    let response = h
        .app
        .oneshot(
            authed("POST", "/orders/checkout/P1", "user-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = body_json(response).await;
    assert_eq!(json["error"], "payment session creation failed");
    assert_eq!(h.orders.count().await, 0);
}

#[tokio::test]
async fn test_get_order_is_owner_only() {
    let h = setup().await;
    let order = Order::pending(
        OrderId::new(),
        UserId::new("user-1"),
        vec![LineItem::new("P1", 1)],
        Money::from_minor(25_000),
    );
    h.orders.create(&order).await.unwrap();

    let response = h
        .app
        .clone()
        .oneshot(
            authed("GET", &format!("/orders/{}", order.id), "user-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "pending");
    assert_eq!(json["lines"][0]["product_id"], "P1");

    let response = h
        .app
        .oneshot(
            authed("GET", &format!("/orders/{}", order.id), "someone-else")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_checkout_then_webhook_settles_and_publishes() {
    let h = setup().await;
    let subscriber = h.bus.subscriber(PRODUCT_SERVICE_GROUP, &[TOPIC_ORDER_PAID]);
    let order_id = OrderId::new();

    let response = h
        .app
        .clone()
        .oneshot(
            authed("POST", &format!("/orders/cartcheckout/{order_id}"), "user-1")
                .header("content-type", "application/json")
                .body(json_body(&json!({
                    "line_items": [
                        {"product_id": "P1", "quantity": 2},
                        {"product_id": "P2", "quantity": 1}
                    ]
                })))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let products = serde_json::to_string(&json!({
        "line_items": [
            {"product_id": "P1", "quantity": 2},
            {"product_id": "P2", "quantity": 1}
        ]
    }))
    .unwrap();
    let payload = payment_succeeded(
        "pi_1",
        json!({ "order_id": order_id.to_string(), "user_id": "user-1", "products": products }),
    );

    let response = h
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["outcome"], "settled");

    let order = h.orders.get(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.stripe_transaction_id.as_deref(), Some("pi_1"));

    let mut received = Vec::new();
    for _ in 0..20 {
        received.extend(subscriber.poll(10, Duration::from_millis(50)).await.unwrap());
        if received.len() == 2 {
            break;
        }
    }
    assert_eq!(received.len(), 2);
}

#[tokio::test]
async fn test_webhook_for_unknown_order_is_acknowledged() {
    let h = setup().await;
    let payload = payment_succeeded(
        "pi_2",
        json!({ "order_id": OrderId::new().to_string(), "user_id": "user-1", "product_id": "P1" }),
    );

    let response = h
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["outcome"], "unknown_order");
}

#[tokio::test]
async fn test_malformed_webhook_is_bad_request() {
    let h = setup().await;

    let response = h
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_webhook_is_rejected() {
    let h = setup().await;
    let payload = vec![b' '; orders::MAX_WEBHOOK_BODY + 1];

    let response = h
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_webhook_signature_is_checked_when_configured() {
    let h = setup_with(
        StaticUserDirectory::with_identity("cus_123"),
        Some(WEBHOOK_SECRET),
    )
    .await;
    let order = Order::pending(
        OrderId::new(),
        UserId::new("user-1"),
        vec![LineItem::new("P1", 1)],
        Money::from_minor(25_000),
    );
    h.orders.create(&order).await.unwrap();
    let payload = payment_succeeded(
        "pi_3",
        json!({ "order_id": order.id.to_string(), "user_id": "user-1", "product_id": "P1" }),
    );

    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("stripe-signature", signed(&payload, "whsec_wrong"))
                .body(Body::from(payload.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let stored = h.orders.get(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Pending);

    let response = h
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("stripe-signature", signed(&payload, WEBHOOK_SECRET))
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let stored = h.orders.get(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Paid);
}
