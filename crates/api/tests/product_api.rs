//! Product-service router tests over in-memory stores.

use std::sync::{Arc, OnceLock};

use api::routes::products::ProductAppState;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::UserId;
use inventory::{
    CartAggregator, CartRepository, CartStatus, InMemoryCartRepository, InMemoryProductStore,
    RecordingOrderCheckout,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tower::ServiceExt;

const BEARER: &str = "Bearer test-token";

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
    carts: InMemoryCartRepository,
    orders: RecordingOrderCheckout,
}

async fn setup() -> Harness {
    let products = InMemoryProductStore::new();
    products.upsert("P1", 10, "price_p1").await;
    products.upsert("P2", 0, "price_p2").await;

    let carts = InMemoryCartRepository::new();
    let orders = RecordingOrderCheckout::new();

    let state = Arc::new(ProductAppState {
        carts: CartAggregator::new(Arc::new(carts.clone()), Arc::new(orders.clone())),
        products: Arc::new(products),
    });

    Harness {
        app: api::create_product_app(state, get_metrics_handle()),
        carts,
        orders,
    }
}

fn authed(method: &str, uri: &str, user: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", BEARER)
        .header("x-user-id", user)
}

fn add_request(user: &str, product_id: &str, quantity: u32) -> Request<Body> {
    authed("POST", "/cart", user)
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::to_vec(&json!({ "product_id": product_id, "quantity": quantity }))
                .unwrap(),
        ))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_batched_stock_lookup() {
    let h = setup().await;

    let response = h
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/products/stock")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::to_vec(&json!({ "productIds": ["P2", "missing", "P1"] })).unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let items = json.as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["product_id"], "P2");
    assert_eq!(items[0]["stock"], 0);
    assert_eq!(items[1]["product_id"], "P1");
    assert_eq!(items[1]["price_id"], "price_p1");
}

#[tokio::test]
async fn test_empty_stock_query_is_rejected() {
    let h = setup().await;

    let response = h
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/products/stock")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"productIds": []}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_single_product_stock() {
    let h = setup().await;

    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/products/stock/P1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["stock"], 10);

    let response = h
        .app
        .oneshot(
            Request::builder()
                .uri("/products/stock/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_add_to_cart_merges_quantities() {
    let h = setup().await;

    let first = h.app.clone().oneshot(add_request("user-1", "P1", 2)).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let second = h.app.clone().oneshot(add_request("user-1", "P1", 2)).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(body_json(second).await["quantity"], 4);

    let response = h
        .app
        .oneshot(authed("GET", "/cart", "user-1").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["lines"].as_array().unwrap().len(), 1);
    assert_eq!(json["lines"][0]["status"], "inprogress");
    assert!(json["order_id"].is_string());
}

#[tokio::test]
async fn test_zero_quantity_is_rejected() {
    let h = setup().await;

    let response = h.app.oneshot(add_request("user-1", "P1", 0)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(h.carts.all().await.is_empty());
}

#[tokio::test]
async fn test_oversized_cart_body_is_rejected() {
    let h = setup().await;
    let padding = "x".repeat(6 * 1024);
    let body = serde_json::to_vec(&json!({ "product_id": padding, "quantity": 1 })).unwrap();

    let response = h
        .app
        .oneshot(
            authed("POST", "/cart", "user-1")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(h.carts.all().await.is_empty());
}

#[tokio::test]
async fn test_cart_requires_identity() {
    let h = setup().await;

    let response = h
        .app
        .oneshot(Request::builder().uri("/cart").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_empty_cart_reads_as_no_lines() {
    let h = setup().await;

    let response = h
        .app
        .oneshot(authed("GET", "/cart", "user-1").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["order_id"].is_null());
    assert!(json["lines"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_cart_line() {
    let h = setup().await;
    let added = h.app.clone().oneshot(add_request("user-1", "P1", 1)).await.unwrap();
    let line_id = body_json(added).await["id"].as_str().unwrap().to_string();

    let other_user = h
        .app
        .clone()
        .oneshot(
            authed("DELETE", &format!("/cart/{line_id}"), "user-2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(other_user.status(), StatusCode::NOT_FOUND);

    let response = h
        .app
        .clone()
        .oneshot(
            authed("DELETE", &format!("/cart/{line_id}"), "user-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(h.carts.all().await.is_empty());

    let again = h
        .app
        .oneshot(
            authed("DELETE", &format!("/cart/{line_id}"), "user-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cart_checkout_forwards_lines_and_bearer() {
    let h = setup().await;
    h.app.clone().oneshot(add_request("user-1", "P1", 2)).await.unwrap();
    h.app.clone().oneshot(add_request("user-1", "P2", 1)).await.unwrap();

    let response = h
        .app
        .oneshot(
            authed("POST", "/cart/checkout", "user-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let order_id = json["order_id"].as_str().unwrap().to_string();
    assert_eq!(
        json["checkout_session_id"],
        format!("https://checkout.test/pay/{order_id}")
    );

    let requests = h.orders.requests().await;
    assert_eq!(requests.len(), 1);
    let sent = &requests[0];
    assert_eq!(sent.order_id.to_string(), order_id);
    assert_eq!(sent.user_id, UserId::new("user-1"));
    assert_eq!(sent.bearer, BEARER);
    assert_eq!(sent.request.line_items.len(), 2);

    let pending = h.carts.all().await;
    assert!(pending.iter().all(|l| l.status == CartStatus::Pending));
}

#[tokio::test]
async fn test_checkout_of_empty_cart_is_a_no_op() {
    let h = setup().await;

    let response = h
        .app
        .oneshot(
            authed("POST", "/cart/checkout", "user-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["checkout_session_id"].is_null());
    assert!(json["order_id"].is_null());
    assert_eq!(h.orders.calls(), 0);
}

#[tokio::test]
async fn test_order_service_failure_is_bad_gateway() {
    let h = setup().await;
    h.orders.set_fail_status(Some(500)).await;
    h.app.clone().oneshot(add_request("user-1", "P1", 1)).await.unwrap();

    let response = h
        .app
        .oneshot(
            authed("POST", "/cart/checkout", "user-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["error"], "error fetching checkout session");
    assert!(
        h.carts
            .in_progress(&UserId::new("user-1"))
            .await
            .unwrap()
            .is_none()
    );
}
