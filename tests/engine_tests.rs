//! Cross-module scenarios that need the full lane/engine wiring rather
//! than a single component in isolation: a stop cascade driven through
//! the HTTP surface, and a warm-restart round trip through `AppState`.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use matching_core::{
    api::{OrderAck, router},
    snapshot::BookSnapshot,
    state::AppState,
};
use serde_json::{Value, json};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn ack(res: axum::response::Response) -> OrderAck {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_json(res: axum::response::Response) -> Value {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// S5, driven end-to-end through the HTTP surface rather than straight
/// at `MatchingEngine`: two armed SELL stops below a resting bid ladder
/// must both fire off a single incoming SELL market order.
#[tokio::test]
async fn stop_cascade_fires_through_the_http_surface() {
    let dir = tempdir().unwrap();
    let state = AppState::test_default(dir.path()).await.unwrap();
    let app = router(state);

    for price in ["100", "99", "98"] {
        let res = app
            .clone()
            .oneshot(post(
                "/orders",
                json!({
                    "symbol": "BTC-USD",
                    "side": "buy",
                    "kind": "limit",
                    "limit_price": price,
                    "quantity": "1",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    for stop_price in ["100", "99"] {
        let res = app
            .clone()
            .oneshot(post(
                "/orders",
                json!({
                    "symbol": "BTC-USD",
                    "side": "sell",
                    "kind": "stop_market",
                    "stop_price": stop_price,
                    "quantity": "1",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let a = ack(res).await;
        assert_eq!(a.status, "armed");
    }

    let res = app
        .clone()
        .oneshot(post(
            "/orders",
            json!({
                "symbol": "BTC-USD",
                "side": "sell",
                "kind": "market",
                "quantity": "1",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let a = ack(res).await;

    // root order trades at 100, dragging last_price to 100; that
    // triggers the stop armed at 100, whose own fill at 99 triggers
    // the stop armed at 99, all within the one HTTP call.
    assert_eq!(a.trades.len(), 3);
    assert_eq!(a.trades[0].price.to_string(), "100");
    assert_eq!(a.trades[1].price.to_string(), "99");
    assert_eq!(a.trades[2].price.to_string(), "98");
    assert!(!a.cascade_overflow);

    let res = app
        .oneshot(
            Request::builder()
                .uri("/book/BTC-USD")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let snap = body_json(res).await;
    assert!(snap["bids"].as_array().unwrap().is_empty());
}

/// Snapshot round trip (property 9): resting orders and armed stops
/// exported from a live lane and fed into a freshly constructed
/// `AppState` come back with their FIFO order and status intact.
#[tokio::test]
async fn warm_restart_preserves_depth_and_fifo_order() {
    let dir = tempdir().unwrap();
    let state = AppState::test_default(dir.path()).await.unwrap();
    let app = router(state.clone());

    // Two resting bids at the same price, FIFO A-then-B.
    for qty in ["2", "3"] {
        let res = app
            .clone()
            .oneshot(post(
                "/orders",
                json!({
                    "symbol": "BTC-USD",
                    "side": "buy",
                    "kind": "limit",
                    "limit_price": "50",
                    "quantity": qty,
                }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    let res = app
        .oneshot(post(
            "/orders",
            json!({
                "symbol": "BTC-USD",
                "side": "sell",
                "kind": "stop_limit",
                "stop_price": "60",
                "limit_price": "59",
                "quantity": "1",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let snapshots = state.export_all_snapshots().await;
    let btc = snapshots.get("BTC-USD").unwrap();
    assert_eq!(btc.resting_orders.len(), 2);
    assert_eq!(btc.armed_stops.len(), 1);

    // Round trip through JSON on disk, exactly as main.rs does on shutdown/startup.
    let path = dir.path().join("BTC-USD.json");
    btc.save(&path).unwrap();
    let reloaded = BookSnapshot::load(&path).unwrap();

    let mut restored = std::collections::HashMap::new();
    restored.insert("BTC-USD".to_string(), reloaded);

    let dir2 = tempdir().unwrap();
    let state2 = AppState::new(
        dir2.path(),
        matching_core::instrument::SymbolRegistry::with_default_pairs(),
        CancellationToken::new(),
        restored,
    )
    .await
    .unwrap();
    let app2 = router(state2);

    let res = app2
        .clone()
        .oneshot(
            Request::builder()
                .uri("/book/BTC-USD?depth=10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let snap = body_json(res).await;
    assert_eq!(snap["bids"][0][0].as_str(), Some("50"));
    assert_eq!(snap["bids"][0][1].as_str(), Some("5"));

    // FIFO is preserved: a SELL for 2 must drain the first-arrived
    // order (qty 2) entirely before touching the second (qty 3).
    let res = app2
        .oneshot(post(
            "/orders",
            json!({
                "symbol": "BTC-USD",
                "side": "sell",
                "kind": "limit",
                "limit_price": "50",
                "quantity": "2",
            }),
        ))
        .await
        .unwrap();
    let a = ack(res).await;
    assert_eq!(a.trades.len(), 1);
    assert_eq!(a.trades[0].quantity.to_string(), "2");
}
