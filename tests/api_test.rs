//! Integration tests for API endpoints

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use common::{harness, Harness};
use serde_json::{json, Value};
use signalstack::config::Config;
use signalstack::{api, AppState};
use std::sync::Arc;
use tower::ServiceExt;

fn app(h: &Harness) -> Router {
    let state = AppState {
        config: Arc::new(Config::from_env()),
        ledger: h.ledger.clone(),
    };
    api::router().with_state(state)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_alice(app: &Router) {
    let (status, _) = send(
        app,
        "POST",
        "/api/accounts",
        Some(json!({"userId": "alice", "initialBalance": 100000.0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

async fn deploy(app: &Router, fund: f64) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        "/api/accounts/alice/bots",
        Some(json!({"strategy": "shannon", "riskProfile": 50, "allocatedFund": fund})),
    )
    .await
}

#[tokio::test]
async fn test_health() {
    let h = harness();
    let app = app(&h);
    let (status, body) = send(&app, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["accounts"], 0);
}

#[tokio::test]
async fn test_list_strategies() {
    let h = harness();
    let app = app(&h);
    let (status, body) = send(&app, "GET", "/api/strategies", None).await;
    assert_eq!(status, StatusCode::OK);

    let strategies = body["data"].as_array().unwrap();
    assert_eq!(strategies.len(), 6);
    assert_eq!(strategies[0]["key"], "shannon");
    assert_eq!(strategies[5]["key"], "tactical");
}

#[tokio::test]
async fn test_create_and_get_account() {
    let h = harness();
    let app = app(&h);
    create_alice(&app).await;

    let (status, body) = send(&app, "GET", "/api/accounts/alice", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["userId"], "alice");
    assert_eq!(body["data"]["cashBalance"], 100000.0);
    assert_eq!(body["data"]["totalValue"], 100000.0);
    assert_eq!(body["data"]["pnl"], 0.0);
}

#[tokio::test]
async fn test_bot_lifecycle() {
    let h = harness();
    let app = app(&h);
    create_alice(&app).await;

    let (status, body) = deploy(&app, 10_000.0).await;
    assert_eq!(status, StatusCode::CREATED);
    let bot_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["status"], "active");
    assert_eq!(body["data"]["strategy"], "shannon");

    h.prices.set_price("BTC", 53_000.0);
    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/accounts/alice/bots/{}/stop", bot_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let liquidation = body["data"]["liquidationValue"].as_f64().unwrap();
    assert!((liquidation - 10_300.0).abs() < 1e-6);

    let (status, body) = send(
        &app,
        "GET",
        &format!("/api/accounts/alice/bots/{}/performance", bot_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!((body["data"]["pnlPercent"].as_f64().unwrap() - 3.0).abs() < 1e-6);
    assert_eq!(body["data"]["history"].as_array().unwrap().len(), 2);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/accounts/alice/bots/{}/resume", bot_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "active");

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/accounts/alice/bots/{}/revalue", bot_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/accounts/alice/bots/{}/trades", bot_id),
        Some(json!({"asset": "ETH", "action": "sell", "amount": 1.0, "price": 2500.0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["action"], "sell");
    assert_eq!(body["data"]["value"], 2500.0);

    let uri = format!("/api/accounts/alice/bots/{}", bot_id);
    let (status, body) = send(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_STATE");

    send(&app, "POST", &format!("{}/stop", uri), None).await;
    let (status, _) = send(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_error_responses() {
    let h = harness();
    let app = app(&h);

    let (status, body) = send(&app, "GET", "/api/accounts/nobody", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "ACCOUNT_NOT_FOUND");

    create_alice(&app).await;
    let (status, body) = deploy(&app, 500_000.0).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INSUFFICIENT_FUNDS");

    let (status, body) = send(&app, "POST", "/api/accounts/alice/bots/bot_x/stop", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "BOT_NOT_FOUND");
}

#[tokio::test]
async fn test_recommendation_and_risk() {
    let h = harness();
    let app = app(&h);
    create_alice(&app).await;
    deploy(&app, 10_000.0).await;

    let (status, body) = send(
        &app,
        "GET",
        "/api/accounts/alice/recommendation?riskProfile=30",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["action"], "hold");
    assert!(body["data"]["targetWeights"]["BTC"].is_number());

    let (status, body) = send(&app, "GET", "/api/accounts/alice/risk", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["diversification"], 2);
    assert_eq!(body["data"]["limits"]["minDiversification"], 3);
}
