//! HTTP surface tests: routing, identity headers, and error mapping.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use rust_decimal_macros::dec;
use tower::ServiceExt;

use solana_goal_engine::api::create_router;
use solana_goal_engine::app::{AppState, FundingConfig};
use solana_goal_engine::domain::DatabaseClient;
use solana_goal_engine::test_utils::{
    MockDatabaseClient, MockLedgerClient, MockNotifier, MockSessionProvider, MockSwapClient,
    sample_goal,
};

fn build_app() -> (Router, Arc<MockDatabaseClient>) {
    let db = Arc::new(MockDatabaseClient::new());
    let state = Arc::new(AppState::new(
        db.clone(),
        Arc::new(MockSwapClient::new()),
        Arc::new(MockLedgerClient::new()),
        Arc::new(MockNotifier::new()),
        Arc::new(MockSessionProvider::new()),
        FundingConfig::default(),
    ));
    (create_router(state), db)
}

fn request(method: &str, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-user-id", "user-1")
        .header(header::CONTENT_TYPE, "application/json");
    match body {
        Some(json) => builder.body(Body::from(json.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoints() {
    let (app, _db) = build_app();

    let response = app
        .clone()
        .oneshot(request("GET", "/health", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");

    let response = app
        .clone()
        .oneshot(request("GET", "/health/live", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(request("GET", "/health/ready", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let (app, _db) = build_app();
    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/goals")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"]["type"], "authentication_error");
}

#[tokio::test]
async fn test_goal_creation_and_fetch() {
    let (app, _db) = build_app();

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/goals",
            Some(serde_json::json!({
                "token_symbol": "SOL",
                "token_mint": "So11111111111111111111111111111111111111112",
                "token_decimals": 9,
                "target_quantity": "10",
                "contribution_amount": "25",
                "contribution_frequency": "weekly",
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let goal_id = body["id"].as_str().unwrap().to_string();
    assert_eq!(body["status"], "active");

    let response = app
        .oneshot(request("GET", &format!("/goals/{goal_id}"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_goal_validation_error() {
    let (app, _db) = build_app();
    let response = app
        .oneshot(request(
            "POST",
            "/goals",
            Some(serde_json::json!({
                "token_symbol": "",
                "token_mint": "too-short",
                "token_decimals": 9,
                "target_quantity": "10",
                "contribution_amount": "25",
                "contribution_frequency": "weekly",
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["type"], "validation_error");
    assert_eq!(body["error"]["retryable"], false);
}

#[tokio::test]
async fn test_pause_and_resume_goal() {
    let (app, db) = build_app();
    db.create_goal(&sample_goal("goal-1", "user-1")).await.unwrap();

    let response = app
        .clone()
        .oneshot(request("POST", "/goals/goal-1/pause", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "paused");

    // Contributions are refused while paused.
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/contributions",
            Some(serde_json::json!({
                "batch_id": "batch-1",
                "goal_id": "goal-1",
                "amount": "25",
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["error"]["type"], "goal_inactive");

    let response = app
        .oneshot(request("POST", "/goals/goal-1/resume", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "active");
}

#[tokio::test]
async fn test_contribution_lifecycle_over_http() {
    let (app, db) = build_app();
    db.create_goal(&sample_goal("goal-1", "user-1")).await.unwrap();

    let contribution = serde_json::json!({
        "batch_id": "batch-1",
        "goal_id": "goal-1",
        "amount": "25",
    });
    let response = app
        .clone()
        .oneshot(request("POST", "/contributions", Some(contribution.clone())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["transaction"]["state"], "pending_onramp");

    // Idempotent retry returns the same row.
    let first_id = body["transaction"]["id"].clone();
    let response = app
        .clone()
        .oneshot(request("POST", "/contributions", Some(contribution)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["transaction"]["id"], first_id);

    let response = app
        .clone()
        .oneshot(request("POST", "/contributions/batch-1/onramp", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/contributions/batch-1/quote",
            Some(serde_json::json!({
                "signer_address": "So11111111111111111111111111111111111111112",
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["swap_transaction"].as_str().is_some());

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/contributions/batch-1/submit",
            Some(serde_json::json!({ "signed_transaction": "c2lnbmVk" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["state"], "swap_submitted");

    // Status polls the ledger (mock confirms by default) before deriving.
    let response = app
        .oneshot(request("GET", "/contributions/batch-1", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["state"], "swap_confirmed");
    assert_eq!(body["next_action"], "done");
    assert_eq!(body["cancelable"], false);
    assert!(body["explorer_url"].as_str().unwrap().starts_with("https://solscan.io/tx/"));
}

#[tokio::test]
async fn test_unknown_batch_is_not_found() {
    let (app, _db) = build_app();
    let response = app
        .oneshot(request("GET", "/contributions/missing", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"]["type"], "not_found");
}

#[tokio::test]
async fn test_cancel_endpoint_is_idempotent() {
    let (app, db) = build_app();
    db.create_goal(&sample_goal("goal-1", "user-1")).await.unwrap();
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/contributions",
            Some(serde_json::json!({
                "batch_id": "batch-1",
                "goal_id": "goal-1",
                "amount": "25",
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(request("POST", "/contributions/batch-1/cancel", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["newly_canceled"], true);

    let response = app
        .oneshot(request("POST", "/contributions/batch-1/cancel", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["newly_canceled"], false);
}

#[tokio::test]
async fn test_admin_reconcile_endpoint() {
    let (app, _db) = build_app();
    let response = app
        .oneshot(request(
            "POST",
            "/admin/reconcile",
            Some(serde_json::json!({ "stale_after_secs": 60, "batch_size": 10 })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["resolved"], 0);
}

#[tokio::test]
async fn test_openapi_spec_served() {
    let (app, _db) = build_app();
    let response = app
        .oneshot(request("GET", "/api-docs/openapi.json", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["paths"].get("/contributions").is_some());
}
