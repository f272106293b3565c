//! HTTP surface tests for the vault service.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::util::ServiceExt;

use meridian_vault::{build_router, Ed25519Signer, Ledger, RationaleStore, VaultState};

fn app() -> (Arc<Ledger>, axum::Router) {
    let signer = Ed25519Signer::generate();
    let ledger = Arc::new(Ledger::new(signer.clone()).unwrap());
    let rationales = Arc::new(RationaleStore::new(signer, ledger.clone()));
    let router = build_router(VaultState {
        ledger: ledger.clone(),
        rationales,
    });
    (ledger, router)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn fresh_ledger_lists_only_genesis_and_verifies() {
    let (_, app) = app();

    let response = app
        .clone()
        .oneshot(Request::get("/api/v1/ledger").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["entries"][0]["entry_type"], "genesis");
    assert_eq!(
        body["entries"][0]["previous_hash"],
        "0".repeat(64).as_str()
    );

    let response = app
        .oneshot(
            Request::get("/api/v1/ledger/verify")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["valid"], true);
    assert_eq!(body["entries"], 1);
}

#[tokio::test]
async fn rationale_create_anchors_a_decision_entry() {
    let (ledger, app) = app();

    let response = app
        .clone()
        .oneshot(
            Request::post("/api/v1/rationales")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({
                        "org_id": "org-1",
                        "repo_id": "repo-1",
                        "title": "adopt event sourcing",
                        "body": "replay gives us audit and recovery in one mechanism",
                        "created_by": "alex",
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert_eq!(created["signature"].as_str().unwrap().len(), 128);

    assert_eq!(ledger.len(), 2);
    assert!(ledger.verify().valid);

    // The stored record is retrievable and filtered listing finds it.
    let id = created["id"].as_str().unwrap();
    let response = app
        .clone()
        .oneshot(
            Request::get(format!("/api/v1/rationales/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::get("/api/v1/rationales?org_id=org-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let listed = body_json(response).await;
    assert_eq!(listed["total"], 1);
}

#[tokio::test]
async fn missing_entries_render_the_error_envelope() {
    let (_, app) = app();

    let response = app
        .oneshot(
            Request::get("/api/v1/ledger/deadbeef")
                .header("x-request-id", "req-vault-404")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["status"], 404);
    assert_eq!(body["request"], "req-vault-404");
    assert!(body["error"].as_str().unwrap().contains("deadbeef"));
}

#[tokio::test]
async fn invalid_rationale_body_is_rejected() {
    let (ledger, app) = app();

    let response = app
        .oneshot(
            Request::post("/api/v1/rationales")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"org_id": "org-1", "repo_id": "repo-1", "title": "", "body": ""})
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(ledger.len(), 1);
}
