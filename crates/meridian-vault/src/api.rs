//! Vault HTTP surface: ledger inspection and rationale CRUD.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use meridian_core::api::{request_id_middleware, ApiError, RequestId};
use meridian_core::{LedgerEntry, Rationale, RationaleFilter};

use crate::error::VaultError;
use crate::ledger::{ChainVerification, Ledger};
use crate::rationale::{NewRationale, RationaleStore, RationaleUpdate};

#[derive(Clone)]
pub struct VaultState {
    pub ledger: Arc<Ledger>,
    pub rationales: Arc<RationaleStore>,
}

pub fn build_router(state: VaultState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/ledger", get(list_entries))
        .route("/api/v1/ledger/verify", get(verify_chain))
        .route("/api/v1/ledger/:hash", get(get_entry))
        .route(
            "/api/v1/rationales",
            get(list_rationales).post(create_rationale),
        )
        .route(
            "/api/v1/rationales/:id",
            get(get_rationale).put(update_rationale),
        )
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

fn render(err: VaultError, request_id: &RequestId) -> ApiError {
    let api = match &err {
        VaultError::RationaleNotFound(_) => ApiError::not_found(err.to_string()),
        VaultError::PayloadNotObject => ApiError::bad_request(err.to_string()),
        VaultError::SignatureSelfCheck(_) => {
            tracing::error!(error = %err, "ledger invariant violated");
            ApiError::internal(err.to_string())
        }
        _ => ApiError::internal(err.to_string()),
    };
    api.with_request_id(request_id.0.clone())
}

async fn health() -> Json<Value> {
    Json(json!({"status": "healthy", "service": "vault"}))
}

async fn list_entries(State(state): State<VaultState>) -> Json<Value> {
    let entries: Vec<LedgerEntry> = state.ledger.entries();
    Json(json!({"entries": entries, "total": entries.len()}))
}

async fn verify_chain(State(state): State<VaultState>) -> Json<ChainVerification> {
    Json(state.ledger.verify())
}

async fn get_entry(
    State(state): State<VaultState>,
    Extension(request_id): Extension<RequestId>,
    Path(hash): Path<String>,
) -> Result<Json<LedgerEntry>, ApiError> {
    state
        .ledger
        .get_by_hash(&hash)
        .map(Json)
        .ok_or_else(|| {
            ApiError::not_found(format!("no ledger entry with hash {hash}"))
                .with_request_id(request_id.0.clone())
        })
}

#[derive(Debug, Default, Deserialize)]
struct ListRationalesQuery {
    org_id: Option<String>,
    repo_id: Option<String>,
}

async fn list_rationales(
    State(state): State<VaultState>,
    Query(query): Query<ListRationalesQuery>,
) -> Json<Value> {
    let filter = RationaleFilter {
        org_id: query.org_id.filter(|s| !s.is_empty()),
        repo_id: query.repo_id.filter(|s| !s.is_empty()),
    };
    let data: Vec<Rationale> = state.rationales.list(&filter);
    Json(json!({"data": data, "total": data.len()}))
}

async fn create_rationale(
    State(state): State<VaultState>,
    Extension(request_id): Extension<RequestId>,
    Json(req): Json<NewRationale>,
) -> Result<(StatusCode, Json<Rationale>), ApiError> {
    if req.title.is_empty() || req.body.is_empty() {
        return Err(
            ApiError::bad_request("title and body are required").with_request_id(request_id.0),
        );
    }
    let rationale = state
        .rationales
        .create(req)
        .map_err(|e| render(e, &request_id))?;
    Ok((StatusCode::CREATED, Json(rationale)))
}

async fn get_rationale(
    State(state): State<VaultState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
) -> Result<Json<Rationale>, ApiError> {
    state.rationales.get(&id).map(Json).ok_or_else(|| {
        ApiError::not_found(format!("rationale {id} not found")).with_request_id(request_id.0)
    })
}

async fn update_rationale(
    State(state): State<VaultState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
    Json(update): Json<RationaleUpdate>,
) -> Result<Json<Rationale>, ApiError> {
    state
        .rationales
        .update(&id, update)
        .map(Json)
        .map_err(|e| render(e, &request_id))
}
