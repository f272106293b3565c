//! Gateway routes: pipeline operations and resilience inspection, all
//! behind the mediation layers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use meridian_core::api::{request_id_middleware, ApiError, RequestId};
use meridian_core::{EventBus, PipelineRun};

use crate::auth::{require_role, Role, TenantContext};
use crate::middleware::{auth_middleware, deadline_middleware, tenant_middleware};
use crate::state::GatewayState;

pub fn build_router(state: GatewayState) -> Router {
    let protected = Router::new()
        .route("/repos/:repo_id/analyze", post(trigger_analysis))
        .route("/pipelines", get(list_pipelines))
        .route("/pipelines/:run_id", get(get_pipeline))
        .route("/organizations/:org_id/pipelines", get(list_org_pipelines))
        .route("/resilience/breakers", get(breaker_stats))
        .route("/resilience/dlq", get(dlq_overview))
        .route("/resilience/dlq/:id/requeue", post(requeue_dead_letter))
        // Innermost first: tenant runs after auth, which runs after the
        // request id and deadline layers.
        .layer(from_fn(tenant_middleware))
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .nest("/api/v1", protected)
        .layer(from_fn(deadline_middleware))
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({"status": "healthy", "service": "gateway"}))
}

async fn ready(State(state): State<GatewayState>) -> Json<Value> {
    Json(json!({
        "status": "ready",
        "env": state.config.env.as_str(),
        "breakers": state.breakers.stats().len(),
    }))
}

#[derive(Debug, Default, Deserialize)]
struct AnalyzeRequest {
    commit_sha: Option<String>,
    branch: Option<String>,
}

/// Starts an analysis pipeline for one repository under the caller's
/// tenant. Architect or admin only.
async fn trigger_analysis(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(request_id): Extension<RequestId>,
    Path(repo_id): Path<String>,
    body: Option<Json<AnalyzeRequest>>,
) -> Result<(StatusCode, Json<PipelineRun>), ApiError> {
    require_role(&ctx, &[Role::Admin, Role::Architect])
        .map_err(|e| ApiError::from(e).with_request_id(request_id.0.clone()))?;

    let req = body.map(|Json(req)| req).unwrap_or_default();
    let run = state
        .orchestrator
        .start(
            repo_id,
            ctx.org_id.clone(),
            req.commit_sha,
            req.branch.unwrap_or_else(|| "main".to_string()),
        )
        .await;
    Ok((StatusCode::ACCEPTED, Json(run)))
}

/// Lists the caller tenant's runs.
async fn list_pipelines(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<TenantContext>,
) -> Json<Value> {
    let runs: Vec<PipelineRun> = state
        .orchestrator
        .list()
        .await
        .into_iter()
        .filter(|run| run.org_id == ctx.org_id)
        .collect();
    Json(json!({"data": runs, "total": runs.len()}))
}

/// Fetches one run; a run belonging to another tenant is indistinguishable
/// from cross-tenant access and is refused.
async fn get_pipeline(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(request_id): Extension<RequestId>,
    Path(run_id): Path<String>,
) -> Result<Json<PipelineRun>, ApiError> {
    let run = state.orchestrator.get(&run_id).await.ok_or_else(|| {
        ApiError::not_found(format!("pipeline {run_id} not found"))
            .with_request_id(request_id.0.clone())
    })?;
    if run.org_id != ctx.org_id {
        return Err(ApiError::forbidden("cross-tenant access denied").with_request_id(request_id.0));
    }
    Ok(Json(run))
}

/// Lists runs for the route's organization. The tenant layer already
/// guarantees the route org matches the token.
async fn list_org_pipelines(
    State(state): State<GatewayState>,
    Path(org_id): Path<String>,
) -> Json<Value> {
    let runs: Vec<PipelineRun> = state
        .orchestrator
        .list()
        .await
        .into_iter()
        .filter(|run| run.org_id == org_id)
        .collect();
    Json(json!({"data": runs, "total": runs.len()}))
}

/// Breaker snapshot for every outbound dependency. Admin only.
async fn breaker_stats(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Json<Value>, ApiError> {
    require_role(&ctx, &[Role::Admin])
        .map_err(|e| ApiError::from(e).with_request_id(request_id.0))?;
    let stats = state.breakers.stats();
    Ok(Json(json!({"data": stats, "total": stats.len()})))
}

/// Dead-letter inspection. Admin only.
async fn dlq_overview(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Json<Value>, ApiError> {
    require_role(&ctx, &[Role::Admin])
        .map_err(|e| ApiError::from(e).with_request_id(request_id.0))?;
    Ok(Json(json!({
        "messages": state.dlq.list(),
        "stats": state.dlq.stats(),
    })))
}

/// Removes a dead letter and republishes its payload on the original
/// topic. Admin only.
async fn requeue_dead_letter(
    State(state): State<GatewayState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    require_role(&ctx, &[Role::Admin])
        .map_err(|e| ApiError::from(e).with_request_id(request_id.0.clone()))?;

    let msg = state.dlq.dequeue(&id).ok_or_else(|| {
        ApiError::not_found(format!("dead letter {id} not found"))
            .with_request_id(request_id.0.clone())
    })?;
    state
        .bus
        .publish(&msg.original_topic, msg.payload.clone())
        .map_err(|e| ApiError::from(e).with_request_id(request_id.0))?;

    tracing::info!(id = %id, topic = %msg.original_topic, "dead letter requeued");
    Ok(Json(json!({"requeued": true, "id": id, "topic": msg.original_topic})))
}
