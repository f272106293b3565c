//! Request mediation layers: authentication, tenant isolation, and the
//! request deadline.
//!
//! The typed [`TenantContext`] travels in request extensions; handlers take
//! it as an `Extension` argument. There is no dynamic request-local bag.

use std::time::Duration;

use axum::extract::{RawPathParams, Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;

use meridian_core::api::{ApiError, RequestId};

use crate::auth::{authenticate, TenantContext, TENANT_HOP_HEADER};
use crate::state::GatewayState;

/// Per-request write budget.
pub const REQUEST_DEADLINE: Duration = Duration::from_secs(15);

fn tag(err: ApiError, request: &Request) -> ApiError {
    match request.extensions().get::<RequestId>() {
        Some(id) => err.with_request_id(id.0.clone()),
        None => err,
    }
}

/// Rejects unauthenticated requests and attaches the tenant context.
pub async fn auth_middleware(
    State(state): State<GatewayState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    match authenticate(request.headers(), &state.config.jwt_secret) {
        Ok(ctx) => {
            request.extensions_mut().insert(ctx);
            Ok(next.run(request).await)
        }
        Err(err) => Err(tag(ApiError::from(err), &request)),
    }
}

/// Enforces tenant scoping: the context must carry an org id, a route
/// `org_id` parameter must match it, and the tenant id is published on the
/// downstream hop header.
pub async fn tenant_middleware(
    params: RawPathParams,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx = request
        .extensions()
        .get::<TenantContext>()
        .cloned()
        .ok_or_else(|| tag(ApiError::unauthorized("tenant context missing"), &request))?;

    if ctx.org_id.is_empty() {
        return Err(tag(
            ApiError::forbidden("tenant context missing: org_id not found in token"),
            &request,
        ));
    }

    if let Some(route_org) = params
        .iter()
        .find(|(name, _)| *name == "org_id")
        .map(|(_, value)| value)
    {
        if route_org != ctx.org_id {
            return Err(tag(ApiError::forbidden("cross-tenant access denied"), &request));
        }
    }

    if let Ok(value) = HeaderValue::from_str(&ctx.org_id) {
        request.headers_mut().insert(TENANT_HOP_HEADER, value);
    }

    Ok(next.run(request).await)
}

/// Bounds handler execution to the service write budget.
pub async fn deadline_middleware(request: Request, next: Next) -> Result<Response, ApiError> {
    let deadline_err = tag(ApiError::timeout("request deadline exceeded"), &request);
    match tokio::time::timeout(REQUEST_DEADLINE, next.run(request)).await {
        Ok(response) => Ok(response),
        Err(_) => Err(deadline_err),
    }
}
