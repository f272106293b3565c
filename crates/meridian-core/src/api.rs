//! HTTP boundary shared by every service: error rendering and request ids.
//!
//! Errors crossing the HTTP boundary render as JSON
//! `{"error", "status", "request"}` where `request` is the inbound request
//! id (honored from `x-request-id` when well-formed, else generated).

use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::CoreError;
use crate::identity::new_id;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Typed request id carried in request extensions by `request_id_middleware`.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// HTTP-facing error with the service-wide envelope.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    request_id: Option<String>,
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: String,
    status: u16,
    request: String,
}

/// Client closed / cancelled; not part of the `StatusCode` constants.
fn cancelled_status() -> StatusCode {
    StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            request_id: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn circuit_open(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(cancelled_status(), message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::InvalidInput(_) => Self::bad_request(message),
            CoreError::Unauthorized(_) => Self::unauthorized(message),
            CoreError::Forbidden(_) => Self::forbidden(message),
            CoreError::NotFound(_) => Self::not_found(message),
            CoreError::CircuitOpen(_) => Self::circuit_open(message),
            CoreError::Cancelled => Self::cancelled(message),
            CoreError::Transient(_) | CoreError::Fatal(_) => Self::internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorEnvelope {
            error: self.message,
            status: self.status.as_u16(),
            request: self.request_id.unwrap_or_else(new_id),
        };
        (self.status, Json(body)).into_response()
    }
}

/// Extracts a well-formed inbound request id, if any.
pub fn inbound_request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(normalize_request_id)
}

fn normalize_request_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > 128 {
        return None;
    }
    if !trimmed
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b':'))
    {
        return None;
    }
    Some(trimmed.to_string())
}

/// Ensures every request carries a request id: honors a well-formed inbound
/// `x-request-id`, generates one otherwise, stores it in request extensions,
/// and echoes it on the response.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let id = inbound_request_id(request.headers()).unwrap_or_else(new_id);
    request.extensions_mut().insert(RequestId(id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_spec_status_codes() {
        let cases = [
            (CoreError::InvalidInput("x".into()), 400),
            (CoreError::Unauthorized("x".into()), 401),
            (CoreError::Forbidden("x".into()), 403),
            (CoreError::NotFound("x".into()), 404),
            (CoreError::CircuitOpen("dep".into()), 503),
            (CoreError::Cancelled, 499),
            (CoreError::Transient("x".into()), 500),
            (CoreError::Fatal("x".into()), 500),
        ];
        for (err, code) in cases {
            let api: ApiError = err.into();
            assert_eq!(api.status().as_u16(), code);
        }
    }

    #[test]
    fn request_id_normalization_rejects_junk() {
        assert_eq!(normalize_request_id("req-1.2:3"), Some("req-1.2:3".into()));
        assert_eq!(normalize_request_id("  trimmed  "), Some("trimmed".into()));
        assert_eq!(normalize_request_id(""), None);
        assert_eq!(normalize_request_id("has spaces"), None);
        assert_eq!(normalize_request_id(&"x".repeat(200)), None);
    }
}
