//! Bearer-token authentication and the tenant context.
//!
//! Tokens are HMAC-signed JWTs carrying `sub`, `org_id`, `role`, `email`,
//! and a standard expiry. The signing method is checked against the HMAC
//! family before any signature verification: accepting an asymmetric
//! algorithm against the shared secret is a known auth-bypass class and is
//! refused outright.

use axum::http::HeaderMap;
use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};

use meridian_core::CoreError;

/// Downstream hop header carrying the enforced tenant id.
pub const TENANT_HOP_HEADER: &str = "x-tenant-id";

/// Role claim values; the enumeration is closed and gating is by membership.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Architect,
    Viewer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Architect => "architect",
            Role::Viewer => "viewer",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "architect" => Some(Role::Architect),
            "viewer" => Some(Role::Viewer),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWT claim set the identity provider issues.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub org_id: String,
    pub role: String,
    pub email: String,
    pub exp: i64,
}

/// Per-request identity bundle derived from a validated token. Created at
/// request entry, read-only to handlers, dropped at request exit.
#[derive(Clone, Debug)]
pub struct TenantContext {
    pub user_id: String,
    pub org_id: String,
    pub role: Role,
    pub email: String,
}

/// Extracts the bearer token; the scheme match is case-insensitive.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let raw = headers.get("authorization")?.to_str().ok()?;
    let (scheme, token) = raw.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Validates the bearer token and derives the tenant context.
pub fn authenticate(headers: &HeaderMap, secret: &str) -> Result<TenantContext, CoreError> {
    let token = bearer_token(headers).ok_or_else(|| {
        CoreError::Unauthorized("missing or malformed authorization header".into())
    })?;

    let header = decode_header(token)
        .map_err(|_| CoreError::Unauthorized("invalid token header".into()))?;
    if !matches!(
        header.alg,
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
    ) {
        return Err(CoreError::Unauthorized("unexpected signing method".into()));
    }

    let mut validation = Validation::new(header.alg);
    validation.leeway = 0;
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|err| match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                CoreError::Unauthorized("token expired".into())
            }
            _ => CoreError::Unauthorized("invalid token".into()),
        })?;

    let role = Role::parse(&data.claims.role)
        .ok_or_else(|| CoreError::Unauthorized("unknown role claim".into()))?;

    Ok(TenantContext {
        user_id: data.claims.sub,
        org_id: data.claims.org_id,
        role,
        email: data.claims.email,
    })
}

/// Signs a claim set with the shared HMAC secret. Local development and
/// tests mint tokens through this; production tokens come from the identity
/// provider.
pub fn encode_token(secret: &str, claims: &Claims) -> Result<String, CoreError> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| CoreError::Fatal(format!("token encoding failed: {e}")))
}

/// Role-gates an operation: membership in `allowed` or Forbidden.
pub fn require_role(ctx: &TenantContext, allowed: &[Role]) -> Result<(), CoreError> {
    if allowed.contains(&ctx.role) {
        Ok(())
    } else {
        Err(CoreError::Forbidden(format!(
            "role {} is not permitted for this operation",
            ctx.role
        )))
    }
}
