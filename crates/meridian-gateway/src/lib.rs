//! Meridian API gateway: tenant-mediated request path over the pipeline
//! orchestrator and the resilience kernel.

pub mod auth;
pub mod handlers;
pub mod middleware;
pub mod state;
pub mod tenant_keys;

pub use auth::{
    authenticate, bearer_token, encode_token, require_role, Claims, Role, TenantContext,
    TENANT_HOP_HEADER,
};
pub use handlers::build_router;
pub use middleware::REQUEST_DEADLINE;
pub use state::{GatewayState, OUTBOUND_DEPENDENCIES};
pub use tenant_keys::TenantKeyDeriver;
