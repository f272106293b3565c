//! Shared kernel of the Meridian control plane: identifiers, error kinds,
//! configuration, domain models, and the collaborator ports (persistence,
//! event bus) the services are specified against.

pub mod api;
pub mod bus;
pub mod config;
pub mod error;
pub mod identity;
pub mod models;
pub mod shutdown;
pub mod store;

pub use api::{ApiError, RequestId};
pub use bus::{BusMessage, BusReceiver, EventBus, InMemoryBus, PIPELINE_STAGES_TOPIC};
pub use config::{AppEnv, Config};
pub use error::CoreError;
pub use identity::{new_id, OrgId, RepoId, RunId};
pub use models::{
    LedgerEntry, PipelineRun, Rationale, RunStatus, Stage, StageResult, GENESIS_PREVIOUS_HASH,
    PARALLEL_STAGES, SEQUENTIAL_STAGES,
};
pub use store::{ControlPlaneStore, InMemoryStore, RationaleFilter};
