//! Staged analysis workflow engine.
//!
//! One run executes the fixed sequential block, then fans out the parallel
//! block. Stages are opaque; the orchestrator owns the run state and emits
//! stage events through a bounded notifier.

pub mod executor;
pub mod orchestrator;

pub use executor::{SimulatedStages, StageExecutor};
pub use orchestrator::{Orchestrator, StageEvent, StageListener, FAILURE_REASON_KEY};
