//! Identifier types shared across the control plane.
//!
//! Identifiers are plain strings (uuid v4 text) so they survive every wire
//! boundary unchanged; the aliases mark intent at API seams.

/// Identifier of one pipeline execution.
pub type RunId = String;

/// Identifier of an organization (tenant).
pub type OrgId = String;

/// Identifier of a repository under analysis.
pub type RepoId = String;

/// Allocates a fresh globally-unique identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
