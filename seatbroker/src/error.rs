//! Service error taxonomy.

use thiserror::Error;

/// Errors surfaced to clients by the license service. Each variant maps to
/// one transport status code; see the HTTP layer for the mapping.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request itself is malformed.
    #[error("{0}")]
    InvalidArgument(String),

    /// The requested license type is not configured on this server.
    #[error("unknown license type: {0:?}")]
    UnknownLicense(String),

    /// The id is not known to any pool, on either side.
    #[error("invocation_id not found: {0:?}")]
    InvocationNotFound(String),

    /// The id exists but does not hold an allocation.
    #[error("invocation_id not allocated: {0:?}")]
    NotAllocated(String),

    /// Adoption of an unknown id failed because the pool is full.
    #[error("{0:?} has no available licenses")]
    Exhausted(String),

    /// Could not mint a fresh invocation id.
    #[error("failed to generate invocation_id: {0}")]
    IdGeneration(anyhow::Error),
}
