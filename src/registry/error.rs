//! Registry error types

use thiserror::Error;

use super::store::StoreError;

/// Error type for registry operations
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The request conflicts with registry state: duplicate text on add,
    /// or deletion of a confirmed record
    #[error("registry conflict: {0}")]
    Conflict(String),

    /// No record matches the given id
    #[error("not found: {0}")]
    NotFound(String),

    /// The registry rejected the request as malformed
    #[error("registry rejected the request: {0}")]
    Rejected(String),

    /// Transport failure, timeout, or unexpected server response
    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for RegistryError {
    fn from(error: StoreError) -> Self {
        let detail = error.to_string();
        match error {
            StoreError::DuplicateText { .. } => RegistryError::Conflict(detail),
            StoreError::ConfirmedImmutable { .. } => RegistryError::Conflict(detail),
            StoreError::NotFound { .. } => RegistryError::NotFound(detail),
            StoreError::EmptyText => RegistryError::Rejected(detail),
        }
    }
}
