//! Engine and repository error types.
//!
//! Defined as closed enums so batch processing can classify per-item
//! failures through [`EngineError::kind`] instead of matching on messages.

use thiserror::Error;
use uuid::Uuid;

use crate::workflow::WorkflowState;

/// Errors raised by a repository implementation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// The referenced row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A write's expected state/version no longer matches the stored record.
    #[error("record {record_id} changed concurrently (expected {expected} v{expected_version})")]
    Conflict {
        record_id: Uuid,
        expected: WorkflowState,
        expected_version: u64,
    },

    /// The backing store failed.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Errors raised by the workflow engine, batch processor, and services.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Input rejected before any state change.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The record's current state is not a legal "from" state.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: WorkflowState,
        to: WorkflowState,
    },

    /// Marks cannot be edited in the record's current state.
    #[error("record is not editable in state {state}")]
    NotEditable { state: WorkflowState },

    /// The actor lacks the role or ownership the operation requires.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The edit window has closed and no override was supplied.
    #[error("edit window of {window_days} days expired")]
    EditWindowExpired { window_days: i64 },

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Another actor changed the record between read and write.
    #[error("concurrent modification of record {0}")]
    Conflict(Uuid),

    /// Any other repository failure.
    #[error(transparent)]
    Store(StoreError),
}

/// Failure classes used when reporting per-item batch errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    InvalidTransition,
    Unauthorized,
    EditWindowExpired,
    NotFound,
    Conflict,
    Storage,
}

impl EngineError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::InvalidTransition { .. } | EngineError::NotEditable { .. } => {
                ErrorKind::InvalidTransition
            }
            EngineError::Unauthorized(_) => ErrorKind::Unauthorized,
            EngineError::EditWindowExpired { .. } => ErrorKind::EditWindowExpired,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::Store(_) => ErrorKind::Storage,
        }
    }

    /// Returns `true` if retrying the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Conflict(_) | EngineError::Store(_))
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            StoreError::Conflict { record_id, .. } => EngineError::Conflict(record_id),
            other => EngineError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_conflict_maps_to_engine_conflict() {
        let id = Uuid::nil();
        let err: EngineError = StoreError::Conflict {
            record_id: id,
            expected: WorkflowState::Draft,
            expected_version: 3,
        }
        .into();
        assert_eq!(err, EngineError::Conflict(id));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.is_retryable());
    }

    #[test]
    fn not_editable_classifies_as_invalid_transition() {
        let err = EngineError::NotEditable {
            state: WorkflowState::Frozen,
        };
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert_eq!(err.to_string(), "record is not editable in state FROZEN");
    }
}
