//! Error types for store operations.

use crate::Path;
use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Which history operation ran out of entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryOp {
    Undo,
    Redo,
}

impl std::fmt::Display for HistoryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HistoryOp::Undo => write!(f, "undo"),
            HistoryOp::Redo => write!(f, "redo"),
        }
    }
}

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `dispatch` was called with a key missing from the action table.
    #[error("action dispatched that does not exist: {key}")]
    ActionNotFound {
        /// The unknown action key.
        key: String,
    },

    /// `commit` was called with a key missing from the mutation table.
    #[error("mutation committed that does not exist: {key}")]
    MutationNotFound {
        /// The unknown mutation key.
        key: String,
    },

    /// `undo` or `redo` was called with nothing to revert or reapply.
    #[error("cannot {operation}: history is empty")]
    HistoryUnderflow {
        /// The operation that failed.
        operation: HistoryOp,
    },

    /// A direct write outside a mutation, under the rejecting write policy.
    #[error("state written outside a mutation at {path}; use an action or mutation")]
    UnauthorizedWrite {
        /// The path of the written field.
        path: Path,
    },

    /// Path does not exist in the state tree.
    #[error("path not found: {path}")]
    PathNotFound {
        /// The path that was not found.
        path: Path,
    },

    /// Array index is out of bounds.
    #[error("index {index} out of bounds (len: {len}) at path {path}")]
    IndexOutOfBounds {
        /// The path to the array.
        path: Path,
        /// The index that was accessed.
        index: usize,
        /// The actual length of the array.
        len: usize,
    },

    /// Type mismatch when accessing a value.
    #[error("type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        /// The path where the mismatch occurred.
        path: Path,
        /// The expected type.
        expected: &'static str,
        /// The actual type found.
        found: &'static str,
    },

    /// The node behind a view was replaced; the view no longer addresses it.
    #[error("stale view: node at {path} was replaced")]
    StaleView {
        /// The path the view was created for.
        path: Path,
    },

    /// A mutation or action received a payload it cannot use.
    #[error("invalid payload: {message}")]
    InvalidPayload {
        /// Description of what went wrong.
        message: String,
    },

    /// The same action key was registered twice.
    #[error("action already registered: {0}")]
    DuplicateAction(String),

    /// The same mutation key was registered twice.
    #[error("mutation already registered: {0}")]
    DuplicateMutation(String),

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Create a path not found error.
    #[inline]
    pub fn path_not_found(path: Path) -> Self {
        StoreError::PathNotFound { path }
    }

    /// Create an index out of bounds error.
    #[inline]
    pub fn index_out_of_bounds(path: Path, index: usize, len: usize) -> Self {
        StoreError::IndexOutOfBounds { path, index, len }
    }

    /// Create a type mismatch error.
    #[inline]
    pub fn type_mismatch(path: Path, expected: &'static str, found: &'static str) -> Self {
        StoreError::TypeMismatch {
            path,
            expected,
            found,
        }
    }

    /// Create an invalid payload error.
    #[inline]
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        StoreError::InvalidPayload {
            message: message.into(),
        }
    }

    /// Whether this error means the caller named something that isn't registered.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::ActionNotFound { .. } | StoreError::MutationNotFound { .. }
        )
    }
}
