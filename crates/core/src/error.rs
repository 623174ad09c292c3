//! Error types returned across the manager's external interfaces.
//!
//! Per the error handling design, the manager is infallible for any
//! operation once its preconditions are met. The only recoverable failures
//! are allocation failure and a uniqueness violation discovered while
//! adding a statement; everything else the host can trigger is a
//! precondition misuse. Invariant breaches encountered mid-rollback or
//! mid-GC are not representable here at all — those are `panic!`s, because
//! a partially unwound chain cannot be made consistent by returning an
//! error to the caller.

use thiserror::Error;

/// Result type alias used throughout the manager's public API.
pub type TxResult<T> = std::result::Result<T, TxError>;

/// Errors the manager can surface to its host.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TxError {
    /// A uniqueness check failed while adding an `INSERT` statement.
    #[error("duplicate key in index {index_id}")]
    DuplicateKey {
        /// Dense id of the index whose uniqueness constraint was violated.
        index_id: u32,
    },

    /// A pool or arena allocation failed.
    #[error("out of memory: failed to allocate {requested} bytes")]
    OutOfMemory {
        /// Size of the allocation that could not be satisfied.
        requested: usize,
    },

    /// The host passed arguments that violate a precondition (e.g. a
    /// multikey functional index, or an operation on an unregistered
    /// transaction).
    #[error("illegal parameters: {reason}")]
    IllegalParams {
        /// Human-readable description of the violated precondition.
        reason: String,
    },
}

impl TxError {
    /// Build a [`TxError::DuplicateKey`].
    pub fn duplicate_key(index_id: u32) -> Self {
        TxError::DuplicateKey { index_id }
    }

    /// Build a [`TxError::OutOfMemory`].
    pub fn out_of_memory(requested: usize) -> Self {
        TxError::OutOfMemory { requested }
    }

    /// Build a [`TxError::IllegalParams`].
    pub fn illegal_params(reason: impl Into<String>) -> Self {
        TxError::IllegalParams {
            reason: reason.into(),
        }
    }

    /// Whether retrying the same statement, unmodified, could plausibly
    /// succeed (true only for transient resource exhaustion).
    pub fn is_retryable(&self) -> bool {
        matches!(self, TxError::OutOfMemory { .. })
    }

    /// Whether this error reflects a violated precondition in the host's
    /// usage rather than a runtime resource limit.
    pub fn is_precondition_violation(&self) -> bool {
        matches!(
            self,
            TxError::IllegalParams { .. } | TxError::DuplicateKey { .. }
        )
    }

    /// Whether this error stems from resource exhaustion.
    pub fn is_resource_error(&self) -> bool {
        matches!(self, TxError::OutOfMemory { .. })
    }
}
