// crates/cipherbench-core/src/interfaces.rs
// ============================================================================
// Module: Benchmark Interfaces
// Description: Backend-agnostic store interface and operation errors.
// Purpose: Let the workload drive any store exposing the two domain operations.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! The workload only ever calls two operations: a filtered read of unseen
//! message identifiers and an insert of one new unseen message. Backends
//! implement [`BenchStore`] and classify their failures into [`StoreError`];
//! the workload wraps those with the [`OperationName`] that failed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Operation Names
// ============================================================================

/// Domain operation measured by the benchmark.
///
/// # Invariants
/// - Labels are stable; they are written verbatim into sample logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum OperationName {
    /// Read identifiers of all unseen messages.
    QueryUnseenMessages,
    /// Insert one unseen message with a fresh identifier.
    InsertUnseenMessage,
}

impl OperationName {
    /// Every operation, in reporting order.
    pub const ALL: [Self; 2] = [Self::QueryUnseenMessages, Self::InsertUnseenMessage];

    /// Returns the stable label for the operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::QueryUnseenMessages => "QueryUnseenMessages",
            Self::InsertUnseenMessage => "InsertUnseenMessage",
        }
    }

    /// Parses a stable label back into an operation.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == label)
    }
}

impl std::fmt::Display for OperationName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Store operation errors.
///
/// # Invariants
/// - Messages never embed secret key material.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Busy timeout elapsed while waiting on a lock.
    #[error("store busy: {0}")]
    Busy(String),
    /// Store reported a locked table or database.
    #[error("store locked: {0}")]
    Locked(String),
    /// Store was closed before the operation ran.
    #[error("store closed")]
    Closed,
    /// Connection could not be acquired from the pool.
    #[error("store pool error: {0}")]
    Pool(String),
    /// Any other engine error.
    #[error("store db error: {0}")]
    Db(String),
}

/// A store failure tagged with the operation that produced it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{operation} failed: {error}")]
pub struct OperationError {
    /// Operation that failed.
    pub operation: OperationName,
    /// Underlying store error.
    pub error: StoreError,
}

impl OperationError {
    /// Wraps a store error with its operation.
    #[must_use]
    pub const fn new(operation: OperationName, error: StoreError) -> Self {
        Self {
            operation,
            error,
        }
    }
}

// ============================================================================
// SECTION: Store Interface
// ============================================================================

/// Store surface exercised by the benchmark workload.
///
/// Implementations are shared by every concurrent task of a run, so all
/// methods take `&self`.
pub trait BenchStore: Send + Sync {
    /// Returns identifiers of every message whose seen flag is false, in the
    /// order the backend yields them. An empty result is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn query_unseen(&self) -> Result<Vec<String>, StoreError>;

    /// Inserts one unseen message with a freshly generated identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails, including busy-timeout
    /// exhaustion under lock contention.
    fn insert_unseen(&self) -> Result<(), StoreError>;

    /// Releases the backing resources. Idempotent; operations issued after
    /// close fail with [`StoreError::Closed`].
    fn close(&self);
}
