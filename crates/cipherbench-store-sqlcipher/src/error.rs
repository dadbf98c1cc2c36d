// crates/cipherbench-store-sqlcipher/src/error.rs
// ============================================================================
// Module: SQLCipher Store Errors
// Description: Error taxonomy for pool initialization and store operations.
// Purpose: Classify engine failures and map them onto core store errors.
// Dependencies: cipherbench-core, rusqlite, thiserror
// ============================================================================

//! ## Overview
//! [`SqlcipherStoreError`] covers every way opening a pool or running a store
//! operation can fail. Engine errors are classified by result code so a
//! wrong key surfaces as [`SqlcipherStoreError::KeyRejected`] rather than a
//! generic engine failure, and [`SetupStep`] names the initialization step
//! that failed. The `From` conversion into [`StoreError`] keeps that
//! distinction across the core interface.

// ============================================================================
// SECTION: Imports
// ============================================================================

use cipherbench_core::StoreError;
use rusqlite::ErrorCode;
use thiserror::Error;

// ============================================================================
// SECTION: Setup Steps
// ============================================================================

/// Step of the per-connection initialization sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStep {
    /// Physical open of the dataset file.
    Open,
    /// `PRAGMA foreign_keys = ON`.
    ForeignKeys,
    /// `PRAGMA key`.
    Key,
    /// `PRAGMA kdf_iter`.
    KdfIterations,
    /// First read confirming the key decrypts the file.
    KeyCheck,
    /// `PRAGMA journal_mode = WAL`.
    JournalMode,
    /// Busy-wait timeout installation.
    BusyTimeout,
}

impl SetupStep {
    /// Stable label for the step.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::ForeignKeys => "foreign_keys",
            Self::Key => "key",
            Self::KdfIterations => "kdf_iter",
            Self::KeyCheck => "key_check",
            Self::JournalMode => "journal_mode",
            Self::BusyTimeout => "busy_timeout",
        }
    }
}

impl std::fmt::Display for SetupStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// SQLCipher store errors.
///
/// # Invariants
/// - No variant carries key material; the key step reports a fixed message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqlcipherStoreError {
    /// Invalid configuration or path.
    #[error("sqlcipher store invalid: {0}")]
    Invalid(String),
    /// Filesystem error.
    #[error("sqlcipher store io error: {0}")]
    Io(String),
    /// Dataset file does not exist.
    #[error("sqlcipher dataset not found: {0}")]
    MissingDataset(String),
    /// Key does not decrypt the dataset.
    #[error("sqlcipher key rejected: file is not a database under this key")]
    KeyRejected,
    /// An initialization step failed.
    #[error("sqlcipher connection setup failed at {step}: {message}")]
    Pragma {
        /// Failing step.
        step: SetupStep,
        /// Engine message.
        message: String,
    },
    /// Engine refused to switch to write-ahead journaling.
    #[error("unable to set journal_mode to wal, actual mode {actual}")]
    JournalMode {
        /// Mode the engine reported.
        actual: String,
    },
    /// Busy timeout elapsed.
    #[error("sqlcipher store busy: {0}")]
    Busy(String),
    /// Table or database locked.
    #[error("sqlcipher store locked: {0}")]
    Locked(String),
    /// Store closed.
    #[error("sqlcipher store closed")]
    Closed,
    /// Pool construction or checkout failure.
    #[error("sqlcipher pool error: {0}")]
    Pool(String),
    /// Any other engine error.
    #[error("sqlcipher store db error: {0}")]
    Db(String),
}

impl SqlcipherStoreError {
    /// Classifies an engine error by its result code.
    #[must_use]
    pub fn from_sqlite(err: &rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) => Self::Busy(err.to_string()),
            Some(ErrorCode::DatabaseLocked) => Self::Locked(err.to_string()),
            Some(ErrorCode::NotADatabase) => Self::KeyRejected,
            _ => Self::Db(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for SqlcipherStoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::from_sqlite(&err)
    }
}

impl From<r2d2::Error> for SqlcipherStoreError {
    fn from(err: r2d2::Error) -> Self {
        Self::Pool(err.to_string())
    }
}

impl From<SqlcipherStoreError> for StoreError {
    fn from(error: SqlcipherStoreError) -> Self {
        match error {
            SqlcipherStoreError::Busy(message) => Self::Busy(message),
            SqlcipherStoreError::Locked(message) => Self::Locked(message),
            SqlcipherStoreError::Closed => Self::Closed,
            SqlcipherStoreError::Pool(message) => Self::Pool(message),
            SqlcipherStoreError::Db(message) => Self::Db(message),
            other => Self::Db(other.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
