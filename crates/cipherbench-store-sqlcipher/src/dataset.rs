// crates/cipherbench-store-sqlcipher/src/dataset.rs
// ============================================================================
// Module: Dataset Provisioning
// Description: Creation of a fresh encrypted dataset with the message table.
// Purpose: Give first-time runs and tests a dataset of the expected shape.
// Dependencies: cipherbench-core, rusqlite, serde
// ============================================================================

//! ## Overview
//! Provisioning only ever creates a new file. It applies the same keyed
//! setup sequence as pooled connections, creates the single `user_messages`
//! table, and optionally seeds rows with `seed-<n>` identifiers so they never
//! collide with workload inserts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::time::Duration;

use cipherbench_core::SecretKey;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;

use crate::error::SetupStep;
use crate::error::SqlcipherStoreError;
use crate::factory::DEFAULT_BUSY_TIMEOUT_MS;
use crate::factory::initialize_connection;
use crate::factory::is_in_memory_path;
use crate::factory::validate_dataset_path;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Table definition of the benchmark dataset.
const CREATE_TABLE_SQL: &str = "CREATE TABLE user_messages (
    id TEXT PRIMARY KEY,
    whisper_timestamp INTEGER NOT NULL DEFAULT 0,
    source TEXT NOT NULL DEFAULT '',
    text TEXT NOT NULL DEFAULT '',
    content_type INTEGER NOT NULL DEFAULT 0,
    timestamp INTEGER NOT NULL DEFAULT 0,
    chat_id TEXT NOT NULL DEFAULT '',
    local_chat_id TEXT NOT NULL DEFAULT '',
    clock_value INTEGER NOT NULL DEFAULT 0,
    seen BOOLEAN NOT NULL DEFAULT 0,
    replace_message TEXT NOT NULL DEFAULT '',
    rtl BOOLEAN NOT NULL DEFAULT 0,
    line_count INTEGER NOT NULL DEFAULT 0,
    image_base64 TEXT NOT NULL DEFAULT '',
    audio_base64 TEXT NOT NULL DEFAULT ''
);";

/// Inserts one seed row.
const INSERT_SEED_SQL: &str = "INSERT INTO user_messages (id, text, seen) VALUES (?1, ?2, ?3)";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Rows written into a freshly provisioned dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSeed {
    /// Rows with the seen flag cleared.
    pub unseen: u32,
    /// Rows with the seen flag set.
    pub seen: u32,
}

impl DatasetSeed {
    /// Total seeded rows.
    #[must_use]
    pub fn total(self) -> u64 {
        u64::from(self.unseen) + u64::from(self.seen)
    }
}

// ============================================================================
// SECTION: Provisioning
// ============================================================================

/// Creates a new encrypted dataset at `path`.
///
/// # Errors
///
/// Returns [`SqlcipherStoreError::Invalid`] when `path` already exists or is
/// malformed, and setup or engine errors otherwise. A partially written file
/// is removed on failure.
pub fn provision_dataset(
    path: &Path,
    key: &SecretKey,
    kdf_iterations: u32,
    seed: DatasetSeed,
) -> Result<(), SqlcipherStoreError> {
    if is_in_memory_path(path) {
        return Err(SqlcipherStoreError::Invalid(
            "cannot provision an in-memory dataset".to_string(),
        ));
    }
    validate_dataset_path(path)?;
    if path.exists() {
        return Err(SqlcipherStoreError::Invalid(format!(
            "refusing to overwrite existing dataset {}",
            path.display()
        )));
    }
    if key.is_empty() {
        return Err(SqlcipherStoreError::Invalid("key must not be empty".to_string()));
    }
    if kdf_iterations == 0 {
        return Err(SqlcipherStoreError::Invalid(
            "kdf_iterations must be greater than zero".to_string(),
        ));
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|err| SqlcipherStoreError::Io(err.to_string()))?;
    }

    let result = create_dataset(path, key, kdf_iterations, seed);
    if result.is_err() {
        let _ = std::fs::remove_file(path);
    }
    result
}

/// Writes the schema and seed rows into a new file.
fn create_dataset(
    path: &Path,
    key: &SecretKey,
    kdf_iterations: u32,
    seed: DatasetSeed,
) -> Result<(), SqlcipherStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let mut connection =
        Connection::open_with_flags(path, flags).map_err(|err| SqlcipherStoreError::Pragma {
            step: SetupStep::Open,
            message: err.to_string(),
        })?;
    initialize_connection(
        &connection,
        key,
        kdf_iterations,
        Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        false,
    )?;
    let tx = connection.transaction()?;
    tx.execute_batch(CREATE_TABLE_SQL)?;
    {
        let mut statement = tx.prepare(INSERT_SEED_SQL)?;
        for index in 0 .. seed.total() {
            let seen = index >= u64::from(seed.unseen);
            let id = format!("seed-{index}");
            statement.execute(params![id, format!("seeded message {index}"), seen])?;
        }
    }
    tx.commit()?;
    Ok(())
}
