// crates/cipherbench-store-sqlcipher/src/store.rs
// ============================================================================
// Module: SQLCipher Message Store
// Description: The two benchmark operations over an encrypted connection pool.
// Purpose: Implement BenchStore with collision-free identifiers and safe close.
// Dependencies: cipherbench-core, rusqlite
// ============================================================================

//! ## Overview
//! [`MessageStore`] owns the pool handle and a per-store insert counter. The
//! counter starts one past the largest `msg-<n>` already present, and is
//! advanced before each write so identifiers stay unique even when a write
//! fails. Closing drops the pool handle; operations issued afterwards fail
//! with [`StoreError::Closed`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use cipherbench_core::BenchStore;
use cipherbench_core::StoreError;
use rusqlite::params;

use crate::error::SqlcipherStoreError;
use crate::factory::SqlcipherPool;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Identifier prefix of workload-inserted messages.
pub const MESSAGE_ID_PREFIX: &str = "msg-";

/// Reads identifiers of unseen messages.
const QUERY_UNSEEN_SQL: &str = "SELECT id FROM user_messages WHERE seen = 0";

/// Inserts one unseen message; auxiliary columns get neutral values.
const INSERT_UNSEEN_SQL: &str = "INSERT INTO user_messages (id, whisper_timestamp, source, text, \
                                 content_type, timestamp, chat_id, local_chat_id, clock_value, \
                                 seen, replace_message, rtl, line_count, image_base64, \
                                 audio_base64) VALUES (?1, 0, '', '', 0, 0, '', '', 0, ?2, '', \
                                 0, 0, '', '')";

/// Largest ordinal among existing `msg-<n>` identifiers.
const MAX_MESSAGE_ORDINAL_SQL: &str = "SELECT MAX(CAST(substr(id, 5) AS INTEGER)) FROM \
                                       user_messages WHERE id GLOB 'msg-[0-9]*'";

// ============================================================================
// SECTION: Store
// ============================================================================

/// Benchmark store over an encrypted pool.
pub struct MessageStore {
    /// Pool handle; `None` once closed.
    pool: Mutex<Option<SqlcipherPool>>,
    /// Ordinal of the next inserted message.
    next_ordinal: AtomicU64,
}

impl MessageStore {
    /// Binds a store to `pool`, seeding the counter past existing messages.
    ///
    /// # Errors
    ///
    /// Returns [`SqlcipherStoreError`] when the seed query fails.
    pub fn new(pool: SqlcipherPool) -> Result<Self, SqlcipherStoreError> {
        let max: Option<i64> = {
            let connection = pool.get()?;
            connection.query_row(MAX_MESSAGE_ORDINAL_SQL, [], |row| row.get(0))?
        };
        let next = max.and_then(|value| u64::try_from(value).ok()).map_or(0, |value| value + 1);
        Ok(Self {
            pool: Mutex::new(Some(pool)),
            next_ordinal: AtomicU64::new(next),
        })
    }

    /// Ordinal the next insert will use.
    #[must_use]
    pub fn next_ordinal(&self) -> u64 {
        self.next_ordinal.load(Ordering::SeqCst)
    }

    /// Returns true once [`BenchStore::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }

    /// Clones the live pool handle.
    fn pool(&self) -> Result<SqlcipherPool, SqlcipherStoreError> {
        self.pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(SqlcipherStoreError::Closed)
    }

    /// Runs the unseen-message read on a pooled connection.
    fn select_unseen(&self) -> Result<Vec<String>, SqlcipherStoreError> {
        let pool = self.pool()?;
        let connection = pool.get()?;
        let mut statement = connection.prepare_cached(QUERY_UNSEEN_SQL)?;
        let rows = statement.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for id in rows {
            ids.push(id?);
        }
        Ok(ids)
    }

    /// Claims the next ordinal, then inserts `msg-<ordinal>`.
    fn insert_message(&self) -> Result<(), SqlcipherStoreError> {
        let pool = self.pool()?;
        let ordinal = self.next_ordinal.fetch_add(1, Ordering::SeqCst);
        let id = format!("{MESSAGE_ID_PREFIX}{ordinal}");
        let connection = pool.get()?;
        let mut statement = connection.prepare_cached(INSERT_UNSEEN_SQL)?;
        statement.execute(params![id, false])?;
        Ok(())
    }
}

impl BenchStore for MessageStore {
    fn query_unseen(&self) -> Result<Vec<String>, StoreError> {
        self.select_unseen().map_err(StoreError::from)
    }

    fn insert_unseen(&self) -> Result<(), StoreError> {
        self.insert_message().map_err(StoreError::from)
    }

    fn close(&self) {
        let pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner).take();
        drop(pool);
    }
}
