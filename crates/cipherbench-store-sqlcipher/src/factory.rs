// crates/cipherbench-store-sqlcipher/src/factory.rs
// ============================================================================
// Module: Credentialed Connection Factory
// Description: r2d2 manager that keys and configures every SQLCipher connection.
// Purpose: Build pools of authenticated, WAL-enabled, lock-tolerant connections.
// Dependencies: cipherbench-core, r2d2, rusqlite
// ============================================================================

//! ## Overview
//! [`KeyedConnectionManager`] is the per-connection initialization hook: r2d2
//! calls [`r2d2::ManageConnection::connect`] for every physical connection it
//! creates, and the manager applies, in order, foreign-key enforcement, the
//! key, the key-derivation cost, a key check, WAL journaling, and the busy
//! timeout. A failing step discards the connection.
//!
//! The idle set never holds more than `max_idle` connections: a connection
//! returned while that many are already idle is closed, so the next demand
//! spike pays connection setup again.
//!
//! Each pool owns its manager, so keys, iteration counts, and connection
//! ordinals never leak between pools opened in one process.
//!
//! [`open_pool`] validates inputs, runs the hook once on a probe connection
//! so the exact failing step is returned without waiting on the pool's
//! checkout timeout, and only then builds the pool.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::ops::Deref;
use std::ops::DerefMut;
use std::sync::Arc;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use cipherbench_core::BenchEventKind;
use cipherbench_core::BenchEventSink;
use cipherbench_core::PoolSizing;
use cipherbench_core::SecretKey;
use r2d2::Pool;
use r2d2::PooledConnection;
use rusqlite::Connection;
use rusqlite::OpenFlags;

use crate::error::SetupStep;
use crate::error::SqlcipherStoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default key-derivation iteration count.
pub const DEFAULT_KDF_ITERATIONS: u32 = 256_000;
/// Default busy-wait timeout.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 30_000;
/// Default wait for a pooled connection.
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 30_000;
/// Default lifetime of an idle connection.
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 60_000;
/// Path naming a private in-memory database.
pub(crate) const IN_MEMORY_PATH: &str = ":memory:";
/// Journal mode every file-backed connection must report.
const WAL_MODE: &str = "wal";
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Inputs of one pool.
#[derive(Debug, Clone)]
pub struct SqlcipherConfig {
    /// Dataset file, or `:memory:`.
    pub path: PathBuf,
    /// Key applied to every connection.
    pub key: SecretKey,
    /// Open and idle connection caps.
    pub sizing: PoolSizing,
    /// `PRAGMA kdf_iter` value.
    pub kdf_iterations: u32,
    /// Engine busy-wait timeout in milliseconds.
    pub busy_timeout_ms: u64,
    /// Pool checkout timeout in milliseconds.
    pub connection_timeout_ms: u64,
    /// Idle reaping timeout in milliseconds.
    pub idle_timeout_ms: u64,
}

impl SqlcipherConfig {
    /// Config with default timeouts and iteration count.
    pub fn new(path: impl Into<PathBuf>, key: SecretKey, sizing: PoolSizing) -> Self {
        Self {
            path: path.into(),
            key,
            sizing,
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT_MS,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
        }
    }

    /// Returns true when the target is an in-memory database.
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        is_in_memory_path(&self.path)
    }

    /// Fails closed on values the pool cannot honor.
    fn validate(&self) -> Result<(), SqlcipherStoreError> {
        if self.key.is_empty() {
            return Err(SqlcipherStoreError::Invalid("key must not be empty".to_string()));
        }
        if self.kdf_iterations == 0 {
            return Err(SqlcipherStoreError::Invalid(
                "kdf_iterations must be greater than zero".to_string(),
            ));
        }
        if self.connection_timeout_ms == 0 {
            return Err(SqlcipherStoreError::Invalid(
                "connection_timeout_ms must be greater than zero".to_string(),
            ));
        }
        PoolSizing::new(self.sizing.max_open(), self.sizing.max_idle())
            .map_err(|err| SqlcipherStoreError::Invalid(err.to_string()))?;
        if self.is_in_memory() {
            return Ok(());
        }
        validate_dataset_path(&self.path)?;
        if !self.path.exists() {
            return Err(SqlcipherStoreError::MissingDataset(self.path.display().to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Connection Accounting
// ============================================================================

/// Counters shared by a manager and the pool built on it.
#[derive(Debug)]
struct PoolCounters {
    /// Connections successfully initialized.
    established: AtomicU64,
    /// Idle slots claimed by connections sitting in the pool.
    idle_slots: AtomicU32,
    /// Most connections allowed to sit idle.
    max_idle: u32,
}

impl PoolCounters {
    /// Claims an idle slot; false once `max_idle` slots are held.
    fn claim_idle_slot(&self) -> bool {
        self.idle_slots
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |held| {
                (held < self.max_idle).then_some(held + 1)
            })
            .is_ok()
    }

    /// Gives back a slot taken by [`Self::claim_idle_slot`].
    fn release_idle_slot(&self) {
        self.idle_slots.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Keyed connection as stored by the pool.
///
/// A connection entering the idle set claims one of `max_idle` slots and
/// gives it back when checked out or closed. A connection returned while
/// every slot is taken is closed instead of kept.
pub struct KeyedConnection {
    /// Initialized engine connection.
    connection: Connection,
    /// Whether this connection currently holds an idle slot.
    holds_idle_slot: bool,
    /// Accounting shared with the owning pool.
    counters: Arc<PoolCounters>,
}

impl KeyedConnection {
    /// Releases the idle slot, if held.
    fn leave_idle(&mut self) {
        if self.holds_idle_slot {
            self.holds_idle_slot = false;
            self.counters.release_idle_slot();
        }
    }
}

impl Deref for KeyedConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.connection
    }
}

impl DerefMut for KeyedConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }
}

impl Drop for KeyedConnection {
    fn drop(&mut self) {
        self.leave_idle();
    }
}

// ============================================================================
// SECTION: Connection Manager
// ============================================================================

/// r2d2 manager applying the keyed initialization sequence to each connection.
pub struct KeyedConnectionManager {
    /// Dataset location.
    path: PathBuf,
    /// Key material; never logged.
    key: SecretKey,
    /// `PRAGMA kdf_iter` value.
    kdf_iterations: u32,
    /// Busy-wait timeout.
    busy_timeout: Duration,
    /// Open flags for every physical connection.
    flags: OpenFlags,
    /// Setup and idle accounting, shared with the pool.
    counters: Arc<PoolCounters>,
    /// Sink for setup events.
    events: Arc<dyn BenchEventSink>,
}

impl KeyedConnectionManager {
    /// Builds a manager for `config`. Missing files are never created.
    pub fn new(config: &SqlcipherConfig, events: Arc<dyn BenchEventSink>) -> Self {
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
            | OpenFlags::SQLITE_OPEN_URI;
        if config.is_in_memory() {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        Self {
            path: config.path.clone(),
            key: config.key.clone(),
            kdf_iterations: config.kdf_iterations,
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
            flags,
            counters: Arc::new(PoolCounters {
                established: AtomicU64::new(0),
                idle_slots: AtomicU32::new(0),
                max_idle: config.sizing.max_idle(),
            }),
            events,
        }
    }

    /// Number of connections this manager has initialized.
    #[must_use]
    pub fn established(&self) -> u64 {
        self.counters.established.load(Ordering::Relaxed)
    }

    /// Opens and initializes one connection.
    fn open_keyed(&self) -> Result<Connection, SqlcipherStoreError> {
        let connection = Connection::open_with_flags(&self.path, self.flags).map_err(|err| {
            SqlcipherStoreError::Pragma {
                step: SetupStep::Open,
                message: err.to_string(),
            }
        })?;
        initialize_connection(
            &connection,
            &self.key,
            self.kdf_iterations,
            self.busy_timeout,
            is_in_memory_path(&self.path),
        )?;
        Ok(connection)
    }
}

impl r2d2::ManageConnection for KeyedConnectionManager {
    type Connection = KeyedConnection;
    type Error = SqlcipherStoreError;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let path = self.path.display().to_string();
        match self.open_keyed() {
            Ok(connection) => {
                let ordinal = self.counters.established.fetch_add(1, Ordering::Relaxed) + 1;
                self.events.emit(BenchEventKind::ConnectionSetup {
                    path,
                    ordinal,
                });
                // r2d2 parks new connections in the idle set until a waiter takes them.
                Ok(KeyedConnection {
                    connection,
                    holds_idle_slot: self.counters.claim_idle_slot(),
                    counters: Arc::clone(&self.counters),
                })
            }
            Err(err) => {
                self.events.emit(BenchEventKind::ConnectionSetupFailed {
                    path,
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.execute_batch("SELECT 1;").map_err(SqlcipherStoreError::from)
    }

    /// Runs as r2d2 takes a connection back; `true` closes it.
    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        if !conn.holds_idle_slot {
            conn.holds_idle_slot = self.counters.claim_idle_slot();
        }
        !conn.holds_idle_slot
    }
}

// ============================================================================
// SECTION: Connection Initialization
// ============================================================================

/// Applies the keyed setup sequence to a freshly opened connection.
pub(crate) fn initialize_connection(
    connection: &Connection,
    key: &SecretKey,
    kdf_iterations: u32,
    busy_timeout: Duration,
    in_memory: bool,
) -> Result<(), SqlcipherStoreError> {
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(|err| {
        SqlcipherStoreError::Pragma {
            step: SetupStep::ForeignKeys,
            message: err.to_string(),
        }
    })?;
    // Engine messages for this statement may echo the literal.
    connection
        .execute_batch(&format!("PRAGMA key = {};", quote_literal(key.expose())))
        .map_err(|_| SqlcipherStoreError::Pragma {
            step: SetupStep::Key,
            message: "failed to set key pragma".to_string(),
        })?;
    connection.execute_batch(&format!("PRAGMA kdf_iter = {kdf_iterations};")).map_err(|err| {
        SqlcipherStoreError::Pragma {
            step: SetupStep::KdfIterations,
            message: err.to_string(),
        }
    })?;
    connection
        .query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
        .map_err(|err| match SqlcipherStoreError::from_sqlite(&err) {
            SqlcipherStoreError::KeyRejected => SqlcipherStoreError::KeyRejected,
            _ => SqlcipherStoreError::Pragma {
                step: SetupStep::KeyCheck,
                message: err.to_string(),
            },
        })?;
    let mode: String = connection
        .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
        .map_err(|err| SqlcipherStoreError::Pragma {
            step: SetupStep::JournalMode,
            message: err.to_string(),
        })?;
    verify_journal_mode(&mode, in_memory)?;
    connection.busy_timeout(busy_timeout).map_err(|err| SqlcipherStoreError::Pragma {
        step: SetupStep::BusyTimeout,
        message: err.to_string(),
    })?;
    Ok(())
}

/// Accepts `wal` (case-insensitive), or any mode for in-memory targets.
///
/// # Errors
///
/// Returns [`SqlcipherStoreError::JournalMode`] for any other reported mode.
pub fn verify_journal_mode(reported: &str, in_memory: bool) -> Result<(), SqlcipherStoreError> {
    if in_memory || reported.eq_ignore_ascii_case(WAL_MODE) {
        return Ok(());
    }
    Err(SqlcipherStoreError::JournalMode {
        actual: reported.to_string(),
    })
}

/// Renders a SQL string literal, doubling embedded quotes.
pub(crate) fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Returns true for the in-memory sentinel path.
pub(crate) fn is_in_memory_path(path: &Path) -> bool {
    path.as_os_str() == IN_MEMORY_PATH
}

/// Validates dataset path shape before touching the filesystem.
pub(crate) fn validate_dataset_path(path: &Path) -> Result<(), SqlcipherStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqlcipherStoreError::Invalid("dataset path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqlcipherStoreError::Invalid("dataset path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqlcipherStoreError::Invalid(
                "dataset path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqlcipherStoreError::Invalid(
            "dataset path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// SECTION: Pool
// ============================================================================

/// Initialized pool bound to one dataset.
#[derive(Clone)]
pub struct SqlcipherPool {
    /// Underlying r2d2 pool.
    pool: Pool<KeyedConnectionManager>,
    /// Caps the pool was built with.
    sizing: PoolSizing,
    /// Dataset location.
    path: PathBuf,
    /// Accounting shared with the manager.
    counters: Arc<PoolCounters>,
}

impl SqlcipherPool {
    /// Checks out a connection, waiting up to the connection timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SqlcipherStoreError::Pool`] when no connection becomes available.
    pub fn get(&self) -> Result<PooledConnection<KeyedConnectionManager>, SqlcipherStoreError> {
        let mut connection = self.pool.get()?;
        connection.leave_idle();
        Ok(connection)
    }

    /// Caps the pool was built with.
    #[must_use]
    pub const fn sizing(&self) -> PoolSizing {
        self.sizing
    }

    /// Dataset location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Live connections currently held by the pool.
    #[must_use]
    pub fn connections(&self) -> u32 {
        self.pool.state().connections
    }

    /// Idle connections currently held by the pool.
    #[must_use]
    pub fn idle_connections(&self) -> u32 {
        self.pool.state().idle_connections
    }

    /// Connections initialized by this pool's manager, probe included.
    #[must_use]
    pub fn established(&self) -> u64 {
        self.counters.established.load(Ordering::Relaxed)
    }
}

/// Opens a pool whose every connection is keyed and WAL-enabled.
///
/// Fails as a whole: no pool is returned unless one connection completed the
/// full setup sequence.
///
/// # Errors
///
/// Returns [`SqlcipherStoreError`] for invalid inputs, a missing dataset, a
/// rejected key, a failed setup step, or pool construction failure.
pub fn open_pool(
    config: &SqlcipherConfig,
    events: Arc<dyn BenchEventSink>,
) -> Result<SqlcipherPool, SqlcipherStoreError> {
    config.validate()?;
    let manager = KeyedConnectionManager::new(config, Arc::clone(&events));
    // Converts the file to WAL serially before connections race to do it.
    let probe = r2d2::ManageConnection::connect(&manager)?;
    drop(probe);

    let sizing = config.sizing;
    let counters = Arc::clone(&manager.counters);
    // No warm floor; the idle cap is applied in `has_broken`.
    let pool = Pool::builder()
        .max_size(sizing.max_open())
        .min_idle(Some(0))
        .idle_timeout(Some(Duration::from_millis(config.idle_timeout_ms.max(1))))
        .connection_timeout(Duration::from_millis(config.connection_timeout_ms))
        .test_on_check_out(false)
        .build(manager)?;

    events.emit(BenchEventKind::PoolOpened {
        path: config.path.display().to_string(),
        max_open: sizing.max_open(),
        max_idle: sizing.max_idle(),
        kdf_iterations: config.kdf_iterations,
    });
    Ok(SqlcipherPool {
        pool,
        sizing,
        path: config.path.clone(),
        counters,
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================
