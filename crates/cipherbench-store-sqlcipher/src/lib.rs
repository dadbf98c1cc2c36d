// crates/cipherbench-store-sqlcipher/src/lib.rs
// ============================================================================
// Module: cipherbench SQLCipher Store
// Description: Encrypted connection pools and the message store built on them.
// Purpose: Provide a BenchStore whose every connection is keyed and WAL-enabled.
// Dependencies: cipherbench-core, r2d2, rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! [`open_pool`] turns a dataset path plus a [`SecretKey`] into an `r2d2`
//! pool whose manager runs the same initialization sequence on every new
//! physical connection. [`MessageStore`] exposes the two benchmark
//! operations over that pool. [`provision_dataset`] creates a fresh encrypted
//! dataset with the expected table.
//!
//! [`SecretKey`]: cipherbench_core::SecretKey

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod dataset;
pub mod error;
pub mod factory;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use dataset::DatasetSeed;
pub use dataset::provision_dataset;
pub use error::SetupStep;
pub use error::SqlcipherStoreError;
pub use factory::DEFAULT_BUSY_TIMEOUT_MS;
pub use factory::DEFAULT_CONNECTION_TIMEOUT_MS;
pub use factory::DEFAULT_IDLE_TIMEOUT_MS;
pub use factory::DEFAULT_KDF_ITERATIONS;
pub use factory::KeyedConnection;
pub use factory::KeyedConnectionManager;
pub use factory::SqlcipherConfig;
pub use factory::SqlcipherPool;
pub use factory::open_pool;
pub use factory::verify_journal_mode;
pub use store::MessageStore;
