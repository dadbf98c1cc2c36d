// crates/cipherbench-store-sqlcipher/tests/sqlcipher_store_unit.rs
// ============================================================================
// Module: SQLCipher Store Unit Tests
// Description: Pool initialization and store operations on real datasets.
// Purpose: Validate keying, WAL enforcement, identifier allocation, and close.
// ============================================================================

//! ## Overview
//! Tests against freshly provisioned encrypted datasets:
//! - Key handling (wrong key rejected, independent keys per pool)
//! - Missing dataset and invalid sizing rejection
//! - WAL journaling and the idle cap on pooled connections
//! - Identifier format, uniqueness under concurrency, and counter seeding
//! - Idempotent close

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use cipherbench_core::BenchEventKind;
use cipherbench_core::BenchEventSink;
use cipherbench_core::BenchStore;
use cipherbench_core::MemoryEventSink;
use cipherbench_core::NoopEventSink;
use cipherbench_core::PoolSizing;
use cipherbench_core::SecretKey;
use cipherbench_core::StoreError;
use cipherbench_store_sqlcipher::DatasetSeed;
use cipherbench_store_sqlcipher::MessageStore;
use cipherbench_store_sqlcipher::SqlcipherConfig;
use cipherbench_store_sqlcipher::SqlcipherStoreError;
use cipherbench_store_sqlcipher::open_pool;
use cipherbench_store_sqlcipher::provision_dataset;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reduced iteration count keeping connection setup fast.
const TEST_KDF_ITERATIONS: u32 = 4_000;

fn provision(dir: &TempDir, name: &str, key: &str, seed: DatasetSeed) -> PathBuf {
    let path = dir.path().join(name);
    provision_dataset(&path, &SecretKey::new(key), TEST_KDF_ITERATIONS, seed).unwrap();
    path
}

fn config(path: &Path, key: &str, max_open: u32, max_idle: u32) -> SqlcipherConfig {
    let mut config = SqlcipherConfig::new(
        path,
        SecretKey::new(key),
        PoolSizing::new(max_open, max_idle).unwrap(),
    );
    config.kdf_iterations = TEST_KDF_ITERATIONS;
    config.connection_timeout_ms = 5_000;
    config
}

fn open_store(path: &Path, key: &str, max_open: u32, max_idle: u32) -> MessageStore {
    let pool = open_pool(&config(path, key, max_open, max_idle), Arc::new(NoopEventSink)).unwrap();
    MessageStore::new(pool).unwrap()
}

fn assert_message_id(id: &str) {
    let Some(digits) = id.strip_prefix("msg-") else {
        panic!("unexpected id {id}");
    };
    assert!(!digits.is_empty());
    assert!(digits.chars().all(|c| c.is_ascii_digit()), "unexpected id {id}");
}

// ============================================================================
// SECTION: Keying
// ============================================================================

#[test]
fn fresh_dataset_has_no_unseen_messages() {
    let temp = TempDir::new().unwrap();
    let path = provision(&temp, "fresh.db", "testkey", DatasetSeed::default());
    let store = open_store(&path, "testkey", 2, 1);
    assert!(store.query_unseen().unwrap().is_empty());
}

#[test]
fn wrong_key_is_rejected_at_open() {
    let temp = TempDir::new().unwrap();
    let path = provision(&temp, "locked.db", "right-key", DatasetSeed::default());
    let events = Arc::new(MemoryEventSink::new());
    let sink: Arc<dyn BenchEventSink> = events.clone();
    let Err(err) = open_pool(&config(&path, "wrong-key", 2, 1), sink) else {
        panic!("expected key rejection");
    };
    assert_eq!(err, SqlcipherStoreError::KeyRejected);
    assert!(!err.to_string().contains("wrong-key"));
    let kinds = events.kinds();
    assert!(matches!(kinds.as_slice(), [BenchEventKind::ConnectionSetupFailed { .. }]));
    // Deterministic: a second attempt fails the same way.
    let second = open_pool(&config(&path, "wrong-key", 2, 1), Arc::new(NoopEventSink));
    assert_eq!(second.err(), Some(SqlcipherStoreError::KeyRejected));
}

#[test]
fn key_with_quotes_round_trips() {
    let temp = TempDir::new().unwrap();
    let path = provision(&temp, "quoted.db", "it's a key", DatasetSeed::default());
    let store = open_store(&path, "it's a key", 1, 1);
    store.insert_unseen().unwrap();
    assert_eq!(store.query_unseen().unwrap().len(), 1);
}

#[test]
fn two_pools_with_different_keys_stay_independent() {
    let temp = TempDir::new().unwrap();
    let first_path = provision(&temp, "a.db", "alpha", DatasetSeed::default());
    let second_path = provision(&temp, "b.db", "bravo", DatasetSeed::default());

    let first_events = Arc::new(MemoryEventSink::new());
    let second_events = Arc::new(MemoryEventSink::new());
    let first_pool = open_pool(&config(&first_path, "alpha", 3, 2), first_events.clone()).unwrap();
    let second_pool =
        open_pool(&config(&second_path, "bravo", 3, 2), second_events.clone()).unwrap();
    let first = MessageStore::new(first_pool).unwrap();
    let second = MessageStore::new(second_pool).unwrap();

    for _ in 0 .. 3 {
        first.insert_unseen().unwrap();
    }
    second.insert_unseen().unwrap();
    assert_eq!(first.query_unseen().unwrap().len(), 3);
    assert_eq!(second.query_unseen().unwrap().len(), 1);

    for events in [&first_events, &second_events] {
        let ordinals: Vec<u64> = events
            .kinds()
            .into_iter()
            .filter_map(|kind| match kind {
                BenchEventKind::ConnectionSetup {
                    ordinal,
                    ..
                } => Some(ordinal),
                _ => None,
            })
            .collect();
        assert_eq!(ordinals.first(), Some(&1));
        assert!(events.kinds().iter().any(|kind| matches!(
            kind,
            BenchEventKind::PoolOpened {
                max_open: 3,
                max_idle: 2,
                ..
            }
        )));
    }
}

// ============================================================================
// SECTION: Open Validation
// ============================================================================

#[test]
fn missing_dataset_fails_before_connecting() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("absent.db");
    let Err(err) = open_pool(&config(&path, "k", 1, 1), Arc::new(NoopEventSink)) else {
        panic!("expected missing dataset");
    };
    assert!(matches!(err, SqlcipherStoreError::MissingDataset(_)));
    assert!(!path.exists());
}

#[test]
fn directory_path_is_invalid() {
    let temp = TempDir::new().unwrap();
    let Err(err) = open_pool(&config(temp.path(), "k", 1, 1), Arc::new(NoopEventSink)) else {
        panic!("expected invalid path");
    };
    assert!(matches!(err, SqlcipherStoreError::Invalid(_)));
}

#[test]
fn in_memory_target_skips_journal_check() {
    let pool = open_pool(&config(Path::new(":memory:"), "k", 1, 1), Arc::new(NoopEventSink)).unwrap();
    assert_eq!(pool.sizing().max_open(), 1);
    assert!(pool.established() >= 1);
}

// ============================================================================
// SECTION: Pooled Connections
// ============================================================================

#[test]
fn pooled_connections_report_wal_journal_mode() {
    let temp = TempDir::new().unwrap();
    let path = provision(&temp, "wal.db", "k", DatasetSeed::default());
    let pool = open_pool(&config(&path, "k", 2, 2), Arc::new(NoopEventSink)).unwrap();

    let first = pool.get().unwrap();
    let second = pool.get().unwrap();
    for connection in [&first, &second] {
        let mode: String =
            connection.query_row("PRAGMA journal_mode", [], |row| row.get(0)).unwrap();
        assert_eq!(mode, "wal");
    }
}

#[test]
fn returned_connections_above_max_idle_are_closed() {
    let temp = TempDir::new().unwrap();
    let path = provision(&temp, "idle.db", "k", DatasetSeed::default());
    let pool = open_pool(&config(&path, "k", 4, 1), Arc::new(NoopEventSink)).unwrap();

    let held: Vec<_> = (0 .. 4).map(|_| pool.get().unwrap()).collect();
    assert_eq!(pool.connections(), 4);
    drop(held);
    assert_eq!(pool.idle_connections(), 1);
    assert_eq!(pool.connections(), 1);

    // Demand above the idle cap opens fresh connections again.
    let before = pool.established();
    let again: Vec<_> = (0 .. 3).map(|_| pool.get().unwrap()).collect();
    assert!(pool.established() >= before + 2);
    drop(again);
    assert!(pool.idle_connections() <= 1);
}

#[test]
fn idle_cap_equal_to_open_cap_keeps_every_connection() {
    let temp = TempDir::new().unwrap();
    let path = provision(&temp, "warm.db", "k", DatasetSeed::default());
    let pool = open_pool(&config(&path, "k", 3, 3), Arc::new(NoopEventSink)).unwrap();

    let held: Vec<_> = (0 .. 3).map(|_| pool.get().unwrap()).collect();
    drop(held);
    assert_eq!(pool.idle_connections(), 3);

    let before = pool.established();
    let again: Vec<_> = (0 .. 3).map(|_| pool.get().unwrap()).collect();
    assert_eq!(pool.established(), before);
    drop(again);
}

#[test]
fn provisioning_refuses_to_overwrite() {
    let temp = TempDir::new().unwrap();
    let path = provision(&temp, "once.db", "k", DatasetSeed::default());
    let Err(err) = provision_dataset(&path, &SecretKey::new("k"), TEST_KDF_ITERATIONS, DatasetSeed::default())
    else {
        panic!("expected overwrite refusal");
    };
    assert!(matches!(err, SqlcipherStoreError::Invalid(_)));
}

#[test]
fn seeded_rows_are_visible_with_their_flags() {
    let temp = TempDir::new().unwrap();
    let path = provision(
        &temp,
        "seeded.db",
        "k",
        DatasetSeed {
            unseen: 4,
            seen: 6,
        },
    );
    let store = open_store(&path, "k", 2, 1);
    let unseen = store.query_unseen().unwrap();
    assert_eq!(unseen.len(), 4);
    assert!(unseen.iter().all(|id| id.starts_with("seed-")));
    assert_eq!(store.next_ordinal(), 0);
}

// ============================================================================
// SECTION: Identifiers
// ============================================================================

#[test]
fn inserted_ids_use_message_format() {
    let temp = TempDir::new().unwrap();
    let path = provision(&temp, "ids.db", "k", DatasetSeed::default());
    let store = open_store(&path, "k", 2, 2);
    for _ in 0 .. 5 {
        store.insert_unseen().unwrap();
    }
    let ids = store.query_unseen().unwrap();
    assert!(ids.len() >= 5);
    for id in &ids {
        assert_message_id(id);
    }
}

#[test]
fn concurrent_inserts_produce_distinct_ids() {
    let temp = TempDir::new().unwrap();
    let path = provision(&temp, "concurrent.db", "k", DatasetSeed::default());
    let store = open_store(&path, "k", 4, 2);
    thread::scope(|scope| {
        for _ in 0 .. 64 {
            scope.spawn(|| store.insert_unseen().unwrap());
        }
    });
    let ids = store.query_unseen().unwrap();
    assert_eq!(ids.len(), 64);
    let distinct: HashSet<&String> = ids.iter().collect();
    assert_eq!(distinct.len(), 64);
}

#[test]
fn counter_resumes_past_existing_messages() {
    let temp = TempDir::new().unwrap();
    let path = provision(&temp, "resume.db", "k", DatasetSeed::default());
    {
        let store = open_store(&path, "k", 1, 1);
        for _ in 0 .. 3 {
            store.insert_unseen().unwrap();
        }
        store.close();
    }
    let reopened = open_store(&path, "k", 1, 1);
    assert_eq!(reopened.next_ordinal(), 3);
    reopened.insert_unseen().unwrap();
    let ids: HashSet<String> = reopened.query_unseen().unwrap().into_iter().collect();
    assert!(ids.contains("msg-3"));
    assert_eq!(ids.len(), 4);
}

// ============================================================================
// SECTION: Close
// ============================================================================

#[test]
fn close_is_idempotent_and_fails_later_calls() {
    let temp = TempDir::new().unwrap();
    let path = provision(&temp, "close.db", "k", DatasetSeed::default());
    let store = open_store(&path, "k", 2, 1);
    store.close();
    store.close();
    assert!(store.is_closed());
    assert_eq!(store.query_unseen(), Err(StoreError::Closed));
    assert_eq!(store.insert_unseen(), Err(StoreError::Closed));
}
