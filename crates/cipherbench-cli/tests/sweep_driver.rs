// crates/cipherbench-cli/tests/sweep_driver.rs
// ============================================================================
// Module: Sweep Driver Tests
// Description: Trials over disposable dataset copies and summary output.
// Purpose: Ensure sweeps leave the source untouched and abort on failure.
// Dependencies: cipherbench-cli sweep module, cipherbench-store-sqlcipher
// ============================================================================

//! ## Overview
//! Runs small sweeps against provisioned datasets:
//! - One summary line per configuration, in grid order
//! - Source dataset bytes unchanged and working copies removed
//! - First failed configuration aborts the sweep

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions and helpers are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use cipherbench_cli::sweep::SUMMARY_FILE_PREFIX;
use cipherbench_cli::sweep::SummaryWriter;
use cipherbench_cli::sweep::SweepDriver;
use cipherbench_cli::sweep::SweepError;
use cipherbench_cli::sweep::WorkingCopy;
use cipherbench_config::BenchConfig;
use cipherbench_core::BenchEventKind;
use cipherbench_core::JitterRange;
use cipherbench_core::MemoryEventSink;
use cipherbench_core::NoopEventSink;
use cipherbench_core::PoolSizing;
use cipherbench_core::SecretKey;
use cipherbench_store_sqlcipher::DatasetSeed;
use cipherbench_store_sqlcipher::SqlcipherStoreError;
use cipherbench_store_sqlcipher::provision_dataset;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reduced iteration count keeping connection setup fast.
const TEST_KDF_ITERATIONS: u32 = 4_000;

fn provision(dir: &TempDir, key: &str) -> PathBuf {
    let path = dir.path().join("source.db");
    let seed = DatasetSeed {
        unseen: 3,
        seen: 2,
    };
    provision_dataset(&path, &SecretKey::new(key), TEST_KDF_ITERATIONS, seed).unwrap();
    path
}

fn small_config(output: &Path) -> BenchConfig {
    let mut config = BenchConfig::default();
    config.connection.kdf_iterations = TEST_KDF_ITERATIONS;
    config.workload.readers = 3;
    config.workload.writers = 8;
    config.workload.reader_jitter_ms = JitterRange::new(0, 2);
    config.workload.writer_jitter_ms = JitterRange::NONE;
    config.output.dir = output.to_path_buf();
    config
}

fn sizings(pairs: &[(u32, u32)]) -> Vec<PoolSizing> {
    pairs.iter().map(|(open, idle)| PoolSizing::new(*open, *idle).unwrap()).collect()
}

fn summary_files(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(SUMMARY_FILE_PREFIX))
        })
        .collect()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn sweep_writes_one_summary_line_per_configuration() {
    let dir = TempDir::new().unwrap();
    let source = provision(&dir, "testkey");
    let before = fs::read(&source).unwrap();
    let output = dir.path().join("output");
    let events = Arc::new(MemoryEventSink::new());
    let driver = SweepDriver::new(
        small_config(&output),
        &source,
        SecretKey::new("testkey"),
        events.clone(),
    );

    let mut seen = Vec::new();
    let report = driver
        .run(&sizings(&[(1, 1), (4, 2)]), |outcome| seen.push(outcome.sizing.label()))
        .unwrap();

    assert_eq!(seen, vec!["1x1".to_string(), "4x2".to_string()]);
    assert_eq!(report.trials.len(), 2);
    assert_eq!(report.summary_write_failures, 0);
    for trial in &report.trials {
        assert_eq!(trial.report.warmup_unseen, 3);
        assert_eq!(trial.report.writes, 9);
        assert_eq!(trial.samples_lost, 0);
        let log = fs::read_to_string(trial.sample_log.as_ref().unwrap()).unwrap();
        assert_eq!(log.lines().count(), 13);
    }

    let summary_path = report.summary_path.clone().unwrap();
    assert_eq!(summary_files(&output), vec![summary_path.clone()]);
    let summary = fs::read_to_string(&summary_path).unwrap();
    let lines: Vec<&str> = summary.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("1 1 "));
    assert!(lines[1].starts_with("4 2 "));
    let elapsed: u64 = lines[1].rsplit(' ').next().unwrap().parse().unwrap();
    assert_eq!(elapsed, report.trials[1].report.elapsed_ms());

    assert_eq!(fs::read(&source).unwrap(), before);
    let kinds = events.kinds();
    let copies: Vec<String> = kinds
        .iter()
        .filter_map(|kind| match kind {
            BenchEventKind::WorkingCopyCreated {
                copy, ..
            } => Some(copy.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(copies.len(), 2);
    assert_ne!(copies[0], copies[1]);
    assert!(copies.iter().all(|copy| !Path::new(copy).exists()));
    let finished =
        kinds.iter().filter(|kind| matches!(kind, BenchEventKind::TrialFinished { .. })).count();
    assert_eq!(finished, 2);
}

#[test]
fn every_trial_starts_from_the_source_contents() {
    let dir = TempDir::new().unwrap();
    let source = provision(&dir, "testkey");
    let driver = SweepDriver::new(
        small_config(&dir.path().join("output")),
        &source,
        SecretKey::new("testkey"),
        Arc::new(NoopEventSink),
    );

    let first = driver.run_trial(PoolSizing::new(2, 1).unwrap()).unwrap();
    let second = driver.run_trial(PoolSizing::new(2, 1).unwrap()).unwrap();

    assert_eq!(first.report.warmup_unseen, 3);
    assert_eq!(second.report.warmup_unseen, 3);
}

#[test]
fn failed_configuration_aborts_the_sweep() {
    let dir = TempDir::new().unwrap();
    let source = provision(&dir, "right");
    let mut summary = SummaryWriter::from_writer(Vec::new());
    let events = Arc::new(MemoryEventSink::new());
    let driver = SweepDriver::new(
        small_config(&dir.path().join("output")),
        &source,
        SecretKey::new("wrong"),
        events.clone(),
    );

    let mut calls = 0;
    let err = driver
        .run_with_summary(&sizings(&[(1, 1), (4, 2)]), &mut summary, |_| calls += 1)
        .unwrap_err();

    match err {
        SweepError::Store {
            sizing,
            source,
        } => {
            assert_eq!(sizing, "1x1");
            assert_eq!(source, SqlcipherStoreError::KeyRejected);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(calls, 0);
    assert!(summary.into_inner().is_empty());
    let kinds = events.kinds();
    assert!(!kinds.iter().any(|kind| matches!(kind, BenchEventKind::TrialFinished { .. })));
    assert!(!kinds.iter().any(|kind| matches!(kind, BenchEventKind::RunStarted { .. })));
}

#[test]
fn empty_grid_is_rejected() {
    let dir = TempDir::new().unwrap();
    let source = provision(&dir, "testkey");
    let output = dir.path().join("output");
    let driver = SweepDriver::new(
        small_config(&output),
        &source,
        SecretKey::new("testkey"),
        Arc::new(NoopEventSink),
    );

    let err = driver.run(&[], |_| {}).unwrap_err();

    assert!(matches!(err, SweepError::EmptyGrid));
    assert!(!output.exists());
}

#[test]
fn working_copy_requires_an_existing_source() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.db");

    let err = WorkingCopy::create(&missing, &NoopEventSink).err().unwrap();

    assert!(matches!(err, SweepError::WorkingCopy(_)));
}

#[test]
fn working_copy_is_removed_on_drop() {
    let dir = TempDir::new().unwrap();
    let source = provision(&dir, "testkey");

    let copy = WorkingCopy::create(&source, &NoopEventSink).unwrap();
    let path = copy.path().to_path_buf();
    assert_eq!(fs::read(&path).unwrap(), fs::read(&source).unwrap());
    drop(copy);

    assert!(!path.exists());
    assert!(source.exists());
}
