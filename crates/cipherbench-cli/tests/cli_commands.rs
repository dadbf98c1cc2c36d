// crates/cipherbench-cli/tests/cli_commands.rs
// ============================================================================
// Module: CLI Command Tests
// Description: Integration tests running the cipherbench binary end to end.
// Purpose: Ensure commands succeed on valid inputs and fail closed otherwise.
// Dependencies: cipherbench binary
// ============================================================================

//! ## Overview
//! Runs the CLI binary for provisioning, single runs, sweeps, reports, and
//! config validation. Each test uses its own temporary directory and an
//! explicit config file with a reduced key-derivation cost.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::process::Output;

use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn cipherbench_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_cipherbench"))
}

/// Writes a small, fast configuration under `root`.
fn write_config(root: &Path) -> PathBuf {
    let output = root.join("output");
    let config = format!(
        r"
[connection]
kdf_iterations = 4000

[workload]
readers = 2
writers = 5
reader_jitter_ms = {{ min_ms = 0, max_ms = 1 }}
writer_jitter_ms = {{ min_ms = 0, max_ms = 0 }}

[sweep]
pairs = [{{ max_open = 1, max_idle = 1 }}, {{ max_open = 2, max_idle = 1 }}]

[output]
dir = '{}'
event_log = '{}'
",
        output.display(),
        root.join("events.jsonl").display()
    );
    let path = root.join("cipherbench.toml");
    fs::write(&path, config.trim()).expect("write config");
    path
}

fn cipherbench(config: &Path, args: &[&str]) -> Output {
    Command::new(cipherbench_bin())
        .env_remove("CIPHERBENCH_CONFIG")
        .env_remove("CIPHERBENCH_KEY")
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .expect("run cipherbench")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn provision(root: &Path, config: &Path, key: &str) -> PathBuf {
    let db = root.join("source.db");
    let output = cipherbench(
        config,
        &["provision", "--db", db.to_str().unwrap(), "--key", key, "--unseen", "2"],
    );
    assert!(output.status.success(), "provision failed: {}", stderr(&output));
    db
}

fn sample_logs(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| {
            path.file_name().and_then(|name| name.to_str()).is_some_and(|name| {
                name.starts_with("perf-") && !name.starts_with("perf-compare-connections-config")
            })
        })
        .collect()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Verifies config validation reports the loaded file.
#[test]
fn config_validate_accepts_valid_config() {
    let root = TempDir::new().unwrap();
    let config = write_config(root.path());

    let output = cipherbench(&config, &["config", "validate"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains("Config valid"));
}

/// Verifies config validation fails closed on unknown fields.
#[test]
fn config_validate_rejects_unknown_fields() {
    let root = TempDir::new().unwrap();
    let config = root.path().join("bad.toml");
    fs::write(&config, "[workload]\nthreads = 4\n").unwrap();

    let output = cipherbench(&config, &["config", "validate"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Failed to load config"));
}

/// Verifies a run works on a copy and leaves a parseable sample log.
#[test]
fn run_then_report_summarizes_samples() {
    let root = TempDir::new().unwrap();
    let config = write_config(root.path());
    let db = provision(root.path(), &config, "testkey");
    let before = fs::read(&db).unwrap();

    let output = cipherbench(
        &config,
        &[
            "run",
            "--db",
            db.to_str().unwrap(),
            "--key",
            "testkey",
            "--max-open",
            "2",
            "--max-idle",
            "1",
        ],
    );
    assert!(output.status.success(), "run failed: {}", stderr(&output));
    assert!(stdout(&output).contains("Run 2x1 finished"));
    assert_eq!(fs::read(&db).unwrap(), before);

    let logs = sample_logs(&root.path().join("output"));
    assert_eq!(logs.len(), 1);
    let report = cipherbench(&config, &["report", logs[0].to_str().unwrap()]);
    assert!(report.status.success(), "report failed: {}", stderr(&report));
    let text = stdout(&report);
    assert!(text.contains("QueryUnseenMessages: count=3"));
    assert!(text.contains("InsertUnseenMessage: count=6"));

    let json = cipherbench(&config, &["report", "--json", logs[0].to_str().unwrap()]);
    let summaries: serde_json::Value = serde_json::from_slice(&json.stdout).unwrap();
    assert_eq!(summaries.as_array().unwrap().len(), 2);

    let events = fs::read_to_string(root.path().join("events.jsonl")).unwrap();
    assert!(events.contains("\"event\":\"run_finished\""));
    assert!(!events.contains("testkey"));
}

/// Verifies a sweep writes one summary line per configured pair.
#[test]
fn sweep_writes_summary_file() {
    let root = TempDir::new().unwrap();
    let config = write_config(root.path());
    let db = provision(root.path(), &config, "testkey");

    let output = cipherbench(&config, &["sweep", "--db", db.to_str().unwrap(), "--key", "testkey"]);

    assert!(output.status.success(), "sweep failed: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.lines().any(|line| line.starts_with("1 1 ")));
    assert!(text.lines().any(|line| line.starts_with("2 1 ")));
    let summary = fs::read_dir(root.path().join("output"))
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .find(|path| path.to_string_lossy().contains("perf-compare-connections-config"))
        .expect("summary file");
    assert_eq!(fs::read_to_string(summary).unwrap().lines().count(), 2);
}

/// Verifies a wrong key fails the run without echoing either key.
#[test]
fn run_with_wrong_key_fails_closed() {
    let root = TempDir::new().unwrap();
    let config = write_config(root.path());
    let db = provision(root.path(), &config, "right-key");

    let output = cipherbench(
        &config,
        &[
            "run",
            "--db",
            db.to_str().unwrap(),
            "--key",
            "wrong-key",
            "--max-open",
            "1",
            "--max-idle",
            "1",
        ],
    );

    assert!(!output.status.success());
    let message = stderr(&output);
    assert!(message.contains("Run 1x1 failed"));
    assert!(!message.contains("wrong-key"));
    assert!(!message.contains("right-key"));
}

/// Verifies a missing key is reported before any dataset is touched.
#[test]
fn provision_requires_a_key() {
    let root = TempDir::new().unwrap();
    let config = write_config(root.path());
    let db = root.path().join("source.db");

    let output = cipherbench(&config, &["provision", "--db", db.to_str().unwrap()]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("CIPHERBENCH_KEY"));
    assert!(!db.exists());
}

/// Verifies provisioning refuses to overwrite an existing dataset.
#[test]
fn provision_refuses_existing_dataset() {
    let root = TempDir::new().unwrap();
    let config = write_config(root.path());
    let db = provision(root.path(), &config, "testkey");

    let output =
        cipherbench(&config, &["provision", "--db", db.to_str().unwrap(), "--key", "testkey"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("refusing to overwrite"));
}

/// Verifies an inverted pool sizing is rejected.
#[test]
fn run_rejects_idle_above_open() {
    let root = TempDir::new().unwrap();
    let config = write_config(root.path());
    let db = provision(root.path(), &config, "testkey");

    let output = cipherbench(
        &config,
        &[
            "run",
            "--db",
            db.to_str().unwrap(),
            "--key",
            "testkey",
            "--max-open",
            "2",
            "--max-idle",
            "3",
        ],
    );

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Invalid pool sizing"));
}
