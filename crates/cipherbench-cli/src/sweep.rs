// crates/cipherbench-cli/src/sweep.rs
// ============================================================================
// Module: Pool-Size Sweep
// Description: Per-configuration trials over disposable dataset copies.
// Purpose: Repeat the workload across a sizing grid and summarize elapsed time.
// Dependencies: cipherbench-config, cipherbench-core, cipherbench-store-sqlcipher, tempfile
// ============================================================================

//! ## Overview
//! A trial copies the source dataset into a fresh temporary directory, opens
//! a pool with one [`PoolSizing`] against the copy, runs the configured
//! workload, and then discards the pool and the copy. The source dataset is
//! only ever read. [`SweepDriver::run`] executes trials in grid order, appends
//! `<max_open> <max_idle> <elapsed_ms>` per configuration to a summary file,
//! and aborts on the first failed trial.
//!
//! Summary write failures are counted, not fatal.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use cipherbench_config::BenchConfig;
use cipherbench_core::BenchEventKind;
use cipherbench_core::BenchEventSink;
use cipherbench_core::BenchStore;
use cipherbench_core::LatencyRecorder;
use cipherbench_core::PoolSizing;
use cipherbench_core::RecorderError;
use cipherbench_core::RunReport;
use cipherbench_core::SecretKey;
use cipherbench_core::Workload;
use cipherbench_core::WorkloadError;
use cipherbench_store_sqlcipher::MessageStore;
use cipherbench_store_sqlcipher::SqlcipherStoreError;
use cipherbench_store_sqlcipher::open_pool;
use tempfile::TempDir;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// File name prefix of sweep summaries.
pub const SUMMARY_FILE_PREFIX: &str = "perf-compare-connections-config";
/// File name of the dataset copy inside its temporary directory.
const WORKING_COPY_NAME: &str = "dataset.db";
/// Upper bound on unused-name probes for a summary file.
const MAX_NAME_ATTEMPTS: u32 = 64;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Sweep and trial errors.
#[derive(Debug, Error)]
pub enum SweepError {
    /// The grid held no sizings.
    #[error("sweep grid is empty")]
    EmptyGrid,
    /// The disposable dataset copy could not be created or removed.
    #[error("working copy failed: {0}")]
    WorkingCopy(String),
    /// The summary file could not be created.
    #[error("summary file failed: {0}")]
    Summary(String),
    /// Opening the pool or store failed.
    #[error("configuration {sizing}: {source}")]
    Store {
        /// Sizing label of the failed trial.
        sizing: String,
        /// Underlying store error.
        source: SqlcipherStoreError,
    },
    /// The sample log could not be created.
    #[error("configuration {sizing}: {source}")]
    Recorder {
        /// Sizing label of the failed trial.
        sizing: String,
        /// Underlying recorder error.
        source: RecorderError,
    },
    /// The workload run failed.
    #[error("configuration {sizing}: {source}")]
    Workload {
        /// Sizing label of the failed trial.
        sizing: String,
        /// Underlying workload error.
        source: WorkloadError,
    },
}

// ============================================================================
// SECTION: Working Copy
// ============================================================================

/// Disposable copy of a dataset, removed with its directory on drop.
pub struct WorkingCopy {
    /// Owning temporary directory.
    dir: TempDir,
    /// Copied dataset file.
    path: PathBuf,
}

impl WorkingCopy {
    /// Copies `source` into a new temporary directory.
    ///
    /// # Errors
    ///
    /// Returns [`SweepError::WorkingCopy`] when `source` is not a file or the
    /// copy fails.
    pub fn create(source: &Path, events: &dyn BenchEventSink) -> Result<Self, SweepError> {
        if !source.is_file() {
            return Err(SweepError::WorkingCopy(format!(
                "dataset {} does not exist",
                source.display()
            )));
        }
        let dir = tempfile::Builder::new()
            .prefix("cipherbench-")
            .tempdir()
            .map_err(|err| SweepError::WorkingCopy(err.to_string()))?;
        let path = dir.path().join(WORKING_COPY_NAME);
        fs::copy(source, &path).map_err(|err| SweepError::WorkingCopy(err.to_string()))?;
        events.emit(BenchEventKind::WorkingCopyCreated {
            source: source.display().to_string(),
            copy: path.display().to_string(),
        });
        Ok(Self {
            dir,
            path,
        })
    }

    /// Location of the copied dataset.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the copy, reporting cleanup failures.
    ///
    /// # Errors
    ///
    /// Returns [`SweepError::WorkingCopy`] when the directory cannot be removed.
    pub fn remove(self) -> Result<(), SweepError> {
        self.dir.close().map_err(|err| SweepError::WorkingCopy(err.to_string()))
    }
}

// ============================================================================
// SECTION: Summary File
// ============================================================================

/// Formats one summary line, newline included.
#[must_use]
pub fn summary_line(sizing: PoolSizing, elapsed_ms: u64) -> String {
    format!("{} {} {elapsed_ms}\n", sizing.max_open(), sizing.max_idle())
}

/// Append-only per-configuration summary.
pub struct SummaryWriter<W = File> {
    /// Destination of summary lines.
    writer: W,
    /// Summary file location when file-backed.
    path: Option<PathBuf>,
}

impl SummaryWriter<File> {
    /// Creates `perf-compare-connections-config<unix_secs>.csv` under `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`SweepError::Summary`] when no file can be created.
    pub fn create(dir: &Path) -> Result<Self, SweepError> {
        fs::create_dir_all(dir).map_err(|err| SweepError::Summary(err.to_string()))?;
        let stamp = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        for attempt in 0 .. MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                format!("{SUMMARY_FILE_PREFIX}{stamp}.csv")
            } else {
                format!("{SUMMARY_FILE_PREFIX}{stamp}-{attempt}.csv")
            };
            let path = dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    return Ok(Self {
                        writer: file,
                        path: Some(path),
                    });
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
                Err(err) => return Err(SweepError::Summary(err.to_string())),
            }
        }
        Err(SweepError::Summary(format!("no unused summary name under {}", dir.display())))
    }
}

impl<W: Write> SummaryWriter<W> {
    /// Wraps an arbitrary writer.
    pub const fn from_writer(writer: W) -> Self {
        Self {
            writer,
            path: None,
        }
    }

    /// Appends and flushes one configuration line.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub fn append(&mut self, sizing: PoolSizing, elapsed_ms: u64) -> io::Result<()> {
        self.writer.write_all(summary_line(sizing, elapsed_ms).as_bytes())?;
        self.writer.flush()
    }

    /// Summary file location when file-backed.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the wrapped writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

// ============================================================================
// SECTION: Driver
// ============================================================================

/// Result of one successful trial.
#[derive(Debug, Clone)]
pub struct TrialOutcome {
    /// Pool sizing exercised.
    pub sizing: PoolSizing,
    /// Workload report.
    pub report: RunReport,
    /// Sample log written by the trial.
    pub sample_log: Option<PathBuf>,
    /// Samples lost to write failures.
    pub samples_lost: u64,
}

/// Result of a completed sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Trials in execution order.
    pub trials: Vec<TrialOutcome>,
    /// Summary file location when file-backed.
    pub summary_path: Option<PathBuf>,
    /// Summary lines that could not be written.
    pub summary_write_failures: u64,
}

/// Runs trials against disposable copies of one source dataset.
pub struct SweepDriver {
    /// Connection, workload, and output settings.
    config: BenchConfig,
    /// Dataset copied for every trial; never opened directly.
    source: PathBuf,
    /// Dataset key.
    key: SecretKey,
    /// Sink for trial and run events.
    events: Arc<dyn BenchEventSink>,
}

impl SweepDriver {
    /// Creates a driver for `source`.
    pub fn new(
        config: BenchConfig,
        source: impl Into<PathBuf>,
        key: SecretKey,
        events: Arc<dyn BenchEventSink>,
    ) -> Self {
        Self {
            config,
            source: source.into(),
            key,
            events,
        }
    }

    /// Runs one trial with `sizing` on a fresh working copy.
    ///
    /// # Errors
    ///
    /// Returns [`SweepError`] when the copy, pool, sample log, or run fails.
    pub fn run_trial(&self, sizing: PoolSizing) -> Result<TrialOutcome, SweepError> {
        let label = sizing.label();
        let copy = WorkingCopy::create(&self.source, self.events.as_ref())?;
        let settings = self.config.sqlcipher_config(copy.path(), self.key.clone(), sizing);
        let store = open_pool(&settings, Arc::clone(&self.events))
            .and_then(MessageStore::new)
            .map_err(|source| SweepError::Store {
                sizing: label.clone(),
                source,
            })?;
        let recorder =
            LatencyRecorder::create(&self.config.output.dir, &label, Arc::clone(&self.events))
                .map_err(|source| SweepError::Recorder {
                    sizing: label.clone(),
                    source,
                })?;
        let workload =
            Workload::new(label.clone(), self.config.workload.plan(), Arc::clone(&self.events));
        let result = workload.run(&store, &recorder);
        store.close();
        drop(store);
        let report = result.map_err(|source| SweepError::Workload {
            sizing: label,
            source,
        })?;
        copy.remove()?;

        self.events.emit(BenchEventKind::TrialFinished {
            max_open: sizing.max_open(),
            max_idle: sizing.max_idle(),
            elapsed_ms: report.elapsed_ms(),
        });
        Ok(TrialOutcome {
            sizing,
            report,
            sample_log: recorder.path().map(Path::to_path_buf),
            samples_lost: recorder.failed(),
        })
    }

    /// Runs every sizing in order, writing a summary file under the output
    /// directory. `on_trial` sees each outcome as soon as it is summarized.
    ///
    /// # Errors
    ///
    /// Returns [`SweepError`] for an empty grid, an uncreatable summary file,
    /// or the first failed trial.
    pub fn run(
        &self,
        sizings: &[PoolSizing],
        on_trial: impl FnMut(&TrialOutcome),
    ) -> Result<SweepReport, SweepError> {
        if sizings.is_empty() {
            return Err(SweepError::EmptyGrid);
        }
        let mut summary = SummaryWriter::create(&self.config.output.dir)?;
        self.run_with_summary(sizings, &mut summary, on_trial)
    }

    /// Runs every sizing in order, appending to `summary`.
    ///
    /// # Errors
    ///
    /// Returns [`SweepError`] for an empty grid or the first failed trial.
    pub fn run_with_summary<W: Write>(
        &self,
        sizings: &[PoolSizing],
        summary: &mut SummaryWriter<W>,
        mut on_trial: impl FnMut(&TrialOutcome),
    ) -> Result<SweepReport, SweepError> {
        if sizings.is_empty() {
            return Err(SweepError::EmptyGrid);
        }
        let mut report = SweepReport {
            summary_path: summary.path().map(Path::to_path_buf),
            ..SweepReport::default()
        };
        for sizing in sizings {
            let outcome = self.run_trial(*sizing)?;
            if summary.append(outcome.sizing, outcome.report.elapsed_ms()).is_err() {
                report.summary_write_failures += 1;
            }
            on_trial(&outcome);
            report.trials.push(outcome);
        }
        Ok(report)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
