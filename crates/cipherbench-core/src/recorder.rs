// crates/cipherbench-core/src/recorder.rs
// ============================================================================
// Module: Latency Recorder
// Description: Concurrency-safe, append-only sink for per-call latency samples.
// Purpose: Persist every sample as one complete line, flushed as it is taken.
// Dependencies: thiserror, crate::{interfaces, telemetry}
// ============================================================================

//! ## Overview
//! [`LatencyRecorder`] serializes writers behind a mutex; each sample is
//! formatted up front and written with a single `write_all` plus `flush`, so
//! lines never interleave and nothing sits in a user-space buffer. Write
//! failures are reported through the event sink and counted, but never fail
//! the operation being measured.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use thiserror::Error;

use crate::interfaces::OperationName;
use crate::telemetry::BenchEventKind;
use crate::telemetry::BenchEventSink;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Separator between the operation label and the nanosecond duration.
pub const SAMPLE_SEPARATOR: char = 'µ';
/// Attempts made to find an unused sample log file name.
const MAX_NAME_ATTEMPTS: u32 = 64;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Sample log creation errors.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// Output directory or file could not be created.
    #[error("sample log io error: {0}")]
    Io(String),
}

// ============================================================================
// SECTION: Recorder
// ============================================================================

/// Append-only latency sample log.
pub struct LatencyRecorder<W = File> {
    /// Serialization point for every sample written.
    writer: Mutex<W>,
    /// Log file location when file-backed.
    path: Option<PathBuf>,
    /// Sink for write-failure reports.
    events: Arc<dyn BenchEventSink>,
    /// Samples written successfully.
    recorded: AtomicU64,
    /// Samples lost to write failures.
    failed: AtomicU64,
}

impl LatencyRecorder<File> {
    /// Creates a fresh `perf-<unix_millis>-<label>.csv` log under `dir`.
    ///
    /// Existing files are never truncated; a numeric suffix is appended
    /// until an unused name is found.
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError`] when the directory or file cannot be created.
    pub fn create(
        dir: &Path,
        label: &str,
        events: Arc<dyn BenchEventSink>,
    ) -> Result<Self, RecorderError> {
        std::fs::create_dir_all(dir).map_err(|err| RecorderError::Io(err.to_string()))?;
        let stamp = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        for attempt in 0 .. MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                format!("perf-{stamp}-{label}.csv")
            } else {
                format!("perf-{stamp}-{label}-{attempt}.csv")
            };
            let path = dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    let mut recorder = Self::from_writer(file, events);
                    recorder.path = Some(path);
                    return Ok(recorder);
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
                Err(err) => return Err(RecorderError::Io(err.to_string())),
            }
        }
        Err(RecorderError::Io(format!("no unused sample log name under {}", dir.display())))
    }
}

impl<W: Write + Send> LatencyRecorder<W> {
    /// Wraps an arbitrary writer.
    pub fn from_writer(writer: W, events: Arc<dyn BenchEventSink>) -> Self {
        Self {
            writer: Mutex::new(writer),
            path: None,
            events,
            recorded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Appends one sample line. Failures are reported, never propagated.
    pub fn record(&self, operation: OperationName, duration: Duration) {
        let line = format_sample_line(operation, duration);
        let outcome = {
            let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
            writer.write_all(line.as_bytes()).and_then(|()| writer.flush())
        };
        match outcome {
            Ok(()) => {
                self.recorded.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.events.emit(BenchEventKind::SampleWriteFailed {
                    operation,
                    error: err.to_string(),
                });
            }
        }
    }

    /// Runs `call`, records its duration, and returns its result untouched.
    ///
    /// The sample is recorded whether the call succeeds or fails.
    pub fn time<T, E>(
        &self,
        operation: OperationName,
        call: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        let started = Instant::now();
        let result = call();
        self.record(operation, started.elapsed());
        result
    }

    /// Number of samples written successfully.
    #[must_use]
    pub fn recorded(&self) -> u64 {
        self.recorded.load(Ordering::Relaxed)
    }

    /// Number of samples lost to write failures.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Location of the sample log when file-backed.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Consumes the recorder and returns the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Formats one sample as `<label>µ<nanoseconds>\n`.
#[must_use]
pub fn format_sample_line(operation: OperationName, duration: Duration) -> String {
    format!("{}{SAMPLE_SEPARATOR}{}\n", operation.as_str(), duration.as_nanos())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
