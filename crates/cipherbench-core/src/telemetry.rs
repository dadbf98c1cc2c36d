// crates/cipherbench-core/src/telemetry.rs
// ============================================================================
// Module: Benchmark Telemetry
// Description: Structured benchmark events and pluggable JSON-line sinks.
// Purpose: Emit redacted operational logs without hard logging dependencies.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Benchmark layers report lifecycle events (pools opened, connections set
//! up, runs started and finished, sample-log write failures) through a
//! [`BenchEventSink`]. Sinks serialize each event as one JSON line. Events
//! never carry key material.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::interfaces::OperationName;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Event payload variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BenchEventKind {
    /// A connection pool finished initialization.
    PoolOpened {
        /// Dataset path the pool is bound to.
        path: String,
        /// Maximum live connections.
        max_open: u32,
        /// Maximum idle connections.
        max_idle: u32,
        /// Key-derivation iteration count applied per connection.
        kdf_iterations: u32,
    },
    /// A physical connection completed its initialization hook.
    ConnectionSetup {
        /// Dataset path the connection is bound to.
        path: String,
        /// Pool-local ordinal of the connection (1-based).
        ordinal: u64,
    },
    /// A physical connection failed its initialization hook.
    ConnectionSetupFailed {
        /// Dataset path the connection is bound to.
        path: String,
        /// Failure description.
        error: String,
    },
    /// A workload run started.
    RunStarted {
        /// Run label.
        label: String,
        /// Concurrent reader task count.
        readers: usize,
        /// Concurrent writer task count.
        writers: usize,
    },
    /// A workload run reached a terminal state.
    RunFinished {
        /// Run label.
        label: String,
        /// Whether the run succeeded.
        succeeded: bool,
        /// Elapsed wall time in milliseconds.
        elapsed_ms: u64,
        /// Number of failed tasks.
        failures: usize,
        /// First error observed, when the run failed.
        error: Option<String>,
    },
    /// A latency sample could not be appended to the sample log.
    SampleWriteFailed {
        /// Operation whose sample was lost.
        operation: OperationName,
        /// Write failure description.
        error: String,
    },
    /// A disposable dataset copy was created for a trial.
    WorkingCopyCreated {
        /// Source dataset path.
        source: String,
        /// Temporary copy path.
        copy: String,
    },
    /// One sweep configuration finished.
    TrialFinished {
        /// Maximum live connections.
        max_open: u32,
        /// Maximum idle connections.
        max_idle: u32,
        /// Elapsed workload time in milliseconds.
        elapsed_ms: u64,
    },
}

/// Timestamped benchmark event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BenchEvent {
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Event payload.
    #[serde(flatten)]
    pub kind: BenchEventKind,
}

impl BenchEvent {
    /// Creates a new event stamped with the current time.
    #[must_use]
    pub fn new(kind: BenchEventKind) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            timestamp_ms,
            kind,
        }
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Sink for benchmark events.
pub trait BenchEventSink: Send + Sync {
    /// Record an event.
    fn record(&self, event: &BenchEvent);

    /// Stamps and records an event payload.
    fn emit(&self, kind: BenchEventKind) {
        self.record(&BenchEvent::new(kind));
    }
}

/// Sink that logs JSON lines to stderr.
pub struct StderrEventSink;

impl BenchEventSink for StderrEventSink {
    fn record(&self, event: &BenchEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Sink that appends JSON lines to a file.
pub struct FileEventSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileEventSink {
    /// Opens the event log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl BenchEventSink for FileEventSink {
    fn record(&self, event: &BenchEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op event sink.
pub struct NoopEventSink;

impl BenchEventSink for NoopEventSink {
    fn record(&self, _event: &BenchEvent) {}
}

/// In-memory sink that retains events for inspection.
#[derive(Default)]
pub struct MemoryEventSink {
    /// Recorded events in arrival order.
    events: Mutex<Vec<BenchEvent>>,
}

impl MemoryEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded event payloads.
    #[must_use]
    pub fn kinds(&self) -> Vec<BenchEventKind> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|event| event.kind.clone())
            .collect()
    }
}

impl BenchEventSink for MemoryEventSink {
    fn record(&self, event: &BenchEvent) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event.clone());
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
