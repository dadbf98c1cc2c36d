// crates/cipherbench-core/src/workload.rs
// ============================================================================
// Module: Benchmark Workload
// Description: Serial warm-up followed by a concurrent mixed read/write phase.
// Purpose: Time every store call and fail the run on the first error seen.
// Dependencies: rand, thiserror, crate::{interfaces, recorder, telemetry, types}
// ============================================================================

//! ## Overview
//! A run executes one timed read and one timed write serially (fail-fast),
//! then launches `readers + writers` independent tasks, each performing a
//! single timed call after an optional random delay. Every task is joined
//! before errors are inspected, so no failure is dropped; the first collected
//! error is reported. There is no retry and no sibling cancellation: one
//! failure invalidates the run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use thiserror::Error;

use crate::interfaces::BenchStore;
use crate::interfaces::OperationError;
use crate::interfaces::OperationName;
use crate::recorder::LatencyRecorder;
use crate::telemetry::BenchEventKind;
use crate::telemetry::BenchEventSink;
use crate::types::JitterRange;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default concurrent reader task count.
pub const DEFAULT_READERS: usize = 50;
/// Default concurrent writer task count.
pub const DEFAULT_WRITERS: usize = 1_000;
/// Default reader start delay range.
pub const DEFAULT_READER_JITTER: JitterRange = JitterRange::new(200, 700);
/// Default writer start delay range.
pub const DEFAULT_WRITER_JITTER: JitterRange = JitterRange::new(50, 150);
/// Samples recorded by the serial warm-up phase.
pub const WARMUP_SAMPLES: usize = 2;

// ============================================================================
// SECTION: Plan
// ============================================================================

/// Shape of one workload run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadPlan {
    /// Concurrent read tasks.
    pub readers: usize,
    /// Concurrent write tasks.
    pub writers: usize,
    /// Start delay drawn by each read task.
    pub reader_jitter: JitterRange,
    /// Start delay drawn by each write task.
    pub writer_jitter: JitterRange,
}

impl Default for WorkloadPlan {
    fn default() -> Self {
        Self {
            readers: DEFAULT_READERS,
            writers: DEFAULT_WRITERS,
            reader_jitter: DEFAULT_READER_JITTER,
            writer_jitter: DEFAULT_WRITER_JITTER,
        }
    }
}

impl WorkloadPlan {
    /// Plan with the given task counts and no start delays.
    #[must_use]
    pub const fn immediate(readers: usize, writers: usize) -> Self {
        Self {
            readers,
            writers,
            reader_jitter: JitterRange::NONE,
            writer_jitter: JitterRange::NONE,
        }
    }

    /// Number of samples a successful run appends to the sample log.
    #[must_use]
    pub const fn expected_samples(&self) -> usize {
        WARMUP_SAMPLES + self.readers + self.writers
    }
}

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Phase of a run, used to attribute failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// Serial warm-up read and write.
    Warmup,
    /// Concurrent reader and writer tasks.
    Concurrent,
}

/// Terminal failure of a workload run.
#[derive(Debug, Error)]
pub enum WorkloadError {
    /// A warm-up call failed; the concurrent phase never started.
    #[error("warm-up failed: {0}")]
    Warmup(OperationError),
    /// At least one concurrent task failed.
    #[error("concurrent phase failed ({failures} of {tasks} tasks): {first}")]
    Concurrent {
        /// First error collected after all tasks were joined.
        first: OperationError,
        /// Number of failed tasks.
        failures: usize,
        /// Number of launched tasks.
        tasks: usize,
    },
    /// The OS refused to start a task thread.
    #[error("failed to spawn workload task: {0}")]
    Spawn(String),
    /// A task thread panicked.
    #[error("workload task panicked during {operation}")]
    TaskPanicked {
        /// Operation the task was running.
        operation: OperationName,
    },
}

impl WorkloadError {
    /// Phase the failure belongs to.
    #[must_use]
    pub const fn phase(&self) -> RunPhase {
        match self {
            Self::Warmup(_) => RunPhase::Warmup,
            Self::Concurrent {
                ..
            }
            | Self::Spawn(_)
            | Self::TaskPanicked {
                ..
            } => RunPhase::Concurrent,
        }
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Wall time from the warm-up read to the last joined task.
    pub elapsed: Duration,
    /// Reads performed, warm-up included.
    pub reads: usize,
    /// Writes performed, warm-up included.
    pub writes: usize,
    /// Unseen messages returned by the warm-up read.
    pub warmup_unseen: usize,
}

impl RunReport {
    /// Elapsed time in whole milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

// ============================================================================
// SECTION: Workload
// ============================================================================

/// Benchmark run driver.
pub struct Workload {
    /// Label used in emitted events.
    label: String,
    /// Task counts and delays.
    plan: WorkloadPlan,
    /// Sink for run lifecycle events.
    events: Arc<dyn BenchEventSink>,
}

impl Workload {
    /// Creates a workload for `plan`.
    pub fn new(label: impl Into<String>, plan: WorkloadPlan, events: Arc<dyn BenchEventSink>) -> Self {
        Self {
            label: label.into(),
            plan,
            events,
        }
    }

    /// Returns the run plan.
    #[must_use]
    pub const fn plan(&self) -> &WorkloadPlan {
        &self.plan
    }

    /// Executes one run against `store`, timing every call into `recorder`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkloadError`] when any call fails or a task cannot run.
    pub fn run<S, W>(
        &self,
        store: &S,
        recorder: &LatencyRecorder<W>,
    ) -> Result<RunReport, WorkloadError>
    where
        S: BenchStore + ?Sized,
        W: std::io::Write + Send,
    {
        self.events.emit(BenchEventKind::RunStarted {
            label: self.label.clone(),
            readers: self.plan.readers,
            writers: self.plan.writers,
        });
        let started = Instant::now();
        let result = self.warmup(store, recorder).and_then(|warmup_unseen| {
            self.concurrent(store, recorder)?;
            Ok(RunReport {
                elapsed: started.elapsed(),
                reads: 1 + self.plan.readers,
                writes: 1 + self.plan.writers,
                warmup_unseen,
            })
        });
        self.report_finished(started.elapsed(), &result);
        result
    }

    /// Serial phase: one read, then one write. Returns the unseen count read.
    fn warmup<S, W>(&self, store: &S, recorder: &LatencyRecorder<W>) -> Result<usize, WorkloadError>
    where
        S: BenchStore + ?Sized,
        W: std::io::Write + Send,
    {
        let unseen = recorder
            .time(OperationName::QueryUnseenMessages, || store.query_unseen())
            .map_err(|err| {
                WorkloadError::Warmup(OperationError::new(OperationName::QueryUnseenMessages, err))
            })?;
        recorder.time(OperationName::InsertUnseenMessage, || store.insert_unseen()).map_err(
            |err| {
                WorkloadError::Warmup(OperationError::new(OperationName::InsertUnseenMessage, err))
            },
        )?;
        Ok(unseen.len())
    }

    /// Concurrent phase: launch every task, join them all, report the first error.
    fn concurrent<S, W>(&self, store: &S, recorder: &LatencyRecorder<W>) -> Result<(), WorkloadError>
    where
        S: BenchStore + ?Sized,
        W: std::io::Write + Send,
    {
        let tasks = self.plan.readers + self.plan.writers;
        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(tasks);
            let mut spawn_error = None;
            for index in 0 .. tasks {
                let (operation, jitter) = if index < self.plan.readers {
                    (OperationName::QueryUnseenMessages, self.plan.reader_jitter)
                } else {
                    (OperationName::InsertUnseenMessage, self.plan.writer_jitter)
                };
                let spawned = thread::Builder::new()
                    .name(format!("bench-task-{index}"))
                    .spawn_scoped(scope, move || run_task(store, recorder, operation, jitter));
                match spawned {
                    Ok(handle) => handles.push((operation, handle)),
                    Err(err) => {
                        spawn_error = Some(err.to_string());
                        break;
                    }
                }
            }

            let mut errors = Vec::new();
            let mut panicked = None;
            for (operation, handle) in handles {
                match handle.join() {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => errors.push(err),
                    Err(_) => {
                        panicked.get_or_insert(operation);
                    }
                }
            }

            if let Some(message) = spawn_error {
                return Err(WorkloadError::Spawn(message));
            }
            if let Some(operation) = panicked {
                return Err(WorkloadError::TaskPanicked {
                    operation,
                });
            }
            let failures = errors.len();
            match errors.into_iter().next() {
                Some(first) => Err(WorkloadError::Concurrent {
                    first,
                    failures,
                    tasks,
                }),
                None => Ok(()),
            }
        })
    }

    /// Emits the terminal run event.
    fn report_finished(&self, elapsed: Duration, result: &Result<RunReport, WorkloadError>) {
        let (failures, error) = match result {
            Ok(_) => (0, None),
            Err(WorkloadError::Concurrent {
                failures,
                ..
            }) => (*failures, result.as_ref().err().map(ToString::to_string)),
            Err(err) => (1, Some(err.to_string())),
        };
        self.events.emit(BenchEventKind::RunFinished {
            label: self.label.clone(),
            succeeded: result.is_ok(),
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            failures,
            error,
        });
    }
}

/// Body of one concurrent task: delay, then one timed call.
fn run_task<S, W>(
    store: &S,
    recorder: &LatencyRecorder<W>,
    operation: OperationName,
    jitter: JitterRange,
) -> Result<(), OperationError>
where
    S: BenchStore + ?Sized,
    W: std::io::Write + Send,
{
    let delay = jitter.sample(&mut rand::thread_rng());
    if !delay.is_zero() {
        thread::sleep(delay);
    }
    let result = match operation {
        OperationName::QueryUnseenMessages => {
            recorder.time(operation, || store.query_unseen()).map(|_| ())
        }
        OperationName::InsertUnseenMessage => recorder.time(operation, || store.insert_unseen()),
    };
    result.map_err(|err| OperationError::new(operation, err))
}
