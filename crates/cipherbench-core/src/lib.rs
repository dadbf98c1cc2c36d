// crates/cipherbench-core/src/lib.rs
// ============================================================================
// Module: cipherbench Core Library
// Description: Public API surface for the benchmark core.
// Purpose: Expose store interfaces, latency recording, and workload runners.
// Dependencies: crate::{analysis, interfaces, recorder, telemetry, types, workload}
// ============================================================================

//! ## Overview
//! cipherbench core drives a mixed read/write workload against any
//! [`BenchStore`] and records per-call latency into a durable sample log. It
//! is backend-agnostic: the encrypted `SQLite` pool lives in
//! `cipherbench-store-sqlcipher` and plugs in through [`BenchStore`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod analysis;
pub mod interfaces;
pub mod recorder;
pub mod telemetry;
pub mod types;
pub mod workload;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use analysis::LatencySummary;
pub use analysis::SampleLogError;
pub use analysis::SampleRecord;
pub use analysis::parse_sample_line;
pub use analysis::parse_sample_log;
pub use analysis::summarize;
pub use interfaces::BenchStore;
pub use interfaces::OperationError;
pub use interfaces::OperationName;
pub use interfaces::StoreError;
pub use recorder::LatencyRecorder;
pub use recorder::RecorderError;
pub use recorder::SAMPLE_SEPARATOR;
pub use recorder::format_sample_line;
pub use telemetry::BenchEvent;
pub use telemetry::BenchEventKind;
pub use telemetry::BenchEventSink;
pub use telemetry::FileEventSink;
pub use telemetry::MemoryEventSink;
pub use telemetry::NoopEventSink;
pub use telemetry::StderrEventSink;
pub use types::JitterRange;
pub use types::PoolSizing;
pub use types::PoolSizingError;
pub use types::SecretKey;
pub use workload::RunPhase;
pub use workload::RunReport;
pub use workload::Workload;
pub use workload::WorkloadError;
pub use workload::WorkloadPlan;
