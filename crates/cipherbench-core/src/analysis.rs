// crates/cipherbench-core/src/analysis.rs
// ============================================================================
// Module: Sample Log Analysis
// Description: Parsing and per-operation summaries of latency sample logs.
// Purpose: Turn raw `<label>µ<nanos>` lines into count, mean, and percentiles.
// Dependencies: serde, thiserror, crate::{interfaces, recorder}
// ============================================================================

//! ## Overview
//! Sample logs are plain text; this module reads them back. Parsing is
//! strict: an unknown label, a missing separator, or a non-numeric duration
//! is reported with its 1-based line number. Percentiles use the
//! nearest-rank method.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::interfaces::OperationName;
use crate::recorder::SAMPLE_SEPARATOR;

// ============================================================================
// SECTION: Types
// ============================================================================

/// One parsed sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRecord {
    /// Operation that was timed.
    pub operation: OperationName,
    /// Measured wall time.
    pub duration: Duration,
}

/// Sample log parse errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SampleLogError {
    /// Line lacked the label separator.
    #[error("line {line}: missing separator")]
    MissingSeparator {
        /// 1-based line number.
        line: usize,
    },
    /// Label did not name a known operation.
    #[error("line {line}: unknown operation `{label}`")]
    UnknownOperation {
        /// 1-based line number.
        line: usize,
        /// Label found on the line.
        label: String,
    },
    /// Duration was not a non-negative integer.
    #[error("line {line}: invalid duration `{value}`")]
    InvalidDuration {
        /// 1-based line number.
        line: usize,
        /// Text found after the separator.
        value: String,
    },
}

impl SampleLogError {
    /// Rewrites the line number carried by the error.
    fn at_line(self, line: usize) -> Self {
        match self {
            Self::MissingSeparator {
                ..
            } => Self::MissingSeparator {
                line,
            },
            Self::UnknownOperation {
                label,
                ..
            } => Self::UnknownOperation {
                line,
                label,
            },
            Self::InvalidDuration {
                value,
                ..
            } => Self::InvalidDuration {
                line,
                value,
            },
        }
    }
}

/// Latency summary for one operation, in microseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatencySummary {
    /// Operation summarized.
    pub operation: OperationName,
    /// Number of samples.
    pub count: usize,
    /// Arithmetic mean.
    pub mean_us: u64,
    /// Median (nearest rank).
    pub p50_us: u64,
    /// 95th percentile (nearest rank).
    pub p95_us: u64,
    /// 99th percentile (nearest rank).
    pub p99_us: u64,
    /// Slowest sample.
    pub max_us: u64,
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Parses one sample line, without its trailing newline.
///
/// # Errors
///
/// Returns [`SampleLogError`] (reported at line 1) when the line is malformed.
pub fn parse_sample_line(line: &str) -> Result<SampleRecord, SampleLogError> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let Some((label, value)) = line.split_once(SAMPLE_SEPARATOR) else {
        return Err(SampleLogError::MissingSeparator {
            line: 1,
        });
    };
    let Some(operation) = OperationName::from_label(label) else {
        return Err(SampleLogError::UnknownOperation {
            line: 1,
            label: label.to_string(),
        });
    };
    let nanos = value.parse::<u64>().map_err(|_| SampleLogError::InvalidDuration {
        line: 1,
        value: value.to_string(),
    })?;
    Ok(SampleRecord {
        operation,
        duration: Duration::from_nanos(nanos),
    })
}

/// Parses a whole sample log. Blank lines are skipped.
///
/// # Errors
///
/// Returns the first [`SampleLogError`] encountered.
pub fn parse_sample_log(content: &str) -> Result<Vec<SampleRecord>, SampleLogError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| parse_sample_line(line).map_err(|err| err.at_line(index + 1)))
        .collect()
}

// ============================================================================
// SECTION: Summaries
// ============================================================================

/// Summarizes samples per operation, in [`OperationName::ALL`] order.
/// Operations without samples are omitted.
#[must_use]
pub fn summarize(records: &[SampleRecord]) -> Vec<LatencySummary> {
    OperationName::ALL
        .into_iter()
        .filter_map(|operation| {
            let mut micros: Vec<u64> = records
                .iter()
                .filter(|record| record.operation == operation)
                .map(|record| u64::try_from(record.duration.as_micros()).unwrap_or(u64::MAX))
                .collect();
            if micros.is_empty() {
                return None;
            }
            micros.sort_unstable();
            let total = micros.iter().fold(0_u128, |acc, value| acc + u128::from(*value));
            let count = micros.len();
            let mean = total / u128::try_from(count).unwrap_or(u128::MAX);
            Some(LatencySummary {
                operation,
                count,
                mean_us: u64::try_from(mean).unwrap_or(u64::MAX),
                p50_us: nearest_rank(&micros, 50),
                p95_us: nearest_rank(&micros, 95),
                p99_us: nearest_rank(&micros, 99),
                max_us: micros.last().copied().unwrap_or(0),
            })
        })
        .collect()
}

/// Nearest-rank percentile over an ascending slice. Returns 0 when empty.
fn nearest_rank(sorted: &[u64], percentile: u32) -> u64 {
    if sorted.is_empty() || percentile == 0 || percentile > 100 {
        return 0;
    }
    let len = u64::try_from(sorted.len()).unwrap_or(u64::MAX);
    let rank = len.saturating_mul(u64::from(percentile)).saturating_add(99).saturating_div(100).max(1);
    let index = usize::try_from(rank.saturating_sub(1)).unwrap_or(usize::MAX);
    sorted.get(index).or_else(|| sorted.last()).copied().unwrap_or(0)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use super::*;

    #[test]
    fn nearest_rank_matches_expected_ranks() {
        let values = [10_u64, 20, 30, 40];
        assert_eq!(nearest_rank(&values, 50), 20);
        assert_eq!(nearest_rank(&values, 95), 40);
        assert_eq!(nearest_rank(&values, 0), 0);
        assert_eq!(nearest_rank(&[], 50), 0);
    }

    #[test]
    fn parse_log_reports_line_numbers() {
        let content = "QueryUnseenMessagesµ1000\n\nInsertUnseenMessage 20\n";
        let err = parse_sample_log(content).unwrap_err();
        assert_eq!(
            err,
            SampleLogError::MissingSeparator {
                line: 3
            }
        );
    }

    #[test]
    fn parse_log_keeps_error_details_with_line_numbers() {
        let content = "InsertUnseenMessageµ7\nDeleteEverythingµ5\n";
        assert_eq!(
            parse_sample_log(content).unwrap_err(),
            SampleLogError::UnknownOperation {
                line: 2,
                label: "DeleteEverything".to_string(),
            }
        );
        let content = "InsertUnseenMessageµ7\nQueryUnseenMessagesµ7\nQueryUnseenMessagesµx\n";
        assert_eq!(
            parse_sample_log(content).unwrap_err(),
            SampleLogError::InvalidDuration {
                line: 3,
                value: "x".to_string(),
            }
        );
    }

    #[test]
    fn parse_line_rejects_unknown_operation() {
        let err = parse_sample_line("DeleteEverythingµ5").unwrap_err();
        assert!(matches!(err, SampleLogError::UnknownOperation { .. }));
        let err = parse_sample_line("InsertUnseenMessageµ-5").unwrap_err();
        assert!(matches!(err, SampleLogError::InvalidDuration { .. }));
    }

    #[test]
    fn summarize_groups_by_operation() {
        let records = [
            SampleRecord {
                operation: OperationName::InsertUnseenMessage,
                duration: Duration::from_micros(30),
            },
            SampleRecord {
                operation: OperationName::InsertUnseenMessage,
                duration: Duration::from_micros(10),
            },
            SampleRecord {
                operation: OperationName::QueryUnseenMessages,
                duration: Duration::from_micros(7),
            },
        ];
        let summaries = summarize(&records);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].operation, OperationName::QueryUnseenMessages);
        assert_eq!(summaries[0].count, 1);
        assert_eq!(summaries[1].count, 2);
        assert_eq!(summaries[1].mean_us, 20);
        assert_eq!(summaries[1].p50_us, 10);
        assert_eq!(summaries[1].max_us, 30);
    }
}
