// crates/cipherbench-core/src/types.rs
// ============================================================================
// Module: Benchmark Value Types
// Description: Pool sizing, secret key material, and task jitter ranges.
// Purpose: Validated value types shared by the store, config, and CLI crates.
// Dependencies: rand, serde, thiserror
// ============================================================================

//! ## Overview
//! Small value types whose constructors enforce the invariants every layer
//! relies on: pool sizes are positive with `max_idle <= max_open`, key
//! material never reaches logs, and jitter ranges are ordered.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Pool Sizing
// ============================================================================

/// Pool sizing validation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolSizingError {
    /// `max_open` was zero.
    #[error("max_open must be greater than zero")]
    ZeroMaxOpen,
    /// `max_idle` was zero.
    #[error("max_idle must be greater than zero")]
    ZeroMaxIdle,
    /// `max_idle` exceeded `max_open`.
    #[error("max_idle ({max_idle}) must not exceed max_open ({max_open})")]
    IdleExceedsOpen {
        /// Requested open connection cap.
        max_open: u32,
        /// Requested idle connection cap.
        max_idle: u32,
    },
}

/// Connection pool bounds for one benchmark configuration.
///
/// # Invariants
/// - `0 < max_idle <= max_open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PoolSizing {
    /// Maximum number of live connections.
    max_open: u32,
    /// Maximum number of idle connections retained by the pool.
    max_idle: u32,
}

impl PoolSizing {
    /// Validates and builds a pool sizing pair.
    ///
    /// # Errors
    ///
    /// Returns [`PoolSizingError`] when either bound is zero or
    /// `max_idle > max_open`.
    pub const fn new(max_open: u32, max_idle: u32) -> Result<Self, PoolSizingError> {
        if max_open == 0 {
            return Err(PoolSizingError::ZeroMaxOpen);
        }
        if max_idle == 0 {
            return Err(PoolSizingError::ZeroMaxIdle);
        }
        if max_idle > max_open {
            return Err(PoolSizingError::IdleExceedsOpen {
                max_open,
                max_idle,
            });
        }
        Ok(Self {
            max_open,
            max_idle,
        })
    }

    /// Maximum number of live connections.
    #[must_use]
    pub const fn max_open(self) -> u32 {
        self.max_open
    }

    /// Maximum number of idle connections.
    #[must_use]
    pub const fn max_idle(self) -> u32 {
        self.max_idle
    }

    /// Short label used in file names, e.g. `4x2`.
    #[must_use]
    pub fn label(self) -> String {
        format!("{}x{}", self.max_open, self.max_idle)
    }
}

// ============================================================================
// SECTION: Secret Key
// ============================================================================

/// Opaque key material used to unlock an encrypted dataset.
///
/// # Invariants
/// - `Debug` never prints the key; the type is deliberately not `Serialize`.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(String);

impl SecretKey {
    /// Wraps key material.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw key for handing to the storage engine.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns true when no key material was supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

// ============================================================================
// SECTION: Jitter
// ============================================================================

/// Inclusive millisecond range a task sleeps before issuing its operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JitterRange {
    /// Lower bound in milliseconds.
    pub min_ms: u64,
    /// Upper bound in milliseconds.
    pub max_ms: u64,
}

impl JitterRange {
    /// No delay.
    pub const NONE: Self = Self {
        min_ms: 0,
        max_ms: 0,
    };

    /// Builds a range from bounds in milliseconds.
    #[must_use]
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms,
            max_ms,
        }
    }

    /// Returns true when the bounds are ordered.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.min_ms <= self.max_ms
    }

    /// Draws a delay from the range. Inverted bounds collapse to `min_ms`.
    pub fn sample<R: Rng + ?Sized>(self, rng: &mut R) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rng.gen_range(self.min_ms ..= self.max_ms))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
