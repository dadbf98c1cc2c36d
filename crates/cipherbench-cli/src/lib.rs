// crates/cipherbench-cli/src/lib.rs
// ============================================================================
// Module: cipherbench CLI Library
// Description: Shared helpers for the cipherbench command-line binary.
// Purpose: Expose the message catalog and the pool-size sweep driver.
// Dependencies: crate::{i18n, sweep}
// ============================================================================

//! ## Overview
//! The `cipherbench` binary is a thin dispatcher; the reusable parts live
//! here so integration tests can drive them directly. [`sweep`] owns the
//! per-configuration trial lifecycle and [`i18n`] owns every user-facing
//! string.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod i18n;
pub mod sweep;
