// crates/cipherbench-config/src/lib.rs
// ============================================================================
// Module: cipherbench Config Library
// Description: Canonical benchmark configuration model and validation.
// Purpose: Single source of truth for cipherbench.toml semantics.
// Dependencies: cipherbench-core, cipherbench-store-sqlcipher, serde, toml
// ============================================================================

//! ## Overview
//! `cipherbench-config` loads `cipherbench.toml`, applies defaults for every
//! omitted field, and validates the result fail-closed. It also derives the
//! sweep grid and the per-pool SQLCipher settings from the loaded values.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
