// crates/cipherbench-cli/src/i18n.rs
// ============================================================================
// Module: CLI Message Catalog
// Description: Message catalog and placeholder substitution for CLI output.
// Purpose: Keep every user-facing string in one table.
// Dependencies: Standard library collections.
// ============================================================================

//! ## Overview
//! All runtime output of the `cipherbench` binary goes through the
//! [`t!`](crate::t) macro, which looks a key up in the catalog and
//! substitutes `{name}` placeholders.
//!
//! ## Invariants
//! - The catalog is built once and read-only thereafter.
//! - Missing keys fall back to the key itself.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::OnceLock;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Named placeholder value for a catalog message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageArg {
    /// Placeholder name used in templates (e.g., `"path"`).
    pub key: &'static str,
    /// Value substituted for the placeholder.
    pub value: String,
}

impl MessageArg {
    /// Constructs a new [`MessageArg`].
    pub fn new(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// English message templates.
const CATALOG_EN: &[(&str, &str)] = &[
    ("output.stream.stdout", "stdout"),
    ("output.stream.stderr", "stderr"),
    ("output.stream.unknown", "output"),
    ("output.write_failed", "Failed to write to {stream}: {error}"),
    ("config.load_failed", "Failed to load config: {error}"),
    ("config.validate.ok", "Config valid: {source}"),
    ("config.validate.defaults", "Config valid (built-in defaults)."),
    ("dataset.resolve_failed", "Failed to resolve dataset: {error}"),
    ("key.resolve_failed", "Failed to resolve dataset key: {error}"),
    ("events.open_failed", "Failed to open event log {path}: {error}"),
    ("sizing.invalid", "Invalid pool sizing: {error}"),
    ("provision.failed", "Failed to provision dataset {path}: {error}"),
    ("provision.ok", "Provisioned {path} with {unseen} unseen and {seen} seen messages."),
    ("run.failed", "Run {label} failed: {error}"),
    (
        "run.ok",
        "Run {label} finished in {elapsed_ms} ms ({reads} reads, {writes} writes). Samples: {path}",
    ),
    ("sweep.failed", "Sweep aborted: {error}"),
    ("sweep.trial", "{max_open} {max_idle} {elapsed_ms}"),
    ("sweep.summary_write_failed", "Warning: {count} summary line(s) could not be written."),
    ("sweep.ok", "Sweep finished {count} configuration(s). Summary: {path}"),
    ("report.read_failed", "Failed to read sample log {path}: {error}"),
    ("report.parse_failed", "Failed to parse sample log {path}: {error}"),
    ("report.json_failed", "Failed to serialize report: {error}"),
    ("report.empty", "No samples in {path}."),
    ("report.header", "Samples in {path}:"),
    (
        "report.entry",
        "  {operation}: count={count} mean={mean}us p50={p50}us p95={p95}us p99={p99}us \
         max={max}us",
    ),
];

/// Returns the lazily built lookup table.
pub(crate) fn catalog() -> &'static HashMap<&'static str, &'static str> {
    static CATALOG_EN_MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    CATALOG_EN_MAP.get_or_init(|| CATALOG_EN.iter().copied().collect())
}

// ============================================================================
// SECTION: Translation
// ============================================================================

/// Resolves `key` and substitutes `args` into its placeholders.
#[must_use]
pub fn translate(key: &str, args: Vec<MessageArg>) -> String {
    let template = catalog().get(key).copied().unwrap_or(key);
    if args.is_empty() {
        return template.to_string();
    }

    let mut result = template.to_string();
    for arg in args {
        let placeholder = format!("{{{}}}", arg.key);
        result = result.replace(&placeholder, &arg.value);
    }
    result
}

// ============================================================================
// SECTION: Macro
// ============================================================================

/// Formats a catalog message from a key and named arguments.
///
/// # Examples
///
/// ```
/// use cipherbench_cli::t;
///
/// let message = t!("sweep.trial", max_open = 4, max_idle = 2, elapsed_ms = 910);
/// assert_eq!(message, "4 2 910");
/// ```
#[macro_export]
macro_rules! t {
    ($key:literal $(, $name:ident = $value:expr )* $(,)?) => {{
        let args = ::std::vec![
            $(
                $crate::i18n::MessageArg::new(stringify!($name), $value.to_string()),
            )*
        ];
        $crate::i18n::translate($key, args)
    }};
}

// ============================================================================
// SECTION: Tests
// ============================================================================
