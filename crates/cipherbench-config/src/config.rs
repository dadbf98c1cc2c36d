// crates/cipherbench-config/src/config.rs
// ============================================================================
// Module: cipherbench Configuration
// Description: Configuration loading and validation for benchmark runs.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: cipherbench-core, cipherbench-store-sqlcipher, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Every section is optional and falls back to the stock benchmark defaults
//! (50 readers, 1000 writers, a 256,000-iteration KDF, and the 1..=17 step-4
//! pool grid). Unknown fields are rejected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use cipherbench_core::JitterRange;
use cipherbench_core::PoolSizing;
use cipherbench_core::SecretKey;
use cipherbench_core::WorkloadPlan;
use cipherbench_core::workload::DEFAULT_READER_JITTER;
use cipherbench_core::workload::DEFAULT_READERS;
use cipherbench_core::workload::DEFAULT_WRITER_JITTER;
use cipherbench_core::workload::DEFAULT_WRITERS;
use cipherbench_store_sqlcipher::DEFAULT_BUSY_TIMEOUT_MS;
use cipherbench_store_sqlcipher::DEFAULT_CONNECTION_TIMEOUT_MS;
use cipherbench_store_sqlcipher::DEFAULT_IDLE_TIMEOUT_MS;
use cipherbench_store_sqlcipher::DEFAULT_KDF_ITERATIONS;
use cipherbench_store_sqlcipher::SqlcipherConfig;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "cipherbench.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "CIPHERBENCH_CONFIG";
/// Default environment variable holding the dataset key.
pub const DEFAULT_KEY_ENV: &str = "CIPHERBENCH_KEY";
/// Default output directory for sample logs and summaries.
const DEFAULT_OUTPUT_DIR: &str = "output";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum length of an environment variable name.
const MAX_ENV_NAME_LENGTH: usize = 128;
/// Upper bound for any timeout setting.
pub(crate) const MAX_TIMEOUT_MS: u64 = 10 * 60 * 1000;
/// Upper bound for a task start delay.
pub(crate) const MAX_JITTER_MS: u64 = 60_000;
/// Upper bound for concurrent tasks in one run.
pub(crate) const MAX_TASKS: usize = 100_000;
/// Upper bound for `max_open` in a sweep.
pub(crate) const MAX_POOL_SIZE: u32 = 1024;
/// Upper bound for explicit sweep pairs.
pub(crate) const MAX_SWEEP_PAIRS: usize = 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Benchmark configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BenchConfig {
    /// Dataset location and key source.
    #[serde(default)]
    pub dataset: DatasetConfig,
    /// Per-connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Workload shape.
    #[serde(default)]
    pub workload: WorkloadConfig,
    /// Pool-size sweep grid.
    #[serde(default)]
    pub sweep: SweepConfig,
    /// Output locations.
    #[serde(default)]
    pub output: OutputConfig,
    /// File the configuration was loaded from, if any.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl BenchConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// Resolution order: `path`, then `CIPHERBENCH_CONFIG`, then
    /// `cipherbench.toml` when it exists. With none of those, defaults apply.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(resolved) = resolve_path(path)? else {
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        };
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config = Self::from_toml_str(content)?;
        config.source = Some(resolved);
        Ok(config)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dataset.validate()?;
        self.connection.validate()?;
        self.workload.validate()?;
        self.sweep.validate()?;
        self.output.validate()?;
        Ok(())
    }

    /// Picks the dataset path: `explicit` wins over `dataset.path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when neither is set.
    pub fn dataset_path(&self, explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| self.dataset.path.clone())
            .ok_or_else(|| ConfigError::Invalid("dataset path is required".to_string()))
    }

    /// Resolves the dataset key from `explicit` or the configured variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when no non-empty key is available.
    pub fn resolve_key(&self, explicit: Option<&str>) -> Result<SecretKey, ConfigError> {
        self.resolve_key_with(explicit, |name| env::var(name).ok())
    }

    /// Resolves the dataset key using `lookup` for environment access.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when no non-empty key is available.
    pub fn resolve_key_with(
        &self,
        explicit: Option<&str>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<SecretKey, ConfigError> {
        let value = match explicit {
            Some(value) => Some(value.to_string()),
            None => lookup(&self.dataset.key_env),
        };
        match value {
            Some(value) if !value.is_empty() => Ok(SecretKey::new(value)),
            _ => Err(ConfigError::Invalid(format!(
                "dataset key missing: pass --key or set {}",
                self.dataset.key_env
            ))),
        }
    }

    /// Builds the SQLCipher settings for one pool.
    #[must_use]
    pub fn sqlcipher_config(
        &self,
        path: &Path,
        key: SecretKey,
        sizing: PoolSizing,
    ) -> SqlcipherConfig {
        let mut config = SqlcipherConfig::new(path, key, sizing);
        config.kdf_iterations = self.connection.kdf_iterations;
        config.busy_timeout_ms = self.connection.busy_timeout_ms;
        config.connection_timeout_ms = self.connection.connection_timeout_ms;
        config.idle_timeout_ms = self.connection.idle_timeout_ms;
        config
    }
}

// ============================================================================
// SECTION: Dataset
// ============================================================================

/// Dataset location and key source.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetConfig {
    /// Source dataset file; may be supplied on the command line instead.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Environment variable holding the key.
    #[serde(default = "default_key_env")]
    pub key_env: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: None,
            key_env: default_key_env(),
        }
    }
}

impl DatasetConfig {
    /// Validates dataset configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("dataset.path", &path.to_string_lossy())?;
        }
        if self.key_env.is_empty() || self.key_env.len() > MAX_ENV_NAME_LENGTH {
            return Err(ConfigError::Invalid(
                "dataset.key_env must be 1-128 characters".to_string(),
            ));
        }
        if !self.key_env.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ConfigError::Invalid(
                "dataset.key_env must contain only ASCII letters, digits, and underscores"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Connection
// ============================================================================

/// Settings applied to every pooled connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    /// `PRAGMA kdf_iter` value.
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,
    /// Engine busy-wait timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Pool checkout timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    /// Idle connection reaping timeout in milliseconds.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            kdf_iterations: default_kdf_iterations(),
            busy_timeout_ms: default_busy_timeout_ms(),
            connection_timeout_ms: default_connection_timeout_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
        }
    }
}

impl ConnectionConfig {
    /// Validates connection configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.kdf_iterations == 0 {
            return Err(ConfigError::Invalid(
                "connection.kdf_iterations must be greater than zero".to_string(),
            ));
        }
        validate_timeout("connection.busy_timeout_ms", self.busy_timeout_ms)?;
        validate_timeout("connection.connection_timeout_ms", self.connection_timeout_ms)?;
        validate_timeout("connection.idle_timeout_ms", self.idle_timeout_ms)?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Workload
// ============================================================================

/// Workload shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkloadConfig {
    /// Concurrent reader tasks.
    #[serde(default = "default_readers")]
    pub readers: usize,
    /// Concurrent writer tasks.
    #[serde(default = "default_writers")]
    pub writers: usize,
    /// Reader start delay range.
    #[serde(default = "default_reader_jitter")]
    pub reader_jitter_ms: JitterRange,
    /// Writer start delay range.
    #[serde(default = "default_writer_jitter")]
    pub writer_jitter_ms: JitterRange,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            readers: default_readers(),
            writers: default_writers(),
            reader_jitter_ms: default_reader_jitter(),
            writer_jitter_ms: default_writer_jitter(),
        }
    }
}

impl WorkloadConfig {
    /// Validates workload configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let tasks = self.readers.saturating_add(self.writers);
        if tasks > MAX_TASKS {
            return Err(ConfigError::Invalid(format!(
                "workload readers + writers exceeds {MAX_TASKS}"
            )));
        }
        validate_jitter("workload.reader_jitter_ms", self.reader_jitter_ms)?;
        validate_jitter("workload.writer_jitter_ms", self.writer_jitter_ms)?;
        Ok(())
    }

    /// Converts to a workload plan.
    #[must_use]
    pub const fn plan(&self) -> WorkloadPlan {
        WorkloadPlan {
            readers: self.readers,
            writers: self.writers,
            reader_jitter: self.reader_jitter_ms,
            writer_jitter: self.writer_jitter_ms,
        }
    }
}

// ============================================================================
// SECTION: Sweep
// ============================================================================

/// One explicit sweep configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweepPair {
    /// Maximum live connections.
    pub max_open: u32,
    /// Maximum idle connections.
    pub max_idle: u32,
}

/// Pool-size sweep grid.
///
/// When `pairs` is empty the grid is generated: `max_open` walks from
/// `max_open_start` to `max_open_end` by `step`, and for each value `max_idle`
/// walks from 1 up to `max_open` by the same step.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    /// First `max_open` value.
    #[serde(default = "default_max_open_start")]
    pub max_open_start: u32,
    /// Last `max_open` value (inclusive).
    #[serde(default = "default_max_open_end")]
    pub max_open_end: u32,
    /// Increment for both axes.
    #[serde(default = "default_step")]
    pub step: u32,
    /// Explicit configurations overriding the generated grid.
    #[serde(default)]
    pub pairs: Vec<SweepPair>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            max_open_start: default_max_open_start(),
            max_open_end: default_max_open_end(),
            step: default_step(),
            pairs: Vec::new(),
        }
    }
}

impl SweepConfig {
    /// Validates sweep configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.pairs.len() > MAX_SWEEP_PAIRS {
            return Err(ConfigError::Invalid(format!("sweep.pairs exceeds {MAX_SWEEP_PAIRS}")));
        }
        for pair in &self.pairs {
            PoolSizing::new(pair.max_open, pair.max_idle)
                .map_err(|err| ConfigError::Invalid(format!("sweep.pairs: {err}")))?;
            if pair.max_open > MAX_POOL_SIZE {
                return Err(ConfigError::Invalid(format!(
                    "sweep.pairs: max_open exceeds {MAX_POOL_SIZE}"
                )));
            }
        }
        if !self.pairs.is_empty() {
            return Ok(());
        }
        if self.step == 0 {
            return Err(ConfigError::Invalid("sweep.step must be greater than zero".to_string()));
        }
        if self.max_open_start == 0 {
            return Err(ConfigError::Invalid(
                "sweep.max_open_start must be greater than zero".to_string(),
            ));
        }
        if self.max_open_start > self.max_open_end {
            return Err(ConfigError::Invalid(
                "sweep.max_open_start must not exceed sweep.max_open_end".to_string(),
            ));
        }
        if self.max_open_end > MAX_POOL_SIZE {
            return Err(ConfigError::Invalid(format!(
                "sweep.max_open_end exceeds {MAX_POOL_SIZE}"
            )));
        }
        Ok(())
    }

    /// Returns the configurations to run, in execution order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when an explicit pair is invalid.
    pub fn sizings(&self) -> Result<Vec<PoolSizing>, ConfigError> {
        if self.pairs.is_empty() {
            return Ok(sweep_grid(self.max_open_start, self.max_open_end, self.step));
        }
        self.pairs
            .iter()
            .map(|pair| {
                PoolSizing::new(pair.max_open, pair.max_idle)
                    .map_err(|err| ConfigError::Invalid(format!("sweep.pairs: {err}")))
            })
            .collect()
    }
}

/// Generates the sweep grid. Empty when `step` is zero or the range is empty.
#[must_use]
pub fn sweep_grid(max_open_start: u32, max_open_end: u32, step: u32) -> Vec<PoolSizing> {
    let Ok(step) = usize::try_from(step) else {
        return Vec::new();
    };
    if step == 0 {
        return Vec::new();
    }
    let mut grid = Vec::new();
    for max_open in (max_open_start.max(1) ..= max_open_end).step_by(step) {
        for max_idle in (1 ..= max_open).step_by(step) {
            if let Ok(sizing) = PoolSizing::new(max_open, max_idle) {
                grid.push(sizing);
            }
        }
    }
    grid
}

// ============================================================================
// SECTION: Output
// ============================================================================

/// Output locations.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Directory for sample logs and sweep summaries.
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    /// Optional JSON-lines event log; events go to stderr when unset.
    #[serde(default)]
    pub event_log: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            event_log: None,
        }
    }
}

impl OutputConfig {
    /// Validates output configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("output.dir", &self.dir.to_string_lossy())?;
        if let Some(path) = &self.event_log {
            validate_path_string("output.event_log", &path.to_string_lossy())?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default `key_env`.
fn default_key_env() -> String {
    DEFAULT_KEY_ENV.to_string()
}

/// Default `kdf_iterations`.
const fn default_kdf_iterations() -> u32 {
    DEFAULT_KDF_ITERATIONS
}

/// Default `busy_timeout_ms`.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Default `connection_timeout_ms`.
const fn default_connection_timeout_ms() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT_MS
}

/// Default `idle_timeout_ms`.
const fn default_idle_timeout_ms() -> u64 {
    DEFAULT_IDLE_TIMEOUT_MS
}

/// Default `readers`.
const fn default_readers() -> usize {
    DEFAULT_READERS
}

/// Default `writers`.
const fn default_writers() -> usize {
    DEFAULT_WRITERS
}

/// Default `reader_jitter`.
const fn default_reader_jitter() -> JitterRange {
    DEFAULT_READER_JITTER
}

/// Default `writer_jitter`.
const fn default_writer_jitter() -> JitterRange {
    DEFAULT_WRITER_JITTER
}

/// Default `max_open_start`.
const fn default_max_open_start() -> u32 {
    1
}

/// Default `max_open_end`.
const fn default_max_open_end() -> u32 {
    17
}

/// Default `step`.
const fn default_step() -> u32 {
    4
}

/// Default `output_dir`.
fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI, environment, or the default file.
fn resolve_path(path: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = path {
        return Ok(Some(path.to_path_buf()));
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(Some(PathBuf::from(env_path)));
    }
    let default = PathBuf::from(DEFAULT_CONFIG_NAME);
    Ok(default.is_file().then_some(default))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates a timeout is positive and bounded.
fn validate_timeout(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 || value > MAX_TIMEOUT_MS {
        return Err(ConfigError::Invalid(format!("{field} must be between 1 and {MAX_TIMEOUT_MS}")));
    }
    Ok(())
}

/// Validates a jitter range is ordered and bounded.
fn validate_jitter(field: &str, range: JitterRange) -> Result<(), ConfigError> {
    if !range.is_valid() {
        return Err(ConfigError::Invalid(format!("{field}: min_ms must not exceed max_ms")));
    }
    if range.max_ms > MAX_JITTER_MS {
        return Err(ConfigError::Invalid(format!("{field}: max_ms exceeds {MAX_JITTER_MS}")));
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
