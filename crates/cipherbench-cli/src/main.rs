// crates/cipherbench-cli/src/main.rs
// ============================================================================
// Module: cipherbench CLI Entry Point
// Description: Command dispatcher for dataset provisioning, runs, and sweeps.
// Purpose: Provide a localized CLI over the encrypted-pool benchmark.
// Dependencies: clap, cipherbench-config, cipherbench-core, cipherbench-store-sqlcipher,
//               serde_json, thiserror.
// ============================================================================

//! ## Overview
//! `cipherbench` provisions encrypted datasets, runs one workload against a
//! disposable copy, sweeps a grid of pool sizings, and summarizes sample
//! logs. All user-facing strings are routed through the message catalog.
//! The dataset key is never echoed; events go to stderr as JSON lines unless
//! `output.event_log` names a file.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use cipherbench_cli::sweep::SweepDriver;
use cipherbench_cli::t;
use cipherbench_config::BenchConfig;
use cipherbench_core::BenchEventSink;
use cipherbench_core::FileEventSink;
use cipherbench_core::PoolSizing;
use cipherbench_core::SecretKey;
use cipherbench_core::StderrEventSink;
use cipherbench_core::parse_sample_log;
use cipherbench_core::summarize;
use cipherbench_store_sqlcipher::DatasetSeed;
use cipherbench_store_sqlcipher::provision_dataset;
use clap::ArgAction;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of a sample log accepted by `report`.
const MAX_SAMPLE_LOG_BYTES: u64 = 256 * 1024 * 1024;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "cipherbench", version, disable_help_subcommand = true)]
struct Cli {
    /// Config file path (defaults to `CIPHERBENCH_CONFIG`, then cipherbench.toml).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Dataset key (defaults to the variable named by `dataset.key_env`).
    #[arg(long, value_name = "KEY", global = true)]
    key: Option<String>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new encrypted dataset with the message table.
    Provision(ProvisionCommand),
    /// Run one workload against a disposable copy of the dataset.
    Run(RunCommand),
    /// Run the workload across the configured pool-size grid.
    Sweep(SweepCommand),
    /// Summarize a latency sample log.
    Report(ReportCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Arguments for the `provision` command.
#[derive(Args, Debug)]
struct ProvisionCommand {
    /// Dataset file to create (overrides `dataset.path`).
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,
    /// Seed rows with the seen flag cleared.
    #[arg(long, value_name = "N", default_value_t = 0)]
    unseen: u32,
    /// Seed rows with the seen flag set.
    #[arg(long, value_name = "N", default_value_t = 0)]
    seen: u32,
}

/// Arguments for the `run` command.
#[derive(Args, Debug)]
struct RunCommand {
    /// Source dataset (overrides `dataset.path`).
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,
    /// Maximum live connections.
    #[arg(long, value_name = "N")]
    max_open: u32,
    /// Maximum idle connections.
    #[arg(long, value_name = "N")]
    max_idle: u32,
}

/// Arguments for the `sweep` command.
#[derive(Args, Debug)]
struct SweepCommand {
    /// Source dataset (overrides `dataset.path`).
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,
}

/// Arguments for the `report` command.
#[derive(Args, Debug)]
struct ReportCommand {
    /// Sample log to summarize.
    #[arg(value_name = "LOG")]
    log: PathBuf,
    /// Emit the summary as JSON.
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate a cipherbench configuration file.
    Validate,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for localized error messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`] from a localized message.
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let key = cli.key.as_deref();
    match cli.command {
        Commands::Provision(command) => command_provision(&config, key, &command),
        Commands::Run(command) => command_run(config, key, &command),
        Commands::Sweep(command) => command_sweep(config, key, &command),
        Commands::Report(command) => command_report(&command),
        Commands::Config {
            command: ConfigCommand::Validate,
        } => command_config_validate(&config),
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Creates a new dataset.
fn command_provision(
    config: &BenchConfig,
    key: Option<&str>,
    command: &ProvisionCommand,
) -> CliResult<ExitCode> {
    let path = dataset_path(config, command.db.as_deref())?;
    let key = resolve_key(config, key)?;
    let seed = DatasetSeed {
        unseen: command.unseen,
        seen: command.seen,
    };
    provision_dataset(&path, &key, config.connection.kdf_iterations, seed).map_err(|err| {
        CliError::new(t!("provision.failed", path = path.display(), error = err))
    })?;
    write_stdout_line(&t!(
        "provision.ok",
        path = path.display(),
        unseen = seed.unseen,
        seen = seed.seen
    ))
    .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Runs one trial with the requested sizing.
fn command_run(
    config: BenchConfig,
    key: Option<&str>,
    command: &RunCommand,
) -> CliResult<ExitCode> {
    let sizing = PoolSizing::new(command.max_open, command.max_idle)
        .map_err(|err| CliError::new(t!("sizing.invalid", error = err)))?;
    let driver = build_driver(config, key, command.db.as_deref())?;
    let outcome = driver.run_trial(sizing).map_err(|err| {
        CliError::new(t!("run.failed", label = sizing.label(), error = err))
    })?;
    let path =
        outcome.sample_log.as_deref().map_or_else(String::new, |path| path.display().to_string());
    write_stdout_line(&t!(
        "run.ok",
        label = sizing.label(),
        elapsed_ms = outcome.report.elapsed_ms(),
        reads = outcome.report.reads,
        writes = outcome.report.writes,
        path = path
    ))
    .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Runs the configured sweep grid.
fn command_sweep(
    config: BenchConfig,
    key: Option<&str>,
    command: &SweepCommand,
) -> CliResult<ExitCode> {
    let sizings = config
        .sweep
        .sizings()
        .map_err(|err| CliError::new(t!("config.load_failed", error = err)))?;
    let driver = build_driver(config, key, command.db.as_deref())?;
    let mut output_failure = None;
    let report = driver
        .run(&sizings, |outcome| {
            let line = t!(
                "sweep.trial",
                max_open = outcome.sizing.max_open(),
                max_idle = outcome.sizing.max_idle(),
                elapsed_ms = outcome.report.elapsed_ms()
            );
            if let Err(err) = write_stdout_line(&line)
                && output_failure.is_none()
            {
                output_failure = Some(err);
            }
        })
        .map_err(|err| CliError::new(t!("sweep.failed", error = err)))?;
    if let Some(err) = output_failure {
        return Err(CliError::new(output_error("stdout", &err)));
    }
    if report.summary_write_failures > 0 {
        write_stderr_line(&t!("sweep.summary_write_failed", count = report.summary_write_failures))
            .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    }
    let path =
        report.summary_path.as_deref().map_or_else(String::new, |path| path.display().to_string());
    write_stdout_line(&t!("sweep.ok", count = report.trials.len(), path = path))
        .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Prints per-operation latency summaries for a sample log.
fn command_report(command: &ReportCommand) -> CliResult<ExitCode> {
    let path = &command.log;
    let read_error = |error: String| {
        CliError::new(t!("report.read_failed", path = path.display(), error = error))
    };
    let metadata = fs::metadata(path).map_err(|err| read_error(err.to_string()))?;
    if metadata.len() > MAX_SAMPLE_LOG_BYTES {
        return Err(read_error(format!("file exceeds {MAX_SAMPLE_LOG_BYTES} bytes")));
    }
    let content = fs::read_to_string(path).map_err(|err| read_error(err.to_string()))?;
    let records = parse_sample_log(&content).map_err(|err| {
        CliError::new(t!("report.parse_failed", path = path.display(), error = err))
    })?;
    let summaries = summarize(&records);

    if command.json {
        let payload = serde_json::to_string_pretty(&summaries)
            .map_err(|err| CliError::new(t!("report.json_failed", error = err)))?;
        write_stdout_line(&payload).map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }
    if summaries.is_empty() {
        write_stdout_line(&t!("report.empty", path = path.display()))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }
    write_stdout_line(&t!("report.header", path = path.display()))
        .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    for summary in &summaries {
        write_stdout_line(&t!(
            "report.entry",
            operation = summary.operation,
            count = summary.count,
            mean = summary.mean_us,
            p50 = summary.p50_us,
            p95 = summary.p95_us,
            p99 = summary.p99_us,
            max = summary.max_us
        ))
        .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Reports on a configuration that already loaded and validated.
fn command_config_validate(config: &BenchConfig) -> CliResult<ExitCode> {
    let message = config.source.as_deref().map_or_else(
        || t!("config.validate.defaults"),
        |source| t!("config.validate.ok", source = source.display()),
    );
    write_stdout_line(&message).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Loads configuration using the default resolution rules.
fn load_config(path: Option<&Path>) -> CliResult<BenchConfig> {
    BenchConfig::load(path).map_err(|err| CliError::new(t!("config.load_failed", error = err)))
}

/// Resolves the dataset path from flags and configuration.
fn dataset_path(config: &BenchConfig, explicit: Option<&Path>) -> CliResult<PathBuf> {
    config
        .dataset_path(explicit)
        .map_err(|err| CliError::new(t!("dataset.resolve_failed", error = err)))
}

/// Resolves the dataset key from flags and the environment.
fn resolve_key(config: &BenchConfig, explicit: Option<&str>) -> CliResult<SecretKey> {
    config.resolve_key(explicit).map_err(|err| CliError::new(t!("key.resolve_failed", error = err)))
}

/// Opens the configured event sink.
fn event_sink(config: &BenchConfig) -> CliResult<Arc<dyn BenchEventSink>> {
    let Some(path) = &config.output.event_log else {
        return Ok(Arc::new(StderrEventSink));
    };
    let open_error = |err: std::io::Error| {
        CliError::new(t!("events.open_failed", path = path.display(), error = err))
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(open_error)?;
    }
    let sink = FileEventSink::new(path).map_err(open_error)?;
    Ok(Arc::new(sink))
}

/// Builds a sweep driver bound to the resolved dataset, key, and sink.
fn build_driver(
    config: BenchConfig,
    key: Option<&str>,
    explicit: Option<&Path>,
) -> CliResult<SweepDriver> {
    let source = dataset_path(&config, explicit)?;
    let key = resolve_key(&config, key)?;
    let events = event_sink(&config)?;
    Ok(SweepDriver::new(config, source, key, events))
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats a localized output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    let stream_label = match stream {
        "stdout" => t!("output.stream.stdout"),
        "stderr" => t!("output.stream.stderr"),
        _ => t!("output.stream.unknown"),
    };
    t!("output.write_failed", stream = stream_label, error = error)
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
