//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Default configuration file, used only if it exists.
pub const DEFAULT_CONFIG_PATH: &str = "tracewarden.toml";

/// Tracewarden -- run a script under a syscall tracer and report risky behavior.
///
/// Use `tracewarden <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "tracewarden", version, about, long_about = None)]
pub struct Cli {
    /// Path to the tracewarden.toml configuration file.
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a script under the tracer and report findings.
    Run(RunArgs),

    /// Classify an existing trace log without running anything.
    Analyze(AnalyzeArgs),

    /// Manage classification rules.
    Rules(RulesArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

/// Monitoring mode selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Classify after the target exits.
    Once,
    /// Classify while the target runs.
    Realtime,
}

// ---- run ----

/// Run a script under the tracer.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Script to execute.
    pub script: PathBuf,

    /// Arguments passed through to the script (after `--`).
    #[arg(last = true)]
    pub script_args: Vec<String>,

    /// Trace log path (default: `<script>.trace.log` in the temp directory).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Monitoring mode (overrides `[monitor] mode`).
    #[arg(long)]
    pub mode: Option<ModeArg>,

    /// Terminate the process tree on the first High or Critical finding.
    #[arg(long)]
    pub terminate_on_high_risk: bool,

    /// Enable the runtime audit hook.
    #[arg(long)]
    pub audit: bool,

    /// File the instrumented runtime writes audit records to (implies --audit).
    #[arg(long)]
    pub audit_feed: Option<PathBuf>,

    /// Interpreter used to launch the script (overrides `[tracer] interpreter`).
    #[arg(long)]
    pub interpreter: Option<String>,
}

// ---- analyze ----

/// Classify a recorded trace log.
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Trace log produced by an earlier run.
    pub log_file: PathBuf,

    /// Script the log was recorded for; its launch exec is not classified.
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// Audit records to merge into the trace by timestamp.
    #[arg(long)]
    pub audit_feed: Option<PathBuf>,
}

// ---- rules ----

/// Manage classification rules.
#[derive(Args, Debug)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub action: RulesAction,
}

#[derive(Subcommand, Debug)]
pub enum RulesAction {
    /// List the effective rule table in evaluation order.
    List {
        /// Directory of custom YAML rules (overrides `[rules] rule_dir`).
        #[arg(long)]
        rule_dir: Option<PathBuf>,
    },
    /// Validate rule files without running anything.
    Validate {
        /// Directory containing YAML rule files.
        path: PathBuf,
    },
}

// ---- config ----

/// Manage tracewarden configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, tracer, monitor, rules).
        #[arg(long)]
        section: Option<String>,
    },
}
