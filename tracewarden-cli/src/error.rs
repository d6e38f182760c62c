//! CLI-specific error types and exit code mapping

use tracewarden_core::error::{MonitorError as CoreMonitorError, TracewardenError};
use tracewarden_monitor::MonitorError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// The tracer could not be launched or the runtime hook could not be registered.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The session was stopped by the high-risk termination policy.
    ///
    /// The report has already been written when this is returned.
    #[error("session stopped by policy: {0}")]
    PolicyStop(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Rule loading or validation error.
    #[error("rule error: {0}")]
    Rule(String),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                  |
    /// |------|------------------------------------------|
    /// | 0    | Success                                  |
    /// | 1    | General / command error                  |
    /// | 2    | Configuration error                      |
    /// | 3    | Tracer or runtime hook unavailable       |
    /// | 4    | Session stopped by the high-risk policy  |
    /// | 10   | IO error                                 |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Unavailable(_) => 3,
            Self::PolicyStop(_) => 4,
            Self::Io(_) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Rule(_) => 1,
        }
    }
}

impl From<TracewardenError> for CliError {
    fn from(e: TracewardenError) -> Self {
        match e {
            TracewardenError::Config(_) => Self::Config(e.to_string()),
            TracewardenError::Io(io) => Self::Io(io),
            TracewardenError::Monitor(
                CoreMonitorError::TracerUnavailable(_) | CoreMonitorError::HookRegistration(_),
            ) => Self::Unavailable(e.to_string()),
            TracewardenError::Monitor(CoreMonitorError::Rule(_)) => Self::Rule(e.to_string()),
            TracewardenError::Monitor(_) | TracewardenError::Parse(_) => {
                Self::Command(e.to_string())
            }
        }
    }
}

impl From<MonitorError> for CliError {
    fn from(e: MonitorError) -> Self {
        match e {
            MonitorError::Io(io) => Self::Io(io),
            MonitorError::Config { .. } => Self::Config(e.to_string()),
            MonitorError::TracerUnavailable { .. } | MonitorError::HookRegistration(_) => {
                Self::Unavailable(e.to_string())
            }
            MonitorError::RuleLoad { .. }
            | MonitorError::RuleValidation { .. }
            | MonitorError::Regex(_) => Self::Rule(e.to_string()),
            MonitorError::Parse { .. }
            | MonitorError::TerminationFailure { .. }
            | MonitorError::Channel(_) => Self::Command(e.to_string()),
        }
    }
}
