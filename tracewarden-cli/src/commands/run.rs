//! `tracewarden run` command handler

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use tracewarden_core::config::TracewardenConfig;
use tracewarden_core::types::MonitorMode;
use tracewarden_monitor::{MonitorEngine, RuleSet, SessionConfig, SessionConfigBuilder};

use crate::cli::{ModeArg, RunArgs};
use crate::error::CliError;
use crate::output::OutputWriter;

/// Execute the `run` command.
///
/// The report is always written before a policy stop is turned into
/// [`CliError::PolicyStop`], so callers see both the findings and exit code 4.
pub async fn execute(
    args: RunArgs,
    config: &TracewardenConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let session = session_config(args, config)?;
    let rules = RuleSet::from_config(&config.rules).await?;
    info!(
        script = %session.script.display(),
        log = %session.log_path.display(),
        rules = rules.len(),
        "starting monitored run"
    );

    let engine = MonitorEngine::new(session, rules)?;
    let cancel = engine.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping the monitored script");
            cancel.cancel();
        }
    });

    let result = engine.run().await;
    interrupt.abort();
    let report = result?;

    writer.render(&report)?;

    if report.stop_cause.is_policy_stop() {
        return Err(CliError::PolicyStop(report.stop_cause.to_string()));
    }
    Ok(())
}

/// Resolve the session configuration: config file values, then command-line flags.
fn session_config(args: RunArgs, config: &TracewardenConfig) -> Result<SessionConfig, CliError> {
    let log_path = args
        .log_file
        .unwrap_or_else(|| default_log_path(&args.script));

    let mut builder =
        SessionConfigBuilder::from_config(SessionConfig::from_core(config, &args.script, log_path))
            .script_args(args.script_args);

    if let Some(mode) = args.mode {
        builder = builder.mode(monitor_mode(mode));
    }
    if args.terminate_on_high_risk {
        builder = builder.terminate_on_high_risk(true);
    }
    if args.audit || args.audit_feed.is_some() {
        builder = builder.audit_enabled(true);
    }
    if let Some(feed) = args.audit_feed {
        builder = builder.audit_feed_path(feed);
    }
    if let Some(interpreter) = args.interpreter {
        builder = builder.interpreter(interpreter);
    }

    Ok(builder.build()?)
}

fn monitor_mode(mode: ModeArg) -> MonitorMode {
    match mode {
        ModeArg::Once => MonitorMode::Once,
        ModeArg::Realtime => MonitorMode::Realtime,
    }
}

/// Per-run trace log in the temp directory, e.g. `/tmp/tracewarden-job-4242.log`.
fn default_log_path(script: &Path) -> PathBuf {
    let stem = script
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "script".to_owned());
    std::env::temp_dir().join(format!("tracewarden-{stem}-{}.log", std::process::id()))
}
