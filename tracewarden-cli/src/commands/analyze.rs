//! `tracewarden analyze` command handler

use tracing::info;

use tracewarden_core::config::TracewardenConfig;
use tracewarden_monitor::{MonitorEngine, RuleSet, SessionConfig, SessionConfigBuilder};

use crate::cli::AnalyzeArgs;
use crate::error::CliError;
use crate::output::OutputWriter;

/// Execute the `analyze` command.
///
/// Classifies a trace log recorded by an earlier run. Nothing is launched,
/// so the termination policy never applies.
pub async fn execute(
    args: AnalyzeArgs,
    config: &TracewardenConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let session = session_config(args, config)?;
    let rules = RuleSet::from_config(&config.rules).await?;
    info!(log = %session.log_path.display(), rules = rules.len(), "analyzing trace log");

    let engine = MonitorEngine::new(session, rules)?;
    let report = engine.analyze().await?;
    writer.render(&report)?;
    Ok(())
}

fn session_config(args: AnalyzeArgs, config: &TracewardenConfig) -> Result<SessionConfig, CliError> {
    let script = args.script.unwrap_or_default();
    let mut session = SessionConfig::from_core(config, script, args.log_file);
    // only a feed named on the command line is merged
    session.audit_feed_path = None;

    let mut builder = SessionConfigBuilder::from_config(session);
    if let Some(feed) = args.audit_feed {
        builder = builder.audit_enabled(true).audit_feed_path(feed);
    }
    Ok(builder.build()?)
}
