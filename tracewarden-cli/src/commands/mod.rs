//! Command handlers -- one module per subcommand

pub mod analyze;
pub mod config;
pub mod rules;
pub mod run;

use std::path::Path;

use tracing::debug;

use tracewarden_core::config::TracewardenConfig;

use crate::cli::DEFAULT_CONFIG_PATH;
use crate::error::CliError;

/// Load the effective configuration for a command.
///
/// A missing file at the default path falls back to defaults plus
/// environment overrides; an explicitly given path must exist.
pub async fn load_config(path: &Path) -> Result<TracewardenConfig, CliError> {
    if path == Path::new(DEFAULT_CONFIG_PATH) && !path.exists() {
        debug!(path = %path.display(), "no configuration file, using defaults");
        return Ok(TracewardenConfig::from_env()?);
    }
    Ok(TracewardenConfig::load(path).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_explicit_missing_config_is_an_error() {
        let err = load_config(Path::new("/nonexistent/tracewarden.toml"))
            .await
            .expect_err("explicit path must exist");
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_explicit_config_is_loaded() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("tw.toml");
        std::fs::write(&path, "[tracer]\ninterpreter = \"python3.12\"\n").expect("write config");

        let config = load_config(&path).await.expect("config should load");
        assert_eq!(config.tracer.interpreter, "python3.12");
    }
}
