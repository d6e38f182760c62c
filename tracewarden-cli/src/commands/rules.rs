//! `tracewarden rules` command handler

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use tracewarden_core::config::{RulesConfig, TracewardenConfig};
use tracewarden_monitor::rule::RuleStatus;
use tracewarden_monitor::{RuleLoader, RuleSet};

use crate::cli::{RulesAction, RulesArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render, severity_colored};

/// Execute the `rules` command.
pub async fn execute(
    args: RulesArgs,
    config: &TracewardenConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        RulesAction::List { rule_dir } => execute_list(config, rule_dir, writer).await,
        RulesAction::Validate { path } => execute_validate(&config.rules, &path, writer).await,
    }
}

async fn execute_list(
    config: &TracewardenConfig,
    rule_dir: Option<PathBuf>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let mut rules_config = config.rules.clone();
    if let Some(dir) = rule_dir {
        rules_config.rule_dir = dir.display().to_string();
    }

    let report = rule_list(&rules_config).await?;
    writer.render(&report)?;
    Ok(())
}

/// Build the effective rule table in evaluation order.
pub async fn rule_list(rules_config: &RulesConfig) -> Result<RuleListReport, CliError> {
    let builtin_count = RuleSet::builtin(rules_config)?.len();
    let set = RuleSet::from_config(rules_config).await?;
    info!(
        builtin = builtin_count,
        custom = set.len() - builtin_count,
        "loaded rule table"
    );

    let rules = set
        .rules()
        .iter()
        .enumerate()
        .map(|(index, rule)| RuleEntry {
            order: index + 1,
            id: rule.id.clone(),
            label: rule.label.clone(),
            severity: rule.severity.to_string(),
            source: rule
                .source
                .map(|s| s.as_label().to_owned())
                .unwrap_or_else(|| "any".to_owned()),
            status: match rule.status {
                RuleStatus::Enabled => "enabled".to_owned(),
                RuleStatus::Disabled => "disabled".to_owned(),
            },
            origin: if index < builtin_count {
                "builtin".to_owned()
            } else {
                "custom".to_owned()
            },
        })
        .collect::<Vec<_>>();

    Ok(RuleListReport {
        total: rules.len(),
        rules,
    })
}

async fn execute_validate(
    rules_config: &RulesConfig,
    path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %path.display(), "validating rule files");

    let report = validate_dir(rules_config, path).await?;
    writer.render(&report)?;

    if report.invalid > 0 {
        return Err(CliError::Rule(format!("{} invalid rule files", report.invalid)));
    }
    Ok(())
}

/// Validate every YAML file in `dir` as it would be appended to the builtin table.
///
/// Unlike loading for a run, every problem is reported instead of skipped:
/// parse errors, invalid conditions, bad regexes and ids that collide with
/// a builtin or an earlier file.
pub async fn validate_dir(
    rules_config: &RulesConfig,
    dir: &Path,
) -> Result<RuleValidationReport, CliError> {
    let files = yaml_files(dir).await?;
    let mut set = RuleSet::builtin(rules_config)?;
    let mut errors = Vec::new();

    for file in &files {
        let result = match RuleLoader::load_file(file).await {
            Ok(rule) => set.add_rule(rule),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            errors.push(RuleError {
                file: file.display().to_string(),
                error: e.to_string(),
            });
        }
    }

    Ok(RuleValidationReport {
        path: dir.display().to_string(),
        total_files: files.len(),
        valid: files.len() - errors.len(),
        invalid: errors.len(),
        errors,
    })
}

/// `.yml`/`.yaml` files of a directory, in the order they would be applied.
async fn yaml_files(dir: &Path) -> Result<Vec<PathBuf>, CliError> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
        CliError::Rule(format!("failed to read rule directory {}: {e}", dir.display()))
    })?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path
            .extension()
            .is_some_and(|ext| ext == "yml" || ext == "yaml")
        {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

#[derive(Serialize)]
pub struct RuleListReport {
    pub total: usize,
    pub rules: Vec<RuleEntry>,
}

#[derive(Serialize)]
pub struct RuleEntry {
    pub order: usize,
    pub id: String,
    pub label: String,
    pub severity: String,
    pub source: String,
    pub status: String,
    pub origin: String,
}

impl Render for RuleListReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "Classification Rules ({} total, first match wins)",
            self.total.to_string().bold()
        )?;
        writeln!(w)?;
        writeln!(
            w,
            "{:<4} {:<28} {:<10} {:<8} {:<9} {:<8} Label",
            "#", "ID", "Severity", "Source", "Status", "Origin"
        )?;
        writeln!(w, "{}", "-".repeat(100))?;

        for r in &self.rules {
            let status = match r.status.as_str() {
                "enabled" => r.status.green(),
                _ => r.status.yellow(),
            };
            let severity = tracewarden_core::types::Severity::from_str_loose(&r.severity)
                .map(|s| format!("{:<10}", severity_colored(s)))
                .unwrap_or_else(|| format!("{:<10}", r.severity));

            writeln!(
                w,
                "{:<4} {:<28} {} {:<8} {:<9} {:<8} {}",
                r.order, r.id, severity, r.source, status, r.origin, r.label
            )?;
        }

        Ok(())
    }
}

#[derive(Serialize)]
pub struct RuleValidationReport {
    pub path: String,
    pub total_files: usize,
    pub valid: usize,
    pub invalid: usize,
    pub errors: Vec<RuleError>,
}

#[derive(Serialize)]
pub struct RuleError {
    pub file: String,
    pub error: String,
}

impl Render for RuleValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Rule Validation: {}", self.path.bold())?;
        writeln!(
            w,
            "  Files: {} total, {} valid, {} invalid",
            self.total_files,
            self.valid.to_string().green(),
            if self.invalid > 0 {
                self.invalid.to_string().red()
            } else {
                self.invalid.to_string().normal()
            }
        )?;

        if !self.errors.is_empty() {
            writeln!(w)?;
            writeln!(w, "  Errors:")?;
            for err in &self.errors {
                writeln!(w, "    {}: {}", err.file.yellow(), err.error.red())?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NETWORK_RULE: &str = r#"
id: curl_download
label: "Download tool execution"
severity: High
source: tracer
name:
  exact: ["execve"]
args:
  - modifier: contains
    values: ["curl", "wget"]
"#;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).expect("write rule file");
    }

    #[tokio::test]
    async fn test_rule_list_builtin_only() {
        let report = rule_list(&RulesConfig::default()).await.expect("builtin rules load");
        assert!(report.total > 0);
        assert_eq!(report.rules[0].order, 1);
        assert!(report.rules.iter().all(|r| r.origin == "builtin"));
    }

    #[tokio::test]
    async fn test_rule_list_appends_custom_rules_last() {
        let dir = tempfile::tempdir().expect("temp dir");
        write(dir.path(), "10-curl.yml", NETWORK_RULE);

        let mut config = RulesConfig::default();
        config.rule_dir = dir.path().display().to_string();
        let report = rule_list(&config).await.expect("rules load");

        let last = report.rules.last().expect("at least one rule");
        assert_eq!(last.id, "curl_download");
        assert_eq!(last.origin, "custom");
        assert_eq!(last.severity, "High");
        assert_eq!(last.source, "tracer");
    }

    #[tokio::test]
    async fn test_validate_dir_reports_each_bad_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        write(dir.path(), "a-good.yml", NETWORK_RULE);
        write(dir.path(), "b-dup.yaml", NETWORK_RULE);
        write(dir.path(), "c-broken.yml", "id: [unterminated");
        write(dir.path(), "notes.txt", "ignored");

        let report = validate_dir(&RulesConfig::default(), dir.path())
            .await
            .expect("directory readable");
        assert_eq!(report.total_files, 3);
        assert_eq!(report.valid, 1);
        assert_eq!(report.invalid, 2);
        assert!(report.errors[0].file.ends_with("b-dup.yaml"));
        assert!(report.errors[0].error.contains("duplicate"));
        assert!(report.errors[1].file.ends_with("c-broken.yml"));
    }

    #[tokio::test]
    async fn test_validate_missing_dir_is_rule_error() {
        let err = validate_dir(&RulesConfig::default(), Path::new("/nonexistent/rules"))
            .await
            .err()
            .expect("missing directory should fail");
        assert!(matches!(err, CliError::Rule(_)));
    }

    #[test]
    fn test_validation_report_render_text() {
        colored::control::set_override(false);
        let report = RuleValidationReport {
            path: "/etc/tracewarden/rules".to_owned(),
            total_files: 2,
            valid: 1,
            invalid: 1,
            errors: vec![RuleError {
                file: "bad.yml".to_owned(),
                error: "rule load error".to_owned(),
            }],
        };
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).expect("render");
        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("Files: 2 total, 1 valid, 1 invalid"));
        assert!(output.contains("bad.yml: rule load error"));
    }
}
