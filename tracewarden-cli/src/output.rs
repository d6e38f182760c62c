//! Output formatting abstraction for text vs JSON rendering
//!
//! All subcommand output flows through [`OutputWriter`] which handles format switching.
//! This keeps format-specific logic out of command handlers entirely.

use std::io::Write;

use colored::{ColoredString, Colorize};
use serde::Serialize;

use tracewarden_core::types::Severity;
use tracewarden_monitor::Report;

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Abstraction for writing CLI output in different formats.
///
/// Subcommand handlers call `writer.render(&payload)` where `payload`
/// implements both `Serialize` (for JSON) and `Render` (for text).
pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    /// Create a new output writer with the specified format.
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Render a payload to stdout.
    pub fn render<T: Render + Serialize>(&self, payload: &T) -> Result<(), CliError> {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        self.render_to(payload, &mut handle)?;
        handle.flush()?;
        Ok(())
    }

    /// Render a payload to an arbitrary writer.
    ///
    /// For `Text` format, delegates to `Render::render_text()`.
    /// For `Json` format, serialises via `serde_json`.
    pub fn render_to<T: Render + Serialize>(
        &self,
        payload: &T,
        w: &mut dyn Write,
    ) -> Result<(), CliError> {
        match self.format {
            OutputFormat::Text => payload.render_text(w)?,
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut *w, payload)?;
                writeln!(w)?;
            }
        }
        Ok(())
    }
}

/// Trait for human-readable text rendering.
///
/// Implemented by every CLI output payload alongside `serde::Serialize`.
pub trait Render {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()>;
}

/// Color a severity label for terminal output.
pub fn severity_colored(severity: Severity) -> ColoredString {
    let label = severity.to_string();
    match severity {
        Severity::Critical => label.red().bold(),
        Severity::High => label.red(),
        Severity::Medium => label.yellow(),
        Severity::Low => label.cyan(),
        Severity::Info => label.normal(),
    }
}

impl Render for Report {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "Session {}", self.session_id.to_string().bold())?;
        writeln!(w, "Script:   {}", self.script.display())?;
        writeln!(w, "Log:      {}", self.log_path.display())?;
        writeln!(w, "Mode:     {}", self.mode)?;
        match &self.exit {
            Some(exit) => writeln!(w, "Tracer:   {exit}")?,
            None => writeln!(w, "Tracer:   (offline analysis)")?,
        }
        let stop = self.stop_cause.to_string();
        if self.stop_cause.is_policy_stop() {
            writeln!(w, "Stopped:  {}", stop.red().bold())?;
        } else {
            writeln!(w, "Stopped:  {stop}")?;
        }
        writeln!(
            w,
            "Parsed:   {} lines, {} events, {} ignored, {} failures",
            self.parse_stats.lines,
            self.parse_stats.parsed,
            self.parse_stats.ignored,
            self.parse_stats.failures
        )?;
        writeln!(w)?;

        for (severity, findings) in self.groups() {
            writeln!(w, "=== {} ===", severity_colored(severity))?;
            if findings.is_empty() {
                writeln!(w, "none")?;
            }
            for finding in findings {
                writeln!(w, "{}", finding.message())?;
            }
        }

        if !self.notes.is_empty() {
            writeln!(w)?;
            writeln!(w, "{}", "Notes:".yellow())?;
            for note in &self.notes {
                writeln!(w, "  - {note}")?;
            }
        }
        Ok(())
    }
}
