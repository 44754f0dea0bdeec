//! Output formatters for run reports
//!
//! Provides table, JSON, CSV and summary output formats.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

use crate::config::DEFAULT_ROUND_RUNTIME;
use crate::models::{OutcomeStatus, ResultAggregate, SuiteOutcome};
use crate::program::RunReport;

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Csv,
    Summary,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "csv" => Some(OutputFormat::Csv),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }
}

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
    precision: u32,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
            precision: DEFAULT_ROUND_RUNTIME,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    /// Decimal places for runtimes
    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = precision;
        self
    }

    fn runtime(&self, secs: f64) -> String {
        format!("{:.*}s", self.precision as usize, secs)
    }

    fn round(&self, secs: f64) -> f64 {
        let factor = 10f64.powi(self.precision as i32);
        (secs * factor).round() / factor
    }

    /// Copy of the report with every runtime rounded
    fn rounded(&self, report: &RunReport) -> RunReport {
        let round_outcome = |outcome: &SuiteOutcome| {
            let mut outcome = outcome.clone();
            outcome.duration_secs = self.round(outcome.duration_secs);
            for case in &mut outcome.cases {
                case.duration_secs = self.round(case.duration_secs);
            }
            outcome
        };

        let mut rounded = report.clone();
        rounded.scripts = report.scripts.iter().map(round_outcome).collect();
        rounded.aggregate = ResultAggregate::new();
        for outcome in report.aggregate.outcomes() {
            rounded.aggregate.insert(round_outcome(outcome));
        }
        rounded.summary.total_duration_secs = self.round(report.summary.total_duration_secs);
        rounded
    }

    pub fn format_report(&self, report: &RunReport) -> Result<String> {
        match self.format {
            OutputFormat::Table => Ok(self.format_table(report)),
            OutputFormat::Json => Ok(serde_json::to_string(&self.rounded(report))?),
            OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(&self.rounded(report))?),
            OutputFormat::Csv => self.format_csv(report),
            OutputFormat::Summary => Ok(self.format_brief(report)),
        }
    }

    fn status_label(&self, status: OutcomeStatus) -> String {
        let label = format!("{} {}", status.symbol(), status);
        if !self.colorize {
            return label;
        }
        let color = match status {
            OutcomeStatus::Pass => "32",
            OutcomeStatus::Skip => "33",
            OutcomeStatus::Fail | OutcomeStatus::Error => "31",
        };
        format!("\x1b[{color}m{label}\x1b[0m")
    }

    fn format_outcome(&self, outcome: &SuiteOutcome, output: &mut String) {
        output.push_str(&format!(
            "  {:28} {} [{}]\n",
            outcome.suite,
            self.status_label(outcome.status),
            self.runtime(outcome.duration_secs)
        ));
        for case in &outcome.cases {
            output.push_str(&format!(
                "      {:24} {} [{}]",
                case.case,
                self.status_label(case.status),
                self.runtime(case.duration_secs)
            ));
            if let Some(msg) = &case.message {
                output.push_str(&format!(" - {msg}"));
            }
            output.push('\n');
        }
        if let Some(tag) = &outcome.stopped_on {
            output.push_str(&format!("      ({tag})\n"));
        }
        if let Some(msg) = &outcome.message {
            output.push_str(&format!("      {msg}\n"));
        }
    }

    fn format_table(&self, report: &RunReport) -> String {
        let mut output = String::new();

        output.push_str("\n══════════════════════════════════════════════════════════════\n");
        output.push_str(&format!(" Program: {}\n", report.program));
        output.push_str("══════════════════════════════════════════════════════════════\n");

        if !report.scripts.is_empty() {
            output.push_str(" Scripts:\n");
            for outcome in &report.scripts {
                self.format_outcome(outcome, &mut output);
            }
        }

        output.push_str(" Suites:\n");
        for outcome in report.aggregate.outcomes() {
            self.format_outcome(outcome, &mut output);
        }

        let summary = &report.summary;
        output.push_str("──────────────────────────────────────────────────────────────\n");
        output.push_str(&format!(
            " Total: {} | Pass: {} | Fail: {} | Skip: {} | Error: {} | Cases: {}\n",
            summary.total, summary.passed, summary.failed, summary.skipped, summary.errors, summary.cases
        ));
        output.push_str(&format!(
            " Pass Rate: {:.1}% | Duration: {}\n",
            summary.pass_rate(),
            self.runtime(report.duration_secs())
        ));

        for note in &report.notes {
            output.push_str(&format!(" Note: {note}\n"));
        }

        output
    }

    fn write_csv<W: Write>(&self, report: &RunReport, writer: W) -> Result<W> {
        let mut writer = csv::Writer::from_writer(writer);

        writer.write_record([
            "kind",
            "suite",
            "case",
            "status",
            "duration_secs",
            "stopped_on",
            "message",
        ])?;

        let kinds = report
            .scripts
            .iter()
            .map(|o| ("script", o))
            .chain(report.aggregate.outcomes().map(|o| ("suite", o)));

        for (kind, outcome) in kinds {
            writer.write_record([
                kind.to_string(),
                outcome.suite.clone(),
                String::new(),
                outcome.status.to_string(),
                self.round(outcome.duration_secs).to_string(),
                outcome
                    .stopped_on
                    .as_ref()
                    .map(|t| t.phase.clone())
                    .unwrap_or_default(),
                outcome.message.clone().unwrap_or_default(),
            ])?;

            for case in &outcome.cases {
                writer.write_record([
                    "case".to_string(),
                    outcome.suite.clone(),
                    case.case.clone(),
                    case.status.to_string(),
                    self.round(case.duration_secs).to_string(),
                    String::new(),
                    case.message.clone().unwrap_or_default(),
                ])?;
            }
        }

        writer.flush()?;
        writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to finish CSV output: {}", e.error()))
    }

    fn format_csv(&self, report: &RunReport) -> Result<String> {
        let bytes = self.write_csv(report, Vec::new())?;
        Ok(String::from_utf8(bytes)?)
    }

    fn format_brief(&self, report: &RunReport) -> String {
        let summary = &report.summary;
        format!(
            "{}: {}/{} passed ({:.1}%), {} failed, {} errors in {}",
            report.program,
            summary.passed,
            summary.total,
            summary.pass_rate(),
            summary.failed,
            summary.errors,
            self.runtime(report.duration_secs())
        )
    }

    /// Write the formatted report to a file, creating parent directories
    pub fn write_to_file(&self, report: &RunReport, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;

        if self.format == OutputFormat::Csv {
            self.write_csv(report, file)?;
            return Ok(());
        }

        let mut file = file;
        file.write_all(self.format_report(report)?.as_bytes())?;
        Ok(())
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}
