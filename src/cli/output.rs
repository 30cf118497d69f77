//! Output formatting for fabric-preflight.
//!
//! Provides terminal and JSON output formatters.
//!
//! # Graceful Degradation
//!
//! - Non-TTY output: Color disabled via NO_COLOR or --no-color
//! - Checks that never finalized: shown as not executed
//! - Empty reports: Produces valid output with zero checks
//!
//! All formatters produce valid output for any PreflightReport input.

use crate::cli::args::OutputFormat;
use crate::engine::report::{PreflightReport, ReportEntry};
use crate::engine::result::{ResultStatus, Table};
use serde_json::{json, Value};

const RULE: &str = "--------------------------------------------------------------------------------";

/// Trait for output formatters
pub trait OutputFormatter {
    /// Format a preflight report into a string
    fn format(&self, report: &PreflightReport) -> String;
}

/// Terminal (human-readable) formatter
pub struct TerminalFormatter {
    color: bool,
}

impl TerminalFormatter {
    pub fn new(color: bool) -> Self {
        TerminalFormatter { color }
    }

    fn colorize(&self, text: &str, color_code: &str) -> String {
        if self.color {
            format!("\x1b[{}m{}\x1b[0m", color_code, text)
        } else {
            text.to_string()
        }
    }

    fn status(&self, status: ResultStatus) -> String {
        let code = match status {
            ResultStatus::Pass => "32",
            ResultStatus::NotApplicable => "90",
            ResultStatus::ManualReview | ResultStatus::PostUpgradeAction => "33",
            ResultStatus::FailOutage | ResultStatus::FailUpgrade | ResultStatus::Error => "31",
        };
        self.colorize(status.label(), code)
    }

    fn entry(&self, output: &mut String, index: usize, total: usize, entry: &ReportEntry) {
        let Some(result) = &entry.result else {
            output.push_str(&format!(
                "[Check {:>2}/{}] {} ... {}\n",
                index,
                total,
                entry.title,
                self.colorize("NOT EXECUTED", "90")
            ));
            return;
        };

        output.push_str(&format!(
            "[Check {:>2}/{}] {} ... {}\n",
            index,
            total,
            entry.title,
            self.status(result.status())
        ));
        if result.status() == ResultStatus::Pass {
            return;
        }
        if !result.message().is_empty() {
            output.push_str(&format!("  {}\n", result.message()));
        }
        render_table(output, result.table());
        render_table(output, result.unformatted_table());
        if !result.recommended_action().is_empty() {
            output.push_str(&format!("  Recommended Action: {}\n", result.recommended_action()));
        }
        if !result.doc_url().is_empty() {
            output.push_str(&format!("  Reference Document: {}\n", result.doc_url()));
        }
    }
}

impl OutputFormatter for TerminalFormatter {
    fn format(&self, report: &PreflightReport) -> String {
        let mut output = String::new();
        let meta = &report.metadata;

        output.push_str(RULE);
        output.push('\n');
        output.push_str("fabric-preflight pre-upgrade report\n");
        output.push_str(&format!("Current Version: {}\n", or_unknown(&meta.cversion)));
        output.push_str(&format!("Target Version: {}\n", or_unknown(&meta.tversion)));
        output.push_str(&format!("Started: {}\n", meta.datetime));
        output.push_str(RULE);
        output.push_str("\n\n");

        let total = report.entries.len();
        for (i, entry) in report.entries.iter().enumerate() {
            self.entry(&mut output, i + 1, total, entry);
        }

        output.push('\n');
        output.push_str(RULE);
        output.push('\n');
        output.push_str("SUMMARY\n");
        for status in ResultStatus::ALL {
            output.push_str(&format!(
                "  {:<30}: {}\n",
                status.label(),
                report.summary.count(status)
            ));
        }
        output.push_str(&format!("  {:<30}: {}\n", "TOTAL", report.summary.total));
        output.push_str(RULE);

        output
    }
}

/// JSON formatter
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        JsonFormatter { pretty }
    }

    fn table(table: &Table) -> Value {
        json!({
            "headers": table.headers(),
            "rows": table.rows(),
        })
    }

    fn entry(entry: &ReportEntry) -> Value {
        let result = match &entry.result {
            Some(result) => json!({
                "status": result.status().label(),
                "rule_status": result.status().rule_status(),
                "severity": result.status().severity(),
                "message": result.message(),
                "table": Self::table(result.table()),
                "unformatted_table": Self::table(result.unformatted_table()),
                "recommended_action": result.recommended_action(),
                "doc_url": result.doc_url(),
            }),
            None => json!({ "status": "not_executed" }),
        };
        json!({
            "id": entry.id,
            "title": entry.title,
            "data_source": entry.data_source.to_string(),
            "result": result,
        })
    }
}

impl OutputFormatter for JsonFormatter {
    fn format(&self, report: &PreflightReport) -> String {
        let document = json!({
            "metadata": report.metadata,
            "summary": report.summary.to_map(),
            "checks": report.entries.iter().map(Self::entry).collect::<Vec<_>>(),
        });
        let encoded = if self.pretty {
            serde_json::to_string_pretty(&document)
        } else {
            serde_json::to_string(&document)
        };
        // Encoding a Value built from strings and numbers cannot fail.
        encoded.unwrap_or_default()
    }
}

/// Get a formatter based on the output format
pub fn get_formatter(format: OutputFormat, no_color: bool) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Text => Box::new(TerminalFormatter::new(!no_color)),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
    }
}

fn or_unknown(text: &str) -> &str {
    if text.is_empty() {
        "unknown"
    } else {
        text
    }
}

fn render_table(output: &mut String, table: &Table) {
    if table.is_empty() {
        return;
    }
    let mut widths: Vec<usize> = table.headers().iter().map(|h| h.len()).collect();
    for row in table.rows() {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let line = |cells: &[String]| {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect();
        format!("  {}\n", padded.join("  ").trim_end())
    };
    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();

    output.push('\n');
    output.push_str(&line(table.headers()));
    output.push_str(&line(&separator));
    for row in table.rows() {
        output.push_str(&line(row));
    }
    output.push('\n');
}
