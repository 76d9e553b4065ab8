//! Report rendering and exit status.
//!
//! The report is the only thing written to stdout; diagnostics go through
//! the logger on stderr so `-o json` output stays machine-readable.

use clap::ValueEnum;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use strum_macros::{Display, EnumString};

use crate::{CheckOutcome, CheckResult, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Success (0) only when every result is valid; anything else maps to the
/// configured failure code.
pub fn exit_code(results: &[CheckResult], failure_code: i32) -> i32 {
    if results.iter().all(CheckResult::is_valid) {
        0
    } else {
        failure_code
    }
}

pub fn render_table(results: &[CheckResult]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Host").add_attribute(Attribute::Bold),
        Cell::new("Status").add_attribute(Attribute::Bold),
        Cell::new("Days Left").add_attribute(Attribute::Bold),
        Cell::new("Valid Until").add_attribute(Attribute::Bold),
        Cell::new("Issuer").add_attribute(Attribute::Bold),
        Cell::new("Details").add_attribute(Attribute::Bold),
    ]);

    for result in results {
        let host = result.target.to_string();
        match &result.outcome {
            CheckOutcome::Certificate {
                certificate,
                cipher,
                days_remaining,
                status,
            } => {
                let issuer = if certificate.issuer.organization == "None" {
                    &certificate.issuer.common_name
                } else {
                    &certificate.issuer.organization
                };
                let mut details = format!("{} {}", cipher.version, cipher.name);
                if certificate.is_self_signed {
                    details.push_str(", self-signed");
                }
                table.add_row(vec![
                    Cell::new(host),
                    status_cell(*status),
                    Cell::new(days_remaining.to_string()),
                    Cell::new(&certificate.valid_to),
                    Cell::new(issuer),
                    Cell::new(details),
                ]);
            }
            CheckOutcome::Error { message } => {
                table.add_row(vec![
                    Cell::new(host),
                    status_cell(Status::Error),
                    Cell::new("-"),
                    Cell::new("-"),
                    Cell::new("-"),
                    Cell::new(message),
                ]);
            }
        }
    }

    table.to_string()
}

fn status_cell(status: Status) -> Cell {
    let color = match status {
        Status::Valid => Color::Green,
        Status::Warning => Color::Yellow,
        Status::Expired | Status::Error => Color::Red,
    };
    Cell::new(status.to_string()).fg(color)
}

pub fn render_json(results: &[CheckResult]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(results)
}

/// Writes the report to stdout in the requested format.
pub fn print_report(
    results: &[CheckResult],
    format: OutputFormat,
) -> Result<(), serde_json::Error> {
    match format {
        OutputFormat::Table => println!("{}", render_table(results)),
        OutputFormat::Json => println!("{}", render_json(results)?),
    }
    Ok(())
}
