//! Rendering of extraction records.

use console::style;

use ticket_core::ExtractionRecord;
use ticket_core::ticket::total;

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// Plain text summary
    Text,
}

pub fn format_records(records: &[ExtractionRecord], format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(records)?),
        OutputFormat::Csv => format_csv(records),
        OutputFormat::Text => Ok(format_text(records)),
    }
}

fn format_csv(records: &[ExtractionRecord]) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record(["name", "date", "label", "amount", "status", "warnings", "error"])?;

    for record in records {
        let status = record.status().to_string();
        let warnings = record.warnings().join("; ");
        wtr.write_record([
            record.name(),
            record.date().unwrap_or_default(),
            record.label().unwrap_or_default(),
            record.amount().unwrap_or_default(),
            status.as_str(),
            warnings.as_str(),
            record.last_error().unwrap_or_default(),
        ])?;
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn format_text(records: &[ExtractionRecord]) -> String {
    let mut output = String::new();

    for record in records {
        let mark = if record.is_valid() {
            style("✓").green()
        } else {
            style("✗").red()
        };
        output.push_str(&format!("{} {}\n", mark, record));
        for warning in record.warnings() {
            output.push_str(&format!("    warning: {}\n", warning));
        }
        if let Some(error) = record.last_error() {
            output.push_str(&format!("    error: {}\n", error));
        }
        if !record.is_valid() {
            let fields: Vec<String> = record.invalid_fields().iter().map(|f| f.to_string()).collect();
            output.push_str(&format!("    to correct: {}\n", fields.join(", ")));
        }
    }

    let accepted = records.iter().filter(|r| r.is_valid()).count();
    output.push_str(&format!(
        "\n{} of {} receipt(s) readable, total {} EUR\n",
        accepted,
        records.len(),
        total(records)
    ));

    output
}
