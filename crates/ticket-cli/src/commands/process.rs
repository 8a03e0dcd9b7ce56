//! Process command - read a directory of receipt photos into the ledger.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::{style, Term};
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use ticket_core::ocr::transcribe_file;
use ticket_core::{
    ExtractionRecord, GoogleSheetsSink, ImagePreprocessor, LedgerError, LedgerSink, TesseractOcr,
    TicketBatch, TicketConfig, TicketReader,
};

use super::ledger::CsvLedger;
use super::output::{format_records, OutputFormat};
use super::{build_reader, config_path, load_config};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Receipts directory or glob pattern
    #[arg(required = true)]
    input: String,

    /// Write the extraction report to a file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Report format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Start with language-model extraction on for generic receipts
    #[arg(long)]
    fallback: bool,

    /// Skip the correction prompts
    #[arg(long)]
    no_interactive: bool,

    /// Record in this CSV file instead of the configured ledger
    #[arg(long)]
    ledger: Option<PathBuf>,

    /// Read and report only; record nothing
    #[arg(long)]
    dry_run: bool,

    /// Delete the photos of recorded receipts
    #[arg(long)]
    remove_processed: bool,
}

pub fn run(args: ProcessArgs, config: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(&config_path(config))?;

    let files = collect_images(&args.input)?;
    if files.is_empty() {
        anyhow::bail!("No receipt images found for: {}", args.input);
    }

    println!(
        "{} Found {} receipt(s) to read",
        style("ℹ").blue(),
        files.len()
    );

    let reader = build_reader(&config, args.fallback || config.fallback.enabled);
    let stage = ImagePreprocessor::from_config(&config.preprocess);
    let ocr = TesseractOcr::new(&config.ocr).with_retry(config.retry.clone());

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );

    let mut batch = TicketBatch::new();
    let mut sources = Vec::with_capacity(files.len());
    let mut failed = Vec::new();

    for path in files {
        let name = record_name(&path);
        pb.set_message(name.clone());

        match transcribe_file(&path, &stage, &ocr) {
            Ok(text) => {
                batch.push(reader.read(name.clone(), text));
                sources.push((name, path));
            }
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                failed.push((path, e.to_string()));
            }
        }

        pb.inc(1);
    }

    pb.finish_with_message("Done");

    let report = format_records(batch.records(), args.format)?;
    if let Some(output_path) = &args.output {
        fs::write(output_path, &report)?;
        println!(
            "{} Report written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", report);
    }

    if !failed.is_empty() {
        println!("{}", style("Unreadable files:").red());
        for (path, error) in &failed {
            println!("  - {}: {}", path.display(), error);
        }
    }

    if !args.no_interactive && !batch.correction_queue().is_empty() {
        correct_interactively(&mut batch, &reader)?;
    }

    debug!("Reading took {:?}", start.elapsed());

    if args.dry_run || batch.is_empty() {
        return Ok(());
    }

    let pending = batch.correction_queue().len();
    if pending > 0 {
        anyhow::bail!(
            "{} receipt(s) still need correction; nothing was recorded",
            pending
        );
    }

    println!(
        "{} {} receipt(s) ready to record",
        style("ℹ").blue(),
        batch.accepted().count()
    );

    let mut sink = open_ledger(&config, args.ledger.as_deref())?;
    let names: Vec<String> = batch.records().iter().map(|r| r.name().to_string()).collect();

    let committed = match batch.commit(&mut sink) {
        Ok(report) => {
            println!(
                "{} Recorded {} receipt(s) in rows {}-{}, total {} EUR",
                style("✓").green(),
                report.committed.len(),
                report.first_row,
                report.next_row - 1,
                ticket_core::ticket::total(&report.committed)
            );
            names
        }
        Err(LedgerError::Partial { committed, source }) => {
            eprintln!(
                "{} Recorded {} of {} receipt(s) before failing: {}",
                style("✗").red(),
                committed,
                names.len(),
                source
            );
            if args.remove_processed {
                remove_sources(&sources, &names[..committed]);
            }
            return Err(LedgerError::Partial { committed, source }.into());
        }
        Err(e) => return Err(e.into()),
    };

    if args.remove_processed {
        remove_sources(&sources, &committed);
    }

    Ok(())
}

fn record_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// Image files of a directory, or matches of a glob pattern, in name order.
fn collect_images(input: &str) -> anyhow::Result<Vec<PathBuf>> {
    let dir = Path::new(input);
    let mut files: Vec<PathBuf> = if dir.is_dir() {
        fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect()
    } else {
        glob(input)?.filter_map(|r| r.ok()).collect()
    };
    files.retain(|p| is_image(p));
    files.sort();
    Ok(files)
}

fn open_ledger(config: &TicketConfig, csv: Option<&Path>) -> anyhow::Result<Box<dyn LedgerSink>> {
    if let Some(path) = csv {
        info!("Recording in CSV ledger {}", path.display());
        return Ok(Box::new(CsvLedger::new(path)));
    }
    if config.sheet.spreadsheet_id.is_some() {
        info!("Recording in worksheet {}", config.sheet.worksheet);
        let sink = GoogleSheetsSink::from_config(&config.sheet, config.retry.clone())?;
        return Ok(Box::new(sink));
    }
    info!("Recording in CSV ledger {}", config.sheet.ledger_path.display());
    Ok(Box::new(CsvLedger::new(config.sheet.ledger_path.clone())))
}

fn remove_sources(sources: &[(String, PathBuf)], names: &[String]) {
    for (name, path) in sources {
        if !names.contains(name) {
            continue;
        }
        match fs::remove_file(path) {
            Ok(()) => debug!("Removed {}", path.display()),
            Err(e) => warn!("Could not remove {}: {}", path.display(), e),
        }
    }
}

/// Walk the correction queue until it is empty or the operator stops.
fn correct_interactively(batch: &mut TicketBatch, reader: &TicketReader) -> anyhow::Result<()> {
    let term = Term::stdout();
    if !term.is_term() {
        warn!("Not a terminal, skipping corrections");
        return Ok(());
    }

    loop {
        let queue = batch.correction_queue();
        let Some(&index) = queue.first() else {
            break;
        };
        let Some(record) = batch.get_mut(index) else {
            break;
        };

        term.write_line("")?;
        term.write_line(&format!(
            "{} {} ({} left)",
            style("Correct").yellow().bold(),
            record,
            queue.len()
        ))?;
        let fields: Vec<String> = record.invalid_fields().iter().map(|f| f.to_string()).collect();
        term.write_line(&format!("  invalid: {}", fields.join(", ")))?;
        for warning in record.warnings() {
            term.write_line(&format!("  warning: {}", warning))?;
        }
        if let Some(error) = record.last_error() {
            term.write_line(&format!("  error: {}", error))?;
        }

        let fallback = if record.uses_fallback() { "off" } else { "on" };
        term.write_str(&format!(
            "[e]dit  [f]allback {}  [r]efresh fallback  [s]kip  [q]uit > ",
            fallback
        ))?;

        let choice = term.read_line()?;
        let choice = choice.trim();
        if matches!(choice, "f" | "r") && !reader.has_fallback_service() {
            term.write_line("No language model configured, set the fallback API key first")?;
            continue;
        }

        match choice {
            "e" => edit_record(&term, record)?,
            "f" => {
                let enabled = !record.uses_fallback();
                batch.set_fallback_mode(reader, enabled);
            }
            "r" => reader.force_refresh_fallback(record),
            "s" => {
                if let Some(skipped) = batch.remove(index) {
                    info!("Skipped {}", skipped.name());
                }
            }
            "q" => break,
            other => term.write_line(&format!("Unknown choice: {}", other))?,
        }
    }

    Ok(())
}

/// Prompt for each field; Enter keeps the value, `-` clears it.
fn edit_record(term: &Term, record: &mut ExtractionRecord) -> anyhow::Result<()> {
    let mut draft = record.begin_correction();

    draft.date = prompt_field(term, "date (dd/mm/yyyy)", draft.date)?;
    draft.label = prompt_field(term, "label", draft.label)?;
    draft.amount = prompt_field(term, "amount", draft.amount)?;

    term.write_str("Apply? [Y/n] > ")?;
    if term.read_line()?.trim().eq_ignore_ascii_case("n") {
        term.write_line("Discarded")?;
        return Ok(());
    }

    let status = record.commit_correction(draft);
    term.write_line(&format!("{} -> {}", record, status))?;
    Ok(())
}

fn prompt_field(term: &Term, label: &str, current: Option<String>) -> anyhow::Result<Option<String>> {
    term.write_str(&format!(
        "  {} [{}]: ",
        label,
        current.as_deref().unwrap_or("")
    ))?;
    let input = term.read_line()?;
    Ok(match input.trim() {
        "" => current,
        "-" => None,
        value => Some(value.to_string()),
    })
}
