//! Extract command - read fields from an OCR transcript.

use std::fs;
use std::path::PathBuf;

use clap::Args;
use console::style;
use tracing::info;

use super::output::{format_records, OutputFormat};
use super::{build_reader, config_path, load_config};

/// Arguments for the extract command.
#[derive(Args)]
pub struct ExtractArgs {
    /// Transcript text file
    #[arg(required = true)]
    input: PathBuf,

    /// Record name (default: the file name)
    #[arg(short, long)]
    name: Option<String>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Ask the language model for the fields
    #[arg(long)]
    fallback: bool,
}

pub fn run(args: ExtractArgs, config: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(&config_path(config))?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }
    let transcript = fs::read_to_string(&args.input)?;

    let name = args.name.clone().unwrap_or_else(|| {
        args.input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "transcript".to_string())
    });

    let reader = build_reader(&config, args.fallback || config.fallback.enabled);
    let record = reader.read(name, transcript);
    info!("{}", record);

    let output = format_records(std::slice::from_ref(&record), args.format)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    Ok(())
}
