//! Process command - extract invoices from a single XML or ZIP file.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use console::style;
use tracing::{info, warn};

use nfse_core::{IdStrategy, InvoiceRecord, NfseExtractor};

use crate::input::load_documents;
use crate::output::{OutputFormat, format_records};

use super::config::load_config;

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input file (.xml or .zip)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Synthesize reproducible ids instead of random ones
    #[arg(long)]
    deterministic_ids: bool,

    /// Validate extracted data
    #[arg(long)]
    validate: bool,
}

pub fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let config = load_config(config_path)?;
    let mut extractor = NfseExtractor::from_config(&config.extraction);
    if args.deterministic_ids {
        extractor = extractor.with_id_strategy(IdStrategy::Deterministic);
    }

    info!("Processing file: {}", args.input.display());

    let documents = load_documents(&args.input, &config.input)?;
    if documents.is_empty() {
        anyhow::bail!("No XML documents found in {}", args.input.display());
    }

    let mut records: Vec<InvoiceRecord> = Vec::new();
    for document in &documents {
        let result = extractor
            .parse(&document.text)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", document.name, e))?;

        info!(
            "{}: {} invoice(s), {} layout, {}ms",
            document.name,
            result.records.len(),
            result.dialect.display(),
            result.processing_time_ms
        );
        for warning in &result.warnings {
            warn!("{}: {}", document.name, warning);
        }

        records.extend(result.records);
    }

    if args.validate {
        report_validation(&records);
    }

    let output = format_records(&records, args.format)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} {} invoice(s) written to {} in {:?}",
            style("✓").green(),
            records.len(),
            output_path.display(),
            start.elapsed()
        );
    } else {
        println!("{}", output);
    }

    Ok(())
}

pub(crate) fn report_validation(records: &[InvoiceRecord]) {
    for record in records {
        let issues = record.validate();
        if issues.is_empty() {
            continue;
        }

        eprintln!(
            "{} {}",
            style("Validation issues for invoice").yellow(),
            record.numero
        );
        for issue in &issues {
            eprintln!("  - {}", issue);
        }
    }
}
