//! Batch processing command for many invoice files.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, warn};

use nfse_core::{IdStrategy, InvoiceRecord, NfseExtractor, RecordTotals};

use crate::input::{is_supported, load_documents};
use crate::output::{OutputFormat, dedup_records, format_records, write_summary};

use super::config::load_config;
use super::process::report_validation;

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Glob pattern matching .xml and .zip files
    #[arg(required = true)]
    input: String,

    /// Output directory (default: merged output on stdout)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for the merged records
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Also generate a summary CSV with a totals row
    #[arg(long)]
    summary: bool,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,

    /// Keep invoices that repeat the same number and provider
    #[arg(long)]
    keep_duplicates: bool,

    /// Synthesize reproducible ids instead of random ones
    #[arg(long)]
    deterministic_ids: bool,

    /// Validate extracted data
    #[arg(long)]
    validate: bool,
}

/// Result of processing a single input file.
struct FileResult {
    path: PathBuf,
    records: usize,
    error: Option<String>,
}

pub fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let config = load_config(config_path)?;
    let mut extractor = NfseExtractor::from_config(&config.extraction);
    if args.deterministic_ids {
        extractor = extractor.with_id_strategy(IdStrategy::Deterministic);
    }

    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| p.is_file() && is_supported(p))
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    eprintln!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    let mut results = Vec::with_capacity(files.len());
    let mut records: Vec<InvoiceRecord> = Vec::new();

    for path in files {
        match process_single_file(&path, &extractor, &config.input) {
            Ok(file_records) => {
                results.push(FileResult {
                    path,
                    records: file_records.len(),
                    error: None,
                });
                records.extend(file_records);
            }
            Err(e) => {
                let error_msg = e.to_string();
                if args.continue_on_error {
                    warn!("Failed to process {}: {}", path.display(), error_msg);
                    results.push(FileResult {
                        path,
                        records: 0,
                        error: Some(error_msg),
                    });
                } else {
                    pb.abandon();
                    error!("Failed to process {}: {}", path.display(), error_msg);
                    anyhow::bail!("Processing failed: {}", error_msg);
                }
            }
        }

        pb.inc(1);
    }

    pb.finish_and_clear();

    let extracted = records.len();
    let records = if args.keep_duplicates {
        records
    } else {
        let (kept, removed) = dedup_records(records);
        if removed > 0 {
            eprintln!(
                "{} Dropped {} duplicate invoice(s)",
                style("ℹ").blue(),
                removed
            );
        }
        kept
    };

    if args.validate {
        report_validation(&records);
    }

    let content = format_records(&records, args.format)?;
    match &args.output_dir {
        Some(output_dir) => {
            let output_path = output_dir.join(format!("invoices.{}", args.format.extension()));
            fs::write(&output_path, content)?;
            debug!("Wrote output to {}", output_path.display());
        }
        None => println!("{}", content),
    }

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &records)?;
        eprintln!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    print_report(&results, extracted, &records, start);

    Ok(())
}

fn process_single_file(
    path: &Path,
    extractor: &NfseExtractor,
    input: &nfse_core::InputConfig,
) -> anyhow::Result<Vec<InvoiceRecord>> {
    let mut records = Vec::new();

    for document in load_documents(path, input)? {
        let result = extractor
            .parse(&document.text)
            .map_err(|e| anyhow::anyhow!("{}: {}", document.name, e))?;

        for warning in &result.warnings {
            warn!("{}: {}", document.name, warning);
        }
        records.extend(result.records);
    }

    Ok(records)
}

fn print_report(results: &[FileResult], extracted: usize, records: &[InvoiceRecord], start: Instant) {
    let failed: Vec<_> = results.iter().filter(|r| r.error.is_some()).collect();
    let totals = RecordTotals::from_records(records);

    eprintln!();
    eprintln!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        results.len(),
        start.elapsed()
    );
    eprintln!(
        "   {} successful, {} failed",
        style(results.len() - failed.len()).green(),
        style(failed.len()).red()
    );
    eprintln!(
        "   {} invoices extracted, {} kept, total R$ {:.2}",
        extracted, totals.count, totals.valor_servicos
    );
    if totals.saturated {
        eprintln!(
            "   {} some totals exceeded the decimal range and were capped",
            style("⚠").yellow()
        );
    }

    for result in results.iter().filter(|r| r.error.is_none()) {
        debug!("{}: {} invoice(s)", result.path.display(), result.records);
    }

    if !failed.is_empty() {
        eprintln!();
        eprintln!("{}", style("Failed files:").red());
        for result in &failed {
            eprintln!(
                "  - {}: {}",
                result.path.display(),
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
}
