//! CLI application for NFS-e XML extraction.

mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{batch, config, process};

/// NFS-e extractor - Turn municipal and national service invoices into uniform records
#[derive(Parser)]
#[command(name = "nfse")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract invoices from a single XML or ZIP file
    Process(process::ProcessArgs),

    /// Extract invoices from many files and merge the results
    Batch(batch::BatchArgs),

    /// Manage configuration
    Config(config::ConfigArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Process(args) => process::run(args, cli.config.as_deref()),
        Commands::Batch(args) => batch::run(args, cli.config.as_deref()),
        Commands::Config(args) => config::run(args, cli.config.as_deref()),
    }
}
