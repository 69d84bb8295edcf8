//! ghusage CLI - GitHub Actions billable usage reports

use anyhow::Result;
use clap::{Parser, Subcommand};

mod report;

#[derive(Parser)]
#[command(name = "ghusage")]
#[command(about = "GitHub Actions billable usage reports", long_about = None)]
#[command(version)]
struct Cli {
    /// Run in verbose mode
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect usage for an organization and write it as CSV
    Report(report::ReportArgs),
    /// Version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so that `--output -` keeps stdout for CSV
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Version => {
            println!("ghusage {}", env!("CARGO_PKG_VERSION"));
            println!("ghusage-core {}", ghusage_core::VERSION);
        }
        Commands::Report(args) => report::run(args).await?,
    }

    Ok(())
}
