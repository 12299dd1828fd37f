//! qshconv CLI: convert QSH captures, inspect a capture, report the ledger.
//!
//! Commands:
//! - `convert`: convert every capture under a root into the chosen format
//! - `inspect`: print a capture's header, streams, frame count and time range
//! - `ledger status`: count converted files per storage format

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use qshconv_core::ledger::{ConversionLedger, DEFAULT_LEDGER_FILE};
use qshconv_core::qsh::{QshReader, ReadOutcome};
use qshconv_core::sink::StorageFormat;
use qshconv_runner::{run_from_config, ConvertConfig, RunSummary};

#[derive(Parser)]
#[command(name = "qshconv", about = "QScalp history (QSH) capture converter")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert every capture under the source root.
    Convert {
        /// TOML config file. Flags below override its values.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Root scanned recursively for *.qsh files.
        #[arg(long)]
        source: Option<PathBuf>,

        /// Output root.
        #[arg(long)]
        dest: Option<PathBuf>,

        /// Storage format: parquet or csv.
        #[arg(long)]
        format: Option<StorageFormat>,

        /// Worker threads.
        #[arg(long)]
        workers: Option<usize>,

        /// Instrument code, or PREFIX* to match a family.
        #[arg(long)]
        filter: Option<String>,

        /// Ledger of converted files.
        #[arg(long)]
        ledger: Option<PathBuf>,

        /// Write the run summary as JSON to this file.
        #[arg(long)]
        summary_json: Option<PathBuf>,
    },
    /// Print a capture's header, streams, frame count and time range.
    Inspect {
        file: PathBuf,
    },
    /// Ledger commands.
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },
}

#[derive(Subcommand)]
enum LedgerAction {
    /// Count converted files per storage format.
    Status {
        #[arg(long, default_value = DEFAULT_LEDGER_FILE)]
        ledger: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Convert {
            config,
            source,
            dest,
            format,
            workers,
            filter,
            ledger,
            summary_json,
        } => {
            let mut config = match (config, source, dest) {
                (Some(path), source, dest) => {
                    let mut config = ConvertConfig::from_file(&path)?;
                    if let Some(source) = source {
                        config.source_dir = source;
                    }
                    if let Some(dest) = dest {
                        config.dest_dir = dest;
                    }
                    config
                }
                (None, Some(source), Some(dest)) => ConvertConfig::new(source, dest),
                (None, _, _) => bail!("either --config or both --source and --dest are required"),
            };
            if let Some(format) = format {
                config.format = format;
            }
            if let Some(workers) = workers {
                config.workers = workers;
            }
            if filter.is_some() {
                config.instrument_filter = filter;
            }
            if let Some(ledger) = ledger {
                config.ledger_path = ledger;
            }
            run_convert(&config, summary_json.as_deref())
        }
        Commands::Inspect { file } => run_inspect(&file),
        Commands::Ledger { action } => match action {
            LedgerAction::Status { ledger } => run_ledger_status(&ledger),
        },
    }
}

fn run_convert(config: &ConvertConfig, summary_json: Option<&Path>) -> Result<()> {
    tracing::debug!(?config, "resolved configuration");
    let summary = run_from_config(config, None)?;
    print_summary(&summary);

    if let Some(path) = summary_json {
        summary
            .write_json(path)
            .with_context(|| format!("writing summary to {}", path.display()))?;
        println!("Summary saved to: {}", path.display());
    }

    if let Some(first) = summary.first_error() {
        eprintln!("Error for {}: {}", first.path.display(), first.error);
        std::process::exit(1);
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("Discovered:  {}", summary.files_discovered);
    println!("Converted:   {}", summary.converted);
    println!("Skipped:     {}", summary.skipped);
    println!("Cancelled:   {}", summary.cancelled);
    println!("Failed:      {}", summary.failed);
    if summary.unclaimed > 0 {
        println!("Unclaimed:   {}", summary.unclaimed);
    }
    if !summary.rejected.is_empty() {
        println!("Bad names:   {}", summary.rejected.len());
    }
    let m = &summary.messages;
    println!(
        "Messages:    {} (book {}, trades {}, order log {}, level1 {})",
        m.total(),
        m.order_book,
        m.trades,
        m.order_log,
        m.level1
    );
    println!("Elapsed:     {} ms", summary.elapsed_ms);
}

fn run_inspect(path: &Path) -> Result<()> {
    let mut reader = QshReader::<Infallible>::open(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let header = reader.header().clone();
    println!("File:        {}", path.display());
    println!("Version:     {}", header.version);
    println!("Application: {}", header.app_name);
    println!("Comment:     {}", header.comment);
    println!("Recorded:    {}", header.recorded_at);
    for (index, stream) in reader.streams().iter().enumerate() {
        match &stream.security {
            Some(security) => println!("Stream {index}:    {} {security}", stream.kind),
            None => println!("Stream {index}:    {}", stream.kind),
        }
    }

    let mut first = None;
    let mut last = None;
    loop {
        match reader.read_next(false) {
            Ok(ReadOutcome::Tick(time)) => {
                first.get_or_insert(time);
                last = Some(time);
            }
            Ok(ReadOutcome::EndOfFile) => break,
            Err(e) => bail!("{}: {e} after {} frames", path.display(), reader.frames_read()),
        }
    }

    println!("Frames:      {}", reader.frames_read());
    match (first, last) {
        (Some(first), Some(last)) => println!("Time range:  {first} .. {last}"),
        _ => println!("Time range:  (no frames)"),
    }
    Ok(())
}

fn run_ledger_status(path: &Path) -> Result<()> {
    if !path.exists() {
        println!("Ledger does not exist: {}", path.display());
        return Ok(());
    }
    let ledger = ConversionLedger::open(path)?;

    let mut per_format: BTreeMap<String, usize> = BTreeMap::new();
    for key in ledger.keys() {
        let format = key
            .split_once('_')
            .map(|(prefix, _)| prefix)
            .filter(|prefix| prefix.parse::<StorageFormat>().is_ok())
            .unwrap_or("unknown");
        *per_format.entry(format.to_string()).or_default() += 1;
    }

    println!("Ledger:      {}", path.display());
    println!("Entries:     {}", ledger.len());
    for (format, count) in &per_format {
        println!("  {format:<10} {count}");
    }
    Ok(())
}
