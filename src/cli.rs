// Command-line front end
// Argument parsing, logging setup and output of extraction results

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::audio::Upload;
use crate::commands::{self, CommandError, ExtractionSummary, Session};
use crate::config::ExtractionConfig;

/// Batch soundscape metrics for WAV recordings
#[derive(Parser, Debug)]
#[command(name = "soundmetrics")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log filter (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compute metrics for a directory or a list of files
    Extract(ExtractArgs),

    /// Print the metric columns in export order
    ListMetrics,
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Directory scanned (non-recursively) for .wav files
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub dir: Option<PathBuf>,

    /// Individual files, read into memory like uploads
    #[arg(long, num_args = 1..)]
    pub file: Vec<PathBuf>,

    /// Write the result table as CSV
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Write a JSON report with the summary and the table
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// JSON config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Process sources on a worker pool
    #[arg(long)]
    pub parallel: bool,

    /// Worker count for --parallel
    #[arg(long)]
    pub workers: Option<usize>,

    /// Per-source time limit in seconds, also honored without --parallel
    #[arg(long)]
    pub timeout_secs: Option<f64>,

    /// Append a JSONL progress trace to this file
    #[arg(long)]
    pub trace: Option<PathBuf>,
}

impl ExtractArgs {
    /// Config file values with command-line overrides applied
    pub fn resolve_config(&self) -> Result<ExtractionConfig, CommandError> {
        let mut config = match &self.config {
            Some(path) => ExtractionConfig::from_json_file(path)?,
            None => ExtractionConfig::default(),
        };

        if self.parallel {
            config.batch.parallel = true;
        }
        if self.workers.is_some() {
            config.batch.workers = self.workers;
        }
        if self.timeout_secs.is_some() {
            config.batch.timeout_secs = self.timeout_secs;
        }
        if self.trace.is_some() {
            config.batch.trace_path = self.trace.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

fn read_uploads(files: &[PathBuf]) -> Result<Vec<Upload>, CommandError> {
    files
        .iter()
        .map(|path| {
            let data = std::fs::read(path)
                .map_err(|e| CommandError::from(format!("Failed to read {}: {}", path.display(), e)))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            Ok(Upload { name, data })
        })
        .collect()
}

fn print_summary(summary: &ExtractionSummary) {
    println!(
        "{} source(s): {} row(s), {} failure(s){}",
        summary.source_count,
        summary.row_count,
        summary.failure_count,
        if summary.from_cache { " (cached)" } else { "" }
    );
    for failure in &summary.failures {
        println!("  {}: {}", failure.source_name, failure.reason);
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), CommandError> {
    std::fs::write(path, bytes)
        .map_err(|e| CommandError::from(format!("Failed to write {}: {}", path.display(), e)))
}

fn run_extract(args: &ExtractArgs) -> Result<(), CommandError> {
    let session = Session::new(args.resolve_config()?)?;

    let summary = match &args.dir {
        Some(dir) => session.extract_directory(dir)?,
        None => session.extract_uploads(read_uploads(&args.file)?)?,
    };

    print_summary(&summary);

    let csv = commands::export_csv(&summary.outcome)?;
    match &args.output {
        Some(path) => {
            write_file(path, &csv)?;
            log::info!("Wrote {}", path.display());
        }
        None if args.json.is_none() => print!("{}", String::from_utf8_lossy(&csv)),
        None => {}
    }

    if let Some(path) = &args.json {
        write_file(path, summary.to_json_report()?.as_bytes())?;
        log::info!("Wrote {}", path.display());
    }

    Ok(())
}

/// Install the logger. `RUST_LOG` overrides the command-line level.
pub fn init_logging(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    let _ = env_logger::Builder::from_env(env).try_init();
}

fn dispatch(cli: &Cli) -> Result<(), CommandError> {
    match &cli.command {
        Command::Extract(args) => run_extract(args),
        Command::ListMetrics => {
            for name in commands::list_metrics() {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

pub fn execute(cli: Cli) -> ExitCode {
    init_logging(&cli.log_level);

    match dispatch(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e.message());
            eprintln!("error: {}", e.message());
            ExitCode::FAILURE
        }
    }
}
