// SoundMetrics - Batch soundscape metrics for WAV recordings
// Module declarations

use clap::Parser;
use std::process::ExitCode;

pub mod audio;
pub mod cli;
pub mod commands;
pub mod config;
pub mod metrics;
pub mod pipeline;

#[cfg(test)]
mod test_support;

pub use audio::{AudioSource, SignalLoader, Upload};
pub use commands::{ExtractionSummary, Session};
pub use config::ExtractionConfig;
pub use metrics::{BuiltinBackend, MetricComputer, MetricsBackend};
pub use pipeline::{BatchOutcome, BatchPipeline, ResultCache, ResultTable};

pub fn run() -> ExitCode {
    cli::execute(cli::Cli::parse())
}
