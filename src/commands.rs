// Extraction commands
// Session state plus the command entry points behind the CLI

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::audio::{self, AudioSource, SignalLoader, Upload};
use crate::config::ExtractionConfig;
use crate::metrics::{self, BuiltinBackend, MetricComputer, MetricsBackend};
use crate::pipeline::{
    BatchFailure, BatchOutcome, BatchPipeline, ParallelOptions, ResultCache, TraceWriter,
};

#[derive(Debug, Serialize)]
pub struct CommandError {
    message: String,
}

impl<E: std::fmt::Display> From<E> for CommandError {
    fn from(error: E) -> Self {
        CommandError {
            message: error.to_string(),
        }
    }
}

impl CommandError {
    pub fn message(&self) -> &str {
        &self.message
    }
}

type CommandResult<T> = Result<T, CommandError>;

/// What one extraction produced, ready for display or export
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionSummary {
    pub source_count: usize,
    pub row_count: usize,
    pub failure_count: usize,
    pub failures: Vec<BatchFailure>,
    pub cache_key: String,
    pub from_cache: bool,

    #[serde(skip)]
    pub outcome: Arc<BatchOutcome>,
}

#[derive(Serialize)]
struct ExtractionReport<'a> {
    #[serde(flatten)]
    summary: &'a ExtractionSummary,
    table: &'a crate::pipeline::ResultTable,
}

impl ExtractionSummary {
    /// Pretty JSON with the summary fields and the full result table
    pub fn to_json_report(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&ExtractionReport {
            summary: self,
            table: &self.outcome.table,
        })
    }
}

/// Long-lived extraction state: one pipeline, one cache, one config
pub struct Session {
    config: ExtractionConfig,
    pipeline: Arc<BatchPipeline>,
    cache: ResultCache,
    runtime: Option<tokio::runtime::Runtime>,
}

impl Session {
    /// Session using the built-in metrics backend
    pub fn new(config: ExtractionConfig) -> CommandResult<Self> {
        let backend = BuiltinBackend::new(config.level.clone(), config.spectral.clone());
        Self::with_backend(config, Arc::new(backend))
    }

    pub fn with_backend(
        config: ExtractionConfig,
        backend: Arc<dyn MetricsBackend>,
    ) -> CommandResult<Self> {
        config.validate()?;

        let mut loader = SignalLoader::wav();
        if let Some(dir) = &config.batch.staging_dir {
            loader = loader.with_staging_dir(dir);
        }

        let mut pipeline = BatchPipeline::new(loader, MetricComputer::new(backend));
        if let Some(path) = &config.batch.trace_path {
            pipeline = pipeline.with_trace(TraceWriter::new(path));
        }

        let mut cache = ResultCache::new();
        if let Some(capacity) = config.batch.cache_capacity {
            cache = cache.with_capacity(capacity);
        }

        // A time limit needs the runtime even when sources run one at a time
        let runtime = if config.batch.parallel || config.batch.timeout_secs.is_some() {
            Some(
                tokio::runtime::Builder::new_multi_thread()
                    .enable_time()
                    .build()?,
            )
        } else {
            None
        };

        log::info!(
            "Session ready ({} mode{})",
            if config.batch.parallel { "parallel" } else { "sequential" },
            match config.batch.timeout() {
                Some(limit) => format!(", {:?} per source", limit),
                None => String::new(),
            }
        );

        Ok(Session {
            config,
            pipeline: Arc::new(pipeline),
            cache,
            runtime,
        })
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Extract metrics for every `.wav` file directly inside `dir`
    pub fn extract_directory(&self, dir: &Path) -> CommandResult<ExtractionSummary> {
        let sources = audio::scan_directory(dir)?;
        Ok(self.extract(sources))
    }

    /// Extract metrics for uploaded buffers. Non-WAV names are skipped.
    pub fn extract_uploads(&self, uploads: Vec<Upload>) -> CommandResult<ExtractionSummary> {
        let sources = audio::sources_from_uploads(uploads)?;
        Ok(self.extract(sources))
    }

    /// Parallel sessions use the configured pool. A sequential session with a
    /// time limit runs on a single worker so sources still go one at a time.
    fn parallel_options(&self) -> ParallelOptions {
        ParallelOptions {
            workers: if self.config.batch.parallel {
                self.config.batch.workers
            } else {
                Some(1)
            },
            timeout: self.config.batch.timeout(),
        }
    }

    fn extract(&self, sources: Vec<AudioSource>) -> ExtractionSummary {
        let options = self.parallel_options();

        let lookup = self.cache.get_or_compute_with(&sources, |sources| match &self.runtime {
            Some(runtime) => runtime.block_on(
                Arc::clone(&self.pipeline).run_parallel(sources.to_vec(), &options),
            ),
            None => self.pipeline.run(sources),
        });

        if lookup.from_cache {
            log::info!("Reusing cached results for {} source(s)", sources.len());
        }

        ExtractionSummary {
            source_count: sources.len(),
            row_count: lookup.outcome.row_count(),
            failure_count: lookup.outcome.failure_count(),
            failures: lookup.outcome.failures.clone(),
            cache_key: lookup.key.to_string(),
            from_cache: lookup.from_cache,
            outcome: lookup.outcome,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Abandoned timed-out work must not keep the process alive
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Serialize a batch outcome's table as CSV bytes
pub fn export_csv(outcome: &BatchOutcome) -> CommandResult<Vec<u8>> {
    Ok(outcome.table.to_csv_bytes()?)
}

/// Names of all metrics the built-in backend produces, in column order
pub fn list_metrics() -> Vec<&'static str> {
    metrics::metric_names()
}
