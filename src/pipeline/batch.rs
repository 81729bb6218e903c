// Batch pipeline
// Load and measure each source in order, isolating per-source failures

use serde::Serialize;
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::audio::{AudioSource, DecodeError, SignalLoader};
use crate::metrics::{MetricComputer, MetricError};
use crate::pipeline::table::{MetricRecord, ResultTable};
use crate::pipeline::trace::{TraceBuilder, TraceWriter};

/// Why one source produced no row
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Metric computation failed: {0}")]
    Metric(#[from] MetricError),
}

impl SourceError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SourceError::Decode(_) => FailureKind::Decode,
            SourceError::Metric(_) => FailureKind::MetricComputation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Decode,
    MetricComputation,
    Timeout,
    Panicked,
}

/// A source that was skipped, with the reason
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchFailure {
    /// Position of the source in the batch input
    pub index: usize,
    pub source_name: String,
    pub kind: FailureKind,
    pub reason: String,
}

/// Everything a batch produced: the table of successes and the list of failures
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub table: ResultTable,
    pub failures: Vec<BatchFailure>,
}

impl BatchOutcome {
    pub fn row_count(&self) -> usize {
        self.table.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Worker pool settings for `run_parallel`
#[derive(Debug, Clone, Default)]
pub struct ParallelOptions {
    /// Maximum concurrent sources (None = available parallelism)
    pub workers: Option<usize>,

    /// Per-source time limit, counted from when the source gets a worker
    pub timeout: Option<Duration>,
}

impl ParallelOptions {
    /// Effective pool size, clamped to what the semaphore can hold
    pub fn worker_count(&self) -> usize {
        self.workers
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .clamp(1, Semaphore::MAX_PERMITS)
    }
}

/// Result for one source, tagged with its input position
struct SourceReport {
    index: usize,
    result: Result<MetricRecord, (FailureKind, String)>,
    elapsed_ms: f64,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}

/// Sequential and parallel batch execution over one loader and one computer
pub struct BatchPipeline {
    loader: SignalLoader,
    computer: MetricComputer,
    trace: Option<TraceWriter>,
}

impl BatchPipeline {
    pub fn new(loader: SignalLoader, computer: MetricComputer) -> Self {
        BatchPipeline {
            loader,
            computer,
            trace: None,
        }
    }

    /// Append a JSONL progress trace of every run to `writer`
    pub fn with_trace(mut self, writer: TraceWriter) -> Self {
        self.trace = Some(writer);
        self
    }

    /// Load and measure a single source
    pub fn process_source(&self, source: &AudioSource) -> Result<MetricRecord, SourceError> {
        let signal = self.loader.load(source)?;
        let metrics = self.computer.compute(signal)?;
        Ok(MetricRecord::new(source.name(), metrics))
    }

    fn process_isolated(&self, index: usize, source: &AudioSource) -> SourceReport {
        let started = Instant::now();
        let result = match std::panic::catch_unwind(AssertUnwindSafe(|| self.process_source(source))) {
            Ok(Ok(record)) => Ok(record),
            Ok(Err(e)) => Err((e.kind(), e.to_string())),
            Err(payload) => Err((FailureKind::Panicked, panic_message(payload.as_ref()))),
        };

        SourceReport {
            index,
            result,
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
        }
    }

    fn record_trace(&self, tracer: &mut TraceBuilder, name: &str, report: &SourceReport) {
        if let Some(writer) = &self.trace {
            let error = report.result.as_ref().err().map(|(_, reason)| reason.as_str());
            writer.record(tracer.source(report.index, name, error, report.elapsed_ms));
        }
    }

    /// Process every source in order. Never fails as a whole:
    /// bad sources become `BatchFailure`s and the rest continue.
    pub fn run(&self, sources: &[AudioSource]) -> BatchOutcome {
        let started = Instant::now();
        log::info!("Starting batch of {} source(s)", sources.len());

        let mut tracer = TraceBuilder::for_batch(sources.len());
        if let Some(writer) = &self.trace {
            writer.record(tracer.start("sequential"));
        }

        let mut reports = Vec::with_capacity(sources.len());
        for (index, source) in sources.iter().enumerate() {
            let report = self.process_isolated(index, source);
            self.record_trace(&mut tracer, source.name(), &report);
            reports.push(report);
        }

        self.finish(sources, reports, &tracer, started)
    }

    /// Process sources on blocking worker tasks, at most `worker_count` at once.
    /// Rows and failures come back in input order regardless of completion order.
    pub async fn run_parallel(
        self: Arc<Self>,
        sources: Vec<AudioSource>,
        options: &ParallelOptions,
    ) -> BatchOutcome {
        let started = Instant::now();
        let workers = options.worker_count();
        log::info!(
            "Starting parallel batch of {} source(s) on {} worker(s)",
            sources.len(),
            workers
        );

        let mut tracer = TraceBuilder::for_batch(sources.len());
        if let Some(writer) = &self.trace {
            writer.record(tracer.start("parallel"));
        }

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();

        for (index, source) in sources.iter().cloned().enumerate() {
            let pipeline = Arc::clone(&self);
            let semaphore = Arc::clone(&semaphore);
            let timeout = options.timeout;

            tasks.spawn(async move {
                let permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return SourceReport {
                            index,
                            result: Err((FailureKind::Panicked, "worker pool closed".to_string())),
                            elapsed_ms: 0.0,
                        }
                    }
                };

                let started = Instant::now();
                let handle =
                    tokio::task::spawn_blocking(move || pipeline.process_isolated(index, &source));

                // The permit lives in this task, so a timeout frees the slot for the next source
                // while the abandoned blocking call runs on outside the worker bound
                let joined = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, handle).await {
                        Ok(joined) => joined,
                        Err(_) => {
                            drop(permit);
                            log::warn!("Source {} abandoned after {:?}", index, limit);
                            return SourceReport {
                                index,
                                result: Err((
                                    FailureKind::Timeout,
                                    format!("timed out after {:.3}s", limit.as_secs_f64()),
                                )),
                                elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
                            }
                        }
                    },
                    None => handle.await,
                };
                drop(permit);

                match joined {
                    Ok(report) => report,
                    Err(e) => SourceReport {
                        index,
                        result: Err((FailureKind::Panicked, format!("worker failed: {}", e))),
                        elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
                    },
                }
            });
        }

        let mut reports = Vec::with_capacity(sources.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => {
                    if let Some(source) = sources.get(report.index) {
                        self.record_trace(&mut tracer, source.name(), &report);
                    }
                    reports.push(report);
                }
                Err(e) => log::error!("Batch task failed: {}", e),
            }
        }

        // A task lost to a join error still gets a failure entry
        let reported: HashSet<usize> = reports.iter().map(|r| r.index).collect();
        for index in (0..sources.len()).filter(|i| !reported.contains(i)) {
            reports.push(SourceReport {
                index,
                result: Err((FailureKind::Panicked, "worker task lost".to_string())),
                elapsed_ms: 0.0,
            });
        }

        reports.sort_by_key(|r| r.index);
        self.finish(&sources, reports, &tracer, started)
    }

    /// Assemble reports, already in input order, into the batch outcome
    fn finish(
        &self,
        sources: &[AudioSource],
        reports: Vec<SourceReport>,
        tracer: &TraceBuilder,
        started: Instant,
    ) -> BatchOutcome {
        let mut rows = Vec::new();
        let mut failures = Vec::new();

        for report in reports {
            let source_name = sources
                .get(report.index)
                .map(|s| s.name().to_string())
                .unwrap_or_default();

            match report.result {
                Ok(record) => rows.push(record),
                Err((kind, reason)) => {
                    log::warn!("Skipping {} ({:?}): {}", source_name, kind, reason);
                    failures.push(BatchFailure {
                        index: report.index,
                        source_name,
                        kind,
                        reason,
                    });
                }
            }
        }

        let outcome = BatchOutcome {
            table: ResultTable::from_records(rows),
            failures,
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        log::info!(
            "Batch complete: {} row(s), {} failure(s) in {:.1} ms",
            outcome.row_count(),
            outcome.failure_count(),
            elapsed_ms
        );
        if let Some(writer) = &self.trace {
            writer.record(tracer.complete(outcome.row_count(), outcome.failure_count(), elapsed_ms));
        }

        outcome
    }
}

impl Default for BatchPipeline {
    fn default() -> Self {
        BatchPipeline::new(SignalLoader::default(), MetricComputer::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{metric_names, silence_level_db, BuiltinBackend};
    use crate::pipeline::trace::{read_trace_file, STAGE_BATCH_COMPLETE, STAGE_SOURCE};
    use crate::test_support::{
        silence, sine, wav_bytes, write_wav, CountingBackend, FaultyBackend, SlowBackend,
    };
    use tempfile::TempDir;

    fn tone_source(name: &str, freq: f64) -> AudioSource {
        AudioSource::in_memory(name, wav_bytes(1, 16000, &sine(freq, 16000, 0.5, 0.3)))
    }

    fn pipeline_with(backend: Arc<dyn crate::metrics::MetricsBackend>) -> BatchPipeline {
        BatchPipeline::new(SignalLoader::wav(), MetricComputer::new(backend))
    }

    fn names(outcome: &BatchOutcome) -> Vec<&str> {
        outcome
            .table
            .rows()
            .iter()
            .map(|r| r.source_name.as_str())
            .collect()
    }

    #[test]
    fn test_valid_sources_keep_order() {
        let sources = vec![
            tone_source("c.wav", 300.0),
            tone_source("a.wav", 1000.0),
            tone_source("b.wav", 5000.0),
        ];

        let outcome = BatchPipeline::default().run(&sources);

        assert_eq!(names(&outcome), vec!["c.wav", "a.wav", "b.wav"]);
        assert!(outcome.is_complete());
        assert_eq!(outcome.table.columns().len(), metric_names().len());
    }

    #[test]
    fn test_corrupt_source_is_isolated() {
        let sources = vec![
            tone_source("a.wav", 440.0),
            AudioSource::in_memory("broken.wav", b"RIFF garbage".to_vec()),
            tone_source("c.wav", 880.0),
        ];

        let outcome = BatchPipeline::default().run(&sources);

        assert_eq!(names(&outcome), vec!["a.wav", "c.wav"]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].index, 1);
        assert_eq!(outcome.failures[0].source_name, "broken.wav");
        assert_eq!(outcome.failures[0].kind, FailureKind::Decode);
        assert!(!outcome.failures[0].reason.is_empty());
    }

    #[test]
    fn test_empty_batch() {
        let outcome = BatchPipeline::default().run(&[]);

        assert!(outcome.table.is_empty());
        assert!(outcome.table.columns().is_empty());
        assert!(outcome.failures.is_empty());
    }

    #[test]
    fn test_all_failures_give_empty_table() {
        let sources = vec![
            AudioSource::in_memory("x.wav", Vec::<u8>::new()),
            AudioSource::in_memory("y.wav", b"nope".to_vec()),
        ];

        let outcome = BatchPipeline::default().run(&sources);

        assert!(outcome.table.is_empty());
        assert_eq!(outcome.failure_count(), 2);
    }

    #[test]
    fn test_silence_row() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_wav(temp_dir.path(), "a.wav", 1, 16000, &silence(16000, 2.0));

        let outcome = BatchPipeline::default().run(&[AudioSource::on_disk("a.wav", path)]);

        assert_eq!(outcome.row_count(), 1);
        let row = &outcome.table.rows()[0];
        assert_eq!(row.source_name, "a.wav");
        for name in ["LAeq", "LAeq_min", "LAeq_max"] {
            assert!((row.get(name).unwrap() - silence_level_db()).abs() < 1e-9, "{}", name);
        }
        assert!(row.metrics.iter().all(|(_, v)| v.is_finite()));
    }

    #[test]
    fn test_zero_byte_file_fails_decode() {
        let temp_dir = TempDir::new().unwrap();
        let valid = write_wav(temp_dir.path(), "a.wav", 1, 16000, &sine(440.0, 16000, 0.5, 0.2));
        let empty = temp_dir.path().join("b.wav");
        std::fs::write(&empty, b"").unwrap();

        let outcome = BatchPipeline::default().run(&[
            AudioSource::on_disk("a.wav", valid),
            AudioSource::on_disk("b.wav", empty),
        ]);

        assert_eq!(names(&outcome), vec!["a.wav"]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].source_name, "b.wav");
        assert_eq!(outcome.failures[0].kind, FailureKind::Decode);
    }

    #[test]
    fn test_duplicate_names_are_separate_rows() {
        let sources = vec![tone_source("a.wav", 440.0), tone_source("a.wav", 2000.0)];

        let outcome = BatchPipeline::default().run(&sources);

        assert_eq!(names(&outcome), vec!["a.wav", "a.wav"]);
    }

    #[test]
    fn test_metric_failures_and_panics_are_isolated() {
        let pipeline = pipeline_with(Arc::new(FaultyBackend));
        let stereo: Vec<i16> = sine(440.0, 16000, 0.25, 0.2)
            .into_iter()
            .flat_map(|s| [s, s])
            .collect();
        let sources = vec![
            AudioSource::in_memory("stereo.wav", wav_bytes(2, 16000, &stereo)),
            AudioSource::in_memory("tiny.wav", wav_bytes(1, 16000, &[100, -100, 100])),
            tone_source("ok.wav", 440.0),
        ];

        let outcome = pipeline.run(&sources);

        assert_eq!(names(&outcome), vec!["ok.wav"]);
        let kinds: Vec<FailureKind> = outcome.failures.iter().map(|f| f.kind).collect();
        assert_eq!(kinds, vec![FailureKind::MetricComputation, FailureKind::Panicked]);
        assert!(outcome.failures[1].reason.contains("signal too short"));
    }

    #[test]
    fn test_staging_dir_left_empty() {
        let staging = TempDir::new().unwrap();
        let pipeline = BatchPipeline::new(
            SignalLoader::wav().with_staging_dir(staging.path()),
            MetricComputer::default(),
        );

        pipeline.run(&[
            tone_source("a.wav", 440.0),
            AudioSource::in_memory("b.wav", b"junk".to_vec()),
        ]);

        assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_run_writes_trace() {
        let temp_dir = TempDir::new().unwrap();
        let trace_path = temp_dir.path().join("trace.jsonl");
        let pipeline = BatchPipeline::default().with_trace(TraceWriter::new(&trace_path));

        pipeline.run(&[
            tone_source("a.wav", 440.0),
            AudioSource::in_memory("b.wav", Vec::<u8>::new()),
        ]);

        let entries = read_trace_file(&trace_path).unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[1].stage, STAGE_SOURCE);
        assert_eq!(entries[2].data.as_ref().unwrap()["ok"], false);
        assert_eq!(entries[3].stage, STAGE_BATCH_COMPLETE);
        assert_eq!(entries[3].data.as_ref().unwrap()["failures"], 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_parallel_matches_sequential() {
        let sources: Vec<AudioSource> = (0..6)
            .map(|i| {
                let secs = 0.1 + 0.15 * (5 - i) as f64;
                let bytes = wav_bytes(1, 16000, &sine(300.0 + 400.0 * i as f64, 16000, secs, 0.25));
                AudioSource::in_memory(format!("{}.wav", i), bytes)
            })
            .chain(std::iter::once(AudioSource::in_memory("bad.wav", b"x".to_vec())))
            .collect();

        let pipeline = Arc::new(BatchPipeline::default());
        let sequential = pipeline.run(&sources);
        let options = ParallelOptions {
            workers: Some(3),
            timeout: None,
        };
        let parallel = Arc::clone(&pipeline).run_parallel(sources, &options).await;

        assert_eq!(parallel.table, sequential.table);
        assert_eq!(parallel.failures, sequential.failures);
        assert_eq!(parallel.failures[0].index, 6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_parallel_timeout_is_per_source() {
        let backend = Arc::new(SlowBackend {
            delay: Duration::from_millis(500),
            inner: BuiltinBackend::default(),
        });
        let pipeline = Arc::new(pipeline_with(backend));
        let sources = vec![
            AudioSource::in_memory("broken.wav", b"junk".to_vec()),
            tone_source("slow.wav", 440.0),
        ];
        let options = ParallelOptions {
            workers: Some(2),
            timeout: Some(Duration::from_millis(50)),
        };

        let outcome = pipeline.run_parallel(sources, &options).await;

        assert!(outcome.table.is_empty());
        assert_eq!(outcome.failures.len(), 2);
        assert_eq!(outcome.failures[0].kind, FailureKind::Decode);
        assert_eq!(outcome.failures[1].kind, FailureKind::Timeout);
        assert_eq!(outcome.failures[1].source_name, "slow.wav");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timed_out_source_frees_its_worker() {
        let backend = Arc::new(SlowBackend {
            delay: Duration::from_millis(1000),
            inner: BuiltinBackend::default(),
        });
        let pipeline = Arc::new(pipeline_with(backend));
        let sources: Vec<AudioSource> = (0..3)
            .map(|i| tone_source(&format!("{}.wav", i), 440.0))
            .collect();
        let options = ParallelOptions {
            workers: Some(1),
            timeout: Some(Duration::from_millis(100)),
        };

        let started = Instant::now();
        let outcome = pipeline.run_parallel(sources, &options).await;
        let elapsed = started.elapsed();

        let kinds: Vec<FailureKind> = outcome.failures.iter().map(|f| f.kind).collect();
        assert_eq!(kinds, vec![FailureKind::Timeout; 3]);
        // Three back-to-back timeouts on one worker, not three full delays
        assert!(elapsed < Duration::from_millis(900), "took {:?}", elapsed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_parallel_panic_is_isolated() {
        let pipeline = Arc::new(pipeline_with(Arc::new(FaultyBackend)));
        let sources = vec![
            tone_source("a.wav", 440.0),
            AudioSource::in_memory("tiny.wav", wav_bytes(1, 16000, &[1, 2, 3])),
            tone_source("c.wav", 880.0),
        ];

        let outcome = pipeline.run_parallel(sources, &ParallelOptions::default()).await;

        assert_eq!(names(&outcome), vec!["a.wav", "c.wav"]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].index, 1);
        assert_eq!(outcome.failures[0].kind, FailureKind::Panicked);
    }

    #[test]
    fn test_counting_backend_sees_every_source() {
        let backend = Arc::new(CountingBackend::default());
        let pipeline = pipeline_with(backend.clone());

        pipeline.run(&[tone_source("a.wav", 440.0), tone_source("b.wav", 880.0)]);

        assert_eq!(backend.mono_calls(), 2);
    }

    #[test]
    fn test_worker_count_defaults_to_at_least_one() {
        assert!(ParallelOptions::default().worker_count() >= 1);
        let options = ParallelOptions {
            workers: Some(0),
            timeout: None,
        };
        assert_eq!(options.worker_count(), 1);

        let huge = ParallelOptions {
            workers: Some(usize::MAX),
            timeout: None,
        };
        assert_eq!(huge.worker_count(), Semaphore::MAX_PERMITS);
    }
}
