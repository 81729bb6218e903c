// Pipeline module
// Batch execution, result table, caching and progress tracing

pub mod batch;
pub mod cache;
pub mod table;
pub mod trace;

pub use batch::{
    BatchFailure, BatchOutcome, BatchPipeline, FailureKind, ParallelOptions, SourceError,
};
pub use cache::{default_cache_key, CacheKey, CacheLookup, KeyFn, ResultCache};
pub use table::{CsvError, MetricRecord, ResultTable, FILE_NAME_COLUMN};
pub use trace::{read_trace_file, TraceBuilder, TraceEntry, TraceError, TraceWriter};
