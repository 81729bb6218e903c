// Batch progress tracing
// Append-only JSONL trace of batch runs: start, one entry per source, completion

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const STAGE_BATCH_START: &str = "batch/start";
pub const STAGE_SOURCE: &str = "source";
pub const STAGE_BATCH_COMPLETE: &str = "batch/complete";

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// One line of the trace file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// RFC 3339 timestamp
    pub timestamp: String,

    /// `batch/start`, `source` or `batch/complete`
    pub stage: String,

    /// Fraction of the batch processed, in [0.0, 1.0]
    pub progress: f32,

    pub message: String,

    /// Per-entry details such as source name, outcome and timing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl TraceEntry {
    /// Create an entry stamped with the current time. Progress is clamped to [0, 1].
    pub fn new(stage: impl Into<String>, progress: f32, message: impl Into<String>) -> Self {
        TraceEntry {
            timestamp: Utc::now().to_rfc3339(),
            stage: stage.into(),
            progress: progress.clamp(0.0, 1.0),
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured data
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Serialize to one JSON line, newline included
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

/// Appends entries to a JSONL file, creating it on first write
#[derive(Debug, Clone)]
pub struct TraceWriter {
    file_path: PathBuf,
}

impl TraceWriter {
    /// Create a writer appending to `file_path`
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        TraceWriter {
            file_path: file_path.into(),
        }
    }

    /// Append an entry to the file.
    /// Creates the file if it doesn't exist
    pub fn write(&self, entry: &TraceEntry) -> Result<(), TraceError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;

        file.write_all(entry.to_json_line()?.as_bytes())?;
        file.flush()?;

        Ok(())
    }

    /// Write an entry, logging instead of returning failures.
    /// Tracing must never fail a batch.
    pub fn record(&self, entry: TraceEntry) {
        if let Err(e) = self.write(&entry) {
            log::warn!(
                "Failed to write trace entry to {}: {}",
                self.file_path.display(),
                e
            );
        }
    }

    /// Get the trace file path
    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

/// Builds the entries of one batch run, tracking progress
pub struct TraceBuilder {
    total: usize,
    processed: usize,
}

impl TraceBuilder {
    /// Builder for a batch of `total` sources
    pub fn for_batch(total: usize) -> Self {
        TraceBuilder {
            total,
            processed: 0,
        }
    }

    fn progress(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.processed as f32 / self.total as f32
        }
    }

    /// Create the batch start entry (progress = 0.0)
    pub fn start(&self, mode: &str) -> TraceEntry {
        TraceEntry::new(
            STAGE_BATCH_START,
            0.0,
            format!("Processing {} source(s)", self.total),
        )
        .with_data(serde_json::json!({ "total": self.total, "mode": mode }))
    }

    /// Entry for one processed source. `error` is None on success.
    pub fn source(
        &mut self,
        index: usize,
        name: &str,
        error: Option<&str>,
        elapsed_ms: f64,
    ) -> TraceEntry {
        self.processed += 1;
        let message = match error {
            None => format!("Processed {}", name),
            Some(_) => format!("Failed {}", name),
        };
        TraceEntry::new(STAGE_SOURCE, self.progress(), message).with_data(serde_json::json!({
            "index": index,
            "source_name": name,
            "ok": error.is_none(),
            "error": error,
            "elapsed_ms": elapsed_ms,
        }))
    }

    /// Create the batch complete entry (progress = 1.0)
    pub fn complete(&self, rows: usize, failures: usize, elapsed_ms: f64) -> TraceEntry {
        TraceEntry::new(
            STAGE_BATCH_COMPLETE,
            1.0,
            format!("{} row(s), {} failure(s)", rows, failures),
        )
        .with_data(serde_json::json!({
            "rows": rows,
            "failures": failures,
            "elapsed_ms": elapsed_ms,
        }))
    }
}

/// Read trace entries from a JSONL file
pub fn read_trace_file(path: &Path) -> Result<Vec<TraceEntry>, TraceError> {
    let contents = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();

    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(line)?);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_progress_clamping() {
        assert_eq!(TraceEntry::new("x", -0.5, "m").progress, 0.0);
        assert_eq!(TraceEntry::new("x", 1.5, "m").progress, 1.0);
    }

    #[test]
    fn test_builder_tracks_progress() {
        let mut builder = TraceBuilder::for_batch(4);

        let start = builder.start("sequential");
        assert_eq!(start.stage, STAGE_BATCH_START);
        assert_eq!(start.progress, 0.0);
        assert_eq!(start.data.as_ref().unwrap()["total"], 4);

        let first = builder.source(0, "a.wav", None, 1.0);
        assert_eq!(first.progress, 0.25);
        assert_eq!(first.data.as_ref().unwrap()["ok"], true);

        let second = builder.source(1, "b.wav", Some("bad header"), 1.0);
        assert_eq!(second.progress, 0.5);
        assert_eq!(second.data.as_ref().unwrap()["error"], "bad header");

        let complete = builder.complete(1, 1, 2.0);
        assert_eq!(complete.stage, STAGE_BATCH_COMPLETE);
        assert_eq!(complete.progress, 1.0);
    }

    #[test]
    fn test_empty_batch_progress() {
        let builder = TraceBuilder::for_batch(0);
        assert_eq!(builder.complete(0, 0, 0.0).progress, 1.0);
    }

    #[test]
    fn test_writer_appends_lines() {
        let temp_dir = TempDir::new().unwrap();
        let trace_path = temp_dir.path().join("trace.jsonl");
        let writer = TraceWriter::new(&trace_path);

        let mut builder = TraceBuilder::for_batch(1);
        writer.write(&builder.start("sequential")).unwrap();
        writer.write(&builder.source(0, "a.wav", None, 3.5)).unwrap();
        writer.write(&builder.complete(1, 0, 3.5)).unwrap();

        let entries = read_trace_file(&trace_path).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].stage, STAGE_SOURCE);
        assert_eq!(entries[1].data.as_ref().unwrap()["source_name"], "a.wav");
    }

    #[test]
    fn test_record_swallows_write_errors() {
        let temp_dir = TempDir::new().unwrap();
        // A directory cannot be opened for appending
        let writer = TraceWriter::new(temp_dir.path());

        writer.record(TraceEntry::new(STAGE_BATCH_START, 0.0, "start"));

        assert!(writer.write(&TraceEntry::new("x", 0.0, "m")).is_err());
    }

    #[test]
    fn test_json_line_format() {
        let entry = TraceEntry::new("source", 0.5, "Testing");
        let json_line = entry.to_json_line().unwrap();

        assert!(json_line.ends_with('\n'));
        let parsed: TraceEntry = serde_json::from_str(json_line.trim()).unwrap();
        assert_eq!(parsed.stage, "source");
        assert!(!json_line.contains("\"data\""));
    }
}
