// Result table
// One row per processed source, CSV export and import

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::{Read, Write};
use thiserror::Error;

/// Identifier column appended after the metric columns on export
pub const FILE_NAME_COLUMN: &str = "file_name";

#[derive(Debug, Error)]
pub enum CsvError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Invalid value {value:?} in column {column}")]
    InvalidValue { column: String, value: String },
}

/// Metrics computed for one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Display name of the originating source
    pub source_name: String,

    /// Metric name and value pairs, in backend column order
    pub metrics: Vec<(String, f64)>,
}

impl MetricRecord {
    pub fn new(source_name: impl Into<String>, metrics: Vec<(String, f64)>) -> Self {
        MetricRecord {
            source_name: source_name.into(),
            metrics,
        }
    }

    /// Value of one metric, if present
    pub fn get(&self, metric: &str) -> Option<f64> {
        self.metrics
            .iter()
            .find(|(name, _)| name == metric)
            .map(|(_, value)| *value)
    }

    pub fn metric_names(&self) -> impl Iterator<Item = &str> {
        self.metrics.iter().map(|(name, _)| name.as_str())
    }
}

/// Rows in the order the sources were supplied.
/// Columns are the union of metric names in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: Vec<MetricRecord>,
}

impl ResultTable {
    /// Build a table from rows. Duplicate source names are kept as separate rows.
    pub fn from_records(rows: Vec<MetricRecord>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut seen_columns = HashSet::new();
        let mut seen_names = HashSet::new();

        for row in &rows {
            if !seen_names.insert(row.source_name.as_str()) {
                log::warn!("Duplicate source name in result table: {}", row.source_name);
            }
            for name in row.metric_names() {
                if seen_columns.insert(name.to_string()) {
                    columns.push(name.to_string());
                }
            }
        }

        ResultTable { columns, rows }
    }

    /// Union of metric names in first-seen order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[MetricRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one metric column, `None` where a row lacks the metric
    pub fn column(&self, metric: &str) -> Vec<Option<f64>> {
        self.rows.iter().map(|row| row.get(metric)).collect()
    }

    /// Export header: metric columns followed by `file_name`
    pub fn header(&self) -> Vec<&str> {
        if self.columns.is_empty() && self.rows.is_empty() {
            return Vec::new();
        }
        self.columns
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(FILE_NAME_COLUMN))
            .collect()
    }

    /// Write the table as UTF-8 CSV. An empty table writes nothing.
    pub fn to_csv<W: Write>(&self, writer: W) -> Result<(), CsvError> {
        let header = self.header();
        if header.is_empty() {
            return Ok(());
        }

        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(&header)?;

        for row in &self.rows {
            let mut fields: Vec<String> = self
                .columns
                .iter()
                .map(|column| row.get(column).map(|v| v.to_string()).unwrap_or_default())
                .collect();
            fields.push(row.source_name.clone());
            csv_writer.write_record(&fields)?;
        }

        csv_writer.flush()?;
        Ok(())
    }

    /// CSV as an in-memory buffer
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, CsvError> {
        let mut buffer = Vec::new();
        self.to_csv(&mut buffer)?;
        Ok(buffer)
    }

    /// Parse a table previously written by `to_csv`
    pub fn from_csv<R: Read>(reader: R) -> Result<Self, CsvError> {
        let mut csv_reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
        let headers = csv_reader.headers()?.clone();
        if headers.is_empty() {
            return Ok(ResultTable::default());
        }

        let name_index = headers
            .iter()
            .position(|h| h == FILE_NAME_COLUMN)
            .ok_or_else(|| CsvError::MissingColumn(FILE_NAME_COLUMN.to_string()))?;

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            let mut metrics = Vec::new();
            let mut source_name = String::new();

            for (index, (column, cell)) in headers.iter().zip(record.iter()).enumerate() {
                if index == name_index {
                    source_name = cell.to_string();
                    continue;
                }
                if cell.is_empty() {
                    continue;
                }
                let value = cell.parse::<f64>().map_err(|_| CsvError::InvalidValue {
                    column: column.to_string(),
                    value: cell.to_string(),
                })?;
                metrics.push((column.to_string(), value));
            }

            rows.push(MetricRecord::new(source_name, metrics));
        }

        let mut table = ResultTable::from_records(rows);
        // Keep header order even for columns no row fills
        table.columns = headers
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != name_index)
            .map(|(_, column)| column.to_string())
            .collect();

        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, values: &[(&str, f64)]) -> MetricRecord {
        MetricRecord::new(
            name,
            values.iter().map(|(n, v)| (n.to_string(), *v)).collect(),
        )
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(f64::MIN_POSITIVE)
    }

    #[test]
    fn test_columns_union_in_first_seen_order() {
        let table = ResultTable::from_records(vec![
            record("a.wav", &[("LAeq", 50.0), ("Hf", 0.5)]),
            record("b.wav", &[("LAeq", 55.0), ("ADI", 1.2)]),
        ]);

        assert_eq!(table.columns(), &["LAeq", "Hf", "ADI"]);
        assert_eq!(table.column("ADI"), vec![None, Some(1.2)]);
        assert_eq!(table.header(), vec!["LAeq", "Hf", "ADI", "file_name"]);
    }

    #[test]
    fn test_duplicate_names_keep_both_rows() {
        let table = ResultTable::from_records(vec![
            record("a.wav", &[("LAeq", 50.0)]),
            record("a.wav", &[("LAeq", 60.0)]),
        ]);

        assert_eq!(table.len(), 2);
        assert_eq!(table.column("LAeq"), vec![Some(50.0), Some(60.0)]);
    }

    #[test]
    fn test_csv_layout() {
        let table = ResultTable::from_records(vec![record("a.wav", &[("LAeq", 50.5), ("Hf", 0.25)])]);

        let csv = String::from_utf8(table.to_csv_bytes().unwrap()).unwrap();

        assert_eq!(csv, "LAeq,Hf,file_name\n50.5,0.25,a.wav\n");
    }

    #[test]
    fn test_csv_round_trip() {
        let table = ResultTable::from_records(vec![
            record("a.wav", &[("LAeq", -106.02059991327963), ("Hf", 1.0 / 3.0), ("ACI", 1e-20)]),
            record("b, quoted.wav", &[("LAeq", 72.125), ("Hf", 0.999_999_999_7), ("ACI", 12345.678)]),
        ]);

        let bytes = table.to_csv_bytes().unwrap();
        let parsed = ResultTable::from_csv(bytes.as_slice()).unwrap();

        assert_eq!(parsed.len(), table.len());
        assert_eq!(parsed.columns(), table.columns());
        for (expected, actual) in table.rows().iter().zip(parsed.rows()) {
            assert_eq!(expected.source_name, actual.source_name);
            for (name, value) in &expected.metrics {
                assert!(close(*value, actual.get(name).unwrap()), "{}", name);
            }
        }
    }

    #[test]
    fn test_missing_values_export_as_empty_cells() {
        let table = ResultTable::from_records(vec![
            record("a.wav", &[("LAeq", 50.0)]),
            record("b.wav", &[("Hf", 0.5)]),
        ]);

        let csv = String::from_utf8(table.to_csv_bytes().unwrap()).unwrap();
        assert_eq!(csv, "LAeq,Hf,file_name\n50,,a.wav\n,0.5,b.wav\n");

        let parsed = ResultTable::from_csv(csv.as_bytes()).unwrap();
        assert_eq!(parsed.column("LAeq"), vec![Some(50.0), None]);
    }

    #[test]
    fn test_empty_table_writes_nothing() {
        let table = ResultTable::from_records(Vec::new());
        assert!(table.is_empty());
        assert!(table.columns().is_empty());
        assert!(table.to_csv_bytes().unwrap().is_empty());

        let parsed = ResultTable::from_csv(&b""[..]).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_from_csv_requires_file_name() {
        let result = ResultTable::from_csv(&b"LAeq,Hf\n1,2\n"[..]);
        assert!(matches!(result, Err(CsvError::MissingColumn(_))));
    }

    #[test]
    fn test_from_csv_rejects_garbage_values() {
        let result = ResultTable::from_csv(&b"LAeq,file_name\nloud,a.wav\n"[..]);
        assert!(matches!(result, Err(CsvError::InvalidValue { .. })));
    }
}
