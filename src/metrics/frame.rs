// Metric frames and the mean reduction
// A backend returns one row per analysed channel; the computer collapses it to one row

use crate::metrics::MetricError;

/// Named columns by rows of values, one row per analysed channel
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFrame {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl MetricFrame {
    pub fn new(columns: Vec<String>) -> Self {
        MetricFrame {
            columns,
            rows: Vec::new(),
        }
    }

    /// Stack named rows, which must all carry the same names in the same order
    pub fn from_named_rows(named_rows: Vec<Vec<(&str, f64)>>) -> Result<Self, MetricError> {
        let mut rows = named_rows.into_iter();
        let Some(first) = rows.next() else {
            return Ok(MetricFrame::new(Vec::new()));
        };

        let columns = first.iter().map(|(name, _)| name.to_string()).collect();
        let mut frame = MetricFrame::new(columns);
        frame.push_row(first.into_iter().map(|(_, value)| value).collect())?;

        for row in rows {
            let names_match = row.len() == frame.columns.len()
                && row
                    .iter()
                    .zip(&frame.columns)
                    .all(|((name, _), column)| *name == column.as_str());
            if !names_match {
                return Err(MetricError::ShapeMismatch(
                    "channel rows carry different metric names".to_string(),
                ));
            }
            frame.push_row(row.into_iter().map(|(_, value)| value).collect())?;
        }

        Ok(frame)
    }

    pub fn push_row(&mut self, values: Vec<f64>) -> Result<(), MetricError> {
        if values.len() != self.columns.len() {
            return Err(MetricError::ShapeMismatch(format!(
                "row has {} values for {} columns",
                values.len(),
                self.columns.len()
            )));
        }
        self.rows.push(values);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }
}

/// Collapse a frame to a single row by taking the arithmetic mean of every column.
///
/// This discards information: for a stereo recording the left and right channel
/// values are averaged, so a loud channel and a quiet channel report their mean.
/// Downstream users of the table should read every metric as "mean over channels".
pub fn reduce_to_mean(frame: &MetricFrame) -> Result<Vec<(String, f64)>, MetricError> {
    if frame.rows.is_empty() {
        return Err(MetricError::ShapeMismatch(
            "cannot reduce a frame without rows".to_string(),
        ));
    }

    let row_count = frame.rows.len() as f64;
    let reduced = frame
        .columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let total: f64 = frame.rows.iter().map(|row| row[i]).sum();
            (column.clone(), total / row_count)
        })
        .collect();

    Ok(reduced)
}
