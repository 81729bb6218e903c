// Metric computation
// Selects the channel path for a decoded signal and merges the two metric families

use std::sync::Arc;
use thiserror::Error;

use crate::audio::DecodedSignal;
use crate::metrics::frame::{reduce_to_mean, MetricFrame};
use crate::metrics::level::{level_row, LevelConfig, LEVEL_COLUMNS};
use crate::metrics::spectral::{spectral_row, SpectralConfig, SPECTRAL_COLUMNS};

#[derive(Debug, Error)]
pub enum MetricError {
    #[error("Signal has no samples")]
    EmptySignal,

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("Invalid analysis configuration: {0}")]
    InvalidConfig(String),

    #[error("Metric frame shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Metrics backend failed: {0}")]
    Backend(String),
}

/// Which computation branch a signal takes
#[derive(Debug, Clone, Copy)]
pub enum ChannelPath<'a> {
    Mono(&'a [f64]),
    Stereo { left: &'a [f64], right: &'a [f64] },
}

impl<'a> ChannelPath<'a> {
    /// Channels to analyse, left before right
    pub fn channels(&self) -> Vec<&'a [f64]> {
        match *self {
            ChannelPath::Mono(samples) => vec![samples],
            ChannelPath::Stereo { left, right } => vec![left, right],
        }
    }

    pub fn is_stereo(&self) -> bool {
        matches!(self, ChannelPath::Stereo { .. })
    }
}

/// The metrics library seam: one entry point per metric family.
/// Each returns one row per analysed channel.
pub trait MetricsBackend: Send + Sync {
    fn level_family(&self, path: ChannelPath<'_>, sample_rate: u32) -> Result<MetricFrame, MetricError>;

    fn spectral_family(&self, path: ChannelPath<'_>, sample_rate: u32) -> Result<MetricFrame, MetricError>;
}

/// Built-in backend: A-weighted level statistics and spectral diversity indices
#[derive(Debug, Clone, Default)]
pub struct BuiltinBackend {
    pub level: LevelConfig,
    pub spectral: SpectralConfig,
}

impl BuiltinBackend {
    pub fn new(level: LevelConfig, spectral: SpectralConfig) -> Self {
        BuiltinBackend { level, spectral }
    }
}

impl MetricsBackend for BuiltinBackend {
    fn level_family(&self, path: ChannelPath<'_>, sample_rate: u32) -> Result<MetricFrame, MetricError> {
        let rows = path
            .channels()
            .into_iter()
            .map(|samples| level_row(samples, sample_rate, &self.level))
            .collect::<Result<Vec<_>, _>>()?;
        MetricFrame::from_named_rows(rows)
    }

    fn spectral_family(&self, path: ChannelPath<'_>, sample_rate: u32) -> Result<MetricFrame, MetricError> {
        let rows = path
            .channels()
            .into_iter()
            .map(|samples| spectral_row(samples, sample_rate, &self.spectral))
            .collect::<Result<Vec<_>, _>>()?;
        MetricFrame::from_named_rows(rows)
    }
}

/// Metric names produced by the built-in backend, in column order
pub fn metric_names() -> Vec<&'static str> {
    LEVEL_COLUMNS.iter().chain(SPECTRAL_COLUMNS.iter()).copied().collect()
}

/// Computes one flat metric row per decoded signal
#[derive(Clone)]
pub struct MetricComputer {
    backend: Arc<dyn MetricsBackend>,
}

impl MetricComputer {
    pub fn new(backend: Arc<dyn MetricsBackend>) -> Self {
        MetricComputer { backend }
    }

    /// Two channels take the stereo path; every other count is averaged down to mono.
    /// Backend errors are returned as-is so the batch can record them.
    pub fn compute(&self, signal: DecodedSignal) -> Result<Vec<(String, f64)>, MetricError> {
        if signal.sample_rate == 0 {
            return Err(MetricError::InvalidSampleRate(signal.sample_rate));
        }

        let downmix;
        let path = match signal.channels.as_slice() {
            [left, right] => ChannelPath::Stereo { left, right },
            [only] => ChannelPath::Mono(only),
            _ => {
                downmix = signal.to_mono();
                ChannelPath::Mono(&downmix)
            }
        };

        log::debug!(
            "Computing metrics: {} channel(s), {} Hz, {:.2}s, stereo path: {}",
            signal.channel_count(),
            signal.sample_rate,
            signal.duration_secs(),
            path.is_stereo()
        );

        let level = self.backend.level_family(path, signal.sample_rate)?;
        let spectral = self.backend.spectral_family(path, signal.sample_rate)?;

        let mut record = reduce_to_mean(&level)?;
        record.extend(reduce_to_mean(&spectral)?);

        Ok(record)
    }
}

impl Default for MetricComputer {
    fn default() -> Self {
        MetricComputer::new(Arc::new(BuiltinBackend::default()))
    }
}
