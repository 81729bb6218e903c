// Equivalent continuous sound level family
// A-weighted block levels and their summary statistics (LAeq, percentile levels, moments)

use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};

use crate::metrics::stats;
use crate::metrics::MetricError;

/// Reference sound pressure in pascals (20 µPa)
pub const REFERENCE_PRESSURE: f64 = 2e-5;

/// Mean squares are floored here so digital silence has a finite level
pub const SILENCE_FLOOR_PA2: f64 = 1e-20;

/// Column order of the level family
pub const LEVEL_COLUMNS: [&str; 10] = [
    "LAeq", "LAeq_5", "LAeq_10", "LAeq_50", "LAeq_90", "LAeq_95", "LAeq_min", "LAeq_max",
    "LAeq_kurt", "LAeq_skew",
];

/// Configuration for level analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    /// Length of each analysis block in seconds (0.125 = "fast")
    pub block_secs: f64,
}

impl Default for LevelConfig {
    fn default() -> Self {
        LevelConfig { block_secs: 0.125 }
    }
}

impl LevelConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.block_secs.is_finite() && self.block_secs > 0.0) {
            return Err(format!("block_secs must be positive, got {}", self.block_secs));
        }
        Ok(())
    }
}

/// Sound pressure level in dB re 20 µPa for a mean square pressure
pub fn pressure_level_db(mean_square: f64) -> f64 {
    let floored = mean_square.max(SILENCE_FLOOR_PA2);
    10.0 * (floored / (REFERENCE_PRESSURE * REFERENCE_PRESSURE)).log10()
}

/// Level reported for a block of digital silence
pub fn silence_level_db() -> f64 {
    pressure_level_db(0.0)
}

/// IEC 61672 A-weighting as a linear amplitude gain (1.0 at 1 kHz)
pub fn a_weighting_gain(frequency: f64) -> f64 {
    if frequency <= 0.0 {
        return 0.0;
    }

    let f2 = frequency * frequency;
    let c1 = 20.598_997f64.powi(2);
    let c2 = 107.652_65f64.powi(2);
    let c3 = 737.862_23f64.powi(2);
    let c4 = 12_194.217f64.powi(2);

    let ra = c4 * f2 * f2 / ((f2 + c1) * ((f2 + c2) * (f2 + c3)).sqrt() * (f2 + c4));

    // +2.00 dB normalizes the curve to unity at 1 kHz
    ra * 10f64.powf(2.0 / 20.0)
}

/// A-weighted mean square of one block, computed in the frequency domain
fn weighted_mean_square(
    block: &[f64],
    sample_rate: u32,
    planner: &mut RealFftPlanner<f64>,
) -> Result<f64, MetricError> {
    let n = block.len();
    let fft = planner.plan_fft_forward(n);

    let mut input = block.to_vec();
    let mut spectrum = fft.make_output_vec();
    fft.process(&mut input, &mut spectrum)
        .map_err(|e| MetricError::Backend(e.to_string()))?;

    let bin_width = sample_rate as f64 / n as f64;
    let mut sum = 0.0;

    for (k, bin) in spectrum.iter().enumerate() {
        // Interior bins stand in for their negative-frequency mirror
        let is_edge = k == 0 || (n % 2 == 0 && k == n / 2);
        let multiplicity = if is_edge { 1.0 } else { 2.0 };
        let gain = a_weighting_gain(k as f64 * bin_width);
        sum += multiplicity * bin.norm_sqr() * gain * gain;
    }

    // Parseval: mean(x^2) = sum |X_k|^2 / n^2
    Ok(sum / (n as f64 * n as f64))
}

/// Level family for one channel, in `LEVEL_COLUMNS` order
pub fn level_row(
    samples: &[f64],
    sample_rate: u32,
    config: &LevelConfig,
) -> Result<Vec<(&'static str, f64)>, MetricError> {
    if samples.is_empty() {
        return Err(MetricError::EmptySignal);
    }
    if sample_rate == 0 {
        return Err(MetricError::InvalidSampleRate(sample_rate));
    }
    config.validate().map_err(MetricError::InvalidConfig)?;

    let block_len = ((config.block_secs * sample_rate as f64).round() as usize).max(1);
    let blocks: Vec<&[f64]> = if samples.len() < block_len {
        vec![samples]
    } else {
        samples.chunks_exact(block_len).collect()
    };

    let mut planner = RealFftPlanner::<f64>::new();
    let mut mean_squares = Vec::with_capacity(blocks.len());
    for block in blocks {
        let ms = weighted_mean_square(block, sample_rate, &mut planner)?;
        mean_squares.push(ms.max(SILENCE_FLOOR_PA2));
    }

    let mut levels: Vec<f64> = mean_squares.iter().map(|&ms| pressure_level_db(ms)).collect();
    let laeq = pressure_level_db(stats::mean(&mean_squares));
    let kurtosis = stats::excess_kurtosis(&levels);
    let skewness = stats::skewness(&levels);

    levels.sort_by(f64::total_cmp);
    let exceeded = |percent: f64| stats::percentile(&levels, 100.0 - percent);

    let values = [
        laeq,
        exceeded(5.0),
        exceeded(10.0),
        exceeded(50.0),
        exceeded(90.0),
        exceeded(95.0),
        levels[0],
        levels[levels.len() - 1],
        kurtosis,
        skewness,
    ];

    Ok(LEVEL_COLUMNS.iter().copied().zip(values).collect())
}
