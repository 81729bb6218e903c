// Spectral and acoustic diversity indices
// Builds a power spectrogram with realfft and derives the standard ecoacoustic index set
//
// All indices are computed from one STFT per channel. Power values are scaled so that
// the bins of a frame sum to that frame's mean square pressure (Pa^2). Anything that
// would divide by zero (silence, empty bands) reports 0 instead of NaN.

use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};

use crate::metrics::level::{pressure_level_db, SILENCE_FLOOR_PA2};
use crate::metrics::stats;
use crate::metrics::MetricError;

/// Column order of the spectral family
pub const SPECTRAL_COLUMNS: [&str; 44] = [
    "MEANf",
    "VARf",
    "SKEWf",
    "KURTf",
    "NBPEAKS",
    "LEQf",
    "ENRf",
    "BGNf",
    "SNRf",
    "Hf",
    "EAS",
    "ECU",
    "ECV",
    "EPS",
    "EPS_KURT",
    "EPS_SKEW",
    "ACI",
    "NDSI",
    "rBA",
    "AnthroEnergy",
    "BioEnergy",
    "BI",
    "ROU",
    "ADI",
    "AEI",
    "LFC",
    "MFC",
    "HFC",
    "ACTspFract",
    "ACTspCount",
    "ACTspMean",
    "EVNspFract",
    "EVNspMean",
    "EVNspCount",
    "TFSD",
    "H_Havrda",
    "H_Renyi",
    "H_pairedShannon",
    "H_gamma",
    "H_GiniSimpson",
    "RAOQ",
    "AGI",
    "ROItotal",
    "ROIcover",
];

/// Largest accepted STFT window
pub const MAX_WINDOW_SIZE: usize = 1 << 16;

/// Largest accepted number of diversity bands
pub const MAX_DIVERSITY_BANDS: usize = 1024;

/// Configuration for spectral index computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralConfig {
    /// STFT window size in samples
    pub window_size: usize,

    /// Hop size in samples (advance between frames)
    pub hop_size: usize,

    /// A cell is "active" when it exceeds the per-bin background by this many dB
    pub activity_threshold_db: f64,

    /// Minimum run of active frames counted as an event
    pub min_event_frames: usize,

    /// Connected regions of active cells smaller than this are not counted as ROIs
    pub min_roi_cells: usize,

    /// Spectral peaks must stand this far above the median of the mean spectrum (dB)
    pub peak_threshold_db: f64,

    /// Anthrophony band [low, high) in Hz, used by NDSI and rBA
    pub anthrophony_band: (f64, f64),

    /// Biophony band [low, high) in Hz, used by NDSI and rBA
    pub biophony_band: (f64, f64),

    /// Band for the bioacoustic index (BI)
    pub bioacoustic_band: (f64, f64),

    /// Width of the bands used by ADI, AEI and the alpha entropies
    pub diversity_band_hz: f64,

    /// Upper limit of the diversity bands
    pub diversity_max_hz: f64,

    /// Cells above this level relative to the loudest cell count as occupied (ADI/AEI)
    pub diversity_threshold_db: f64,

    /// Order q of the Havrda-Charvat and Renyi entropies (q != 1)
    pub entropy_order: f64,

    /// Bands for the low/mid/high frequency cover (LFC, MFC, HFC)
    pub low_band: (f64, f64),
    pub mid_band: (f64, f64),
    pub high_band: (f64, f64),
}

impl Default for SpectralConfig {
    fn default() -> Self {
        SpectralConfig {
            window_size: 1024,
            hop_size: 512,
            activity_threshold_db: 6.0,
            min_event_frames: 2,
            min_roi_cells: 4,
            peak_threshold_db: 10.0,
            anthrophony_band: (1000.0, 2000.0),
            biophony_band: (2000.0, 11000.0),
            bioacoustic_band: (2000.0, 8000.0),
            diversity_band_hz: 1000.0,
            diversity_max_hz: 10000.0,
            diversity_threshold_db: -50.0,
            entropy_order: 3.0,
            low_band: (0.0, 1500.0),
            mid_band: (1500.0, 8000.0),
            high_band: (8000.0, 20000.0),
        }
    }
}

impl SpectralConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(2..=MAX_WINDOW_SIZE).contains(&self.window_size) {
            return Err(format!(
                "window_size must be between 2 and {}, got {}",
                MAX_WINDOW_SIZE, self.window_size
            ));
        }
        if self.hop_size == 0 {
            return Err("hop_size must be positive".to_string());
        }
        let diversity_ok = self.diversity_band_hz > 0.0
            && self.diversity_max_hz > 0.0
            && self.diversity_max_hz.is_finite();
        if !diversity_ok {
            return Err("diversity bands must be positive".to_string());
        }
        let band_count = (self.diversity_max_hz / self.diversity_band_hz).ceil();
        if band_count > MAX_DIVERSITY_BANDS as f64 {
            return Err(format!(
                "diversity_max_hz / diversity_band_hz gives {} bands, at most {} allowed",
                band_count, MAX_DIVERSITY_BANDS
            ));
        }
        if !(self.entropy_order > 0.0) || (self.entropy_order - 1.0).abs() < f64::EPSILON {
            return Err(format!(
                "entropy_order must be positive and not 1, got {}",
                self.entropy_order
            ));
        }

        let bands = [
            ("anthrophony_band", self.anthrophony_band),
            ("biophony_band", self.biophony_band),
            ("bioacoustic_band", self.bioacoustic_band),
            ("low_band", self.low_band),
            ("mid_band", self.mid_band),
            ("high_band", self.high_band),
        ];
        for (name, (low, high)) in bands {
            if !(low >= 0.0 && high > low) {
                return Err(format!("{} must satisfy 0 <= low < high", name));
            }
        }

        Ok(())
    }
}

/// Power spectrogram, frame-major
#[derive(Debug, Clone)]
pub struct Spectrogram {
    /// `power[frame][bin]` in Pa^2
    pub power: Vec<Vec<f64>>,

    /// Center frequency of each bin in Hz
    pub frequencies: Vec<f64>,

    /// Time between consecutive frames in seconds
    pub frame_secs: f64,
}

impl Spectrogram {
    fn frame_count(&self) -> usize {
        self.power.len()
    }

    fn bin_count(&self) -> usize {
        self.frequencies.len()
    }

    fn bin_width(&self) -> f64 {
        match self.frequencies.get(1) {
            Some(f) => *f,
            None => 0.0,
        }
    }

    /// Indices of bins whose frequency falls in [low, high)
    fn band_bins(&self, (low, high): (f64, f64)) -> Vec<usize> {
        self.frequencies
            .iter()
            .enumerate()
            .filter(|(_, &f)| f >= low && f < high)
            .map(|(i, _)| i)
            .collect()
    }

    /// Per-bin series across frames
    fn bin_series(&self, bin: usize) -> impl Iterator<Item = f64> + '_ {
        self.power.iter().map(move |frame| frame[bin])
    }
}

/// Periodic Hann window
fn hann_window(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / n as f64).cos()))
        .collect()
}

/// Compute a Hann-windowed power spectrogram.
/// Signals shorter than one window are zero-padded into a single frame.
pub fn compute_spectrogram(
    samples: &[f64],
    sample_rate: u32,
    window_size: usize,
    hop_size: usize,
) -> Result<Spectrogram, MetricError> {
    if samples.is_empty() {
        return Err(MetricError::EmptySignal);
    }
    if sample_rate == 0 {
        return Err(MetricError::InvalidSampleRate(sample_rate));
    }
    if !(2..=MAX_WINDOW_SIZE).contains(&window_size) || hop_size == 0 {
        return Err(MetricError::InvalidConfig(format!(
            "window {} / hop {}",
            window_size, hop_size
        )));
    }

    let window = hann_window(window_size);
    let window_energy: f64 = window.iter().map(|w| w * w).sum();
    let scale = 1.0 / (window_size as f64 * window_energy);

    let mut planner = RealFftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(window_size);
    let mut input = fft.make_input_vec();
    let mut spectrum = fft.make_output_vec();

    let frame_count = if samples.len() < window_size {
        1
    } else {
        (samples.len() - window_size) / hop_size + 1
    };

    let mut power = Vec::with_capacity(frame_count);
    for frame_idx in 0..frame_count {
        let start = frame_idx * hop_size;
        let end = (start + window_size).min(samples.len());
        let frame = &samples[start..end];

        for (i, slot) in input.iter_mut().enumerate() {
            *slot = frame.get(i).copied().unwrap_or(0.0) * window[i];
        }

        fft.process(&mut input, &mut spectrum)
            .map_err(|e| MetricError::Backend(e.to_string()))?;

        let row = spectrum
            .iter()
            .enumerate()
            .map(|(k, bin)| {
                let is_edge = k == 0 || (window_size % 2 == 0 && k == window_size / 2);
                let multiplicity = if is_edge { 1.0 } else { 2.0 };
                multiplicity * bin.norm_sqr() * scale
            })
            .collect();
        power.push(row);
    }

    let bin_width = sample_rate as f64 / window_size as f64;
    let frequencies = (0..spectrum.len()).map(|k| k as f64 * bin_width).collect();

    Ok(Spectrogram {
        power,
        frequencies,
        frame_secs: hop_size as f64 / sample_rate as f64,
    })
}

fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 && denominator.is_finite() {
        numerator / denominator
    } else {
        0.0
    }
}

/// Frequency-shape moments of a spectrum: centroid (Hz), variance, skewness, kurtosis
fn spectral_shape(spectrum: &[f64], frequencies: &[f64]) -> [f64; 4] {
    let Some(weights) = stats::normalize(spectrum) else {
        return [0.0; 4];
    };

    let centroid: f64 = weights.iter().zip(frequencies).map(|(w, f)| w * f).sum();
    let moment = |order: i32| -> f64 {
        weights
            .iter()
            .zip(frequencies)
            .map(|(w, f)| w * (f - centroid).powi(order))
            .sum()
    };

    let variance = moment(2);
    if variance <= 0.0 {
        return [centroid, 0.0, 0.0, 0.0];
    }

    [
        centroid,
        variance,
        moment(3) / variance.powf(1.5),
        moment(4) / (variance * variance) - 3.0,
    ]
}

/// Local maxima of the mean spectrum (dB) that stand out from its median
fn count_peaks(spectrum_db: &[f64], threshold_db: f64) -> usize {
    if spectrum_db.len() < 3 {
        return 0;
    }

    let mut sorted = spectrum_db.to_vec();
    sorted.sort_by(f64::total_cmp);
    let floor = stats::percentile(&sorted, 50.0) + threshold_db;

    spectrum_db
        .windows(3)
        .filter(|w| w[1] > w[0] && w[1] >= w[2] && w[1] >= floor)
        .count()
}

/// Acoustic complexity index: summed relative intensity changes between frames, per bin
fn acoustic_complexity(amplitude: &[Vec<f64>], bins: usize) -> f64 {
    if amplitude.len() < 2 {
        return 0.0;
    }

    (0..bins)
        .map(|bin| {
            let total: f64 = amplitude.iter().map(|frame| frame[bin]).sum();
            let change: f64 = amplitude
                .windows(2)
                .map(|pair| (pair[1][bin] - pair[0][bin]).abs())
                .sum();
            safe_ratio(change, total)
        })
        .sum()
}

/// Time-frequency second derivative, normalized by total amplitude
fn time_frequency_second_derivative(amplitude: &[Vec<f64>], bins: usize) -> f64 {
    if amplitude.len() < 2 || bins < 2 {
        return 0.0;
    }

    let total: f64 = amplitude.iter().flatten().sum();
    let derivative: f64 = amplitude
        .windows(2)
        .map(|pair| {
            (0..bins - 1)
                .map(|f| (pair[1][f + 1] - pair[1][f] - pair[0][f + 1] + pair[0][f]).abs())
                .sum::<f64>()
        })
        .sum();

    safe_ratio(derivative, total)
}

/// Activity mask: cells exceeding the per-bin median background by `threshold_db`
fn activity_mask(level_db: &[Vec<f64>], background_db: &[f64], threshold_db: f64) -> Vec<Vec<bool>> {
    level_db
        .iter()
        .map(|frame| {
            frame
                .iter()
                .zip(background_db)
                .map(|(level, background)| *level > background + threshold_db)
                .collect()
        })
        .collect()
}

/// Lengths of runs of `true` in a sequence
fn run_lengths(values: impl Iterator<Item = bool>) -> Vec<usize> {
    let mut runs = Vec::new();
    let mut current = 0;
    for active in values {
        if active {
            current += 1;
        } else if current > 0 {
            runs.push(current);
            current = 0;
        }
    }
    if current > 0 {
        runs.push(current);
    }
    runs
}

/// Shannon entropy of the pairwise products `p[i] * p[j]` (i < j) of a distribution
fn paired_shannon(p: &[f64]) -> f64 {
    let pairs: Vec<f64> = (0..p.len())
        .flat_map(|i| (i + 1..p.len()).map(move |j| p[i] * p[j]))
        .collect();
    stats::shannon_entropy(&pairs)
}

/// Acoustic gradient index: mean rate of change of each frame's dominant frequency, in kHz/s.
/// Frames with no energy above the silence floor have a dominant frequency of 0.
fn acoustic_gradient(spec: &Spectrogram) -> f64 {
    if spec.frame_count() < 2 || spec.frame_secs <= 0.0 {
        return 0.0;
    }

    let peaks: Vec<f64> = spec
        .power
        .iter()
        .map(|frame| {
            frame
                .iter()
                .enumerate()
                .filter(|(_, p)| **p > SILENCE_FLOOR_PA2)
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(bin, _)| spec.frequencies[bin])
                .unwrap_or(0.0)
        })
        .collect();

    let gradients: Vec<f64> = peaks
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).abs() / 1000.0 / spec.frame_secs)
        .collect();
    stats::mean(&gradients)
}

/// Sizes of the 4-connected regions of `true` cells in a frame-major mask
fn region_sizes(mask: &[Vec<bool>]) -> Vec<usize> {
    let frames = mask.len();
    let bins = mask.first().map_or(0, |frame| frame.len());
    let mut visited = vec![vec![false; bins]; frames];
    let mut sizes = Vec::new();
    let mut stack = Vec::new();

    for t in 0..frames {
        for f in 0..bins {
            if !mask[t][f] || visited[t][f] {
                continue;
            }

            visited[t][f] = true;
            stack.push((t, f));
            let mut size = 0;
            while let Some((ct, cf)) = stack.pop() {
                size += 1;
                let neighbours = [
                    (ct.wrapping_sub(1), cf),
                    (ct + 1, cf),
                    (ct, cf.wrapping_sub(1)),
                    (ct, cf + 1),
                ];
                for (nt, nf) in neighbours {
                    if nt < frames && nf < bins && mask[nt][nf] && !visited[nt][nf] {
                        visited[nt][nf] = true;
                        stack.push((nt, nf));
                    }
                }
            }
            sizes.push(size);
        }
    }

    sizes
}

/// Spectral family for one channel, in `SPECTRAL_COLUMNS` order
pub fn spectral_row(
    samples: &[f64],
    sample_rate: u32,
    config: &SpectralConfig,
) -> Result<Vec<(&'static str, f64)>, MetricError> {
    config.validate().map_err(MetricError::InvalidConfig)?;
    let spectrogram = compute_spectrogram(samples, sample_rate, config.window_size, config.hop_size)?;
    let duration_secs = samples.len() as f64 / sample_rate as f64;

    let values = spectral_indices(&spectrogram, config, duration_secs);
    Ok(SPECTRAL_COLUMNS.iter().copied().zip(values).collect())
}

fn spectral_indices(spec: &Spectrogram, config: &SpectralConfig, duration_secs: f64) -> Vec<f64> {
    let frames = spec.frame_count();
    let bins = spec.bin_count();
    let bin_width_khz = spec.bin_width() / 1000.0;

    // Per-bin summaries of power and amplitude
    let mean_power: Vec<f64> = (0..bins).map(|b| spec.bin_series(b).sum::<f64>() / frames as f64).collect();
    let amplitude: Vec<Vec<f64>> = spec
        .power
        .iter()
        .map(|frame| frame.iter().map(|p| p.sqrt()).collect())
        .collect();
    let amplitude_series = |bin: usize| -> Vec<f64> { amplitude.iter().map(|frame| frame[bin]).collect() };
    let mean_amplitude: Vec<f64> = (0..bins).map(|b| stats::mean(&amplitude_series(b))).collect();
    let variance_amplitude: Vec<f64> = (0..bins).map(|b| stats::variance(&amplitude_series(b))).collect();
    let max_amplitude: Vec<f64> = (0..bins)
        .map(|b| amplitude_series(b).into_iter().fold(0.0, f64::max))
        .collect();
    let cv_amplitude: Vec<f64> = variance_amplitude
        .iter()
        .zip(&mean_amplitude)
        .map(|(var, mean)| safe_ratio(var.sqrt(), *mean))
        .collect();

    // Levels and per-bin median background
    let level_db: Vec<Vec<f64>> = spec
        .power
        .iter()
        .map(|frame| frame.iter().map(|&p| pressure_level_db(p)).collect())
        .collect();
    let background_power: Vec<f64> = (0..bins)
        .map(|b| {
            let mut series: Vec<f64> = spec.bin_series(b).collect();
            series.sort_by(f64::total_cmp);
            stats::percentile(&series, 50.0)
        })
        .collect();
    let background_db: Vec<f64> = background_power.iter().map(|&p| pressure_level_db(p)).collect();
    let mean_db: Vec<f64> = mean_power.iter().map(|&p| pressure_level_db(p)).collect();

    // Shape, level and entropy
    let shape = spectral_shape(&mean_power, &spec.frequencies);
    let nb_peaks = count_peaks(&mean_db, config.peak_threshold_db) as f64;
    let leq = pressure_level_db(mean_power.iter().sum());
    let total_energy: f64 = spec.power.iter().flatten().sum::<f64>() * spec.frame_secs;
    let enr = pressure_level_db(total_energy);
    let bgn = pressure_level_db(background_power.iter().sum());
    let snr = leq - bgn;
    let hf = stats::normalized_entropy(&mean_power);
    let eas = 1.0 - stats::normalized_entropy(&mean_amplitude);
    let ecu = 1.0 - stats::normalized_entropy(&variance_amplitude);
    let ecv = 1.0 - stats::normalized_entropy(&cv_amplitude);
    let eps = 1.0 - stats::normalized_entropy(&max_amplitude);
    let eps_kurt = stats::excess_kurtosis(&max_amplitude);
    let eps_skew = stats::skewness(&max_amplitude);

    let aci = acoustic_complexity(&amplitude, bins);

    // Soundscape band ratios
    let band_energy = |band: (f64, f64)| -> f64 { spec.band_bins(band).iter().map(|&b| mean_power[b]).sum() };
    let anthro = band_energy(config.anthrophony_band);
    let bio = band_energy(config.biophony_band);
    let ndsi = safe_ratio(bio - anthro, bio + anthro);
    let rba = safe_ratio(anthro, bio);

    let bi_bins = spec.band_bins(config.bioacoustic_band);
    let bi = match bi_bins.iter().map(|&b| mean_db[b]).reduce(f64::min) {
        Some(min_db) => bi_bins
            .iter()
            .map(|&b| (mean_db[b] - min_db) * bin_width_khz)
            .sum::<f64>(),
        None => 0.0,
    };

    let rou = mean_amplitude
        .windows(3)
        .map(|w| (w[2] - 2.0 * w[1] + w[0]).powi(2))
        .sum::<f64>();

    // Diversity bands: occupancy above the loudest cell minus the threshold
    let max_db = level_db.iter().flatten().copied().fold(f64::NEG_INFINITY, f64::max);
    let diversity_bands: Vec<Vec<usize>> = {
        let band_count = (config.diversity_max_hz / config.diversity_band_hz).ceil() as usize;
        (0..band_count)
            .map(|i| {
                let low = i as f64 * config.diversity_band_hz;
                let high = (low + config.diversity_band_hz).min(config.diversity_max_hz);
                spec.band_bins((low, high))
            })
            .filter(|bins| !bins.is_empty())
            .collect()
    };
    let occupancy: Vec<f64> = diversity_bands
        .iter()
        .map(|band| {
            let occupied = level_db
                .iter()
                .zip(&spec.power)
                .map(|(frame_db, frame_power)| {
                    band.iter()
                        .filter(|&&b| {
                            frame_power[b] > SILENCE_FLOOR_PA2
                                && frame_db[b] - max_db > config.diversity_threshold_db
                        })
                        .count()
                })
                .sum::<usize>();
            safe_ratio(occupied as f64, (band.len() * frames) as f64)
        })
        .collect();
    let adi = stats::shannon_entropy(&occupancy);
    let aei = stats::gini(&occupancy);

    // Cover of active cells in low/mid/high bands
    let mask = activity_mask(&level_db, &background_db, config.activity_threshold_db);
    let cover = |band: (f64, f64)| -> f64 {
        let band_bins = spec.band_bins(band);
        let active = mask
            .iter()
            .map(|frame| band_bins.iter().filter(|&&b| frame[b]).count())
            .sum::<usize>();
        safe_ratio(active as f64, (band_bins.len() * frames) as f64)
    };
    let lfc = cover(config.low_band);
    let mfc = cover(config.mid_band);
    let hfc = cover(config.high_band);

    // Spectral activity and events per bin
    let active_counts: Vec<f64> = (0..bins)
        .map(|b| mask.iter().filter(|frame| frame[b]).count() as f64)
        .collect();
    let act_fract = stats::mean(&active_counts) / frames as f64;
    let act_count = stats::mean(&active_counts);
    let excess: Vec<f64> = level_db
        .iter()
        .zip(&mask)
        .flat_map(|(frame_db, frame_mask)| {
            frame_db
                .iter()
                .zip(frame_mask)
                .zip(&background_db)
                .filter(|((_, &active), _)| active)
                .map(|((level, _), background)| level - background)
                .collect::<Vec<_>>()
        })
        .collect();
    let act_mean = stats::mean(&excess);

    let events: Vec<Vec<usize>> = (0..bins)
        .map(|b| {
            run_lengths(mask.iter().map(|frame| frame[b]))
                .into_iter()
                .filter(|&len| len >= config.min_event_frames)
                .collect()
        })
        .collect();
    let event_fract = stats::mean(
        &events
            .iter()
            .map(|runs| runs.iter().sum::<usize>() as f64 / frames as f64)
            .collect::<Vec<_>>(),
    );
    let event_durations: Vec<f64> = events
        .iter()
        .flatten()
        .map(|&len| len as f64 * spec.frame_secs)
        .collect();
    let event_mean = stats::mean(&event_durations);
    let event_count = safe_ratio(
        stats::mean(&events.iter().map(|runs| runs.len() as f64).collect::<Vec<_>>()),
        duration_secs,
    );

    let tfsd = time_frequency_second_derivative(&amplitude, bins);

    // Alpha entropies over the energy share of each diversity band
    let band_share: Vec<f64> = diversity_bands
        .iter()
        .map(|band| band.iter().map(|&b| mean_power[b]).sum::<f64>())
        .collect();
    let (havrda, renyi, paired, gini_simpson, raoq) = match stats::normalize(&band_share) {
        Some(p) => {
            let q = config.entropy_order;
            let sum_q: f64 = p.iter().map(|v| v.powf(q)).sum();
            let sum_sq: f64 = p.iter().map(|v| v * v).sum();
            let n = p.len();
            let rao = if n > 1 {
                let mut total = 0.0;
                for i in 0..n {
                    for j in 0..n {
                        let distance = i.abs_diff(j) as f64 / (n - 1) as f64;
                        total += distance * p[i] * p[j];
                    }
                }
                total
            } else {
                0.0
            };
            (
                (1.0 - sum_q) / (q - 1.0),
                sum_q.ln() / (1.0 - q),
                paired_shannon(&p),
                1.0 - sum_sq,
                rao,
            )
        }
        None => (0.0, 0.0, 0.0, 0.0, 0.0),
    };

    // Gamma entropy pools every (frame, diversity band) cell into one distribution
    let pooled_cells: Vec<f64> = spec
        .power
        .iter()
        .flat_map(|frame| {
            diversity_bands
                .iter()
                .map(|band| band.iter().map(|&b| frame[b]).sum::<f64>())
                .collect::<Vec<_>>()
        })
        .collect();
    let gamma = stats::shannon_entropy(&pooled_cells);

    let agi = acoustic_gradient(spec);

    // Regions of interest: connected patches of the activity mask
    let regions: Vec<usize> = region_sizes(&mask)
        .into_iter()
        .filter(|&size| size >= config.min_roi_cells)
        .collect();
    let roi_total = regions.len() as f64;
    let roi_cover = 100.0 * safe_ratio(regions.iter().sum::<usize>() as f64, (frames * bins) as f64);

    vec![
        shape[0],
        shape[1],
        shape[2],
        shape[3],
        nb_peaks,
        leq,
        enr,
        bgn,
        snr,
        hf,
        eas,
        ecu,
        ecv,
        eps,
        eps_kurt,
        eps_skew,
        aci,
        ndsi,
        rba,
        anthro,
        bio,
        bi,
        rou,
        adi,
        aei,
        lfc,
        mfc,
        hfc,
        act_fract,
        act_count,
        act_mean,
        event_fract,
        event_mean,
        event_count,
        tfsd,
        havrda,
        renyi,
        paired,
        gamma,
        gini_simpson,
        raoq,
        agi,
        roi_total,
        roi_cover,
    ]
}
