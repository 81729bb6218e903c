// Descriptive statistics shared by the metric families

/// Variance below this (relative to the squared mean) is treated as zero
const DEGENERATE_VARIANCE: f64 = 1e-12;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

fn central_moment(values: &[f64], m: f64, order: i32) -> f64 {
    values.iter().map(|v| (v - m).powi(order)).sum::<f64>() / values.len() as f64
}

fn is_degenerate(m2: f64, m: f64) -> bool {
    m2 <= DEGENERATE_VARIANCE * (1.0 + m * m)
}

/// Biased sample skewness; 0 for constant input
pub fn skewness(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let m2 = central_moment(values, m, 2);
    if is_degenerate(m2, m) {
        return 0.0;
    }
    central_moment(values, m, 3) / m2.powf(1.5)
}

/// Biased excess (Fisher) kurtosis; 0 for constant input
pub fn excess_kurtosis(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let m2 = central_moment(values, m, 2);
    if is_degenerate(m2, m) {
        return 0.0;
    }
    central_moment(values, m, 4) / (m2 * m2) - 3.0
}

/// Percentile with linear interpolation between closest ranks.
/// `sorted` must be ascending; `q` is in [0, 100].
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let position = (q.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
            let lower = position.floor() as usize;
            let upper = position.ceil() as usize;
            let fraction = position - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
        }
    }
}

/// Normalize non-negative weights into a probability distribution
pub fn normalize(weights: &[f64]) -> Option<Vec<f64>> {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return None;
    }
    Some(weights.iter().map(|w| w / total).collect())
}

/// Shannon entropy (natural log) of non-negative weights
pub fn shannon_entropy(weights: &[f64]) -> f64 {
    match normalize(weights) {
        Some(p) => -p.iter().filter(|&&v| v > 0.0).map(|v| v * v.ln()).sum::<f64>(),
        None => 0.0,
    }
}

/// Shannon entropy divided by its maximum, in [0, 1]
pub fn normalized_entropy(weights: &[f64]) -> f64 {
    if weights.len() < 2 {
        return 0.0;
    }
    shannon_entropy(weights) / (weights.len() as f64).ln()
}

/// Gini coefficient of non-negative values
pub fn gini(values: &[f64]) -> f64 {
    let n = values.len();
    let total: f64 = values.iter().sum();
    if n < 2 || total <= 0.0 {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let weighted: f64 = sorted
        .iter()
        .enumerate()
        .map(|(i, v)| (2.0 * (i + 1) as f64 - n as f64 - 1.0) * v)
        .sum();

    weighted / (n as f64 * total)
}
