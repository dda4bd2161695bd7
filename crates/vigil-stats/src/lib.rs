//! History primitives and robust statistics for streaming detection.
//!
//! Everything in this crate is plain owned data. Buffers and trackers are
//! meant to live inside a per-player context that is mutated by exactly one
//! ingest owner at a time; nothing here synchronizes internally.

pub use ewma::Ewma;
pub use ring::RingBuffer;
pub use window::RollingWindow;

mod ewma;
mod ring;
mod window;

/// Median of the values. Returns 0.0 for an empty slice.
#[must_use]
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        f64::midpoint(sorted[mid - 1], sorted[mid])
    } else {
        sorted[mid]
    }
}

/// Median absolute deviation, a dispersion measure that ignores outliers.
#[must_use]
pub fn mad(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let center = median(values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}

/// Arithmetic mean. Returns 0.0 for an empty slice.
#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Bessel-corrected sample standard deviation. Returns 0.0 below two
/// samples.
#[must_use]
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let center = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - center).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

/// Clamps a confidence into `[0, 1]`. NaN maps to 0.
#[must_use]
pub fn bound_confidence(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Maps a non-negative anomaly score onto `[0, 1)` through a sigmoid.
///
/// `scale` sets how much accumulated evidence the curve demands; the
/// output only approaches 1 as `score / scale` grows past ~6. Non-positive
/// or NaN inputs map to 0 so under-evidenced checks stay silent.
#[must_use]
pub fn anomaly_to_confidence(score: f64, scale: f64) -> f64 {
    if score.is_nan() || scale.is_nan() || score <= 0.0 || scale <= 0.0 {
        return 0.0;
    }
    2.0 / (1.0 + (-score / scale).exp()) - 1.0
}

/// Maximum-confidence fusion. Never drops below 0.
#[must_use]
pub fn fuse_max(confidences: &[f64]) -> f64 {
    confidences.iter().copied().fold(0.0, f64::max)
}

/// Weighted-average fusion. Returns 0.0 on a length mismatch or when the
/// total weight is not positive.
#[must_use]
pub fn fuse_weighted(confidences: &[f64], weights: &[f64]) -> f64 {
    if confidences.len() != weights.len() {
        return 0.0;
    }
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let weighted: f64 = confidences
        .iter()
        .zip(weights)
        .map(|(c, w)| c * w)
        .sum();
    bound_confidence(weighted / total)
}
