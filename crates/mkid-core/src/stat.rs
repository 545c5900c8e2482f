//! Small order-statistics helpers shared by the fitters.

/// Sorts a copy of the finite values in ascending order.
pub fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Linearly interpolated percentile of an ascending slice; NaN when empty.
pub fn percentile(sorted: &[f64], quantile: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let position = quantile.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let weight = position - lower as f64;
        sorted[lower] * (1.0 - weight) + sorted[upper] * weight
    }
}

/// Median of the finite values; NaN when there are none.
pub fn median(values: &[f64]) -> f64 {
    percentile(&sorted_finite(values), 0.5)
}

/// Mean after dropping `floor(n * fraction)` values from each end.
///
/// Returns `None` when nothing is left to average.
pub fn trimmed_mean(values: &[f64], fraction: f64) -> Option<f64> {
    let sorted = sorted_finite(values);
    let cut = trim_cut(sorted.len(), fraction);
    if 2 * cut >= sorted.len() {
        return None;
    }
    let kept = &sorted[cut..sorted.len() - cut];
    Some(kept.iter().sum::<f64>() / kept.len() as f64)
}

/// Values [`trimmed_mean`] drops from each end of `n` finite values.
pub fn trim_cut(n: usize, fraction: f64) -> usize {
    (n as f64 * fraction.max(0.0)).floor() as usize
}
