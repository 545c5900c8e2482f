//! Gaussian peak location on a phase histogram.

use mkid_core::quality::BadReason;
use serde::{Deserialize, Serialize};

use crate::histogram::PhaseHistogram;

/// Variance of a unit Gaussian truncated to +/-3 sigma.
const TRUNCATED_VARIANCE: f64 = 0.973_336_924;
const WINDOW_SIGMAS: f64 = 3.0;
const MAX_ITERATIONS: usize = 50;
const CONVERGENCE: f64 = 1e-9;

/// Fitted Gaussian laser-line peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    /// Peak centre in phase units.
    pub centroid: f64,
    /// Gaussian width in phase units.
    pub sigma: f64,
    /// Standard error of the centroid, `sigma / sqrt(n)`.
    pub uncertainty: f64,
    /// Photons inside the final +/-3 sigma window.
    pub counts: u64,
}

/// Initial centre and width from a log-parabola through the tallest bin
/// and its neighbours.
fn log_parabola_guess(histogram: &PhaseHistogram) -> Option<(f64, f64)> {
    let k = histogram.tallest()?;
    let centers = histogram.centers();
    let width = histogram.bin_width;
    if k == 0 || k + 1 >= histogram.counts.len() {
        return Some((centers[k], width));
    }
    let ln_left = (histogram.counts[k - 1] as f64).max(0.5).ln();
    let ln_center = (histogram.counts[k] as f64).max(0.5).ln();
    let ln_right = (histogram.counts[k + 1] as f64).max(0.5).ln();
    let curvature = ln_left - 2.0 * ln_center + ln_right;
    if curvature >= -1e-12 {
        return Some((centers[k], width));
    }
    let delta = 0.5 * (ln_left - ln_right) / curvature;
    let sigma = (-1.0 / curvature).sqrt() * width;
    Some((centers[k] + delta * width, sigma.max(width * 0.5)))
}

/// Locates the dominant Gaussian peak among `phases`.
///
/// The log-parabola guess is refined by iterated windowed moments until the
/// centroid moves less than `1e-9` bin widths.
pub fn fit_peak(
    phases: &[f64],
    histogram: &PhaseHistogram,
    min_counts: u32,
) -> Result<Peak, BadReason> {
    if phases.len() < min_counts as usize {
        return Err(BadReason::LowCounts);
    }
    let (mut centroid, mut sigma) =
        log_parabola_guess(histogram).ok_or(BadReason::PeakNotConverged)?;
    let tolerance = CONVERGENCE * histogram.bin_width;

    for _ in 0..MAX_ITERATIONS {
        let lo = centroid - WINDOW_SIGMAS * sigma;
        let hi = centroid + WINDOW_SIGMAS * sigma;
        let window: Vec<f64> = phases
            .iter()
            .copied()
            .filter(|&p| p >= lo && p <= hi)
            .collect();
        if window.len() < 2 {
            return Err(BadReason::PeakNotConverged);
        }
        let n = window.len() as f64;
        let mean = window.iter().sum::<f64>() / n;
        let var = window.iter().map(|p| (p - mean) * (p - mean)).sum::<f64>() / (n - 1.0);
        let next_sigma = (var / TRUNCATED_VARIANCE).sqrt();
        if !(next_sigma.is_finite() && next_sigma > 0.0) {
            return Err(BadReason::PeakNotConverged);
        }
        let shift = (mean - centroid).abs();
        centroid = mean;
        sigma = next_sigma;
        if shift < tolerance {
            if window.len() < min_counts as usize {
                return Err(BadReason::LowCounts);
            }
            return Ok(Peak {
                centroid,
                sigma,
                uncertainty: sigma / n.sqrt(),
                counts: window.len() as u64,
            });
        }
    }
    Err(BadReason::PeakNotConverged)
}
