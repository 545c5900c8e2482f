//! Phase to energy calibration model.

use mkid_core::quality::BadReason;
use serde::{Deserialize, Serialize};

use crate::peak::Peak;

/// Planck constant times the speed of light in eV nm.
pub const HC_EV_NM: f64 = 1239.841984;
/// Gaussian full width at half maximum in units of sigma.
pub const FWHM_PER_SIGMA: f64 = 2.354_820_045;
const VARIANCE_FLOOR: f64 = 1e-30;

/// Photon energy in eV for a wavelength in nm.
pub fn energy_of(wavelength_nm: f64) -> f64 {
    HC_EV_NM / wavelength_nm
}

/// One laser-line peak used by a pixel model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinePeak {
    /// Laser wavelength in nm.
    pub wavelength: f64,
    /// Fitted Gaussian peak.
    pub peak: Peak,
    /// `E / dE_fwhm` at the line; reported only.
    pub resolving_power: f64,
}

/// Polynomial energy model `E(phase) = sum c_i phase^i` for one pixel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelModel {
    /// Polynomial coefficients, constant term first.
    pub coefficients: Vec<f64>,
    /// Usable phase interval `[low, high]`.
    pub phase_range: [f64; 2],
    /// Reduced chi-squared of the fit, 0 without spare degrees of freedom.
    pub reduced_chi2: f64,
    /// Peaks the model was fitted through, ordered by wavelength.
    pub lines: Vec<LinePeak>,
}

impl PixelModel {
    /// Energy in eV at `phase`.
    pub fn energy(&self, phase: f64) -> f64 {
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, c| acc * phase + c)
    }

    /// Slope `dE/dphase` at `phase`.
    pub fn slope(&self, phase: f64) -> f64 {
        self.coefficients
            .iter()
            .enumerate()
            .skip(1)
            .rev()
            .fold(0.0, |acc, (power, c)| acc * phase + power as f64 * c)
    }

    /// Wavelength in nm for a raw phase, `None` where the model yields no
    /// positive energy.
    pub fn wavelength(&self, phase: f64) -> Option<f64> {
        let energy = self.energy(phase);
        if energy.is_finite() && energy > 0.0 {
            Some(HC_EV_NM / energy)
        } else {
            None
        }
    }

    /// Raw phase inside the usable range that maps to `wavelength_nm`.
    pub fn phase_at(&self, wavelength_nm: f64) -> Option<f64> {
        let target = energy_of(wavelength_nm);
        let [mut lo, mut hi] = self.phase_range;
        let mut f_lo = self.energy(lo) - target;
        let f_hi = self.energy(hi) - target;
        if f_lo == 0.0 {
            return Some(lo);
        }
        if f_hi == 0.0 {
            return Some(hi);
        }
        if f_lo.signum() == f_hi.signum() {
            return None;
        }
        for _ in 0..200 {
            let mid = 0.5 * (lo + hi);
            let f_mid = self.energy(mid) - target;
            if f_mid == 0.0 || hi - lo <= f64::EPSILON * mid.abs().max(1.0) {
                return Some(mid);
            }
            if f_mid.signum() == f_lo.signum() {
                lo = mid;
                f_lo = f_mid;
            } else {
                hi = mid;
            }
        }
        Some(0.5 * (lo + hi))
    }
}

/// Weighted least-squares polynomial fit of `ys` against `xs`.
///
/// Solves the normal equations with partial pivoting; `None` when the
/// system is singular.
pub fn weighted_polyfit(xs: &[f64], ys: &[f64], weights: &[f64], order: usize) -> Option<Vec<f64>> {
    let n = order + 1;
    if xs.len() < n {
        return None;
    }
    let mut matrix = vec![vec![0.0; n + 1]; n];
    for ((&x, &y), &w) in xs.iter().zip(ys).zip(weights) {
        let powers: Vec<f64> = (0..2 * n).map(|p| x.powi(p as i32)).collect();
        for row in 0..n {
            for col in 0..n {
                matrix[row][col] += w * powers[row + col];
            }
            matrix[row][n] += w * y * powers[row];
        }
    }

    for pivot in 0..n {
        let best = (pivot..n).max_by(|&a, &b| {
            matrix[a][pivot]
                .abs()
                .total_cmp(&matrix[b][pivot].abs())
        })?;
        if matrix[best][pivot].abs() < 1e-300 {
            return None;
        }
        matrix.swap(pivot, best);
        for row in 0..n {
            if row == pivot {
                continue;
            }
            let factor = matrix[row][pivot] / matrix[pivot][pivot];
            for col in pivot..=n {
                matrix[row][col] -= factor * matrix[pivot][col];
            }
        }
    }
    let coefficients: Vec<f64> = (0..n).map(|row| matrix[row][n] / matrix[row][row]).collect();
    coefficients
        .iter()
        .all(|c| c.is_finite())
        .then_some(coefficients)
}

/// Fits the energy model through the given peaks and vets it.
///
/// Peaks must be ordered by wavelength. The order is capped at one less
/// than the number of peaks; a first pass weighted by centroid variance is
/// refined once with the variance propagated into energy.
pub fn fit_model(
    peaks: &[(f64, Peak)],
    model_order: u8,
    max_reduced_chi2: f64,
) -> Result<PixelModel, BadReason> {
    if peaks.len() < 2 {
        return Err(BadReason::InsufficientLines);
    }
    let order = (model_order as usize).min(peaks.len() - 1).max(1);
    let phases: Vec<f64> = peaks.iter().map(|(_, peak)| peak.centroid).collect();
    let energies: Vec<f64> = peaks.iter().map(|(wl, _)| energy_of(*wl)).collect();
    let phase_var: Vec<f64> = peaks
        .iter()
        .map(|(_, peak)| (peak.uncertainty * peak.uncertainty).max(VARIANCE_FLOOR))
        .collect();

    let first_weights: Vec<f64> = phase_var.iter().map(|v| 1.0 / v).collect();
    let first = weighted_polyfit(&phases, &energies, &first_weights, order)
        .ok_or(BadReason::PoorFit)?;
    let trial = PixelModel {
        coefficients: first,
        phase_range: [0.0, 0.0],
        reduced_chi2: 0.0,
        lines: Vec::new(),
    };
    let energy_var: Vec<f64> = phases
        .iter()
        .zip(&phase_var)
        .map(|(&phase, &var)| {
            let slope = trial.slope(phase);
            (slope * slope * var).max(VARIANCE_FLOOR)
        })
        .collect();
    let weights: Vec<f64> = energy_var.iter().map(|v| 1.0 / v).collect();
    let coefficients =
        weighted_polyfit(&phases, &energies, &weights, order).ok_or(BadReason::PoorFit)?;

    let (low_idx, high_idx) = extreme_indices(&phases);
    let low = peaks[low_idx].1.centroid - 3.0 * peaks[low_idx].1.sigma;
    let high = peaks[high_idx].1.centroid + 3.0 * peaks[high_idx].1.sigma;

    let mut model = PixelModel {
        coefficients,
        phase_range: [low, high],
        reduced_chi2: 0.0,
        lines: Vec::new(),
    };

    let slope_low = model.slope(low);
    let slope_high = model.slope(high);
    if slope_low == 0.0 || slope_high == 0.0 || slope_low.signum() != slope_high.signum() {
        return Err(BadReason::NotMonotonic);
    }
    if !(model.energy(low) > 0.0 && model.energy(high) > 0.0) {
        return Err(BadReason::NonPositiveEnergy);
    }

    let chi2: f64 = phases
        .iter()
        .zip(&energies)
        .zip(&energy_var)
        .map(|((&phase, &energy), &var)| {
            let residual = energy - model.energy(phase);
            residual * residual / var
        })
        .sum();
    let dof = peaks.len().saturating_sub(order + 1);
    model.reduced_chi2 = if dof == 0 { 0.0 } else { chi2 / dof as f64 };
    if !model.reduced_chi2.is_finite() || model.reduced_chi2 > max_reduced_chi2 {
        return Err(BadReason::PoorFit);
    }

    model.lines = peaks
        .iter()
        .map(|&(wavelength, peak)| {
            let energy = energy_of(wavelength);
            let fwhm = model.slope(peak.centroid).abs() * FWHM_PER_SIGMA * peak.sigma;
            LinePeak {
                wavelength,
                peak,
                resolving_power: if fwhm > 0.0 { energy / fwhm } else { 0.0 },
            }
        })
        .collect();
    Ok(model)
}

fn extreme_indices(values: &[f64]) -> (usize, usize) {
    let mut low = 0;
    let mut high = 0;
    for (idx, value) in values.iter().enumerate() {
        if *value < values[low] {
            low = idx;
        }
        if *value > values[high] {
            high = idx;
        }
    }
    (low, high)
}
