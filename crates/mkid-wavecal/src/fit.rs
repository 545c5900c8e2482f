//! Per-pixel wavelength calibration and the array-wide fit driver.

use mkid_core::config::WavecalFitKey;
use mkid_core::errors::{ErrorInfo, MkidError};
use mkid_core::photon::PixelId;
use mkid_core::provider::{LineSamples, PixelPhases};
use mkid_core::quality::{BadReason, PixelFit, QualitySummary};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::histogram::{clean_phases, PhaseHistogram};
use crate::model::{fit_model, PixelModel};
use crate::peak::{fit_peak, Peak};

/// Solution body of a wavelength calibration, indexed by pixel id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WavecalBody {
    /// One entry per pixel of the array.
    pub pixels: Vec<PixelFit<PixelModel>>,
}

impl WavecalBody {
    /// Model for `pixel`, if it is usable.
    pub fn model(&self, pixel: PixelId) -> Option<&PixelModel> {
        self.pixels.get(pixel.index()).and_then(PixelFit::fit)
    }

    /// Outcome for `pixel`; pixels beyond the array count as missing data.
    pub fn outcome(&self, pixel: PixelId) -> PixelFit<&PixelModel> {
        match self.pixels.get(pixel.index()) {
            Some(PixelFit::Fit(model)) => PixelFit::Fit(model),
            Some(PixelFit::Bad { reason }) => PixelFit::bad(*reason),
            None => PixelFit::bad(BadReason::NoData),
        }
    }

    /// Usable and bad pixel tallies.
    pub fn summary(&self) -> QualitySummary {
        QualitySummary::from_pixels(&self.pixels)
    }
}

fn line_peak(line: &LineSamples, key: &WavecalFitKey) -> Result<Peak, BadReason> {
    let phases = clean_phases(&line.times, &line.phases, key.dead_time);
    if phases.is_empty() {
        return Err(BadReason::NoData);
    }
    if line.exposure > 0.0 && line.phases.len() as f64 / line.exposure > key.max_count_rate {
        return Err(BadReason::HotPixel);
    }
    let histogram =
        PhaseHistogram::adaptive(&phases, key.bin_width).ok_or(BadReason::PeakNotConverged)?;
    fit_peak(&phases, &histogram, key.min_peak_counts)
}

/// Fits one pixel. Never fails: an unusable pixel comes back tagged.
pub fn fit_pixel(samples: &PixelPhases, key: &WavecalFitKey) -> PixelFit<PixelModel> {
    let mut lines: Vec<&LineSamples> = samples.lines.iter().collect();
    lines.sort_by(|a, b| a.wavelength.total_cmp(&b.wavelength));
    if lines.is_empty() {
        return PixelFit::bad(BadReason::NoData);
    }

    let mut peaks = Vec::with_capacity(lines.len());
    let mut failures = Vec::new();
    for line in &lines {
        match line_peak(line, key) {
            Ok(peak) => peaks.push((line.wavelength, peak)),
            Err(reason) => failures.push(reason),
        }
    }

    if peaks.len() < 2 {
        let reason = if lines.len() < 2 {
            BadReason::InsufficientLines
        } else if failures.contains(&BadReason::PeakNotConverged) {
            BadReason::PeakNotConverged
        } else if failures.contains(&BadReason::HotPixel) {
            BadReason::HotPixel
        } else if failures.contains(&BadReason::LowCounts) {
            BadReason::LowCounts
        } else if failures.iter().all(|r| *r == BadReason::NoData) {
            BadReason::NoData
        } else {
            BadReason::InsufficientLines
        };
        return PixelFit::bad(reason);
    }

    match fit_model(&peaks, key.model_order, key.max_reduced_chi2) {
        Ok(model) => PixelFit::Fit(model),
        Err(reason) => PixelFit::bad(reason),
    }
}

/// Fits every pixel of an `n_pixels` array on a pool of `ncpu` workers.
///
/// Pixels absent from `phases` are tagged [`BadReason::NoData`]. The body
/// is indexed by pixel id whatever order the workers finish in.
pub fn fit_wavecal(
    phases: &[PixelPhases],
    n_pixels: u32,
    key: &WavecalFitKey,
    ncpu: usize,
) -> Result<WavecalBody, MkidError> {
    if let Some(stray) = phases.iter().find(|p| p.pixel.as_raw() >= n_pixels) {
        return Err(MkidError::Fit(
            ErrorInfo::new("wavecal.pixel_range", "samples reference a pixel outside the array")
                .with_context("pixel", stray.pixel.as_raw().to_string())
                .with_context("n_pixels", n_pixels.to_string()),
        ));
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(ncpu)
        .build()
        .map_err(|err| MkidError::Fit(ErrorInfo::new("wavecal.thread_pool", err.to_string())))?;

    let mut fitted: Vec<(PixelId, PixelFit<PixelModel>)> = pool.install(|| {
        phases
            .par_iter()
            .map(|samples| (samples.pixel, fit_pixel(samples, key)))
            .collect()
    });
    fitted.sort_by_key(|(pixel, _)| *pixel);

    let mut pixels = vec![PixelFit::bad(BadReason::NoData); n_pixels as usize];
    for (pixel, outcome) in fitted {
        if let Some(reason) = outcome.reason() {
            debug!(pixel = pixel.as_raw(), ?reason, "wavecal pixel flagged bad");
        }
        pixels[pixel.index()] = outcome;
    }

    let body = WavecalBody { pixels };
    let summary = body.summary();
    info!(
        fit = summary.fit,
        bad = summary.bad,
        "wavelength calibration fitted"
    );
    Ok(body)
}
