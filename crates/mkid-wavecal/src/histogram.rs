//! Photon pre-processing and adaptive phase histograms.

use serde::{Deserialize, Serialize};

/// Tallest-bin count the adaptive binning aims for.
pub const TARGET_PEAK_COUNTS: u64 = 400;
/// Histogram builds attempted before settling for the last one.
pub const HISTOGRAM_ATTEMPTS: usize = 3;
/// Most bins a single histogram may hold.
pub const MAX_HISTOGRAM_BINS: usize = 1 << 16;

/// Drops tail-riding photons and keeps only negative phases.
///
/// Photons are ordered by arrival time first; a photon arriving less than
/// `dead_time` after its predecessor is discarded.
pub fn clean_phases(times: &[f64], phases: &[f64], dead_time: f64) -> Vec<f64> {
    let mut photons: Vec<(f64, f64)> = times
        .iter()
        .copied()
        .zip(phases.iter().copied())
        .filter(|(t, p)| t.is_finite() && p.is_finite())
        .collect();
    photons.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));

    let mut kept = Vec::with_capacity(photons.len());
    let mut previous: Option<f64> = None;
    for (time, phase) in photons {
        let riding = previous.map_or(false, |prev| time - prev < dead_time);
        previous = Some(time);
        if !riding && phase < 0.0 {
            kept.push(phase);
        }
    }
    kept
}

/// Phase histogram with ascending edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseHistogram {
    /// Bin edges, one more than `counts`.
    pub edges: Vec<f64>,
    /// Photons per bin.
    pub counts: Vec<u64>,
    /// Width of every bin.
    pub bin_width: f64,
}

impl PhaseHistogram {
    /// Bins `phases` with edges stepping down from the largest phase.
    ///
    /// Returns `None` for empty input, or when the phase span would need
    /// more than [`MAX_HISTOGRAM_BINS`] bins.
    pub fn build(phases: &[f64], bin_width: f64) -> Option<Self> {
        if phases.is_empty() || !(bin_width > 0.0) {
            return None;
        }
        let max = phases.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = phases.iter().copied().fold(f64::INFINITY, f64::min);
        let span = ((max - min) / bin_width).floor();
        if !(span.is_finite() && span < MAX_HISTOGRAM_BINS as f64) {
            return None;
        }
        let nbins = span as usize + 1;
        let edges: Vec<f64> = (0..=nbins)
            .map(|k| max - (nbins - k) as f64 * bin_width)
            .collect();
        let mut counts = vec![0u64; nbins];
        for &phase in phases {
            let from_top = ((max - phase) / bin_width).floor() as usize;
            let bin = nbins - 1 - from_top.min(nbins - 1);
            counts[bin] += 1;
        }
        Some(Self {
            edges,
            counts,
            bin_width,
        })
    }

    /// Builds a histogram, doubling the bin width while the tallest bin
    /// stays below [`TARGET_PEAK_COUNTS`].
    pub fn adaptive(phases: &[f64], bin_width: f64) -> Option<Self> {
        let mut width = bin_width;
        let mut histogram = Self::build(phases, width)?;
        for _ in 1..HISTOGRAM_ATTEMPTS {
            if histogram.max_count() >= TARGET_PEAK_COUNTS {
                break;
            }
            width *= 2.0;
            histogram = Self::build(phases, width)?;
        }
        Some(histogram)
    }

    /// Bin centres.
    pub fn centers(&self) -> Vec<f64> {
        self.edges
            .windows(2)
            .map(|pair| 0.5 * (pair[0] + pair[1]))
            .collect()
    }

    /// Poisson maximum-likelihood variance per bin, `sqrt(c^2 + 1/4) - 1/2`.
    pub fn variance(&self) -> Vec<f64> {
        self.counts
            .iter()
            .map(|&c| {
                let c = c as f64;
                (c * c + 0.25).sqrt() - 0.5
            })
            .collect()
    }

    /// Largest bin count.
    pub fn max_count(&self) -> u64 {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    /// Index of the tallest bin; ties resolve to the highest phase.
    pub fn tallest(&self) -> Option<usize> {
        self.counts
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.cmp(b.1).then(a.0.cmp(&b.0)))
            .map(|(idx, _)| idx)
    }
}
