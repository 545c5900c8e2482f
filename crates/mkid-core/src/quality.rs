//! Tagged per-pixel fit outcomes.
//!
//! A pixel that cannot be calibrated is a normal value here, never an
//! error: the run carries on and the reason lands in the solution body.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Why a pixel has no usable calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadReason {
    /// No samples were recorded for the pixel.
    NoData,
    /// Count rate above the configured ceiling.
    HotPixel,
    /// Fewer than two usable laser-line peaks.
    InsufficientLines,
    /// A laser-line peak holds fewer photons than the configured minimum.
    LowCounts,
    /// Peak search did not settle on a centroid.
    PeakNotConverged,
    /// Model derivative changes sign over the usable phase range.
    NotMonotonic,
    /// Reduced chi-squared above the configured threshold.
    PoorFit,
    /// Model predicts a non-positive energy inside the usable range.
    NonPositiveEnergy,
    /// Overall flat count rate above the configured cutoff.
    RateCutoff,
    /// Nothing left to average after chunking and trimming.
    NoValidChunks,
}

/// Per-pixel result: either a fitted payload or a reason it is unusable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PixelFit<T> {
    /// Usable calibration.
    Fit(T),
    /// Pixel flagged bad.
    Bad {
        /// Failure reason.
        reason: BadReason,
    },
}

impl<T> PixelFit<T> {
    /// Shorthand for a bad pixel.
    pub fn bad(reason: BadReason) -> Self {
        PixelFit::Bad { reason }
    }

    /// Fitted payload when the pixel is usable.
    pub fn fit(&self) -> Option<&T> {
        match self {
            PixelFit::Fit(value) => Some(value),
            PixelFit::Bad { .. } => None,
        }
    }

    /// Failure reason when the pixel is bad.
    pub fn reason(&self) -> Option<BadReason> {
        match self {
            PixelFit::Fit(_) => None,
            PixelFit::Bad { reason } => Some(*reason),
        }
    }

    /// Whether the pixel is usable.
    pub fn is_fit(&self) -> bool {
        matches!(self, PixelFit::Fit(_))
    }
}

/// Counts of usable and bad pixels in a solution body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct QualitySummary {
    /// Pixels with a usable calibration.
    pub fit: usize,
    /// Pixels flagged bad.
    pub bad: usize,
    /// Bad pixels broken down by reason.
    pub by_reason: BTreeMap<BadReason, usize>,
}

impl QualitySummary {
    /// Tallies a pixel-indexed outcome slice.
    pub fn from_pixels<T>(pixels: &[PixelFit<T>]) -> Self {
        let mut summary = Self::default();
        for pixel in pixels {
            match pixel.reason() {
                None => summary.fit += 1,
                Some(reason) => {
                    summary.bad += 1;
                    *summary.by_reason.entry(reason).or_default() += 1;
                }
            }
        }
        summary
    }
}
