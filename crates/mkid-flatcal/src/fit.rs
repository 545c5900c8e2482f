//! Flat-field weight fitting and lookup.

use mkid_core::config::{FlatcalFitKey, InstrumentConfig};
use mkid_core::dataset::TimeRange;
use mkid_core::errors::{ErrorInfo, MkidError};
use mkid_core::photon::{PhotonFlags, PhotonRecord, PhotonTable, PixelId};
use mkid_core::quality::{BadReason, PixelFit, QualitySummary};
use mkid_core::stat::{median, trim_cut, trimmed_mean};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bins::{BinLookup, WavelengthBins};
use crate::chunks::{chunk_of, partition};

/// Trimmed rates and weights for one pixel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelWeights {
    /// Trimmed-mean count rate per bin (cps).
    pub rates: Vec<f64>,
    /// Weight per bin; `None` where the pixel saw nothing in the bin.
    pub weights: Vec<Option<f64>>,
    /// Poisson uncertainty of each weight, `weight / sqrt(counts)` over the
    /// chunks that survived trimming. The reference rate is taken as exact.
    pub weight_errors: Vec<Option<f64>>,
    /// Chunks in which the pixel recorded at least one photon.
    pub valid_chunks: usize,
}

/// Why a record could not receive a flat weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightMiss {
    /// Pixel flagged bad in the solution.
    BadPixel,
    /// Wavelength below the binned band.
    BelowRange,
    /// Wavelength above the binned band.
    AboveRange,
    /// Pixel is usable but the bin has no weight.
    Undefined,
}

impl WeightMiss {
    /// Record flags describing the miss.
    pub fn flags(&self) -> PhotonFlags {
        match self {
            WeightMiss::BadPixel | WeightMiss::Undefined => {
                PhotonFlags::UNCALIBRATED | PhotonFlags::FLATCAL_BAD
            }
            WeightMiss::BelowRange => PhotonFlags::UNCALIBRATED | PhotonFlags::BELOW_RANGE,
            WeightMiss::AboveRange => PhotonFlags::UNCALIBRATED | PhotonFlags::ABOVE_RANGE,
        }
    }
}

/// Solution body of a flat-field calibration, indexed by pixel id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatcalBody {
    /// Wavelength binning shared by every pixel.
    pub bins: WavelengthBins,
    /// Array reference rate per bin (median over usable pixels).
    pub reference_rates: Vec<Option<f64>>,
    /// One entry per pixel of the array.
    pub pixels: Vec<PixelFit<PixelWeights>>,
}

impl FlatcalBody {
    /// Weight for a photon of `wavelength` nm seen by `pixel`.
    pub fn weight(&self, pixel: PixelId, wavelength: f64) -> Result<f64, WeightMiss> {
        let weights = match self.pixels.get(pixel.index()) {
            Some(PixelFit::Fit(weights)) => weights,
            _ => return Err(WeightMiss::BadPixel),
        };
        let bin = match self.bins.lookup(wavelength) {
            BinLookup::Bin(bin) => bin,
            BinLookup::Below => return Err(WeightMiss::BelowRange),
            BinLookup::Above => return Err(WeightMiss::AboveRange),
        };
        weights
            .weights
            .get(bin)
            .copied()
            .flatten()
            .ok_or(WeightMiss::Undefined)
    }

    /// Usable and bad pixel tallies.
    pub fn summary(&self) -> QualitySummary {
        QualitySummary::from_pixels(&self.pixels)
    }
}

struct PixelRates {
    rates: Vec<f64>,
    kept_counts: Vec<f64>,
    valid_chunks: usize,
}

fn pixel_rates(
    records: &[&PhotonRecord],
    chunks: &[TimeRange],
    bins: &WavelengthBins,
    key: &FlatcalFitKey,
) -> PixelFit<PixelRates> {
    let mut counts = vec![vec![0u64; bins.count]; chunks.len()];
    let mut seen = vec![false; chunks.len()];
    let mut total = 0u64;
    for record in records {
        let Some(chunk) = chunk_of(chunks, record.time) else {
            continue;
        };
        total += 1;
        seen[chunk] = true;
        if let BinLookup::Bin(bin) = bins.lookup(record.wavelength) {
            counts[chunk][bin] += 1;
        }
    }

    let live_time = chunks.len() as f64 * key.chunk_time;
    if key.rate_cutoff > 0.0 && live_time > 0.0 && total as f64 / live_time > key.rate_cutoff {
        return PixelFit::bad(BadReason::RateCutoff);
    }

    let valid: Vec<usize> = (0..chunks.len()).filter(|&k| seen[k]).collect();
    if valid.is_empty() {
        return PixelFit::bad(BadReason::NoValidChunks);
    }
    let kept_chunks = valid
        .len()
        .saturating_sub(2 * trim_cut(valid.len(), key.trim_fraction));
    let kept_time = kept_chunks as f64 * key.chunk_time;
    let mut rates = Vec::with_capacity(bins.count);
    let mut kept_counts = Vec::with_capacity(bins.count);
    for bin in 0..bins.count {
        let chunk_rates: Vec<f64> = valid
            .iter()
            .map(|&k| counts[k][bin] as f64 / key.chunk_time)
            .collect();
        match trimmed_mean(&chunk_rates, key.trim_fraction) {
            Some(rate) => {
                rates.push(rate);
                kept_counts.push(rate * kept_time);
            }
            None => return PixelFit::bad(BadReason::NoValidChunks),
        }
    }
    PixelFit::Fit(PixelRates {
        rates,
        kept_counts,
        valid_chunks: valid.len(),
    })
}

/// Fits flat weights from a wavelength-calibrated flat exposure.
///
/// `coverage` is chunked independently per interval. Records already
/// flagged uncalibrated are ignored. A table that has not been through a
/// wavelength calibration is rejected.
pub fn fit_flatcal(
    table: &PhotonTable,
    coverage: &[TimeRange],
    instrument: &InstrumentConfig,
    key: &FlatcalFitKey,
    ncpu: usize,
) -> Result<FlatcalBody, MkidError> {
    if !table.header.wavelength_calibrated {
        return Err(MkidError::DataUnavailable(
            ErrorInfo::new(
                "flatcal.uncalibrated_input",
                "flat exposure must be wavelength calibrated first",
            )
            .with_context("dataset", table.header.dataset.clone())
            .with_hint("fetch and apply a wavecal solution to the flat table"),
        ));
    }
    let bins = WavelengthBins::for_instrument(instrument, key.wavelength_bin_width)?;
    let chunks = partition(coverage, key.chunk_time);
    let n_pixels = instrument.n_pixels() as usize;

    let mut by_pixel: Vec<Vec<&PhotonRecord>> = vec![Vec::new(); n_pixels];
    for record in &table.records {
        if record.flags().contains(PhotonFlags::UNCALIBRATED) {
            continue;
        }
        if let Some(slot) = by_pixel.get_mut(record.pixel.index()) {
            slot.push(record);
        }
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(ncpu)
        .build()
        .map_err(|err| MkidError::Fit(ErrorInfo::new("flatcal.thread_pool", err.to_string())))?;
    let rates: Vec<PixelFit<PixelRates>> = pool.install(|| {
        by_pixel
            .par_iter()
            .map(|records| pixel_rates(records, &chunks, &bins, key))
            .collect()
    });

    let reference_rates: Vec<Option<f64>> = (0..bins.count)
        .map(|bin| {
            let positive: Vec<f64> = rates
                .iter()
                .filter_map(PixelFit::fit)
                .map(|pixel| pixel.rates[bin])
                .filter(|r| *r > 0.0)
                .collect();
            let reference = median(&positive);
            reference.is_finite().then_some(reference)
        })
        .collect();

    let pixels: Vec<PixelFit<PixelWeights>> = rates
        .into_iter()
        .enumerate()
        .map(|(idx, outcome)| match outcome {
            PixelFit::Fit(pixel) => {
                let weights: Vec<Option<f64>> = pixel
                    .rates
                    .iter()
                    .zip(&reference_rates)
                    .map(|(rate, reference)| match reference {
                        Some(reference) if *rate > 0.0 => Some(reference / rate),
                        _ => None,
                    })
                    .collect();
                let weight_errors = weights
                    .iter()
                    .zip(&pixel.kept_counts)
                    .map(|(weight, counts)| weight.map(|w| w / counts.sqrt()))
                    .collect();
                PixelFit::Fit(PixelWeights {
                    rates: pixel.rates,
                    weights,
                    weight_errors,
                    valid_chunks: pixel.valid_chunks,
                })
            }
            PixelFit::Bad { reason } => {
                debug!(pixel = idx, ?reason, "flatcal pixel flagged bad");
                PixelFit::bad(reason)
            }
        })
        .collect();

    let body = FlatcalBody {
        bins,
        reference_rates,
        pixels,
    };
    let summary = body.summary();
    info!(
        fit = summary.fit,
        bad = summary.bad,
        chunks = chunks.len(),
        "flat-field weights fitted"
    );
    Ok(body)
}
