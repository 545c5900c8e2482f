//! Wavelength binning over the instrument band.

use mkid_core::config::InstrumentConfig;
use mkid_core::errors::{ErrorInfo, MkidError};
use serde::{Deserialize, Serialize};

/// Where a wavelength falls relative to the binned band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinLookup {
    /// Inside bin `n`.
    Bin(usize),
    /// Shorter than the band.
    Below,
    /// Longer than the band, or not a number.
    Above,
}

/// Equal-width bins covering `[minimum, maximum)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WavelengthBins {
    /// Band start in nm.
    pub minimum: f64,
    /// Band end in nm.
    pub maximum: f64,
    /// Bin width in nm; the last bin may be narrower.
    pub width: f64,
    /// Number of bins.
    pub count: usize,
}

impl WavelengthBins {
    /// Bins spanning the instrument band.
    pub fn for_instrument(instrument: &InstrumentConfig, width: f64) -> Result<Self, MkidError> {
        let span = instrument.maximum_wavelength - instrument.minimum_wavelength;
        if !(width > 0.0 && span > 0.0) {
            return Err(MkidError::Fit(
                ErrorInfo::new("flatcal.bins", "wavelength band and bin width must be positive")
                    .with_context("width", width.to_string())
                    .with_context("span", span.to_string()),
            ));
        }
        Ok(Self {
            minimum: instrument.minimum_wavelength,
            maximum: instrument.maximum_wavelength,
            width,
            count: (span / width).ceil() as usize,
        })
    }

    /// Locates `wavelength` among the bins.
    pub fn lookup(&self, wavelength: f64) -> BinLookup {
        if wavelength < self.minimum {
            return BinLookup::Below;
        }
        if !(wavelength < self.maximum) {
            return BinLookup::Above;
        }
        let bin = ((wavelength - self.minimum) / self.width).floor() as usize;
        BinLookup::Bin(bin.min(self.count - 1))
    }

    /// Bin centres in nm.
    pub fn centers(&self) -> Vec<f64> {
        (0..self.count)
            .map(|k| {
                let lo = self.minimum + k as f64 * self.width;
                let hi = (lo + self.width).min(self.maximum);
                0.5 * (lo + hi)
            })
            .collect()
    }
}
