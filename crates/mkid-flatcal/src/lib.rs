#![deny(missing_docs)]
#![doc = "Flat-field calibration: chunked, trimmed per-pixel count rates turned into relative response weights."]

/// Wavelength binning.
pub mod bins;
/// Exposure chunking.
pub mod chunks;
/// Weight fitting and lookup.
pub mod fit;

pub use bins::{BinLookup, WavelengthBins};
pub use fit::{fit_flatcal, FlatcalBody, PixelWeights, WeightMiss};
