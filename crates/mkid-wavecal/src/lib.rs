#![deny(missing_docs)]
#![doc = "Wavelength calibration: per-pixel Gaussian laser-line peaks mapped to energy through a monotonic polynomial."]

/// Fit driver and solution body.
pub mod fit;
/// Photon cleaning and adaptive histograms.
pub mod histogram;
/// Energy model fitting and evaluation.
pub mod model;
/// Gaussian peak location.
pub mod peak;
/// Seeded synthetic exposures.
pub mod synthetic;

pub use fit::{fit_pixel, fit_wavecal, WavecalBody};
pub use model::{energy_of, LinePeak, PixelModel, HC_EV_NM};
pub use peak::Peak;
