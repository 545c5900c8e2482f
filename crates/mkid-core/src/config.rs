//! Calibration configuration and the declared fingerprint-relevant subsets.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dataset::DatasetSpec;
use crate::errors::{ErrorInfo, MkidError};
use crate::serde::{from_yaml_slice, to_yaml_string};

/// Calibration steps the engine knows how to resolve and apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationKind {
    /// Phase to wavelength conversion.
    Wavecal,
    /// Per-pixel, per-wavelength-bin relative response weights.
    Flatcal,
}

impl CalibrationKind {
    /// Stable lowercase label used in file names and the store index.
    pub fn as_str(&self) -> &'static str {
        match self {
            CalibrationKind::Wavecal => "wavecal",
            CalibrationKind::Flatcal => "flatcal",
        }
    }
}

impl fmt::Display for CalibrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CalibrationKind {
    type Err = MkidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wavecal" => Ok(CalibrationKind::Wavecal),
            "flatcal" => Ok(CalibrationKind::Flatcal),
            other => Err(MkidError::Config(
                ErrorInfo::new("config.kind", format!("unknown calibration kind '{other}'"))
                    .with_hint("expected 'wavecal' or 'flatcal'"),
            )),
        }
    }
}

/// Detector array identity and usable band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Instrument identifier, matched against [`DatasetSpec::instrument`].
    pub name: String,
    /// Number of pixel columns.
    pub ncols: u32,
    /// Number of pixel rows.
    pub nrows: u32,
    /// Lower edge of the calibrated band in nanometres.
    #[serde(default = "InstrumentConfig::default_minimum_wavelength")]
    pub minimum_wavelength: f64,
    /// Upper edge of the calibrated band in nanometres.
    #[serde(default = "InstrumentConfig::default_maximum_wavelength")]
    pub maximum_wavelength: f64,
}

impl InstrumentConfig {
    fn default_minimum_wavelength() -> f64 {
        950.0
    }

    fn default_maximum_wavelength() -> f64 {
        1375.0
    }

    /// Total number of pixels in the array.
    pub fn n_pixels(&self) -> u32 {
        self.ncols.saturating_mul(self.nrows)
    }
}

/// Wavelength calibration knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WavecalConfig {
    /// Initial phase histogram bin width.
    #[serde(default = "WavecalConfig::default_bin_width")]
    pub bin_width: f64,
    /// Polynomial order of the phase to energy model (1 or 2).
    #[serde(default = "WavecalConfig::default_model_order")]
    pub model_order: u8,
    /// Largest accepted reduced chi-squared of the model fit.
    #[serde(default = "WavecalConfig::default_max_reduced_chi2")]
    pub max_reduced_chi2: f64,
    /// Photons arriving closer than this to their predecessor are discarded (s).
    #[serde(default = "WavecalConfig::default_dead_time")]
    pub dead_time: f64,
    /// Exposures above this count rate (cps) are treated as hot.
    #[serde(default = "WavecalConfig::default_max_count_rate")]
    pub max_count_rate: f64,
    /// Minimum photons inside a peak window for the peak to count.
    #[serde(default = "WavecalConfig::default_min_peak_counts")]
    pub min_peak_counts: u32,
    /// Diagnostic plot level; never affects the fit.
    #[serde(default)]
    pub plots: String,
}

impl WavecalConfig {
    fn default_bin_width() -> f64 {
        0.005
    }

    fn default_model_order() -> u8 {
        2
    }

    fn default_max_reduced_chi2() -> f64 {
        10.0
    }

    fn default_dead_time() -> f64 {
        5.0e-4
    }

    fn default_max_count_rate() -> f64 {
        2000.0
    }

    fn default_min_peak_counts() -> u32 {
        50
    }

    /// Fields that influence the fitted model.
    pub fn fit_key(&self) -> WavecalFitKey {
        WavecalFitKey {
            bin_width: self.bin_width,
            model_order: self.model_order,
            max_reduced_chi2: self.max_reduced_chi2,
            dead_time: self.dead_time,
            max_count_rate: self.max_count_rate,
            min_peak_counts: self.min_peak_counts,
        }
    }
}

impl Default for WavecalConfig {
    fn default() -> Self {
        Self {
            bin_width: Self::default_bin_width(),
            model_order: Self::default_model_order(),
            max_reduced_chi2: Self::default_max_reduced_chi2(),
            dead_time: Self::default_dead_time(),
            max_count_rate: Self::default_max_count_rate(),
            min_peak_counts: Self::default_min_peak_counts(),
            plots: String::new(),
        }
    }
}

/// Fingerprint-relevant subset of [`WavecalConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WavecalFitKey {
    /// See [`WavecalConfig::bin_width`].
    pub bin_width: f64,
    /// See [`WavecalConfig::model_order`].
    pub model_order: u8,
    /// See [`WavecalConfig::max_reduced_chi2`].
    pub max_reduced_chi2: f64,
    /// See [`WavecalConfig::dead_time`].
    pub dead_time: f64,
    /// See [`WavecalConfig::max_count_rate`].
    pub max_count_rate: f64,
    /// See [`WavecalConfig::min_peak_counts`].
    pub min_peak_counts: u32,
}

/// Flat-field calibration knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatcalConfig {
    /// Chunk integration time in seconds.
    #[serde(default = "FlatcalConfig::default_chunk_time")]
    pub chunk_time: f64,
    /// Wavelength bin width in nanometres.
    #[serde(default = "FlatcalConfig::default_wavelength_bin_width")]
    pub wavelength_bin_width: f64,
    /// Pixels with an overall rate above this (cps) are rejected; 0 disables the cut.
    #[serde(default)]
    pub rate_cutoff: f64,
    /// Fraction of chunk rates trimmed from each end before averaging.
    #[serde(default = "FlatcalConfig::default_trim_fraction")]
    pub trim_fraction: f64,
    /// Diagnostic plot level; never affects the fit.
    #[serde(default)]
    pub plots: String,
}

impl FlatcalConfig {
    fn default_chunk_time() -> f64 {
        10.0
    }

    fn default_wavelength_bin_width() -> f64 {
        50.0
    }

    fn default_trim_fraction() -> f64 {
        0.1
    }

    /// Fields that influence the fitted weights.
    pub fn fit_key(&self) -> FlatcalFitKey {
        FlatcalFitKey {
            chunk_time: self.chunk_time,
            wavelength_bin_width: self.wavelength_bin_width,
            rate_cutoff: self.rate_cutoff,
            trim_fraction: self.trim_fraction,
        }
    }
}

impl Default for FlatcalConfig {
    fn default() -> Self {
        Self {
            chunk_time: Self::default_chunk_time(),
            wavelength_bin_width: Self::default_wavelength_bin_width(),
            rate_cutoff: 0.0,
            trim_fraction: Self::default_trim_fraction(),
            plots: String::new(),
        }
    }
}

/// Fingerprint-relevant subset of [`FlatcalConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatcalFitKey {
    /// See [`FlatcalConfig::chunk_time`].
    pub chunk_time: f64,
    /// See [`FlatcalConfig::wavelength_bin_width`].
    pub wavelength_bin_width: f64,
    /// See [`FlatcalConfig::rate_cutoff`].
    pub rate_cutoff: f64,
    /// See [`FlatcalConfig::trim_fraction`].
    pub trim_fraction: f64,
}

/// Filesystem locations used by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Solution store root (index database and artifacts).
    #[serde(default = "PathsConfig::default_database")]
    pub database: PathBuf,
    /// Output directory for calibrated tables.
    #[serde(default = "PathsConfig::default_out")]
    pub out: PathBuf,
}

impl PathsConfig {
    fn default_database() -> PathBuf {
        PathBuf::from("database")
    }

    fn default_out() -> PathBuf {
        PathBuf::from("out")
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            database: Self::default_database(),
            out: Self::default_out(),
        }
    }
}

/// Snapshot of a whole pipeline configuration.
///
/// Passed by value into fingerprinting and fetching; fitters never read
/// configuration from anywhere else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Detector array description.
    pub instrument: InstrumentConfig,
    /// Wavelength calibration settings.
    #[serde(default)]
    pub wavecal: WavecalConfig,
    /// Flat-field calibration settings.
    #[serde(default)]
    pub flatcal: FlatcalConfig,
    /// Output and store locations.
    #[serde(default)]
    pub paths: PathsConfig,
    /// Worker threads for per-pixel fitting; 0 lets rayon decide.
    #[serde(default)]
    pub ncpu: usize,
    /// Directory containing the configuration file (ignored when serializing).
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl CalibrationConfig {
    /// Builds a configuration with default step settings for an instrument.
    pub fn for_instrument(instrument: InstrumentConfig) -> Self {
        Self {
            instrument,
            wavecal: WavecalConfig::default(),
            flatcal: FlatcalConfig::default(),
            paths: PathsConfig::default(),
            ncpu: 0,
            base_dir: PathBuf::new(),
        }
    }

    /// Checks every constraint and reports all violations at once.
    pub fn validate(&self) -> Result<(), MkidError> {
        let mut violations = Vec::new();
        let instrument = &self.instrument;
        if instrument.name.trim().is_empty() {
            violations.push("instrument.name must not be empty".to_string());
        }
        if instrument.n_pixels() == 0 {
            violations.push("instrument geometry must contain at least one pixel".to_string());
        }
        if !(instrument.minimum_wavelength > 0.0
            && instrument.minimum_wavelength < instrument.maximum_wavelength)
        {
            violations.push(
                "instrument wavelength range must be positive and increasing".to_string(),
            );
        }

        let wavecal = &self.wavecal;
        if !(wavecal.bin_width > 0.0) {
            violations.push("wavecal.bin_width must be positive".to_string());
        }
        if !matches!(wavecal.model_order, 1 | 2) {
            violations.push(format!(
                "wavecal.model_order must be 1 or 2, got {}",
                wavecal.model_order
            ));
        }
        if !(wavecal.max_reduced_chi2 > 0.0) {
            violations.push("wavecal.max_reduced_chi2 must be positive".to_string());
        }
        if !(wavecal.dead_time >= 0.0) {
            violations.push("wavecal.dead_time must be non-negative".to_string());
        }
        if !(wavecal.max_count_rate > 0.0) {
            violations.push("wavecal.max_count_rate must be positive".to_string());
        }

        let flatcal = &self.flatcal;
        if !(flatcal.chunk_time > 0.0) {
            violations.push("flatcal.chunk_time must be positive".to_string());
        }
        if !(flatcal.wavelength_bin_width > 0.0) {
            violations.push("flatcal.wavelength_bin_width must be positive".to_string());
        }
        if !(0.0..=20000.0).contains(&flatcal.rate_cutoff) {
            violations.push("flatcal.rate_cutoff must lie in [0, 20000] cps".to_string());
        }
        if !(0.0..0.5).contains(&flatcal.trim_fraction) {
            violations.push("flatcal.trim_fraction must lie in [0, 0.5)".to_string());
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(MkidError::Config(
                ErrorInfo::new("config.invalid", "configuration failed validation")
                    .with_context("violations", violations.join("; "))
                    .with_hint("fix the listed fields and rerun"),
            ))
        }
    }

    /// The fit-relevant snapshot for `kind` against `dataset`.
    ///
    /// Only fields listed here may influence a solution; everything else in
    /// the configuration is free to change without invalidating the store.
    pub fn snapshot(&self, kind: CalibrationKind, dataset: &DatasetSpec) -> FitSnapshot {
        match kind {
            CalibrationKind::Wavecal => FitSnapshot::Wavecal {
                instrument: self.instrument.clone(),
                fit: self.wavecal.fit_key(),
                lines: dataset.laser_lines(),
            },
            CalibrationKind::Flatcal => FitSnapshot::Flatcal {
                instrument: self.instrument.clone(),
                fit: self.flatcal.fit_key(),
            },
        }
    }

    /// Resolved store root.
    pub fn database_dir(&self) -> PathBuf {
        resolve(&self.base_dir, &self.paths.database)
    }

    /// Resolved output directory.
    pub fn out_dir(&self) -> PathBuf {
        resolve(&self.base_dir, &self.paths.out)
    }

    /// Produces a YAML representation of the configuration.
    pub fn to_yaml_string(&self) -> Result<String, MkidError> {
        to_yaml_string(self)
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Declared fit-relevant configuration for one calibration step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FitSnapshot {
    /// Wavelength calibration inputs.
    Wavecal {
        /// Array geometry and band.
        instrument: InstrumentConfig,
        /// Fit settings.
        fit: WavecalFitKey,
        /// Laser lines (nm) present in the calibration data.
        lines: Vec<f64>,
    },
    /// Flat-field calibration inputs.
    Flatcal {
        /// Array geometry and band.
        instrument: InstrumentConfig,
        /// Fit settings.
        fit: FlatcalFitKey,
    },
}

impl FitSnapshot {
    /// Calibration step this snapshot belongs to.
    pub fn kind(&self) -> CalibrationKind {
        match self {
            FitSnapshot::Wavecal { .. } => CalibrationKind::Wavecal,
            FitSnapshot::Flatcal { .. } => CalibrationKind::Flatcal,
        }
    }

    /// Instrument the snapshot was taken for.
    pub fn instrument(&self) -> &InstrumentConfig {
        match self {
            FitSnapshot::Wavecal { instrument, .. } | FitSnapshot::Flatcal { instrument, .. } => {
                instrument
            }
        }
    }
}

/// Loads a configuration from YAML and validates it.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CalibrationConfig, MkidError> {
    let config_path = path.as_ref();
    let bytes = fs::read(config_path).map_err(|err| {
        MkidError::Config(
            ErrorInfo::new("config.read", err.to_string())
                .with_context("path", config_path.display().to_string()),
        )
    })?;
    let mut config: CalibrationConfig = from_yaml_slice(&bytes)?;
    config.base_dir = config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    config.validate()?;
    Ok(config)
}
