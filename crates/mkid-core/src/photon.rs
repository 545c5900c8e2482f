//! Photon records and the in-memory photon table.

use std::fs;
use std::path::Path;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::config::CalibrationKind;
use crate::dataset::TimeRange;
use crate::errors::{ErrorInfo, MkidError};
use crate::serde::{from_bincode_slice, to_bincode_bytes};

/// Identifier of a detector pixel (resonator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PixelId(u32);

impl PixelId {
    /// Creates a new identifier from its raw integer representation.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Column-major identifier for array position `(x, y)`.
    pub const fn from_xy(x: u32, y: u32, nrows: u32) -> Self {
        Self(x * nrows + y)
    }

    /// Returns the raw integer representation of the identifier.
    pub const fn as_raw(&self) -> u32 {
        self.0
    }

    /// Index into pixel-ordered vectors.
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

bitflags! {
    /// Per-record calibration flag bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PhotonFlags: u32 {
        /// A calibration step could not be applied to this record.
        const UNCALIBRATED = 1 << 0;
        /// The owning pixel has no usable wavelength model.
        const WAVECAL_BAD = 1 << 1;
        /// The owning pixel or bin has no usable flat weight.
        const FLATCAL_BAD = 1 << 2;
        /// Wavelength below the flat-field binned range.
        const BELOW_RANGE = 1 << 3;
        /// Wavelength above the flat-field binned range.
        const ABOVE_RANGE = 1 << 4;
    }
}

/// One detected photon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhotonRecord {
    /// Absolute arrival time in seconds.
    pub time: f64,
    /// Owning pixel.
    pub pixel: PixelId,
    /// Raw phase height until a wavelength calibration is applied, then nanometres.
    pub wavelength: f64,
    /// Spectral weight; flat-field weights multiply into it.
    pub weight: f64,
    /// Raw [`PhotonFlags`] bits.
    pub flags: u32,
}

impl PhotonRecord {
    /// Uncalibrated record with unit weight and no flags.
    pub fn raw(time: f64, pixel: PixelId, phase: f64) -> Self {
        Self {
            time,
            pixel,
            wavelength: phase,
            weight: 1.0,
            flags: 0,
        }
    }

    /// Decoded flag bits, ignoring unknown ones.
    pub fn flags(&self) -> PhotonFlags {
        PhotonFlags::from_bits_truncate(self.flags)
    }

    /// OR-sets the given flags.
    pub fn insert_flags(&mut self, flags: PhotonFlags) {
        self.flags |= flags.bits();
    }
}

/// Record of one calibration applied to a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedCalibration {
    /// Step that was applied.
    pub kind: CalibrationKind,
    /// Fingerprint key of the applied solution.
    pub key: String,
    /// RFC 3339 timestamp of the application.
    pub applied_at: String,
}

/// Table-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableHeader {
    /// Name of the dataset the table was built from.
    pub dataset: String,
    /// First covered instant in seconds.
    pub start: f64,
    /// End of the covered interval in seconds.
    pub stop: f64,
    /// Whether record wavelengths are in nanometres rather than raw phase.
    #[serde(default)]
    pub wavelength_calibrated: bool,
    /// Calibrations applied so far, oldest first.
    #[serde(default)]
    pub history: Vec<AppliedCalibration>,
}

/// A photon table: header plus records in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotonTable {
    /// Table-level metadata.
    pub header: TableHeader,
    /// Photon records.
    pub records: Vec<PhotonRecord>,
}

impl PhotonTable {
    /// Fresh uncalibrated table.
    pub fn new(dataset: impl Into<String>, range: TimeRange, records: Vec<PhotonRecord>) -> Self {
        Self {
            header: TableHeader {
                dataset: dataset.into(),
                start: range.start,
                stop: range.stop,
                wavelength_calibrated: false,
                history: Vec::new(),
            },
            records,
        }
    }

    /// Covered interval.
    pub fn range(&self) -> TimeRange {
        TimeRange {
            start: self.header.start,
            stop: self.header.stop,
        }
    }

    /// Whether a calibration of `kind` appears in the history.
    pub fn has_applied(&self, kind: CalibrationKind) -> bool {
        self.header.history.iter().any(|entry| entry.kind == kind)
    }

    /// Loads a bincode-encoded table.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MkidError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|err| {
            MkidError::DataUnavailable(
                ErrorInfo::new("photon_table.read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        from_bincode_slice(&bytes).map_err(|err| {
            MkidError::DataUnavailable(
                ErrorInfo::new("photon_table.decode", err.info().message.clone())
                    .with_context("path", path.display().to_string()),
            )
        })
    }

    /// Writes the table through a temporary sibling and renames it into place.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), MkidError> {
        let path = path.as_ref();
        let bytes = to_bincode_bytes(self)?;
        let tmp = path.with_extension("tmp");
        let io_err = |err: std::io::Error| {
            MkidError::Store(
                ErrorInfo::new("photon_table.write", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        fs::write(&tmp, bytes).map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)?;
        Ok(())
    }
}
