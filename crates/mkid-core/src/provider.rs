//! Seam between the calibration engine and photon-table storage.

use serde::{Deserialize, Serialize};

use crate::dataset::DatasetSpec;
use crate::errors::MkidError;
use crate::photon::{PhotonTable, PixelId};

/// Half-open range of raw pixel identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRange {
    /// First pixel included.
    pub start: u32,
    /// First pixel excluded.
    pub end: u32,
}

impl PixelRange {
    /// Range covering `[start, end)`.
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Range covering the first `n` pixels.
    pub const fn first(n: u32) -> Self {
        Self { start: 0, end: n }
    }

    /// Whether `pixel` is inside the range.
    pub fn contains(&self, pixel: PixelId) -> bool {
        (self.start..self.end).contains(&pixel.as_raw())
    }

    /// Number of pixels in the range.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start) as usize
    }

    /// Whether the range is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates the pixel identifiers in order.
    pub fn iter(&self) -> impl Iterator<Item = PixelId> {
        (self.start..self.end).map(PixelId::from_raw)
    }
}

/// Raw samples recorded by one pixel under one laser line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSamples {
    /// Laser wavelength in nanometres.
    pub wavelength: f64,
    /// Integration time that produced the samples, in seconds.
    pub exposure: f64,
    /// Arrival times in seconds.
    pub times: Vec<f64>,
    /// Raw phase heights, parallel to `times`.
    pub phases: Vec<f64>,
}

/// All laser-line samples for one pixel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelPhases {
    /// Pixel the samples belong to.
    pub pixel: PixelId,
    /// One entry per laser line the pixel saw.
    pub lines: Vec<LineSamples>,
}

/// Persistent photon-table abstraction consumed by the resolver and driver.
///
/// Implementations must fail with [`MkidError::DataUnavailable`] when the
/// requested span cannot be read in full.
pub trait PhotonTableProvider: Send + Sync {
    /// Per-pixel raw phase samples for exactly the dataset's coverage,
    /// ordered by pixel id. Pixels with no samples may be omitted.
    fn read_raw_phases(
        &self,
        dataset: &DatasetSpec,
        pixels: PixelRange,
    ) -> Result<Vec<PixelPhases>, MkidError>;

    /// All photon records of the dataset as one table.
    fn read_records(&self, dataset: &DatasetSpec) -> Result<PhotonTable, MkidError>;

    /// Persists a table for the dataset, replacing any previous one.
    fn write_records(&self, dataset: &DatasetSpec, table: &PhotonTable) -> Result<(), MkidError>;
}
