//! Observation datasets and time-range arithmetic.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, MkidError};
use crate::serde::from_yaml_slice;

/// Half-open interval `[start, stop)` of absolute times in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive start time.
    pub start: f64,
    /// Exclusive stop time.
    pub stop: f64,
}

impl TimeRange {
    /// Builds a range, rejecting empty, reversed or non-finite bounds.
    pub fn new(start: f64, stop: f64) -> Result<Self, MkidError> {
        if !start.is_finite() || !stop.is_finite() || stop <= start {
            return Err(MkidError::Config(
                ErrorInfo::new("dataset.time_range", "time range must satisfy start < stop")
                    .with_context("start", start.to_string())
                    .with_context("stop", stop.to_string()),
            ));
        }
        Ok(Self { start, stop })
    }

    /// Length of the range in seconds.
    pub fn duration(&self) -> f64 {
        self.stop - self.start
    }

    /// Whether `other` lies entirely inside this range.
    pub fn contains(&self, other: &TimeRange) -> bool {
        self.start <= other.start && other.stop <= self.stop
    }

    /// Whether the instant `t` falls in `[start, stop)`.
    pub fn contains_time(&self, t: f64) -> bool {
        self.start <= t && t < self.stop
    }
}

/// Sorts ranges and fuses those that overlap or touch.
pub fn merge_ranges(ranges: &[TimeRange]) -> Vec<TimeRange> {
    let mut sorted = ranges.to_vec();
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start).then(a.stop.total_cmp(&b.stop)));
    let mut merged: Vec<TimeRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(last) if range.start <= last.stop => {
                if range.stop > last.stop {
                    last.stop = range.stop;
                }
            }
            _ => merged.push(range),
        }
    }
    merged
}

/// Containment predicate used for cache compatibility: every requested
/// interval must sit inside a single interval of the stored coverage.
pub fn coverage_contains(stored: &[TimeRange], requested: &[TimeRange]) -> bool {
    let stored = merge_ranges(stored);
    let requested = merge_ranges(requested);
    !requested.is_empty()
        && requested
            .iter()
            .all(|want| stored.iter().any(|have| have.contains(want)))
}

/// One contiguous piece of an observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Inclusive start time in seconds.
    pub start: f64,
    /// Exclusive stop time in seconds.
    pub stop: f64,
    /// Laser line illuminating the array during the segment, in nanometres.
    #[serde(default)]
    pub wavelength: Option<f64>,
}

impl Segment {
    /// The segment's time interval.
    pub fn range(&self) -> TimeRange {
        TimeRange {
            start: self.start,
            stop: self.stop,
        }
    }
}

/// A reduction request's view of an observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSpec {
    /// Human readable label; not part of any fingerprint.
    pub name: String,
    /// Instrument identifier the data was recorded with.
    pub instrument: String,
    /// Directory holding the raw photon tables.
    pub data: PathBuf,
    /// Time segments making up the observation.
    pub segments: Vec<Segment>,
    /// Directory containing the dataset file (ignored when serializing).
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl DatasetSpec {
    /// Merged time coverage of all segments.
    pub fn coverage(&self) -> Vec<TimeRange> {
        let ranges: Vec<TimeRange> = self.segments.iter().map(Segment::range).collect();
        merge_ranges(&ranges)
    }

    /// Smallest single range enclosing every segment.
    pub fn span(&self) -> Option<TimeRange> {
        let start = self.segments.iter().map(|s| s.start).reduce(f64::min)?;
        let stop = self.segments.iter().map(|s| s.stop).reduce(f64::max)?;
        Some(TimeRange { start, stop })
    }

    /// Distinct laser wavelengths in ascending order.
    pub fn laser_lines(&self) -> Vec<f64> {
        let mut lines: Vec<f64> = self.segments.iter().filter_map(|s| s.wavelength).collect();
        lines.sort_by(f64::total_cmp);
        lines.dedup();
        lines
    }

    /// Total exposure time across merged segments.
    pub fn exposure_time(&self) -> f64 {
        self.coverage().iter().map(TimeRange::duration).sum()
    }

    /// Resolved raw data directory.
    pub fn data_dir(&self) -> PathBuf {
        if self.data.is_absolute() {
            self.data.clone()
        } else {
            self.base_dir.join(&self.data)
        }
    }

    /// Checks that the dataset is well formed.
    pub fn validate(&self) -> Result<(), MkidError> {
        let mut violations = Vec::new();
        if self.instrument.trim().is_empty() {
            violations.push("instrument must not be empty".to_string());
        }
        if self.segments.is_empty() {
            violations.push("at least one segment is required".to_string());
        }
        for (idx, segment) in self.segments.iter().enumerate() {
            if let Err(err) = TimeRange::new(segment.start, segment.stop) {
                violations.push(format!("segment {idx}: {}", err.info().message));
            }
            if let Some(wavelength) = segment.wavelength {
                if !(wavelength.is_finite() && wavelength > 0.0) {
                    violations.push(format!("segment {idx}: wavelength must be positive"));
                }
            }
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(MkidError::Config(
                ErrorInfo::new("dataset.invalid", "dataset failed validation")
                    .with_context("dataset", self.name.clone())
                    .with_context("violations", violations.join("; ")),
            ))
        }
    }
}

/// Loads and validates a dataset description from YAML.
pub fn load_dataset<P: AsRef<Path>>(path: P) -> Result<DatasetSpec, MkidError> {
    let dataset_path = path.as_ref();
    let bytes = fs::read(dataset_path).map_err(|err| {
        MkidError::Config(
            ErrorInfo::new("dataset.read", err.to_string())
                .with_context("path", dataset_path.display().to_string()),
        )
    })?;
    let mut dataset: DatasetSpec = from_yaml_slice(&bytes)?;
    dataset
        .segments
        .sort_by(|a, b| a.start.total_cmp(&b.start).then(a.stop.total_cmp(&b.stop)));
    dataset.base_dir = dataset_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    dataset.validate()?;
    Ok(dataset)
}
