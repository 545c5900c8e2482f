//! Deterministic identity of a calibration request.

use mkid_core::config::{CalibrationConfig, CalibrationKind, FitSnapshot};
use mkid_core::dataset::{coverage_contains, merge_ranges, DatasetSpec, TimeRange};
use mkid_core::errors::{ErrorInfo, MkidError};
use mkid_core::hash::stable_hash_string;
use mkid_core::provenance::SolutionProvenance;
use serde::{Deserialize, Serialize};

/// Identity of a solution: relevant configuration plus time coverage.
///
/// `config_digest` hashes the declared fit-relevant snapshot only, so
/// unrelated settings never move it. The dataset's name and location are
/// not part of the identity; two datasets over the same interval share it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Calibration step.
    pub kind: CalibrationKind,
    /// Instrument identifier.
    pub instrument: String,
    /// SHA-256 of the canonical fit-relevant snapshot.
    pub config_digest: String,
    /// Merged covered intervals.
    pub coverage: Vec<TimeRange>,
    /// SHA-256 over all of the above.
    pub key: String,
}

#[derive(Serialize)]
struct KeyMaterial<'a> {
    kind: CalibrationKind,
    instrument: &'a str,
    config_digest: &'a str,
    coverage: &'a [TimeRange],
}

impl Fingerprint {
    /// Builds the fingerprint for a snapshot over `coverage`.
    pub fn from_parts(snapshot: &FitSnapshot, coverage: &[TimeRange]) -> Result<Self, MkidError> {
        let coverage = merge_ranges(coverage);
        if coverage.is_empty() {
            return Err(MkidError::Config(ErrorInfo::new(
                "fingerprint.coverage",
                "a fingerprint needs a non-empty time coverage",
            )));
        }
        let kind = snapshot.kind();
        let instrument = snapshot.instrument().name.clone();
        let config_digest = stable_hash_string(snapshot)?;
        let key = stable_hash_string(&KeyMaterial {
            kind,
            instrument: &instrument,
            config_digest: &config_digest,
            coverage: &coverage,
        })?;
        Ok(Self {
            kind,
            instrument,
            config_digest,
            coverage,
            key,
        })
    }

    /// Rebuilds the fingerprint recorded by a solution's provenance.
    pub fn from_provenance(provenance: &SolutionProvenance) -> Result<Self, MkidError> {
        Self::from_parts(&provenance.snapshot, &provenance.coverage)
    }

    /// Whether a solution carrying `self` may serve `query`: identical
    /// kind, instrument and relevant configuration, and coverage that
    /// contains every requested interval.
    pub fn serves(&self, query: &Fingerprint) -> bool {
        self.kind == query.kind
            && self.instrument == query.instrument
            && self.config_digest == query.config_digest
            && coverage_contains(&self.coverage, &query.coverage)
    }

    /// Smallest interval enclosing the coverage.
    pub fn span(&self) -> Option<TimeRange> {
        let first = self.coverage.first()?;
        let last = self.coverage.last()?;
        Some(TimeRange {
            start: first.start,
            stop: last.stop,
        })
    }

    /// Leading characters of the key for logs and file names.
    pub fn short_key(&self) -> &str {
        &self.key[..self.key.len().min(16)]
    }
}

/// Fingerprint for calibrating `dataset` with `config`.
pub fn fingerprint(
    config: &CalibrationConfig,
    dataset: &DatasetSpec,
    kind: CalibrationKind,
) -> Result<Fingerprint, MkidError> {
    if dataset.instrument != config.instrument.name {
        return Err(MkidError::Config(
            ErrorInfo::new("fingerprint.instrument", "dataset and configuration disagree on the instrument")
                .with_context("dataset", dataset.instrument.clone())
                .with_context("config", config.instrument.name.clone()),
        ));
    }
    Fingerprint::from_parts(&config.snapshot(kind, dataset), &dataset.coverage())
}
