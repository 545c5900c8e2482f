//! The persisted calibration solution artifact.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use mkid_core::config::{CalibrationKind, FitSnapshot};
use mkid_core::dataset::TimeRange;
use mkid_core::errors::{ErrorInfo, MkidError};
use mkid_core::provenance::{SchemaVersion, SolutionProvenance};
use mkid_core::quality::QualitySummary;
use mkid_flatcal::FlatcalBody;
use mkid_wavecal::WavecalBody;
use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;

/// Schema written into every new artifact.
pub const SOLUTION_SCHEMA: SchemaVersion = SchemaVersion::new(1, 0, 0);

/// Per-pixel payload of a solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "pixels", rename_all = "snake_case")]
pub enum SolutionBody {
    /// Phase to wavelength models.
    Wavecal(WavecalBody),
    /// Flat-field weights.
    Flatcal(FlatcalBody),
}

impl SolutionBody {
    /// Calibration step of the body.
    pub fn kind(&self) -> CalibrationKind {
        match self {
            SolutionBody::Wavecal(_) => CalibrationKind::Wavecal,
            SolutionBody::Flatcal(_) => CalibrationKind::Flatcal,
        }
    }

    /// Usable and bad pixel tallies.
    pub fn summary(&self) -> QualitySummary {
        match self {
            SolutionBody::Wavecal(body) => body.summary(),
            SolutionBody::Flatcal(body) => body.summary(),
        }
    }
}

/// Immutable calibration solution: identity, provenance and body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSolution {
    /// Identity the solution is filed under.
    pub fingerprint: Fingerprint,
    /// Configuration snapshot, coverage and creation time.
    pub provenance: SolutionProvenance,
    /// Per-pixel payload.
    pub body: SolutionBody,
}

impl CalibrationSolution {
    /// Wraps a freshly fitted body, stamping provenance with the current time.
    pub fn new(
        snapshot: FitSnapshot,
        coverage: &[TimeRange],
        body: SolutionBody,
    ) -> Result<Self, MkidError> {
        if snapshot.kind() != body.kind() {
            return Err(MkidError::Fit(
                ErrorInfo::new("solution.kind", "snapshot and body describe different steps")
                    .with_context("snapshot", snapshot.kind().to_string())
                    .with_context("body", body.kind().to_string()),
            ));
        }
        let fingerprint = Fingerprint::from_parts(&snapshot, coverage)?;
        let mut tool_versions = BTreeMap::new();
        tool_versions.insert(
            "mkid-store".to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        );
        let provenance = SolutionProvenance {
            schema: SOLUTION_SCHEMA,
            snapshot,
            coverage: fingerprint.coverage.clone(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            tool_versions,
        };
        Ok(Self {
            fingerprint,
            provenance,
            body,
        })
    }

    /// Calibration step of the solution.
    pub fn kind(&self) -> CalibrationKind {
        self.fingerprint.kind
    }

    /// Wavelength models, if this is a wavecal solution.
    pub fn wavecal(&self) -> Option<&WavecalBody> {
        match &self.body {
            SolutionBody::Wavecal(body) => Some(body),
            SolutionBody::Flatcal(_) => None,
        }
    }

    /// Flat weights, if this is a flatcal solution.
    pub fn flatcal(&self) -> Option<&FlatcalBody> {
        match &self.body {
            SolutionBody::Flatcal(body) => Some(body),
            SolutionBody::Wavecal(_) => None,
        }
    }

    /// Checks that the provenance still reproduces the filed fingerprint.
    pub fn verify(&self) -> Result<(), MkidError> {
        let rebuilt = Fingerprint::from_provenance(&self.provenance)?;
        if rebuilt != self.fingerprint || self.body.kind() != self.fingerprint.kind {
            return Err(MkidError::CacheInconsistency(
                ErrorInfo::new(
                    "solution.provenance",
                    "provenance does not reproduce the solution fingerprint",
                )
                .with_context("filed", self.fingerprint.key.clone())
                .with_context("rebuilt", rebuilt.key),
            ));
        }
        Ok(())
    }
}
