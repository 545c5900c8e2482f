//! Provenance and schema descriptors attached to calibration solutions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::FitSnapshot;
use crate::dataset::TimeRange;

/// Semantic version describing the schema of serialized payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Major version incremented for breaking changes.
    pub major: u32,
    /// Minor version incremented for additive changes.
    pub minor: u32,
    /// Patch version incremented for fixes that keep the layout intact.
    pub patch: u32,
}

impl SchemaVersion {
    /// Creates a new schema version descriptor.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::new(1, 0, 0)
    }
}

/// Everything needed to rebuild a solution's fingerprint and judge whether
/// it still matches the live configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionProvenance {
    /// Schema of the artifact body.
    #[serde(default)]
    pub schema: SchemaVersion,
    /// Fit-relevant configuration captured when the solution was generated.
    pub snapshot: FitSnapshot,
    /// Merged time coverage of the raw data the fit consumed.
    pub coverage: Vec<TimeRange>,
    /// RFC 3339 timestamp recording when the solution was generated.
    pub created_at: String,
    /// Version map for the crates involved in the fit.
    #[serde(default)]
    pub tool_versions: BTreeMap<String, String>,
}
