#![deny(missing_docs)]
#![doc = "Core data model for the MKID calibration engine: configuration snapshots, datasets, photon tables and the shared error taxonomy."]

pub mod config;
pub mod dataset;
pub mod errors;
/// Canonical hashing helpers.
pub mod hash;
pub mod photon;
pub mod provenance;
pub mod provider;
pub mod quality;
/// Canonical JSON, YAML and bincode helpers.
pub mod serde;
pub mod stat;

pub use config::{
    load_config, CalibrationConfig, CalibrationKind, FitSnapshot, FlatcalConfig, FlatcalFitKey,
    InstrumentConfig, PathsConfig, WavecalConfig, WavecalFitKey,
};
pub use dataset::{coverage_contains, load_dataset, merge_ranges, DatasetSpec, Segment, TimeRange};
pub use errors::{ErrorInfo, MkidError};
pub use photon::{
    AppliedCalibration, PhotonFlags, PhotonRecord, PhotonTable, PixelId, TableHeader,
};
pub use provenance::{SchemaVersion, SolutionProvenance};
pub use provider::{LineSamples, PhotonTableProvider, PixelPhases, PixelRange};
pub use quality::{BadReason, PixelFit, QualitySummary};
