#![deny(missing_docs)]
#![doc = "Calibration fingerprints, immutable solution artifacts and the SQLite-indexed store that files them."]

/// Deterministic identity of a calibration request.
pub mod fingerprint;
pub mod schema;
/// Persisted solution artifact.
pub mod solution;
pub mod store;

pub use fingerprint::{fingerprint, Fingerprint};
pub use schema::{IndexRow, SCHEMA_VERSION};
pub use solution::{CalibrationSolution, SolutionBody, SOLUTION_SCHEMA};
pub use store::SolutionStore;
