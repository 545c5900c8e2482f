#![deny(missing_docs)]
#![doc = "Resolution and application of calibration solutions: `fetch` a compatible solution (fitting on a miss) and `apply` it to photon tables."]

/// Destructive application of solutions to photon tables.
pub mod apply;
/// Photon tables read from dataset directories.
pub mod provider;
/// Cache-or-fit resolution of calibration solutions.
pub mod resolve;

pub use apply::{apply, ApplyReport};
pub use provider::DirectoryProvider;
pub use resolve::{fetch, FetchOutcome, SolutionOrigin};
