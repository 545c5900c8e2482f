//! Calibration resolver: serve a compatible stored solution or fit a new one.

use mkid_core::config::{CalibrationConfig, CalibrationKind};
use mkid_core::dataset::DatasetSpec;
use mkid_core::errors::{ErrorInfo, MkidError};
use mkid_core::provider::{PhotonTableProvider, PixelRange};
use mkid_flatcal::fit_flatcal;
use mkid_store::{fingerprint, CalibrationSolution, SolutionBody, SolutionStore};
use mkid_wavecal::fit_wavecal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Where a fetched solution came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolutionOrigin {
    /// Served unchanged from the store.
    Cache,
    /// Fitted during this call and persisted.
    Generated,
}

/// Result of [`fetch`].
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    /// The resolved solution.
    pub solution: CalibrationSolution,
    /// Whether it was cached or freshly fitted.
    pub origin: SolutionOrigin,
}

/// Returns a solution of `kind` valid for `dataset` under `config`.
///
/// Without `force`, a compatible stored solution is returned as is. On a
/// miss (or with `force`) the fitter runs over raw data read from
/// `provider` for exactly the dataset's coverage and the result is stored
/// before being returned. Provider failures surface as
/// [`MkidError::DataUnavailable`] and nothing is written.
pub fn fetch(
    store: &SolutionStore,
    provider: &dyn PhotonTableProvider,
    dataset: &DatasetSpec,
    config: &CalibrationConfig,
    kind: CalibrationKind,
    force: bool,
) -> Result<FetchOutcome, MkidError> {
    let query = fingerprint(config, dataset, kind)?;
    if !force {
        if let Some(solution) = store.find(&query)? {
            match check_current(&solution, config, dataset) {
                Ok(()) => {
                    info!(
                        kind = %kind,
                        key = solution.fingerprint.short_key(),
                        dataset = %dataset.name,
                        "calibration served from store"
                    );
                    return Ok(FetchOutcome {
                        solution,
                        origin: SolutionOrigin::Cache,
                    });
                }
                Err(err) => warn!(
                    kind = %kind,
                    key = solution.fingerprint.short_key(),
                    "regenerating after failed provenance check: {}",
                    err.info()
                ),
            }
        }
    }

    let body = generate(provider, dataset, config, kind)?;
    let solution =
        CalibrationSolution::new(config.snapshot(kind, dataset), &dataset.coverage(), body)?;
    store.put(&solution)?;
    let summary = solution.body.summary();
    info!(
        kind = %kind,
        key = solution.fingerprint.short_key(),
        dataset = %dataset.name,
        fit = summary.fit,
        bad = summary.bad,
        force,
        "calibration generated"
    );
    Ok(FetchOutcome {
        solution,
        origin: SolutionOrigin::Generated,
    })
}

/// Re-checks a cached solution's provenance against the live configuration.
fn check_current(
    solution: &CalibrationSolution,
    config: &CalibrationConfig,
    dataset: &DatasetSpec,
) -> Result<(), MkidError> {
    let current = config.snapshot(solution.kind(), dataset);
    if solution.provenance.snapshot != current {
        return Err(MkidError::CacheInconsistency(
            ErrorInfo::new(
                "resolve.stale_provenance",
                "stored configuration snapshot differs from the live configuration",
            )
            .with_context("key", solution.fingerprint.key.clone()),
        ));
    }
    Ok(())
}

fn generate(
    provider: &dyn PhotonTableProvider,
    dataset: &DatasetSpec,
    config: &CalibrationConfig,
    kind: CalibrationKind,
) -> Result<SolutionBody, MkidError> {
    let n_pixels = config.instrument.n_pixels();
    match kind {
        CalibrationKind::Wavecal => {
            let phases = provider.read_raw_phases(dataset, PixelRange::first(n_pixels))?;
            let body = fit_wavecal(&phases, n_pixels, &config.wavecal.fit_key(), config.ncpu)?;
            Ok(SolutionBody::Wavecal(body))
        }
        CalibrationKind::Flatcal => {
            let table = provider.read_records(dataset)?;
            let body = fit_flatcal(
                &table,
                &dataset.coverage(),
                &config.instrument,
                &config.flatcal.fit_key(),
                config.ncpu,
            )?;
            Ok(SolutionBody::Flatcal(body))
        }
    }
}
