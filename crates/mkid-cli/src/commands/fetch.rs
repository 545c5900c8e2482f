use std::collections::BTreeMap;
use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use mkid_core::config::CalibrationKind;
use mkid_core::dataset::load_dataset;
use mkid_core::quality::BadReason;
use mkid_pipeline::{fetch, SolutionOrigin};
use serde::Serialize;

use super::{open_context, print_json};

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Pipeline configuration (YAML).
    #[arg(long)]
    pub config: PathBuf,
    /// Dataset description (YAML) to calibrate.
    #[arg(long)]
    pub dataset: PathBuf,
    /// Calibration step: `wavecal` or `flatcal`.
    #[arg(long)]
    pub kind: CalibrationKind,
    /// Refit even when the store holds a compatible solution.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct FetchSummary {
    kind: CalibrationKind,
    origin: SolutionOrigin,
    key: String,
    dataset: String,
    created_at: String,
    pixels_fit: usize,
    pixels_bad: usize,
    bad_reasons: BTreeMap<BadReason, usize>,
}

pub fn run(args: &FetchArgs) -> Result<(), Box<dyn Error>> {
    let ctx = open_context(&args.config)?;
    let dataset = load_dataset(&args.dataset)?;
    let outcome = fetch(
        &ctx.store,
        &ctx.provider,
        &dataset,
        &ctx.config,
        args.kind,
        args.force,
    )?;
    let quality = outcome.solution.body.summary();
    print_json(&FetchSummary {
        kind: args.kind,
        origin: outcome.origin,
        key: outcome.solution.fingerprint.key.clone(),
        dataset: dataset.name,
        created_at: outcome.solution.provenance.created_at.clone(),
        pixels_fit: quality.fit,
        pixels_bad: quality.bad,
        bad_reasons: quality.by_reason,
    })
}
