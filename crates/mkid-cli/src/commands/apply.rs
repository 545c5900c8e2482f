use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use mkid_core::config::CalibrationKind;
use mkid_core::dataset::{load_dataset, DatasetSpec};
use mkid_core::photon::PhotonTable;
use mkid_core::provider::PhotonTableProvider;
use mkid_pipeline::{apply, fetch, ApplyReport};
use tracing::warn;

use super::{open_context, print_json};

#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Pipeline configuration (YAML).
    #[arg(long)]
    pub config: PathBuf,
    /// Photon table file to calibrate in place.
    #[arg(long, required_unless_present = "dataset", conflicts_with = "dataset")]
    pub table: Option<PathBuf>,
    /// Dataset (YAML) whose records are read and written through the provider.
    #[arg(long)]
    pub dataset: Option<PathBuf>,
    /// Dataset (YAML) providing the wavelength calibration.
    #[arg(long)]
    pub wavecal: Option<PathBuf>,
    /// Dataset (YAML) providing the flat-field calibration.
    #[arg(long)]
    pub flatcal: Option<PathBuf>,
    /// Refit solutions even when the store holds compatible ones.
    #[arg(long)]
    pub force: bool,
}

enum Target {
    File(PathBuf),
    Dataset(DatasetSpec),
}

pub fn run(args: &ApplyArgs) -> Result<(), Box<dyn Error>> {
    let steps: Vec<(CalibrationKind, &PathBuf)> = [
        (CalibrationKind::Wavecal, args.wavecal.as_ref()),
        (CalibrationKind::Flatcal, args.flatcal.as_ref()),
    ]
    .into_iter()
    .filter_map(|(kind, path)| path.map(|path| (kind, path)))
    .collect();
    if steps.is_empty() {
        return Err("nothing to apply: pass --wavecal and/or --flatcal".into());
    }

    let target = match (&args.table, &args.dataset) {
        (Some(path), _) => Target::File(path.clone()),
        (None, Some(path)) => Target::Dataset(load_dataset(path)?),
        (None, None) => return Err("either --table or --dataset is required".into()),
    };
    let ctx = open_context(&args.config)?;
    let mut table = match &target {
        Target::File(path) => PhotonTable::load(path)?,
        Target::Dataset(dataset) => ctx.provider.read_records(dataset)?,
    };

    let mut reports: Vec<ApplyReport> = Vec::with_capacity(steps.len());
    for (kind, dataset_path) in steps {
        let dataset = load_dataset(dataset_path)?;
        let outcome = fetch(
            &ctx.store,
            &ctx.provider,
            &dataset,
            &ctx.config,
            kind,
            args.force,
        )?;
        if table.has_applied(kind) {
            warn!(
                kind = %kind,
                table = %table.header.dataset,
                "double application hazard: table already carries this calibration"
            );
        }
        reports.push(apply(&outcome.solution, &mut table));
    }

    match &target {
        Target::File(path) => table.save(path)?,
        Target::Dataset(dataset) => ctx.provider.write_records(dataset, &table)?,
    }
    print_json(&reports)
}
