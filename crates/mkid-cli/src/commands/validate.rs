use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use mkid_core::config::{load_config, CalibrationKind};
use mkid_core::dataset::load_dataset;
use mkid_store::fingerprint;
use serde::Serialize;

use super::print_json;

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Pipeline configuration (YAML) to validate.
    #[arg(long)]
    pub config: PathBuf,
    /// Optional dataset (YAML) to validate against the configuration.
    #[arg(long)]
    pub dataset: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct Validation {
    instrument: String,
    n_pixels: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    dataset: Option<DatasetKeys>,
}

#[derive(Debug, Serialize)]
struct DatasetKeys {
    name: String,
    exposure_time: f64,
    laser_lines: Vec<f64>,
    wavecal_key: String,
    flatcal_key: String,
}

pub fn run(args: &ValidateArgs) -> Result<(), Box<dyn Error>> {
    let config = load_config(&args.config)?;
    let dataset = match &args.dataset {
        Some(path) => {
            let dataset = load_dataset(path)?;
            let wavecal_key = fingerprint(&config, &dataset, CalibrationKind::Wavecal)?.key;
            let flatcal_key = fingerprint(&config, &dataset, CalibrationKind::Flatcal)?.key;
            Some(DatasetKeys {
                exposure_time: dataset.exposure_time(),
                laser_lines: dataset.laser_lines(),
                name: dataset.name,
                wavecal_key,
                flatcal_key,
            })
        }
        None => None,
    };
    print_json(&Validation {
        instrument: config.instrument.name.clone(),
        n_pixels: config.instrument.n_pixels(),
        dataset,
    })
}
