use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use mkid_core::config::{load_config, CalibrationKind};
use mkid_store::SolutionStore;

use super::print_json;

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Pipeline configuration (YAML) naming the store.
    #[arg(long)]
    pub config: PathBuf,
    /// Restrict the listing to one calibration step.
    #[arg(long)]
    pub kind: Option<CalibrationKind>,
    /// Load and print the full solution filed under this key.
    #[arg(long)]
    pub key: Option<String>,
}

pub fn run(args: &InspectArgs) -> Result<(), Box<dyn Error>> {
    let config = load_config(&args.config)?;
    let store = SolutionStore::open(config.database_dir())?;
    let rows = store.list(args.kind)?;
    match &args.key {
        None => print_json(&rows),
        Some(key) => {
            let row = rows
                .iter()
                .find(|row| row.key == *key || row.key.starts_with(key.as_str()))
                .ok_or_else(|| format!("no stored solution with key {key}"))?;
            print_json(&store.load(row)?)
        }
    }
}
