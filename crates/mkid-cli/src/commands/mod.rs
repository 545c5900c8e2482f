pub mod apply;
pub mod fetch;
pub mod inspect;
pub mod validate;
pub mod version;

use std::error::Error;
use std::path::Path;

use mkid_core::config::{load_config, CalibrationConfig};
use mkid_core::serde::to_canonical_json_bytes;
use mkid_pipeline::DirectoryProvider;
use mkid_store::SolutionStore;
use serde::Serialize;

/// Configuration plus the store and provider it points at.
pub struct Context {
    pub config: CalibrationConfig,
    pub store: SolutionStore,
    pub provider: DirectoryProvider,
}

pub fn open_context(config_path: &Path) -> Result<Context, Box<dyn Error>> {
    let config = load_config(config_path)?;
    let store = SolutionStore::open(config.database_dir())?;
    let provider = DirectoryProvider::new(config.out_dir());
    Ok(Context {
        config,
        store,
        provider,
    })
}

pub fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    let bytes = to_canonical_json_bytes(value)?;
    println!("{}", String::from_utf8(bytes)?);
    Ok(())
}
