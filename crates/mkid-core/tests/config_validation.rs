use std::path::PathBuf;

use mkid_core::config::{load_config, CalibrationConfig, CalibrationKind, FitSnapshot};
use mkid_core::dataset::load_dataset;
use mkid_core::errors::MkidError;

fn fixture_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join(relative)
}

fn fixture_config() -> CalibrationConfig {
    load_config(fixture_path("configs/pipe.yaml")).expect("config loads")
}

#[test]
fn fixture_config_loads_and_validates() {
    let config = fixture_config();
    assert_eq!(config.instrument.name, "MEC");
    assert_eq!(config.instrument.n_pixels(), 16);
    assert_eq!(config.wavecal.model_order, 2);
    assert!(config.database_dir().ends_with("configs/database"));
}

#[test]
fn every_violation_is_reported() {
    let mut config = fixture_config();
    config.flatcal.rate_cutoff = 25000.0;
    config.flatcal.trim_fraction = 0.5;
    config.wavecal.model_order = 3;
    let err = config.validate().expect_err("invalid config");
    match err {
        MkidError::Config(info) => {
            assert_eq!(info.code, "config.invalid");
            let violations = info.context.get("violations").expect("violations listed");
            assert!(violations.contains("rate_cutoff"));
            assert!(violations.contains("trim_fraction"));
            assert!(violations.contains("model_order"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn reversed_wavelength_range_is_rejected() {
    let mut config = fixture_config();
    config.instrument.maximum_wavelength = config.instrument.minimum_wavelength - 1.0;
    assert!(matches!(config.validate(), Err(MkidError::Config(_))));
}

#[test]
fn snapshot_ignores_plots_paths_and_ncpu() {
    let dataset = load_dataset(fixture_path("configs/wavecal_dataset.yaml")).expect("dataset");
    let config = fixture_config();
    let mut tweaked = config.clone();
    tweaked.wavecal.plots = "all".to_string();
    tweaked.flatcal.plots = "all".to_string();
    tweaked.paths.database = PathBuf::from("/elsewhere");
    tweaked.ncpu = 64;
    for kind in [CalibrationKind::Wavecal, CalibrationKind::Flatcal] {
        assert_eq!(
            config.snapshot(kind, &dataset),
            tweaked.snapshot(kind, &dataset)
        );
    }
}

#[test]
fn wavecal_snapshot_carries_laser_lines() {
    let dataset = load_dataset(fixture_path("configs/wavecal_dataset.yaml")).expect("dataset");
    let snapshot = fixture_config().snapshot(CalibrationKind::Wavecal, &dataset);
    match snapshot {
        FitSnapshot::Wavecal { lines, .. } => assert_eq!(lines, vec![950.0, 1100.0]),
        other => panic!("unexpected snapshot {other:?}"),
    }
}

#[test]
fn kind_parses_from_labels() {
    assert_eq!(
        "flatcal".parse::<CalibrationKind>().expect("parse"),
        CalibrationKind::Flatcal
    );
    assert!("darks".parse::<CalibrationKind>().is_err());
}
