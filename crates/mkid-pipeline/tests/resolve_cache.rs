mod common;

use std::fs;

use common::{array_phases, config, flat_dataset, wavecal_dataset, wavecal_over, CountingProvider};
use mkid_core::config::CalibrationKind;
use mkid_core::dataset::TimeRange;
use mkid_core::errors::MkidError;
use mkid_core::photon::{PhotonRecord, PhotonTable, PixelId};
use mkid_core::quality::{BadReason, PixelFit};
use mkid_pipeline::{fetch, SolutionOrigin};
use mkid_store::SolutionStore;

fn open_store() -> (tempfile::TempDir, SolutionStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SolutionStore::open(dir.path()).expect("store opens");
    (dir, store)
}

#[test]
fn second_fetch_is_served_without_touching_raw_data() {
    let (_dir, store) = open_store();
    let config = config();
    let dataset = wavecal_dataset();
    let provider = CountingProvider::with_phases(array_phases(config.instrument.n_pixels()));

    let first = fetch(&store, &provider, &dataset, &config, CalibrationKind::Wavecal, false)
        .expect("first fetch");
    assert_eq!(first.origin, SolutionOrigin::Generated);
    assert_eq!(provider.raw_reads(), 1);

    let second = fetch(&store, &provider, &dataset, &config, CalibrationKind::Wavecal, false)
        .expect("second fetch");
    assert_eq!(second.origin, SolutionOrigin::Cache);
    assert_eq!(provider.raw_reads(), 1);
    assert_eq!(second.solution, first.solution);
}

#[test]
fn bad_pixels_do_not_fail_the_fetch() {
    let (_dir, store) = open_store();
    let config = config();
    let provider = CountingProvider::with_phases(array_phases(config.instrument.n_pixels()));
    let outcome = fetch(
        &store,
        &provider,
        &wavecal_dataset(),
        &config,
        CalibrationKind::Wavecal,
        false,
    )
    .expect("fetch");
    let body = outcome.solution.wavecal().expect("wavecal body");
    assert_eq!(
        body.pixels[common::SINGLE_LINE_PIXEL as usize],
        PixelFit::bad(BadReason::InsufficientLines)
    );
    assert_eq!(body.summary().fit, 15);
}

#[test]
fn contained_request_hits_and_outside_request_refits() {
    let (_dir, store) = open_store();
    let config = config();
    let provider = CountingProvider::with_phases(array_phases(config.instrument.n_pixels()));
    fetch(&store, &provider, &wavecal_dataset(), &config, CalibrationKind::Wavecal, false)
        .expect("seed the store");

    let inside = wavecal_over((36010.0, 36100.0), (36160.0, 36250.0));
    let hit = fetch(&store, &provider, &inside, &config, CalibrationKind::Wavecal, false)
        .expect("inside");
    assert_eq!(hit.origin, SolutionOrigin::Cache);
    assert_eq!(provider.raw_reads(), 1);

    let outside = wavecal_over((36200.0, 36350.0), (36350.0, 36500.0));
    let miss = fetch(&store, &provider, &outside, &config, CalibrationKind::Wavecal, false)
        .expect("outside");
    assert_eq!(miss.origin, SolutionOrigin::Generated);
    assert_eq!(provider.raw_reads(), 2);
    assert_eq!(store.list(None).expect("list").len(), 2);
}

#[test]
fn only_fit_relevant_changes_trigger_a_refit() {
    let (_dir, store) = open_store();
    let config = config();
    let dataset = wavecal_dataset();
    let provider = CountingProvider::with_phases(array_phases(config.instrument.n_pixels()));
    fetch(&store, &provider, &dataset, &config, CalibrationKind::Wavecal, false).expect("seed");

    let mut cosmetic = config.clone();
    cosmetic.wavecal.plots = "all".to_string();
    cosmetic.ncpu = 1;
    let outcome = fetch(&store, &provider, &dataset, &cosmetic, CalibrationKind::Wavecal, false)
        .expect("cosmetic");
    assert_eq!(outcome.origin, SolutionOrigin::Cache);

    let mut relevant = config.clone();
    relevant.wavecal.max_reduced_chi2 = 20.0;
    let outcome = fetch(&store, &provider, &dataset, &relevant, CalibrationKind::Wavecal, false)
        .expect("relevant");
    assert_eq!(outcome.origin, SolutionOrigin::Generated);
    assert_eq!(provider.raw_reads(), 2);
}

#[test]
fn force_refits_and_replaces_the_artifact() {
    let (_dir, store) = open_store();
    let config = config();
    let dataset = wavecal_dataset();
    let provider = CountingProvider::with_phases(array_phases(config.instrument.n_pixels()));
    let first = fetch(&store, &provider, &dataset, &config, CalibrationKind::Wavecal, false)
        .expect("seed");
    let forced = fetch(&store, &provider, &dataset, &config, CalibrationKind::Wavecal, true)
        .expect("forced");
    assert_eq!(forced.origin, SolutionOrigin::Generated);
    assert_eq!(provider.raw_reads(), 2);
    assert_eq!(forced.solution.fingerprint, first.solution.fingerprint);
    assert_eq!(forced.solution.body, first.solution.body, "fits are deterministic");
    assert_eq!(store.list(None).expect("list").len(), 1);
}

#[test]
fn unavailable_data_writes_nothing() {
    let (_dir, store) = open_store();
    let config = config();
    let provider = CountingProvider::empty();
    let err = fetch(
        &store,
        &provider,
        &wavecal_dataset(),
        &config,
        CalibrationKind::Wavecal,
        false,
    )
    .expect_err("no data");
    assert!(matches!(err, MkidError::DataUnavailable(_)));
    assert!(store.list(None).expect("list").is_empty());
}

#[test]
fn uncalibrated_flat_exposure_is_refused_without_a_write() {
    let (_dir, store) = open_store();
    let config = config();
    let dataset = flat_dataset();
    let records = vec![PhotonRecord::raw(40001.0, PixelId::from_raw(0), -0.4)];
    let table = PhotonTable::new(
        dataset.name.clone(),
        TimeRange::new(40000.0, 40120.0).expect("range"),
        records,
    );
    let provider = CountingProvider::with_table(table);
    let err = fetch(&store, &provider, &dataset, &config, CalibrationKind::Flatcal, false)
        .expect_err("raw phases are not wavelengths");
    assert_eq!(err.info().code, "flatcal.uncalibrated_input");
    assert!(store.list(None).expect("list").is_empty());
}

#[test]
fn corrupted_artifact_is_regenerated() {
    let (dir, store) = open_store();
    let config = config();
    let dataset = wavecal_dataset();
    let provider = CountingProvider::with_phases(array_phases(config.instrument.n_pixels()));
    fetch(&store, &provider, &dataset, &config, CalibrationKind::Wavecal, false).expect("seed");

    let row = store
        .list(Some(CalibrationKind::Wavecal))
        .expect("list")
        .pop()
        .expect("one row");
    fs::write(dir.path().join(&row.path), b"{}").expect("corrupt artifact");

    let outcome = fetch(&store, &provider, &dataset, &config, CalibrationKind::Wavecal, false)
        .expect("refetch");
    assert_eq!(outcome.origin, SolutionOrigin::Generated);
    assert_eq!(provider.raw_reads(), 2);

    let again = fetch(&store, &provider, &dataset, &config, CalibrationKind::Wavecal, false)
        .expect("cached again");
    assert_eq!(again.origin, SolutionOrigin::Cache);
}
