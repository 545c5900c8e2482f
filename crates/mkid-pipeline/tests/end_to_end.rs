mod common;

use std::path::Path;

use common::{config, flat_dataset, wavecal_dataset, LINES};
use mkid_core::config::{CalibrationConfig, CalibrationKind};
use mkid_core::dataset::{DatasetSpec, TimeRange};
use mkid_core::errors::MkidError;
use mkid_core::photon::{PhotonFlags, PhotonRecord, PhotonTable, PixelId};
use mkid_core::provider::PhotonTableProvider;
use mkid_core::quality::{BadReason, PixelFit};
use mkid_pipeline::{apply, fetch, DirectoryProvider, SolutionOrigin};
use mkid_store::SolutionStore;
use mkid_wavecal::synthetic::line_exposure;

const PIXEL_A: u32 = 0;
const PIXEL_B: u32 = 1;

/// 10:00 to 10:05 in seconds of day.
const START: f64 = 36000.0;
const SPLIT: f64 = 36150.0;
const STOP: f64 = 36300.0;

fn raw_laser_records() -> Vec<PhotonRecord> {
    let mut records = Vec::new();
    let exposures = [
        (PIXEL_A, 1, LINES[0], START),
        (PIXEL_A, 2, LINES[1], SPLIT),
        (PIXEL_B, 3, LINES[0], START),
    ];
    for (pixel, seed, (wavelength, centroid), start) in exposures {
        let samples = line_exposure(seed, wavelength, centroid, 0.02, 2000, start, SPLIT - START);
        records.extend(
            samples
                .times
                .iter()
                .zip(&samples.phases)
                .map(|(&t, &phase)| PhotonRecord::raw(t, PixelId::from_raw(pixel), phase)),
        );
    }
    records.sort_by(|a, b| a.time.total_cmp(&b.time));
    records
}

fn write_raw(dir: &Path, name: &str, range: TimeRange, records: Vec<PhotonRecord>) {
    PhotonTable::new(name, range, records)
        .save(dir.join(format!("{name}.bin")))
        .expect("raw table written");
}

struct Workspace {
    _root: tempfile::TempDir,
    store: SolutionStore,
    provider: DirectoryProvider,
    config: CalibrationConfig,
    dataset: DatasetSpec,
}

fn workspace() -> Workspace {
    let root = tempfile::tempdir().expect("tempdir");
    let raw = root.path().join("raw").join("wavecal");
    write_raw(
        &raw,
        "laser",
        TimeRange::new(START, STOP).expect("range"),
        raw_laser_records(),
    );
    let mut dataset = wavecal_dataset();
    dataset.data = raw;
    let store = SolutionStore::open(root.path().join("database")).expect("store");
    let provider = DirectoryProvider::new(root.path().join("out"));
    Workspace {
        _root: root,
        store,
        provider,
        config: config(),
        dataset,
    }
}

#[test]
fn fetch_then_apply_calibrates_a_two_line_pixel_and_flags_a_one_line_pixel() {
    let ws = workspace();
    assert_eq!(ws.dataset.coverage(), vec![TimeRange::new(START, STOP).expect("range")]);

    let outcome = fetch(
        &ws.store,
        &ws.provider,
        &ws.dataset,
        &ws.config,
        CalibrationKind::Wavecal,
        false,
    )
    .expect("fetch");
    assert_eq!(outcome.origin, SolutionOrigin::Generated);
    let body = outcome.solution.wavecal().expect("wavecal body");
    assert!(body.pixels[PIXEL_A as usize].is_fit());
    assert_eq!(
        body.pixels[PIXEL_B as usize],
        PixelFit::bad(BadReason::InsufficientLines)
    );
    assert_eq!(body.pixels[2], PixelFit::bad(BadReason::NoData));

    let mut science = PhotonTable::new(
        "science",
        TimeRange::new(50000.0, 50010.0).expect("range"),
        vec![
            PhotonRecord::raw(50001.0, PixelId::from_raw(PIXEL_A), -0.4),
            PhotonRecord::raw(50002.0, PixelId::from_raw(PIXEL_B), -0.4),
        ],
    );
    let report = apply(&outcome.solution, &mut science);
    assert_eq!(report.records_calibrated, 1);
    assert_eq!(report.records_flagged, 1);

    let a = science.records[0];
    assert!(
        a.wavelength > 950.0 && a.wavelength < 1100.0,
        "pixel A mapped -0.4 to {}",
        a.wavelength
    );
    assert!(a.flags().is_empty());

    let b = science.records[1];
    assert_eq!(b.wavelength, -0.4);
    assert!(b.flags().contains(PhotonFlags::UNCALIBRATED));

    let again = fetch(
        &ws.store,
        &ws.provider,
        &ws.dataset,
        &ws.config,
        CalibrationKind::Wavecal,
        false,
    )
    .expect("second fetch");
    assert_eq!(again.origin, SolutionOrigin::Cache);
    assert_eq!(again.solution, outcome.solution);
}

#[test]
fn raw_phases_are_grouped_by_pixel_and_laser_line() {
    let ws = workspace();
    let phases = ws
        .provider
        .read_raw_phases(&ws.dataset, mkid_core::provider::PixelRange::first(16))
        .expect("phases");
    assert_eq!(phases.len(), 2);
    assert_eq!(phases[0].pixel, PixelId::from_raw(PIXEL_A));
    let lines: Vec<f64> = phases[0].lines.iter().map(|l| l.wavelength).collect();
    assert_eq!(lines, vec![950.0, 1100.0]);
    assert!(phases[0].lines.iter().all(|l| l.times.len() == 2000));
    assert!(phases[0].lines.iter().all(|l| l.exposure == 150.0));
    assert_eq!(phases[1].lines.len(), 1);

    let only_b = ws
        .provider
        .read_raw_phases(&ws.dataset, mkid_core::provider::PixelRange::new(1, 16))
        .expect("phases");
    assert_eq!(only_b.len(), 1);
    assert_eq!(only_b[0].pixel, PixelId::from_raw(PIXEL_B));
}

#[test]
fn missing_or_short_raw_data_is_unavailable_and_nothing_is_stored() {
    let ws = workspace();
    let mut missing = ws.dataset.clone();
    missing.data = ws.dataset.data.join("nowhere");
    let err = fetch(
        &ws.store,
        &ws.provider,
        &missing,
        &ws.config,
        CalibrationKind::Wavecal,
        false,
    )
    .expect_err("missing directory");
    assert!(matches!(err, MkidError::DataUnavailable(_)));

    let mut longer = ws.dataset.clone();
    longer.segments[1].stop = STOP + 60.0;
    let err = fetch(
        &ws.store,
        &ws.provider,
        &longer,
        &ws.config,
        CalibrationKind::Wavecal,
        false,
    )
    .expect_err("table ends early");
    assert_eq!(err.info().code, "provider.span_missing");

    assert!(ws.store.list(None).expect("list").is_empty());
}

#[test]
fn flat_exposure_round_trips_through_the_provider_and_fits() {
    let ws = workspace();
    let mut dataset = flat_dataset();
    let raw = ws.dataset.data.parent().expect("raw root").join("flat");
    dataset.data = raw.clone();

    // Pixel p sees p + 1 photons per second at 1000 nm for the whole exposure.
    let mut records = Vec::new();
    for chunk in 0..12u32 {
        for pixel in 0..16u32 {
            let n = 10 * (pixel + 1);
            let step = 10.0 / f64::from(n);
            for i in 0..n {
                let t = 40000.0 + f64::from(chunk) * 10.0 + f64::from(i) * step;
                records.push(PhotonRecord {
                    time: t,
                    pixel: PixelId::from_raw(pixel),
                    wavelength: 1000.0,
                    weight: 1.0,
                    flags: 0,
                });
            }
        }
    }
    let mut table = PhotonTable::new(
        dataset.name.clone(),
        TimeRange::new(40000.0, 40120.0).expect("range"),
        records,
    );
    table.header.wavelength_calibrated = true;
    ws.provider.write_records(&dataset, &table).expect("write");
    assert!(ws.provider.output_path(&dataset).is_file());
    assert!(!raw.exists(), "written tables never land in the raw directory");

    let read = ws.provider.read_records(&dataset).expect("read back");
    assert!(read.header.wavelength_calibrated);
    assert_eq!(read.records.len(), table.records.len());

    let outcome = fetch(
        &ws.store,
        &ws.provider,
        &dataset,
        &ws.config,
        CalibrationKind::Flatcal,
        false,
    )
    .expect("flat fetch");
    let body = outcome.solution.flatcal().expect("flat body");
    assert_eq!(body.summary().fit, 16);
    let w0 = body.weight(PixelId::from_raw(0), 1000.0).expect("pixel 0 weight");
    let w15 = body.weight(PixelId::from_raw(15), 1000.0).expect("pixel 15 weight");
    assert!((w0 - 8.5).abs() < 1e-9, "w0 = {w0}");
    assert!((w15 - 8.5 / 16.0).abs() < 1e-9, "w15 = {w15}");
}
