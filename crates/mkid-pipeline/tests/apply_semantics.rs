mod common;

use common::{array_phases, config, flat_dataset, wavecal_dataset};
use mkid_core::config::CalibrationKind;
use mkid_core::dataset::TimeRange;
use mkid_core::photon::{PhotonFlags, PhotonRecord, PhotonTable, PixelId};
use mkid_core::quality::{BadReason, PixelFit};
use mkid_flatcal::bins::WavelengthBins;
use mkid_flatcal::{FlatcalBody, PixelWeights};
use mkid_pipeline::apply;
use mkid_store::{CalibrationSolution, SolutionBody};
use mkid_wavecal::{fit_wavecal, HC_EV_NM};

const BAD_PIXEL: u32 = 3;

fn wavecal_solution() -> CalibrationSolution {
    let config = config();
    let dataset = wavecal_dataset();
    let n_pixels = config.instrument.n_pixels();
    let mut phases = array_phases(n_pixels);
    phases[BAD_PIXEL as usize].lines.truncate(1);
    let body = fit_wavecal(&phases, n_pixels, &config.wavecal.fit_key(), 2).expect("fit");
    CalibrationSolution::new(
        config.snapshot(CalibrationKind::Wavecal, &dataset),
        &dataset.coverage(),
        SolutionBody::Wavecal(body),
    )
    .expect("solution")
}

fn science_table() -> PhotonTable {
    let mut records = Vec::new();
    for (idx, phase) in [-0.45, -0.4, -0.35].into_iter().enumerate() {
        for pixel in 0..5u32 {
            records.push(PhotonRecord::raw(
                50000.0 + idx as f64 + pixel as f64 * 0.1,
                PixelId::from_raw(pixel),
                phase,
            ));
        }
    }
    PhotonTable::new(
        "science",
        TimeRange::new(50000.0, 50010.0).expect("range"),
        records,
    )
}

#[test]
fn usable_pixels_get_the_exact_inverse_and_bad_pixels_are_flagged() {
    let solution = wavecal_solution();
    let body = solution.wavecal().expect("wavecal body");
    let raw = science_table();
    let mut table = raw.clone();

    let report = apply(&solution, &mut table);

    assert_eq!(report.kind, CalibrationKind::Wavecal);
    assert_eq!(report.records_total, 15);
    assert_eq!(report.records_flagged, 3);
    assert_eq!(report.records_calibrated, 12);
    assert_eq!(report.pixels_calibrated, 4);
    assert_eq!(report.pixels_uncalibrated, 1);

    for (before, after) in raw.records.iter().zip(&table.records) {
        assert_eq!(before.time, after.time);
        assert_eq!(before.pixel, after.pixel);
        assert_eq!(before.weight, after.weight);
        if after.pixel.as_raw() == BAD_PIXEL {
            assert_eq!(after.wavelength, before.wavelength, "phase kept");
            assert!(after
                .flags()
                .contains(PhotonFlags::UNCALIBRATED | PhotonFlags::WAVECAL_BAD));
            continue;
        }
        let model = body.model(after.pixel).expect("usable model");
        let expected = HC_EV_NM / model.energy(before.wavelength);
        assert!((after.wavelength - expected).abs() < 1e-9);
        let recovered = model.phase_at(after.wavelength).expect("phase in range");
        assert!(
            (recovered - before.wavelength).abs() < 1e-9,
            "pixel {} phase {} came back as {recovered}",
            after.pixel.as_raw(),
            before.wavelength
        );
        assert!(after.flags().is_empty());
    }

    assert!(table.header.wavelength_calibrated);
    assert_eq!(table.header.history.len(), 1);
    assert_eq!(table.header.history[0].kind, CalibrationKind::Wavecal);
    assert_eq!(table.header.history[0].key, solution.fingerprint.key);
}

#[test]
fn applying_twice_compounds_instead_of_being_a_no_op() {
    let solution = wavecal_solution();
    let mut table = science_table();
    apply(&solution, &mut table);
    let once = table.clone();

    apply(&solution, &mut table);

    assert_ne!(
        table.records, once.records,
        "a second application must not silently reproduce the first"
    );
    assert_eq!(table.header.history.len(), 2);
}

fn flat_solution() -> CalibrationSolution {
    let config = config();
    let dataset = flat_dataset();
    let bins = WavelengthBins::for_instrument(&config.instrument, 50.0).expect("bins");
    let weights = |value: Option<f64>| PixelWeights {
        rates: vec![1.0; bins.count],
        weights: vec![value; bins.count],
        weight_errors: vec![value.map(|w| w * 0.01); bins.count],
        valid_chunks: 12,
    };
    let mut pixels = vec![PixelFit::bad(BadReason::NoValidChunks); 16];
    pixels[0] = PixelFit::Fit(weights(Some(2.0)));
    pixels[1] = PixelFit::bad(BadReason::RateCutoff);
    pixels[2] = PixelFit::Fit(weights(None));
    pixels[3] = PixelFit::Fit(weights(Some(-0.5)));
    let body = FlatcalBody {
        reference_rates: vec![Some(1.0); bins.count],
        bins,
        pixels,
    };
    CalibrationSolution::new(
        config.snapshot(CalibrationKind::Flatcal, &dataset),
        &dataset.coverage(),
        SolutionBody::Flatcal(body),
    )
    .expect("solution")
}

fn calibrated(records: Vec<(u32, f64, f64)>) -> PhotonTable {
    let records = records
        .into_iter()
        .enumerate()
        .map(|(idx, (pixel, wavelength, weight))| PhotonRecord {
            time: 40000.0 + idx as f64,
            pixel: PixelId::from_raw(pixel),
            wavelength,
            weight,
            flags: 0,
        })
        .collect();
    let mut table = PhotonTable::new(
        "flat",
        TimeRange::new(40000.0, 40120.0).expect("range"),
        records,
    );
    table.header.wavelength_calibrated = true;
    table
}

#[test]
fn flat_weights_multiply_and_misses_are_flagged() {
    let solution = flat_solution();
    let mut table = calibrated(vec![
        (0, 1000.0, 0.5),
        (0, 900.0, 0.5),
        (0, 1400.0, 0.5),
        (1, 1000.0, 0.5),
        (2, 1000.0, 0.5),
        (3, 1000.0, 0.5),
    ]);

    let report = apply(&solution, &mut table);

    let records = &table.records;
    assert_eq!(records[0].weight, 1.0);
    assert!(records[0].flags().is_empty());

    assert_eq!(records[1].weight, 0.5);
    assert!(records[1]
        .flags()
        .contains(PhotonFlags::UNCALIBRATED | PhotonFlags::BELOW_RANGE));
    assert_eq!(records[2].weight, 0.5);
    assert!(records[2]
        .flags()
        .contains(PhotonFlags::UNCALIBRATED | PhotonFlags::ABOVE_RANGE));

    for record in &records[3..5] {
        assert_eq!(record.weight, 0.5);
        assert!(record
            .flags()
            .contains(PhotonFlags::UNCALIBRATED | PhotonFlags::FLATCAL_BAD));
    }
    assert_eq!(records[5].weight, 0.0, "negative weights clip to zero");
    assert!(records[5].flags().is_empty());
    assert!(records.iter().all(|r| r.wavelength > 0.0), "wavelengths untouched");

    assert_eq!(report.records_calibrated, 2);
    assert_eq!(report.records_flagged, 4);
    assert_eq!(report.pixels_calibrated, 3);
    assert_eq!(report.pixels_uncalibrated, 1);
    assert_eq!(table.header.history.last().map(|h| h.kind), Some(CalibrationKind::Flatcal));
}
