//! Solution applier.
//!
//! Application is destructive: raw phases are overwritten by wavelengths
//! and flat weights multiply into the record weight. Nothing here checks
//! whether a table was already calibrated; callers keep an uncalibrated
//! copy if they need to roll back.

use std::collections::BTreeSet;

use chrono::{SecondsFormat, Utc};
use mkid_core::config::CalibrationKind;
use mkid_core::photon::{AppliedCalibration, PhotonFlags, PhotonTable, PixelId};
use mkid_core::quality::PixelFit;
use mkid_flatcal::FlatcalBody;
use mkid_store::{CalibrationSolution, SolutionBody};
use mkid_wavecal::WavecalBody;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Tallies produced by one [`apply`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    /// Step that was applied.
    pub kind: CalibrationKind,
    /// Fingerprint key of the applied solution.
    pub key: String,
    /// Records visited.
    pub records_total: usize,
    /// Records whose value or weight was updated.
    pub records_calibrated: usize,
    /// Records left unchanged and flagged uncalibrated.
    pub records_flagged: usize,
    /// Distinct pixels in the table with a usable solution entry.
    pub pixels_calibrated: usize,
    /// Distinct pixels in the table flagged bad or missing from the solution.
    pub pixels_uncalibrated: usize,
}

#[derive(Default)]
struct Tally {
    calibrated: usize,
    flagged: usize,
    good_pixels: BTreeSet<PixelId>,
    bad_pixels: BTreeSet<PixelId>,
}

/// Applies `solution` to every record of `table` in place.
///
/// Applying the same or another solution a second time compounds the
/// correction; the result is then wrong and is not detected here.
pub fn apply(solution: &CalibrationSolution, table: &mut PhotonTable) -> ApplyReport {
    let tally = match &solution.body {
        SolutionBody::Wavecal(body) => apply_wavecal(body, table),
        SolutionBody::Flatcal(body) => {
            if !table.header.wavelength_calibrated {
                warn!(
                    dataset = %table.header.dataset,
                    "flat weights applied to a table holding raw phases"
                );
            }
            apply_flatcal(body, table)
        }
    };
    table.header.history.push(AppliedCalibration {
        kind: solution.kind(),
        key: solution.fingerprint.key.clone(),
        applied_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
    });

    let report = ApplyReport {
        kind: solution.kind(),
        key: solution.fingerprint.key.clone(),
        records_total: table.records.len(),
        records_calibrated: tally.calibrated,
        records_flagged: tally.flagged,
        pixels_calibrated: tally.good_pixels.len(),
        pixels_uncalibrated: tally.bad_pixels.len(),
    };
    info!(
        kind = %report.kind,
        key = solution.fingerprint.short_key(),
        dataset = %table.header.dataset,
        calibrated = report.records_calibrated,
        flagged = report.records_flagged,
        "calibration applied"
    );
    report
}

fn apply_wavecal(body: &WavecalBody, table: &mut PhotonTable) -> Tally {
    let mut tally = Tally::default();
    let bad = PhotonFlags::UNCALIBRATED | PhotonFlags::WAVECAL_BAD;
    for record in &mut table.records {
        let model = match body.outcome(record.pixel) {
            PixelFit::Fit(model) => {
                tally.good_pixels.insert(record.pixel);
                model
            }
            PixelFit::Bad { .. } => {
                tally.bad_pixels.insert(record.pixel);
                record.insert_flags(bad);
                tally.flagged += 1;
                continue;
            }
        };
        match model.wavelength(record.wavelength) {
            Some(wavelength) => {
                record.wavelength = wavelength;
                tally.calibrated += 1;
            }
            None => {
                record.insert_flags(bad);
                tally.flagged += 1;
            }
        }
    }
    table.header.wavelength_calibrated = true;
    tally
}

fn apply_flatcal(body: &FlatcalBody, table: &mut PhotonTable) -> Tally {
    let mut tally = Tally::default();
    for record in &mut table.records {
        if matches!(body.pixels.get(record.pixel.index()), Some(PixelFit::Fit(_))) {
            tally.good_pixels.insert(record.pixel);
        } else {
            tally.bad_pixels.insert(record.pixel);
        }
        match body.weight(record.pixel, record.wavelength) {
            Ok(weight) => {
                record.weight *= weight.max(0.0);
                tally.calibrated += 1;
            }
            Err(miss) => {
                record.insert_flags(miss.flags());
                tally.flagged += 1;
            }
        }
    }
    tally
}
