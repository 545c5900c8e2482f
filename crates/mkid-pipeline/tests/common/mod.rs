#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use mkid_core::config::{load_config, CalibrationConfig};
use mkid_core::dataset::{load_dataset, DatasetSpec, Segment};
use mkid_core::errors::MkidError;
use mkid_core::photon::{PhotonTable, PixelId};
use mkid_core::provider::{PhotonTableProvider, PixelPhases, PixelRange};
use mkid_wavecal::synthetic::pixel_exposure;

pub const LINES: [(f64, f64); 2] = [(950.0, -0.5), (1100.0, -0.3)];
pub const SINGLE_LINE_PIXEL: u32 = 7;

pub fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

pub fn config() -> CalibrationConfig {
    load_config(workspace_root().join("configs/pipe.yaml")).expect("config loads")
}

pub fn wavecal_dataset() -> DatasetSpec {
    load_dataset(workspace_root().join("configs/wavecal_dataset.yaml")).expect("dataset loads")
}

pub fn flat_dataset() -> DatasetSpec {
    load_dataset(workspace_root().join("configs/flat_dataset.yaml")).expect("dataset loads")
}

/// Wavecal dataset with its two laser segments moved to new bounds.
pub fn wavecal_over(first: (f64, f64), second: (f64, f64)) -> DatasetSpec {
    let mut dataset = wavecal_dataset();
    dataset.segments = vec![
        Segment {
            start: first.0,
            stop: first.1,
            wavelength: Some(950.0),
        },
        Segment {
            start: second.0,
            stop: second.1,
            wavelength: Some(1100.0),
        },
    ];
    dataset
}

/// Laser exposures for every pixel of the fixture array; one pixel only
/// sees the 950 nm line.
pub fn array_phases(n_pixels: u32) -> Vec<PixelPhases> {
    (0..n_pixels)
        .map(|raw| {
            let lines: &[(f64, f64)] = if raw == SINGLE_LINE_PIXEL {
                &LINES[..1]
            } else {
                &LINES
            };
            pixel_exposure(
                PixelId::from_raw(raw),
                100 + raw as u64,
                lines,
                0.02,
                2000,
                36000.0,
                150.0,
            )
        })
        .collect()
}

/// In-memory provider that counts how often the fitters asked for data.
pub struct CountingProvider {
    phases: Vec<PixelPhases>,
    table: Option<PhotonTable>,
    pub raw_reads: AtomicUsize,
    pub record_reads: AtomicUsize,
}

impl CountingProvider {
    pub fn with_phases(phases: Vec<PixelPhases>) -> Self {
        Self {
            phases,
            table: None,
            raw_reads: AtomicUsize::new(0),
            record_reads: AtomicUsize::new(0),
        }
    }

    pub fn with_table(table: PhotonTable) -> Self {
        Self {
            phases: Vec::new(),
            table: Some(table),
            raw_reads: AtomicUsize::new(0),
            record_reads: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::with_phases(Vec::new())
    }

    pub fn raw_reads(&self) -> usize {
        self.raw_reads.load(Ordering::SeqCst)
    }
}

impl PhotonTableProvider for CountingProvider {
    fn read_raw_phases(
        &self,
        dataset: &DatasetSpec,
        pixels: PixelRange,
    ) -> Result<Vec<PixelPhases>, MkidError> {
        self.raw_reads.fetch_add(1, Ordering::SeqCst);
        if self.phases.is_empty() {
            return Err(MkidError::data_unavailable(
                "test.missing",
                format!("no raw phases for {}", dataset.name),
            ));
        }
        Ok(self
            .phases
            .iter()
            .filter(|p| pixels.contains(p.pixel))
            .cloned()
            .collect())
    }

    fn read_records(&self, dataset: &DatasetSpec) -> Result<PhotonTable, MkidError> {
        self.record_reads.fetch_add(1, Ordering::SeqCst);
        self.table.clone().ok_or_else(|| {
            MkidError::data_unavailable("test.missing", format!("no table for {}", dataset.name))
        })
    }

    fn write_records(&self, _dataset: &DatasetSpec, _table: &PhotonTable) -> Result<(), MkidError> {
        Ok(())
    }
}
