//! Photon-table provider over plain directories of bincode tables.
//!
//! A dataset's `data` directory holds one or more raw `*.bin` photon
//! tables. Tables written back through the provider land in a separate
//! output directory as `<dataset name>.bin` and take precedence over the
//! raw tables when records are read again.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use mkid_core::dataset::{coverage_contains, merge_ranges, DatasetSpec, TimeRange};
use mkid_core::errors::{ErrorInfo, MkidError};
use mkid_core::photon::{PhotonRecord, PhotonTable, PixelId};
use mkid_core::provider::{LineSamples, PhotonTableProvider, PixelPhases, PixelRange};
use tracing::debug;
use walkdir::WalkDir;

const TABLE_EXTENSION: &str = "bin";

fn unavailable(code: &str, message: impl Into<String>, dataset: &DatasetSpec) -> MkidError {
    MkidError::DataUnavailable(
        ErrorInfo::new(code, message)
            .with_context("dataset", dataset.name.clone())
            .with_context("path", dataset.data_dir().display().to_string()),
    )
}

/// Provider reading raw tables from each dataset's data directory.
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    out_dir: PathBuf,
}

impl DirectoryProvider {
    /// Provider writing calibrated tables under `out_dir`.
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    /// Where [`PhotonTableProvider::write_records`] puts `dataset`'s table.
    pub fn output_path(&self, dataset: &DatasetSpec) -> PathBuf {
        self.out_dir
            .join(format!("{}.{}", dataset.name, TABLE_EXTENSION))
    }

    fn raw_tables(&self, dataset: &DatasetSpec) -> Result<Vec<PhotonTable>, MkidError> {
        let dir = dataset.data_dir();
        if !dir.is_dir() {
            return Err(unavailable(
                "provider.missing_directory",
                "raw data directory does not exist",
                dataset,
            ));
        }
        let mut tables = Vec::new();
        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry
                .map_err(|err| unavailable("provider.walk", err.to_string(), dataset))?;
            if !entry.file_type().is_file() || !is_table(entry.path()) {
                continue;
            }
            debug!(path = %entry.path().display(), "reading photon table");
            tables.push(PhotonTable::load(entry.path())?);
        }
        if tables.is_empty() {
            return Err(unavailable(
                "provider.no_tables",
                "no photon tables found for the dataset",
                dataset,
            ));
        }
        let held: Vec<TimeRange> = tables.iter().map(PhotonTable::range).collect();
        if !coverage_contains(&merge_ranges(&held), &dataset.coverage()) {
            return Err(unavailable(
                "provider.span_missing",
                "photon tables do not cover the requested span",
                dataset,
            ));
        }
        Ok(tables)
    }
}

fn is_table(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(TABLE_EXTENSION)
}

fn in_coverage(coverage: &[TimeRange], record: &PhotonRecord) -> bool {
    coverage.iter().any(|range| range.contains_time(record.time))
}

impl PhotonTableProvider for DirectoryProvider {
    fn read_raw_phases(
        &self,
        dataset: &DatasetSpec,
        pixels: PixelRange,
    ) -> Result<Vec<PixelPhases>, MkidError> {
        let tables = self.raw_tables(dataset)?;
        if tables.iter().any(|table| table.header.wavelength_calibrated) {
            return Err(unavailable(
                "provider.calibrated_input",
                "raw phases were overwritten by an earlier calibration",
                dataset,
            ));
        }

        let lines = dataset.laser_lines();
        let exposures: Vec<f64> = lines
            .iter()
            .map(|line| {
                let ranges: Vec<TimeRange> = dataset
                    .segments
                    .iter()
                    .filter(|segment| segment.wavelength == Some(*line))
                    .map(|segment| segment.range())
                    .collect();
                merge_ranges(&ranges).iter().map(TimeRange::duration).sum()
            })
            .collect();
        let lit: Vec<(TimeRange, usize)> = dataset
            .segments
            .iter()
            .filter_map(|segment| {
                let wavelength = segment.wavelength?;
                let line = lines.iter().position(|l| *l == wavelength)?;
                Some((segment.range(), line))
            })
            .collect();

        let mut grouped: BTreeMap<u32, BTreeMap<usize, LineSamples>> = BTreeMap::new();
        for record in tables.iter().flat_map(|table| &table.records) {
            if !pixels.contains(record.pixel) {
                continue;
            }
            let Some(&(_, line)) = lit.iter().find(|(range, _)| range.contains_time(record.time))
            else {
                continue;
            };
            let samples = grouped
                .entry(record.pixel.as_raw())
                .or_default()
                .entry(line)
                .or_insert_with(|| LineSamples {
                    wavelength: lines[line],
                    exposure: exposures[line],
                    times: Vec::new(),
                    phases: Vec::new(),
                });
            samples.times.push(record.time);
            samples.phases.push(record.wavelength);
        }

        Ok(grouped
            .into_iter()
            .map(|(pixel, by_line)| PixelPhases {
                pixel: PixelId::from_raw(pixel),
                lines: by_line.into_values().collect(),
            })
            .collect())
    }

    fn read_records(&self, dataset: &DatasetSpec) -> Result<PhotonTable, MkidError> {
        let written = self.output_path(dataset);
        let tables = if written.is_file() {
            vec![PhotonTable::load(&written)?]
        } else {
            self.raw_tables(dataset)?
        };
        let calibrated = tables[0].header.wavelength_calibrated;
        if tables
            .iter()
            .any(|table| table.header.wavelength_calibrated != calibrated)
        {
            return Err(unavailable(
                "provider.mixed_calibration",
                "tables disagree on whether wavelengths are calibrated",
                dataset,
            ));
        }

        let coverage = dataset.coverage();
        let span = dataset.span().ok_or_else(|| {
            unavailable("provider.empty_dataset", "dataset has no segments", dataset)
        })?;
        let history = tables[0].header.history.clone();
        let mut records: Vec<PhotonRecord> = tables
            .into_iter()
            .flat_map(|table| table.records)
            .filter(|record| in_coverage(&coverage, record))
            .collect();
        records.sort_by(|a, b| a.time.total_cmp(&b.time));

        let mut table = PhotonTable::new(dataset.name.clone(), span, records);
        table.header.wavelength_calibrated = calibrated;
        table.header.history = history;
        Ok(table)
    }

    fn write_records(&self, dataset: &DatasetSpec, table: &PhotonTable) -> Result<(), MkidError> {
        let path = self.output_path(dataset);
        table.save(&path)?;
        debug!(path = %path.display(), records = table.records.len(), "photon table written");
        Ok(())
    }
}
