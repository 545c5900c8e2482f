use mkid_core::config::InstrumentConfig;
use mkid_core::dataset::TimeRange;
use mkid_flatcal::bins::{BinLookup, WavelengthBins};
use mkid_flatcal::chunks::{chunk_of, partition};

fn range(start: f64, stop: f64) -> TimeRange {
    TimeRange::new(start, stop).expect("range")
}

#[test]
fn remainder_is_truncated_per_interval() {
    let chunks = partition(&[range(0.0, 25.0), range(100.0, 131.0)], 10.0);
    assert_eq!(chunks.len(), 5);
    assert_eq!(chunks[2], range(100.0, 110.0));
    assert_eq!(chunk_of(&chunks, 19.99), Some(1));
    assert_eq!(chunk_of(&chunks, 22.0), None);
    assert_eq!(chunk_of(&chunks, 129.0), Some(4));
    assert_eq!(chunk_of(&chunks, 130.0), None);
    assert_eq!(chunk_of(&chunks, -1.0), None);
}

#[test]
fn short_exposure_has_no_chunks() {
    assert!(partition(&[range(0.0, 9.0)], 10.0).is_empty());
}

#[test]
fn bins_cover_the_instrument_band() {
    let instrument = InstrumentConfig {
        name: "MEC".to_string(),
        ncols: 1,
        nrows: 1,
        minimum_wavelength: 950.0,
        maximum_wavelength: 1375.0,
    };
    let bins = WavelengthBins::for_instrument(&instrument, 50.0).expect("bins");
    assert_eq!(bins.count, 9);
    assert_eq!(bins.lookup(950.0), BinLookup::Bin(0));
    assert_eq!(bins.lookup(1374.9), BinLookup::Bin(8));
    assert_eq!(bins.lookup(949.0), BinLookup::Below);
    assert_eq!(bins.lookup(f64::NAN), BinLookup::Above);
    assert!((bins.centers()[8] - 1362.5).abs() < 1e-9);
    assert!(WavelengthBins::for_instrument(&instrument, 0.0).is_err());
}
