use mkid_wavecal::model::fit_model;
use mkid_wavecal::Peak;
use proptest::prelude::*;

fn peak(centroid: f64) -> Peak {
    Peak {
        centroid,
        sigma: 0.02,
        uncertainty: 1e-4,
        counts: 2000,
    }
}

proptest! {
    #[test]
    fn two_line_models_invert_inside_the_usable_range(
        low in -0.9f64..-0.5,
        gap in 0.1f64..0.4,
        frac in 0.0f64..=1.0,
    ) {
        let peaks = vec![(950.0, peak(low)), (1100.0, peak(low + gap))];
        let model = fit_model(&peaks, 2, 10.0).expect("two lines fit a line");
        prop_assert_eq!(model.coefficients.len(), 2);

        let phase = low + frac * gap;
        let wavelength = model.wavelength(phase).expect("positive energy");
        prop_assert!(wavelength > 950.0 - 1e-6 && wavelength < 1100.0 + 1e-6);

        let back = model.phase_at(wavelength).expect("inside range");
        prop_assert!((back - phase).abs() < 1e-9, "{} came back as {}", phase, back);
    }
}
