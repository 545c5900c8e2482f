//! Seeded synthetic laser-line exposures for tests, benches and demos.

use mkid_core::photon::PixelId;
use mkid_core::provider::{LineSamples, PixelPhases};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Gaussian phase draws via Box-Muller from a seeded generator.
pub fn gaussian_phases(rng: &mut StdRng, centroid: f64, sigma: f64, n: usize) -> Vec<f64> {
    (0..n)
        .map(|_| {
            let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
            let u2: f64 = rng.gen::<f64>();
            let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
            centroid + sigma * z
        })
        .collect()
}

/// A laser-line exposure of `n` evenly spaced photons starting at `start`.
pub fn line_exposure(
    seed: u64,
    wavelength: f64,
    centroid: f64,
    sigma: f64,
    n: usize,
    start: f64,
    exposure: f64,
) -> LineSamples {
    let mut rng = StdRng::seed_from_u64(seed);
    let step = exposure / n.max(1) as f64;
    LineSamples {
        wavelength,
        exposure,
        times: (0..n).map(|i| start + i as f64 * step).collect(),
        phases: gaussian_phases(&mut rng, centroid, sigma, n),
    }
}

/// A pixel illuminated by each `(wavelength, centroid)` line in turn.
pub fn pixel_exposure(
    pixel: PixelId,
    seed: u64,
    lines: &[(f64, f64)],
    sigma: f64,
    per_line: usize,
    start: f64,
    exposure: f64,
) -> PixelPhases {
    PixelPhases {
        pixel,
        lines: lines
            .iter()
            .enumerate()
            .map(|(idx, &(wavelength, centroid))| {
                line_exposure(
                    seed.wrapping_mul(31).wrapping_add(idx as u64),
                    wavelength,
                    centroid,
                    sigma,
                    per_line,
                    start + idx as f64 * exposure,
                    exposure,
                )
            })
            .collect(),
    }
}
