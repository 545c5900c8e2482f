use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mkid_core::config::WavecalConfig;
use mkid_core::photon::PixelId;
use mkid_wavecal::fit::fit_wavecal;
use mkid_wavecal::synthetic::pixel_exposure;

fn bench_wavecal(c: &mut Criterion) {
    let key = WavecalConfig::default().fit_key();
    let lines = [(950.0, -0.5), (1100.0, -0.3), (1250.0, -0.15)];
    let phases: Vec<_> = (0..64u32)
        .map(|raw| pixel_exposure(PixelId::from_raw(raw), raw as u64, &lines, 0.02, 2000, 0.0, 150.0))
        .collect();

    c.bench_function("wavecal_fit_64_pixels", |b| {
        b.iter(|| {
            let body = fit_wavecal(black_box(&phases), 64, &key, 0).expect("bench fit");
            black_box(body);
        });
    });
}

criterion_group!(benches, bench_wavecal);
criterion_main!(benches);
