/*
Measures the per-cycle preprocessing cost in isolation: wavelet denoising of one
channel, the full six-channel preprocess of a 500-sample snapshot, and window
slicing. Together these bound how short the inter-cycle interval can be.
*/

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::hint::black_box;

use turbine_edge::acquisition::features::FeatureVector;
use turbine_edge::config::PipelineConfig;
use turbine_edge::processing::{
    preprocess::Preprocessor, wavelet::wavelet_denoise, window::create_windows,
};

const SNAPSHOT_SIZES: &[usize] = &[128, 500, 2_000];

fn snapshot(n: usize) -> Vec<FeatureVector> {
    let mut rng = StdRng::seed_from_u64(7);
    (0..n)
        .map(|_| {
            let mut v = [0.0; 6];
            for x in v.iter_mut() {
                *x = rng.random_range(-1.0..1.0);
            }
            FeatureVector(v)
        })
        .collect()
}

fn bench_wavelet(c: &mut Criterion) {
    let mut group = c.benchmark_group("wavelet_denoise");
    for &n in SNAPSHOT_SIZES {
        let signal: Vec<f64> = snapshot(n).iter().map(|f| f.0[0]).collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &signal, |b, s| {
            b.iter(|| wavelet_denoise(black_box(s), 0.1, 4));
        });
    }
    group.finish();
}

fn bench_preprocess(c: &mut Criterion) {
    let config = PipelineConfig::default();
    let pre = Preprocessor::from_config(&config);
    let samples = snapshot(config.window.min_fill + 1);

    c.bench_function("preprocess_snapshot", |b| {
        b.iter(|| pre.run(black_box(&samples)))
    });

    let series = match pre.run(&samples) {
        Ok(s) => s,
        Err(e) => panic!("preprocess failed: {}", e),
    };
    c.bench_function("create_windows", |b| {
        b.iter(|| {
            create_windows(
                black_box(&series),
                config.window.window_length,
                config.window.stride,
            )
        })
    });
}

criterion_group!(benches, bench_wavelet, bench_preprocess);
criterion_main!(benches);
