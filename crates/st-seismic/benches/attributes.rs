// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use st_seismic::synthetic::{dipping_sinusoid, random_noise};
use st_seismic::{
    coherence, curvature, load, normalize, CurvatureParams, LoadRequest, LoaderOptions,
    NormalizationMode, NormalizeParams, PatchSize, Volume,
};

fn survey(edge: usize) -> Volume {
    let source = dipping_sinusoid([edge, edge, 2 * edge], [0.5, 0.25], 12.0);
    match load(&source, &LoadRequest::default(), &LoaderOptions::default()) {
        Ok(loaded) => loaded.volume,
        Err(err) => panic!("synthetic load failed: {err}"),
    }
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");
    for edge in [32usize, 64] {
        let volume = survey(edge);
        for mode in [NormalizationMode::Trace, NormalizationMode::Both] {
            let params = NormalizeParams::new(mode);
            group.bench_with_input(BenchmarkId::new(mode.as_str(), edge), &volume, |b, v| {
                b.iter(|| black_box(normalize(v.clone(), &params)))
            });
        }
    }
    group.finish();
}

fn bench_coherence(c: &mut Criterion) {
    let mut group = c.benchmark_group("coherence");
    let patch = PatchSize::default();
    for edge in [32usize, 64] {
        let volume = survey(edge);
        group.bench_with_input(BenchmarkId::from_parameter(edge), &volume, |b, v| {
            b.iter(|| black_box(coherence(v, &patch)))
        });
    }
    group.finish();
}

fn bench_curvature(c: &mut Criterion) {
    let params = CurvatureParams::default();
    let volume = survey(48);
    c.bench_function("curvature/48", |b| {
        b.iter(|| black_box(curvature(&volume, &params)))
    });
}

fn bench_fallback_load(c: &mut Criterion) {
    let source = random_noise([48, 48, 96], Some(7)).with_bulk_limit(0);
    c.bench_function("load/incremental/48", |b| {
        b.iter(|| black_box(load(&source, &LoadRequest::default(), &LoaderOptions::default())))
    });
}

criterion_group!(
    benches,
    bench_normalize,
    bench_coherence,
    bench_curvature,
    bench_fallback_load
);
criterion_main!(benches);
