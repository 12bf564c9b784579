// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use approx::assert_abs_diff_eq;
use st_seismic::synthetic::dipping_sinusoid;
use st_seismic::{
    parse_patch, parse_range, AttributeKind, CurvatureParams, CurvatureVariant, LoadPath,
    LoadRequest, LoaderOptions, MemoryWriter, NormalizationMode, NormalizeParams, Pipeline,
    PipelineConfig, TraceSource, ZWindow,
};

const SHAPE: [usize; 3] = [10, 10, 20];

/// Mirror index without repeating the edge sample.
fn mirror(i: isize, n: isize) -> usize {
    let mut i = i;
    while i < 0 || i >= n {
        if i < 0 {
            i = -i;
        }
        if i >= n {
            i = 2 * (n - 1) - i;
        }
    }
    i as usize
}

/// Z-window normalisation of one trace, written out longhand.
fn normalize_trace(trace: &[f32], window: isize) -> Vec<f64> {
    let n = trace.len() as isize;
    let half = window / 2;
    (0..n)
        .map(|k| {
            let values: Vec<f64> = (k - half..=k + half)
                .map(|t| trace[mirror(t, n)] as f64)
                .collect();
            let mean = values.iter().sum::<f64>() / window as f64;
            let mean_sq = values.iter().map(|v| v * v).sum::<f64>() / window as f64;
            let std = (mean_sq - mean * mean).max(0.0).sqrt();
            (trace[k as usize] as f64 - mean) / (std + 1e-6)
        })
        .collect()
}

#[test]
fn cropped_coherence_matches_hand_computed_semblance() {
    let source = dipping_sinusoid(SHAPE, [0.5, 0.25], 8.0);
    let config = PipelineConfig::default()
        .with_request(LoadRequest {
            inline: Some(parse_range("2:8").unwrap()),
            ..LoadRequest::default()
        })
        .with_normalize(
            NormalizeParams::new(NormalizationMode::ZWindow)
                .with_z_window(ZWindow::new(5).unwrap()),
        )
        .with_coherence(parse_patch("3,3,5").unwrap());

    let mut writer = MemoryWriter::new();
    let report = Pipeline::new(config).unwrap().run(&source, &mut writer).unwrap();
    let output = &writer.get(AttributeKind::Coherence).unwrap().volume;
    assert_eq!(output.shape(), [6, 10, 20]);
    assert_eq!(report.geometry.cropped_shape, [6, 10, 20]);
    assert_eq!(report.geometry.original_shape, SHAPE);

    // Normalised crop, inline index relative to the crop.
    let data = source.data();
    let normalized = |i: usize, j: usize| -> Vec<f64> {
        let trace: Vec<f32> = (0..SHAPE[2]).map(|k| data[[i + 2, j, k]]).collect();
        normalize_trace(&trace, 5)
    };

    for &(i, j, k) in &[(2usize, 4usize, 9usize), (3, 6, 12)] {
        let (mut s1, mut s2) = (0.0f64, 0.0f64);
        for di in -1isize..=1 {
            for dj in -1isize..=1 {
                let trace = normalized(
                    (i as isize + di).clamp(0, 5) as usize,
                    (j as isize + dj).clamp(0, 9) as usize,
                );
                for dk in -2isize..=2 {
                    let v = trace[(k as isize + dk).clamp(0, 19) as usize];
                    s1 += v;
                    s2 += v * v;
                }
            }
        }
        let expected = (s1 * s1 / (45.0 * s2 + 1e-6)) as f32;
        assert_abs_diff_eq!(output.get([i, j, k]).unwrap(), expected, epsilon = 1e-4);
    }
}

#[test]
fn fallback_path_matches_bulk_path() {
    let config = PipelineConfig::default()
        .with_request(LoadRequest {
            inline: Some(parse_range("1:9").unwrap()),
            depth: Some(parse_range("2:18").unwrap()),
            ..LoadRequest::default()
        })
        .with_coherence(parse_patch("3,3,5").unwrap())
        .with_curvature(CurvatureParams::with_variants(vec![
            CurvatureVariant::Mean,
            CurvatureVariant::Gaussian,
        ]));

    let bulk_source = dipping_sinusoid(SHAPE, [0.5, 0.25], 8.0);
    let mut bulk = MemoryWriter::new();
    let bulk_report = Pipeline::new(config.clone())
        .unwrap()
        .run(&bulk_source, &mut bulk)
        .unwrap();

    let fallback_source = dipping_sinusoid(SHAPE, [0.5, 0.25], 8.0).with_bulk_limit(1024);
    let mut fallback = MemoryWriter::new();
    let fallback_config = config.with_loader(LoaderOptions {
        memory_budget_bytes: None,
        trace_batch: 7,
    });
    let fallback_report = Pipeline::new(fallback_config)
        .unwrap()
        .run(&fallback_source, &mut fallback)
        .unwrap();

    assert_eq!(bulk_report.load_path, LoadPath::Bulk);
    assert_eq!(fallback_report.load_path, LoadPath::Incremental);
    assert_eq!(fallback_source.trace_reads(), 8 * 10);
    assert_eq!(bulk_report.geometry, fallback_report.geometry);
    assert_eq!(bulk.kinds(), fallback.kinds());
    for (a, b) in bulk.outputs().iter().zip(fallback.outputs()) {
        assert_eq!(a.volume, b.volume, "{} differs between paths", a.kind);
    }
}

#[test]
fn out_of_extent_crop_fails_before_reading() {
    let source = dipping_sinusoid(SHAPE, [0.5, 0.25], 8.0);
    let config = PipelineConfig::default()
        .with_request(LoadRequest {
            crossline: Some(parse_range("0:12").unwrap()),
            ..LoadRequest::default()
        })
        .with_coherence(parse_patch("3,3,3").unwrap());
    let err = Pipeline::new(config)
        .unwrap()
        .run(&source, &mut MemoryWriter::new())
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "crossline range 0:12 exceeds the source extent of 10 samples"
    );
    assert_eq!(source.bulk_reads() + source.trace_reads(), 0);
    assert_eq!(source.extent(), SHAPE);
}
