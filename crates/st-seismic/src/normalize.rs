// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Amplitude normalisation: per-trace and sliding depth-window z-scores.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::params::{NormalizationMode, ZWindow};
use crate::volume::Volume;
use crate::window::{box_sum_1d_with, transform_lanes, Boundary};

/// Added to every standard deviation before dividing.
pub const DEFAULT_EPSILON: f32 = 1e-6;

const DEPTH_AXIS: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizeParams {
    #[serde(default)]
    pub mode: NormalizationMode,
    #[serde(default)]
    pub z_window: ZWindow,
    #[serde(default = "default_epsilon")]
    pub epsilon: f32,
}

fn default_epsilon() -> f32 {
    DEFAULT_EPSILON
}

impl Default for NormalizeParams {
    fn default() -> Self {
        Self {
            mode: NormalizationMode::default(),
            z_window: ZWindow::default(),
            epsilon: DEFAULT_EPSILON,
        }
    }
}

impl NormalizeParams {
    pub fn new(mode: NormalizationMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn with_z_window(mut self, z_window: ZWindow) -> Self {
        self.z_window = z_window;
        self
    }
}

/// Normalises `volume` according to `params.mode`.
///
/// Takes ownership and rewrites the samples in place; the returned volume
/// reuses the input storage. `Both` runs the trace pass first and the
/// z-window pass on its result.
pub fn normalize(mut volume: Volume, params: &NormalizeParams) -> Volume {
    if params.mode.uses_trace() {
        info!("applying trace normalisation");
        trace_normalize(&mut volume, params.epsilon);
    }
    if params.mode.uses_z_window() {
        if params.z_window.adjusted() {
            warn!(
                window = params.z_window.size(),
                "z-window adjusted to the next odd size"
            );
        }
        info!(window = params.z_window.size(), "applying z-window normalisation");
        z_window_normalize(&mut volume, params.z_window, params.epsilon);
    }
    volume
}

/// Z-scores every trace against its own mean and population standard deviation.
pub fn trace_normalize(volume: &mut Volume, epsilon: f32) {
    transform_lanes(volume.array_mut(), DEPTH_AXIS, |trace| {
        normalize_trace(trace, epsilon)
    });
}

fn normalize_trace(trace: &mut [f32], epsilon: f32) {
    if trace.is_empty() {
        return;
    }
    let n = trace.len() as f64;
    let mean = trace.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = trace
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    let denom = var.sqrt() + epsilon as f64;
    for v in trace.iter_mut() {
        *v = ((*v as f64 - mean) / denom) as f32;
    }
}

/// Z-scores every sample against the mean and standard deviation of a
/// centred depth window. The window is mirrored at the top and bottom of
/// each trace.
pub fn z_window_normalize(volume: &mut Volume, window: ZWindow, epsilon: f32) {
    let size = window.size();
    transform_lanes(volume.array_mut(), DEPTH_AXIS, |trace| {
        normalize_window(trace, size, epsilon)
    });
}

fn normalize_window(trace: &mut [f32], size: usize, epsilon: f32) {
    let n = trace.len();
    if n == 0 {
        return;
    }
    let mut sum = vec![0.0f32; n];
    let mut sum_sq = vec![0.0f32; n];
    box_sum_1d_with(trace, &mut sum, size, Boundary::Reflect, |v| v as f64);
    box_sum_1d_with(trace, &mut sum_sq, size, Boundary::Reflect, |v| {
        (v as f64) * (v as f64)
    });
    let w = size as f64;
    for ((v, &s1), &s2) in trace.iter_mut().zip(&sum).zip(&sum_sq) {
        let mean = s1 as f64 / w;
        // E[x²] − E[x]² can dip below zero through cancellation.
        let var = (s2 as f64 / w - mean * mean).max(0.0);
        *v = ((*v as f64 - mean) / (var.sqrt() + epsilon as f64)) as f32;
    }
}
