// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Semblance coherence.
//!
//! For a window of `N` samples with sum `S1` and sum of squares `S2` the
//! semblance is `S1² / (N·S2 + ε)`. It reaches 1 when every sample in the
//! window is equal and falls towards `1/N` for incoherent energy.

use ndarray::Zip;
use tracing::{debug, info};

use crate::params::PatchSize;
use crate::volume::Volume;
use crate::window::{box_sum_3d, box_sum_3d_with, Boundary};

/// Guards all-zero (muted) windows.
pub const COHERENCE_EPSILON: f64 = 1e-6;

/// Computes semblance coherence over a `patch`-sized window around every
/// sample. Windows are extended past the volume edges by repeating the edge
/// samples.
pub fn coherence(volume: &Volume, patch: &PatchSize) -> Volume {
    info!(patch = %patch, "computing semblance coherence");
    let size = patch.dims();
    let data = volume.array();

    let mut s1 = box_sum_3d(data, size, Boundary::Nearest);
    let s2 = box_sum_3d_with(data, size, Boundary::Nearest, |v| (v as f64) * (v as f64));
    let n = patch.len() as f64;

    Zip::from(&mut s1).and(&s2).par_for_each(|c, &sq| {
        *c = semblance(*c as f64, sq as f64, n);
    });
    let output = Volume::from_array(s1);
    debug!(stats = ?output.stats(), "coherence done");
    output
}

#[inline]
pub(crate) fn semblance(sum: f64, sum_sq: f64, n: f64) -> f32 {
    let value = sum * sum / (n * sum_sq + COHERENCE_EPSILON);
    if value.is_finite() {
        value.clamp(0.0, 1.0) as f32
    } else {
        0.0
    }
}
