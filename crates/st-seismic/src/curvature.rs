// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Volumetric reflector curvature.
//!
//! The amplitude cube is treated as a stack of reflectors `z = s(x, y)`.
//! Local dips come from the gradient structure tensor,
//!
//! ```text
//! p = ∂s/∂x ≈ −⟨f_x f_z⟩ / (⟨f_z²⟩ + ε)
//! q = ∂s/∂y ≈ −⟨f_y f_z⟩ / (⟨f_z²⟩ + ε)
//! ```
//!
//! where `⟨·⟩` is a box average over the smoothing window. Lateral
//! derivatives of the dip fields give the reflector Hessian
//! `[[s_xx, s_xy], [s_xy, s_yy]]`, and the curvature family follows from
//! the usual surface formulas with `w = 1 + p² + q²`:
//!
//! | variant        | value                                              |
//! |----------------|----------------------------------------------------|
//! | most-positive  | `λ_max(H) / w^{3/2}`                               |
//! | most-negative  | `λ_min(H) / w^{3/2}`                               |
//! | mean           | `((1+q²)s_xx − 2pq s_xy + (1+p²)s_yy) / (2 w^{3/2})` |
//! | gaussian       | `(s_xx s_yy − s_xy²) / w²`                          |
//! | maximum        | `mean + sqrt(max(mean² − gaussian, 0))`            |
//! | minimum        | `mean − sqrt(max(mean² − gaussian, 0))`            |
//!
//! A constant-dip reflector has constant `p, q`, so every variant vanishes
//! regardless of the dip itself.

use ndarray::{Array3, Zip};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{SeismicError, SeismicResult};
use crate::params::{CurvatureVariant, PatchSize};
use crate::volume::Volume;
use crate::window::{box_sum_3d, box_sum_3d_with, central_difference, Boundary};

const INLINE: usize = 0;
const CROSSLINE: usize = 1;
const DEPTH: usize = 2;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurvatureParams {
    /// Outputs to produce, in order.
    #[serde(default = "default_variants")]
    pub variants: Vec<CurvatureVariant>,
    /// Window over which gradient products are averaged for dip estimation.
    #[serde(default = "default_smoothing")]
    pub smoothing: PatchSize,
    /// Added to `⟨f_z²⟩` before dividing.
    #[serde(default = "default_epsilon")]
    pub epsilon: f32,
    /// Dips are clamped to `±max_dip` samples per trace.
    #[serde(default = "default_max_dip")]
    pub max_dip: f32,
}

fn default_variants() -> Vec<CurvatureVariant> {
    vec![CurvatureVariant::MostPositive, CurvatureVariant::MostNegative]
}

fn default_smoothing() -> PatchSize {
    PatchSize {
        py: 3,
        px: 3,
        pz: 5,
        adjusted: [false; 3],
    }
}

fn default_epsilon() -> f32 {
    1e-6
}

fn default_max_dip() -> f32 {
    100.0
}

impl Default for CurvatureParams {
    fn default() -> Self {
        Self {
            variants: default_variants(),
            smoothing: default_smoothing(),
            epsilon: default_epsilon(),
            max_dip: default_max_dip(),
        }
    }
}

impl CurvatureParams {
    pub fn with_variants(variants: Vec<CurvatureVariant>) -> Self {
        Self {
            variants,
            ..Self::default()
        }
    }

    /// Checks the parameters without touching any data.
    pub fn validate(&self) -> SeismicResult<()> {
        if self.variants.is_empty() {
            return Err(SeismicError::config(
                "curvature variant",
                "",
                "at least one variant is required",
            ));
        }
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(SeismicError::config(
                "curvature epsilon",
                self.epsilon.to_string(),
                "must be positive and finite",
            ));
        }
        if !(self.max_dip.is_finite() && self.max_dip > 0.0) {
            return Err(SeismicError::config(
                "curvature max_dip",
                self.max_dip.to_string(),
                "must be positive and finite",
            ));
        }
        Ok(())
    }
}

/// Reflector slopes along inline (`p`) and crossline (`q`), in depth samples
/// per trace.
#[derive(Clone, Debug)]
pub struct DipField {
    pub inline: Array3<f32>,
    pub crossline: Array3<f32>,
}

/// Estimates reflector dips from box-averaged gradient products.
pub fn estimate_dip(
    data: &Array3<f32>,
    smoothing: &PatchSize,
    epsilon: f32,
    max_dip: f32,
) -> DipField {
    let size = smoothing.dims();
    let fz = central_difference(data, DEPTH);

    let smoothed_product = |axis: usize| {
        let mut product = central_difference(data, axis);
        Zip::from(&mut product)
            .and(&fz)
            .par_for_each(|g, &gz| *g *= gz);
        box_sum_3d(&product, size, Boundary::Nearest)
    };
    let mut p = smoothed_product(INLINE);
    let mut q = smoothed_product(CROSSLINE);
    let energy = box_sum_3d_squared(&fz, size);
    drop(fz);

    let eps = epsilon as f64;
    Zip::from(&mut p)
        .and(&mut q)
        .and(&energy)
        .par_for_each(|p, q, &e| {
            let denom = e as f64 + eps;
            *p = guarded(-(*p as f64) / denom, max_dip);
            *q = guarded(-(*q as f64) / denom, max_dip);
        });
    DipField {
        inline: p,
        crossline: q,
    }
}

fn box_sum_3d_squared(src: &Array3<f32>, size: [usize; 3]) -> Array3<f32> {
    box_sum_3d_with(src, size, Boundary::Nearest, |v| (v as f64) * (v as f64))
}

#[inline]
fn guarded(value: f64, limit: f32) -> f32 {
    if value.is_finite() {
        value.clamp(-(limit as f64), limit as f64) as f32
    } else {
        0.0
    }
}

/// Curvature volumes in the order they were requested.
#[derive(Clone, Debug, Default)]
pub struct CurvatureOutputs {
    outputs: Vec<(CurvatureVariant, Volume)>,
}

impl CurvatureOutputs {
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn get(&self, variant: CurvatureVariant) -> Option<&Volume> {
        self.outputs
            .iter()
            .find(|(v, _)| *v == variant)
            .map(|(_, volume)| volume)
    }

    pub fn iter(&self) -> impl Iterator<Item = (CurvatureVariant, &Volume)> {
        self.outputs.iter().map(|(v, volume)| (*v, volume))
    }
}

impl IntoIterator for CurvatureOutputs {
    type Item = (CurvatureVariant, Volume);
    type IntoIter = std::vec::IntoIter<(CurvatureVariant, Volume)>;

    fn into_iter(self) -> Self::IntoIter {
        self.outputs.into_iter()
    }
}

/// Computes the requested curvature attributes of `volume`.
///
/// Parameters are validated before any derivative is taken.
pub fn curvature(volume: &Volume, params: &CurvatureParams) -> SeismicResult<CurvatureOutputs> {
    params.validate()?;
    info!(
        variants = ?params.variants,
        smoothing = %params.smoothing,
        "computing reflector curvature"
    );

    let dip = estimate_dip(volume.array(), &params.smoothing, params.epsilon, params.max_dip);
    let p = &dip.inline;
    let q = &dip.crossline;
    let sxx = central_difference(p, INLINE);
    let syy = central_difference(q, CROSSLINE);
    let mut sxy = central_difference(p, CROSSLINE);
    let qx = central_difference(q, INLINE);
    Zip::from(&mut sxy)
        .and(&qx)
        .par_for_each(|a, &b| *a = 0.5 * (*a + b));
    drop(qx);

    let mut outputs = Vec::with_capacity(params.variants.len());
    let mut seen: Vec<CurvatureVariant> = Vec::new();
    for &variant in &params.variants {
        if seen.contains(&variant) {
            continue;
        }
        seen.push(variant);
        let mut out = Array3::<f32>::zeros(volume.array().raw_dim());
        Zip::from(&mut out)
            .and(p)
            .and(q)
            .and(&sxx)
            .and(&sxy)
            .and(&syy)
            .par_for_each(|out, &p, &q, &sxx, &sxy, &syy| {
                let surface = LocalSurface::new(p, q, sxx, sxy, syy);
                *out = finite_or_zero(surface.evaluate(variant));
            });
        let output = Volume::from_array(out);
        debug!(variant = %variant, stats = ?output.stats(), "curvature variant done");
        outputs.push((variant, output));
    }

    Ok(CurvatureOutputs { outputs })
}

/// Second-order description of a reflector around one sample.
#[derive(Clone, Copy, Debug)]
struct LocalSurface {
    p: f64,
    q: f64,
    sxx: f64,
    sxy: f64,
    syy: f64,
}

impl LocalSurface {
    fn new(p: f32, q: f32, sxx: f32, sxy: f32, syy: f32) -> Self {
        Self {
            p: p as f64,
            q: q as f64,
            sxx: sxx as f64,
            sxy: sxy as f64,
            syy: syy as f64,
        }
    }

    fn slope_weight(&self) -> f64 {
        1.0 + self.p * self.p + self.q * self.q
    }

    fn hessian_eigenvalues(&self) -> (f64, f64) {
        let centre = 0.5 * (self.sxx + self.syy);
        let half_gap = 0.5 * (self.sxx - self.syy);
        let radius = (half_gap * half_gap + self.sxy * self.sxy).sqrt();
        (centre + radius, centre - radius)
    }

    fn mean(&self) -> f64 {
        let w = self.slope_weight();
        let numerator = (1.0 + self.q * self.q) * self.sxx - 2.0 * self.p * self.q * self.sxy
            + (1.0 + self.p * self.p) * self.syy;
        numerator / (2.0 * w.powf(1.5))
    }

    fn gaussian(&self) -> f64 {
        let w = self.slope_weight();
        (self.sxx * self.syy - self.sxy * self.sxy) / (w * w)
    }

    fn principal_spread(&self) -> (f64, f64) {
        let mean = self.mean();
        let spread = (mean * mean - self.gaussian()).max(0.0).sqrt();
        (mean, spread)
    }

    fn evaluate(&self, variant: CurvatureVariant) -> f64 {
        match variant {
            CurvatureVariant::MostPositive => {
                self.hessian_eigenvalues().0 / self.slope_weight().powf(1.5)
            }
            CurvatureVariant::MostNegative => {
                self.hessian_eigenvalues().1 / self.slope_weight().powf(1.5)
            }
            CurvatureVariant::Mean => self.mean(),
            CurvatureVariant::Gaussian => self.gaussian(),
            CurvatureVariant::Maximum => {
                let (mean, spread) = self.principal_spread();
                mean + spread
            }
            CurvatureVariant::Minimum => {
                let (mean, spread) = self.principal_spread();
                mean - spread
            }
        }
    }
}

#[inline]
fn finite_or_zero(value: f64) -> f32 {
    let value = value as f32;
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
