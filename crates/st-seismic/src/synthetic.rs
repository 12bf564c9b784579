// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Synthetic surveys with known analytic content.

use std::f32::consts::TAU;
use std::fmt;
use std::str::FromStr;

use ndarray::Array3;
use rand::Rng;
use spiral_config::determinism::rng_from_optional;

use crate::error::SeismicError;
use crate::source::ArraySource;

/// 4 ms, in microseconds.
pub const DEFAULT_SAMPLE_INTERVAL: f32 = 4000.0;

fn dim(shape: [usize; 3]) -> (usize, usize, usize) {
    (shape[0], shape[1], shape[2])
}

/// Sinusoidal reflectors `sin(2π (z − p·x − q·y) / wavelength)`, dipping by
/// `dips = [p, q]` depth samples per inline and crossline step.
pub fn dipping_sinusoid(shape: [usize; 3], dips: [f32; 2], wavelength: f32) -> ArraySource<f32> {
    let [p, q] = dips;
    let data = Array3::from_shape_fn(dim(shape), |(i, j, k)| {
        (TAU * (k as f32 - p * i as f32 - q * j as f32) / wavelength).sin()
    });
    ArraySource::new(data, DEFAULT_SAMPLE_INTERVAL)
}

/// Linear field `z − p·x − q·y`; every iso-surface is the same tilted plane.
pub fn planar_ramp(shape: [usize; 3], dips: [f32; 2]) -> ArraySource<f32> {
    let [p, q] = dips;
    let data = Array3::from_shape_fn(dim(shape), |(i, j, k)| {
        k as f32 - p * i as f32 - q * j as f32
    });
    ArraySource::new(data, DEFAULT_SAMPLE_INTERVAL)
}

/// Uniform noise in `[-1, 1)`. Without a seed the generator follows the
/// process-wide determinism settings.
pub fn random_noise(shape: [usize; 3], seed: Option<u64>) -> ArraySource<f32> {
    let mut rng = rng_from_optional(seed, "st-seismic.synthetic.noise");
    let data = Array3::from_shape_simple_fn(dim(shape), || rng.gen_range(-1.0f32..1.0));
    ArraySource::new(data, DEFAULT_SAMPLE_INTERVAL)
}

pub fn constant(shape: [usize; 3], value: f32) -> ArraySource<f32> {
    ArraySource::new(Array3::from_elem(dim(shape), value), DEFAULT_SAMPLE_INTERVAL)
}

/// Named synthetic survey families.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyntheticKind {
    Dip,
    Ramp,
    Noise,
    Flat,
}

impl SyntheticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyntheticKind::Dip => "dip",
            SyntheticKind::Ramp => "ramp",
            SyntheticKind::Noise => "noise",
            SyntheticKind::Flat => "flat",
        }
    }

    /// Builds the survey with default dips (0.5, 0.25) and a 12-sample wavelength.
    pub fn generate(&self, shape: [usize; 3], seed: Option<u64>) -> ArraySource<f32> {
        match self {
            SyntheticKind::Dip => dipping_sinusoid(shape, [0.5, 0.25], 12.0),
            SyntheticKind::Ramp => planar_ramp(shape, [0.5, 0.25]),
            SyntheticKind::Noise => random_noise(shape, seed),
            SyntheticKind::Flat => constant(shape, 1.0),
        }
    }
}

impl fmt::Display for SyntheticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyntheticKind {
    type Err = SeismicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dip" | "sinusoid" => Ok(SyntheticKind::Dip),
            "ramp" => Ok(SyntheticKind::Ramp),
            "noise" => Ok(SyntheticKind::Noise),
            "flat" | "constant" => Ok(SyntheticKind::Flat),
            _ => Err(SeismicError::config(
                "synthetic kind",
                s,
                "expected dip, ramp, noise or flat",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::TraceSource;
    use approx::assert_abs_diff_eq;

    #[test]
    fn sinusoid_follows_the_dip() {
        let source = dipping_sinusoid([4, 3, 10], [1.0, 0.0], 8.0);
        let data = source.data();
        // Shifting one inline moves the wavelet one sample deeper.
        assert_abs_diff_eq!(data[[0, 0, 3]], data[[1, 0, 4]], epsilon = 1e-5);
        assert_abs_diff_eq!(data[[0, 1, 2]], data[[0, 0, 2]], epsilon = 1e-6);
        assert_eq!(source.extent(), [4, 3, 10]);
    }

    #[test]
    fn seeded_noise_is_reproducible() {
        let a = random_noise([3, 3, 5], Some(9));
        let b = random_noise([3, 3, 5], Some(9));
        assert_eq!(a.data(), b.data());
        assert!(a.data().iter().all(|v| (-1.0..1.0).contains(v)));
    }

    #[test]
    fn kinds_parse_by_name() {
        assert_eq!("dip".parse::<SyntheticKind>().unwrap(), SyntheticKind::Dip);
        assert_eq!("Flat".parse::<SyntheticKind>().unwrap(), SyntheticKind::Flat);
        assert!("segy".parse::<SyntheticKind>().is_err());
        let flat = SyntheticKind::Flat.generate([2, 2, 2], None);
        assert!(flat.data().iter().all(|&v| v == 1.0));
    }
}
