// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Dense `(inline, crossline, depth)` sample cubes and the geometry that
//! travels with them.

use ndarray::{Array3, ArrayView3, ArrayViewMut3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{SeismicError, SeismicResult};
use crate::params::{AxisRange, Permutation};

/// Dense 3D cube of `f32` samples.
///
/// The shape never changes after construction. Transforms either return a new
/// volume or take `self` by value and rewrite the samples in place.
#[derive(Clone, Debug, PartialEq)]
pub struct Volume {
    data: Array3<f32>,
}

impl Volume {
    pub fn from_array(data: Array3<f32>) -> Self {
        Self { data }
    }

    pub fn zeros(shape: [usize; 3]) -> Self {
        Self {
            data: Array3::zeros(shape),
        }
    }

    /// Builds a volume from a row-major buffer.
    pub fn from_vec(shape: [usize; 3], values: Vec<f32>) -> SeismicResult<Self> {
        let expected = shape.iter().product::<usize>();
        let got = values.len();
        Array3::from_shape_vec(shape, values)
            .map(Self::from_array)
            .map_err(|_| {
                SeismicError::config(
                    "volume data",
                    format!("{got} samples"),
                    format!("shape {shape:?} requires {expected} samples"),
                )
            })
    }

    pub fn shape(&self) -> [usize; 3] {
        let dims = self.data.dim();
        [dims.0, dims.1, dims.2]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    pub fn array(&self) -> &Array3<f32> {
        &self.data
    }

    /// Mutable access for in-place whole-volume transforms.
    pub fn array_mut(&mut self) -> ArrayViewMut3<'_, f32> {
        self.data.view_mut()
    }

    pub fn into_array(self) -> Array3<f32> {
        self.data
    }

    pub fn get(&self, index: [usize; 3]) -> Option<f32> {
        self.data.get(index).copied()
    }

    /// Reorders axes into a freshly allocated standard-layout array.
    pub fn permuted(self, permutation: Permutation) -> Self {
        if permutation.is_identity() {
            return self;
        }
        let order = permutation.order();
        let view = self.data.permuted_axes(order);
        Self {
            data: view.as_standard_layout().into_owned(),
        }
    }

    /// Summary statistics over the finite samples.
    pub fn stats(&self) -> VolumeStats {
        VolumeStats::of(self.data.as_slice_memory_order().unwrap_or(&[]))
            .unwrap_or_else(|| VolumeStats::of_iter(self.data.iter().copied()))
    }
}

/// Min/max/mean/std summary of a volume.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeStats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub std: f32,
    /// Number of finite samples that contributed.
    pub count: usize,
}

#[derive(Clone, Copy)]
struct Moments {
    min: f64,
    max: f64,
    sum: f64,
    sum_sq: f64,
    count: usize,
}

impl Moments {
    const EMPTY: Moments = Moments {
        min: f64::INFINITY,
        max: f64::NEG_INFINITY,
        sum: 0.0,
        sum_sq: 0.0,
        count: 0,
    };

    fn push(mut self, value: f32) -> Self {
        if value.is_finite() {
            let v = value as f64;
            self.min = self.min.min(v);
            self.max = self.max.max(v);
            self.sum += v;
            self.sum_sq += v * v;
            self.count += 1;
        }
        self
    }

    fn merge(self, other: Self) -> Self {
        Moments {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
            sum: self.sum + other.sum,
            sum_sq: self.sum_sq + other.sum_sq,
            count: self.count + other.count,
        }
    }

    fn finish(self) -> VolumeStats {
        if self.count == 0 {
            return VolumeStats::default();
        }
        let n = self.count as f64;
        let mean = self.sum / n;
        let var = (self.sum_sq / n - mean * mean).max(0.0);
        VolumeStats {
            min: self.min as f32,
            max: self.max as f32,
            mean: mean as f32,
            std: var.sqrt() as f32,
            count: self.count,
        }
    }
}

impl VolumeStats {
    fn of(values: &[f32]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let moments = values
            .par_chunks(1 << 16)
            .map(|chunk| chunk.iter().fold(Moments::EMPTY, |acc, &v| acc.push(v)))
            .reduce(|| Moments::EMPTY, Moments::merge);
        Some(moments.finish())
    }

    fn of_iter(values: impl Iterator<Item = f32>) -> Self {
        values.fold(Moments::EMPTY, Moments::push).finish()
    }
}

/// Numeric sample encodings a trace source may deliver.
///
/// Codes follow the SEG-Y binary header convention.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    IbmFloat32,
    Int32,
    Int16,
    IeeeFloat32,
    IeeeFloat64,
    Int8,
}

impl SampleFormat {
    pub fn code(&self) -> u16 {
        match self {
            SampleFormat::IbmFloat32 => 1,
            SampleFormat::Int32 => 2,
            SampleFormat::Int16 => 3,
            SampleFormat::IeeeFloat32 => 5,
            SampleFormat::IeeeFloat64 => 6,
            SampleFormat::Int8 => 8,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(SampleFormat::IbmFloat32),
            2 => Some(SampleFormat::Int32),
            3 => Some(SampleFormat::Int16),
            5 => Some(SampleFormat::IeeeFloat32),
            6 => Some(SampleFormat::IeeeFloat64),
            8 => Some(SampleFormat::Int8),
            _ => None,
        }
    }

    pub fn byte_width(&self) -> usize {
        match self {
            SampleFormat::Int8 => 1,
            SampleFormat::Int16 => 2,
            SampleFormat::IbmFloat32 | SampleFormat::Int32 | SampleFormat::IeeeFloat32 => 4,
            SampleFormat::IeeeFloat64 => 8,
        }
    }
}

/// Spatial referencing carried alongside every volume a run produces.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeometryMetadata {
    /// Extent of the source survey, `(inline, crossline, depth)`.
    pub original_shape: [usize; 3],
    /// Shape of the delivered volume, after cropping and permutation.
    pub cropped_shape: [usize; 3],
    pub inline_range: AxisRange,
    pub crossline_range: AxisRange,
    pub depth_range: AxisRange,
    /// Sample interval in source units (µs for time, or depth units).
    pub sample_interval: f32,
    /// Numeric code of the source sample encoding.
    pub format: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permutation: Option<Permutation>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::parse_permutation;
    use approx::assert_abs_diff_eq;

    fn ramp(shape: [usize; 3]) -> Volume {
        let n = shape.iter().product::<usize>();
        Volume::from_vec(shape, (0..n).map(|v| v as f32).collect()).unwrap()
    }

    #[test]
    fn from_vec_checks_length() {
        assert!(Volume::from_vec([2, 2, 2], vec![0.0; 7]).is_err());
        assert_eq!(ramp([2, 3, 4]).shape(), [2, 3, 4]);
    }

    #[test]
    fn permutation_reorders_axes() {
        let volume = ramp([2, 3, 4]);
        let original = volume.get([1, 2, 3]).unwrap();
        let permuted = volume.permuted(parse_permutation("2,0,1").unwrap());
        assert_eq!(permuted.shape(), [4, 2, 3]);
        assert_eq!(permuted.get([3, 1, 2]).unwrap(), original);
        assert!(permuted.array().is_standard_layout());
    }

    #[test]
    fn stats_skip_non_finite_samples() {
        let volume =
            Volume::from_vec([1, 1, 4], vec![1.0, 3.0, f32::NAN, f32::INFINITY]).unwrap();
        let stats = volume.stats();
        assert_eq!(stats.count, 2);
        assert_abs_diff_eq!(stats.mean, 2.0);
        assert_abs_diff_eq!(stats.std, 1.0);
        assert_eq!((stats.min, stats.max), (1.0, 3.0));
    }

    #[test]
    fn sample_format_codes_round_trip() {
        for format in [
            SampleFormat::IbmFloat32,
            SampleFormat::Int32,
            SampleFormat::Int16,
            SampleFormat::IeeeFloat32,
            SampleFormat::IeeeFloat64,
            SampleFormat::Int8,
        ] {
            assert_eq!(SampleFormat::from_code(format.code()), Some(format));
        }
        assert_eq!(SampleFormat::from_code(4), None);
    }
}
