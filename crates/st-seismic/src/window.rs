// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Lane-parallel windowed kernels shared by the normaliser, coherence and
//! curvature engines.
//!
//! Every filter here is separable and runs one 1D pass per axis. Box sums use
//! running accumulation, so the cost per sample is independent of the window
//! length.

use std::borrow::Cow;

use ndarray::{Array3, ArrayView1, ArrayViewMut1, ArrayViewMut3, Axis, Zip};

/// How indices past either end of a lane are mapped back inside it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Boundary {
    /// Repeat the edge sample: `a a a | a b c d | d d d`.
    Nearest,
    /// Mirror about the edge sample without repeating it: `d c b | a b c d | c b a`.
    Reflect,
}

impl Boundary {
    /// Maps a possibly out-of-range index into `0..len`. `len` must be non-zero.
    #[inline]
    pub fn index(self, i: isize, len: usize) -> usize {
        let n = len as isize;
        match self {
            Boundary::Nearest => i.clamp(0, n - 1) as usize,
            Boundary::Reflect => {
                if n == 1 {
                    return 0;
                }
                let period = 2 * (n - 1);
                let mut k = i.rem_euclid(period);
                if k >= n {
                    k = period - k;
                }
                k as usize
            }
        }
    }
}

/// Sliding-window sum of `map(src)` over a centred window of odd `size`.
///
/// Accumulates in `f64`; each step adds the entering sample and drops the
/// leaving one.
pub fn box_sum_1d_with<F>(
    src: &[f32],
    dst: &mut [f32],
    size: usize,
    boundary: Boundary,
    map: F,
) where
    F: Fn(f32) -> f64,
{
    debug_assert_eq!(src.len(), dst.len());
    debug_assert!(size % 2 == 1, "box window must be odd");
    let n = src.len();
    if n == 0 {
        return;
    }
    let half = (size / 2) as isize;
    let at = |i: isize| map(src[boundary.index(i, n)]);

    let mut acc: f64 = (-half..=half).map(|i| at(i)).sum();
    dst[0] = acc as f32;
    for i in 1..n as isize {
        acc += at(i + half) - at(i - 1 - half);
        dst[i as usize] = acc as f32;
    }
}

/// Sliding-window sum over a centred window of odd `size`.
pub fn box_sum_1d(src: &[f32], dst: &mut [f32], size: usize, boundary: Boundary) {
    box_sum_1d_with(src, dst, size, boundary, |v| v as f64);
}

/// Runs `kernel(input_lane, output_lane)` over every lane along `axis`, in
/// parallel, writing into a new array of the same shape.
pub fn filter_lanes<K>(src: &Array3<f32>, axis: usize, kernel: K) -> Array3<f32>
where
    K: Fn(&[f32], &mut [f32]) + Sync,
{
    let mut dst = Array3::<f32>::zeros(src.raw_dim());
    Zip::from(dst.lanes_mut(Axis(axis)))
        .and(src.lanes(Axis(axis)))
        .par_for_each(|out, input| run_lane(input, out, &kernel));
    dst
}

fn run_lane<K>(input: ArrayView1<'_, f32>, mut out: ArrayViewMut1<'_, f32>, kernel: &K)
where
    K: Fn(&[f32], &mut [f32]),
{
    let input: Cow<'_, [f32]> = match input.to_slice() {
        Some(slice) => Cow::Borrowed(slice),
        None => Cow::Owned(input.to_vec()),
    };
    match out.as_slice_mut() {
        Some(slice) => kernel(&input, slice),
        None => {
            let mut scratch = vec![0.0f32; input.len()];
            kernel(&input, &mut scratch);
            for (slot, value) in out.iter_mut().zip(scratch) {
                *slot = value;
            }
        }
    }
}

/// Rewrites every lane along `axis` in place, in parallel.
pub fn transform_lanes<K>(mut data: ArrayViewMut3<'_, f32>, axis: usize, kernel: K)
where
    K: Fn(&mut [f32]) + Sync,
{
    Zip::from(data.lanes_mut(Axis(axis))).par_for_each(|mut lane| match lane.as_slice_mut() {
        Some(slice) => kernel(slice),
        None => {
            let mut scratch = lane.to_vec();
            kernel(&mut scratch);
            for (slot, value) in lane.iter_mut().zip(scratch) {
                *slot = value;
            }
        }
    });
}

/// Separable 3D box sum of `map(src)` over an odd `size` window per axis.
pub fn box_sum_3d_with<F>(
    src: &Array3<f32>,
    size: [usize; 3],
    boundary: Boundary,
    map: F,
) -> Array3<f32>
where
    F: Fn(f32) -> f64 + Sync,
{
    // The innermost (depth) axis goes first; it is contiguous and carries `map`.
    let mut acc = filter_lanes(src, 2, |input, out| {
        box_sum_1d_with(input, out, size[2], boundary, &map)
    });
    for axis in [1usize, 0] {
        if size[axis] > 1 {
            acc = filter_lanes(&acc, axis, |input, out| {
                box_sum_1d(input, out, size[axis], boundary)
            });
        }
    }
    acc
}

/// Separable 3D box sum over an odd `size` window per axis.
pub fn box_sum_3d(src: &Array3<f32>, size: [usize; 3], boundary: Boundary) -> Array3<f32> {
    box_sum_3d_with(src, size, boundary, |v| v as f64)
}

/// Window mean: the box sum divided by the window volume.
pub fn box_mean_3d(src: &Array3<f32>, size: [usize; 3], boundary: Boundary) -> Array3<f32> {
    let n = (size[0] * size[1] * size[2]) as f32;
    let mut mean = box_sum_3d(src, size, boundary);
    mean.par_mapv_inplace(|v| v / n);
    mean
}

/// First derivative along one lane: central differences inside, one-sided
/// differences at the two ends, zero for single-sample lanes.
pub fn gradient_1d(src: &[f32], dst: &mut [f32]) {
    let n = src.len();
    match n {
        0 => {}
        1 => dst[0] = 0.0,
        _ => {
            dst[0] = src[1] - src[0];
            dst[n - 1] = src[n - 1] - src[n - 2];
            for i in 1..n - 1 {
                dst[i] = 0.5 * (src[i + 1] - src[i - 1]);
            }
        }
    }
}

/// First derivative of a volume along `axis`, in index units.
pub fn central_difference(src: &Array3<f32>, axis: usize) -> Array3<f32> {
    filter_lanes(src, axis, gradient_1d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn brute_box_sum(src: &Array3<f32>, size: [usize; 3], boundary: Boundary) -> Array3<f32> {
        let (ni, nx, nz) = src.dim();
        let dims = [ni, nx, nz];
        let half = size.map(|s| (s / 2) as isize);
        Array3::from_shape_fn(src.raw_dim(), |(i, j, k)| {
            let mut acc = 0.0f64;
            for di in -half[0]..=half[0] {
                for dj in -half[1]..=half[1] {
                    for dk in -half[2]..=half[2] {
                        let a = boundary.index(i as isize + di, dims[0]);
                        let b = boundary.index(j as isize + dj, dims[1]);
                        let c = boundary.index(k as isize + dk, dims[2]);
                        acc += src[[a, b, c]] as f64;
                    }
                }
            }
            acc as f32
        })
    }

    #[test]
    fn boundary_index_extension() {
        let nearest: Vec<usize> = (-3..7).map(|i| Boundary::Nearest.index(i, 4)).collect();
        assert_eq!(nearest, vec![0, 0, 0, 0, 1, 2, 3, 3, 3, 3]);
        let reflect: Vec<usize> = (-3..7).map(|i| Boundary::Reflect.index(i, 4)).collect();
        assert_eq!(reflect, vec![3, 2, 1, 0, 1, 2, 3, 2, 1, 0]);
        assert_eq!(Boundary::Reflect.index(-5, 1), 0);
    }

    #[test]
    fn sliding_sum_matches_direct_sum() {
        let src = [1.0f32, 2.0, 3.0, 4.0, 5.0];
        let mut dst = [0.0f32; 5];
        box_sum_1d(&src, &mut dst, 3, Boundary::Nearest);
        assert_eq!(dst, [4.0, 6.0, 9.0, 12.0, 14.0]);
        box_sum_1d(&src, &mut dst, 3, Boundary::Reflect);
        assert_eq!(dst, [5.0, 6.0, 9.0, 12.0, 13.0]);
        // Window wider than the lane wraps through the extension repeatedly.
        box_sum_1d(&src[..2], &mut dst[..2], 7, Boundary::Reflect);
        assert_eq!(&dst[..2], &[11.0, 10.0]);
    }

    #[test]
    fn separable_box_sum_matches_brute_force() {
        let src = Array3::from_shape_fn((5, 4, 7), |(i, j, k)| {
            ((i * 7 + j * 3 + k) as f32 * 0.37).sin()
        });
        for boundary in [Boundary::Nearest, Boundary::Reflect] {
            let fast = box_sum_3d(&src, [3, 3, 5], boundary);
            let slow = brute_box_sum(&src, [3, 3, 5], boundary);
            for (a, b) in fast.iter().zip(slow.iter()) {
                assert_abs_diff_eq!(a, b, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn mapped_sum_squares_samples() {
        let src = Array3::from_elem((3, 3, 3), 2.0f32);
        let sq = box_sum_3d_with(&src, [3, 3, 3], Boundary::Nearest, |v| (v as f64).powi(2));
        assert!(sq.iter().all(|&v| (v - 108.0).abs() < 1e-4));
        let mean = box_mean_3d(&src, [3, 1, 3], Boundary::Nearest);
        assert!(mean.iter().all(|&v| (v - 2.0).abs() < 1e-6));
    }

    #[test]
    fn gradient_uses_one_sided_edges() {
        let src = [0.0f32, 1.0, 4.0, 9.0];
        let mut dst = [0.0f32; 4];
        gradient_1d(&src, &mut dst);
        assert_eq!(dst, [1.0, 2.0, 4.0, 5.0]);

        let ramp = Array3::from_shape_fn((4, 3, 2), |(i, j, k)| (2 * i + 3 * j + k) as f32);
        let d0 = central_difference(&ramp, 0);
        let d1 = central_difference(&ramp, 1);
        assert!(d0.iter().all(|&v| v == 2.0));
        assert!(d1.iter().all(|&v| v == 3.0));
    }
}
