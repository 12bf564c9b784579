// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Capability seam between the attribute core and whatever stores the traces.
//!
//! The core never parses trace headers. A source only has to report its
//! extent, sample interval and encoding, and hand out either the whole cube
//! or one trace at a time.

use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::Array3;

use crate::error::SourceError;
use crate::volume::SampleFormat;

/// Numeric type a source can deliver. The loader widens or narrows every
/// sample to `f32`.
pub trait SampleValue: Copy + Send + Sync + 'static {
    const FORMAT: SampleFormat;

    fn to_f32(self) -> f32;
}

impl SampleValue for i8 {
    const FORMAT: SampleFormat = SampleFormat::Int8;

    fn to_f32(self) -> f32 {
        self as f32
    }
}

impl SampleValue for i16 {
    const FORMAT: SampleFormat = SampleFormat::Int16;

    fn to_f32(self) -> f32 {
        self as f32
    }
}

impl SampleValue for i32 {
    const FORMAT: SampleFormat = SampleFormat::Int32;

    fn to_f32(self) -> f32 {
        self as f32
    }
}

impl SampleValue for f32 {
    const FORMAT: SampleFormat = SampleFormat::IeeeFloat32;

    fn to_f32(self) -> f32 {
        self
    }
}

impl SampleValue for f64 {
    const FORMAT: SampleFormat = SampleFormat::IeeeFloat64;

    fn to_f32(self) -> f32 {
        self as f32
    }
}

/// Read access to a 3D trace store laid out as `(inline, crossline, depth)`.
pub trait TraceSource: Sync {
    type Sample: SampleValue;

    /// Number of inlines, crosslines and depth samples.
    fn extent(&self) -> [usize; 3];

    fn sample_interval(&self) -> f32;

    fn format(&self) -> SampleFormat {
        <Self::Sample as SampleValue>::FORMAT
    }

    /// Reads the entire cube. Implementations report allocation failure as
    /// [`SourceError::OutOfMemory`] rather than aborting.
    fn read_volume(&self) -> Result<Array3<Self::Sample>, SourceError>;

    /// Reads the full depth sequence at one grid position.
    fn read_trace(&self, inline: usize, crossline: usize)
        -> Result<Vec<Self::Sample>, SourceError>;

    /// Bytes a bulk read would allocate. Saturates at `usize::MAX`.
    fn volume_bytes(&self) -> usize {
        self.extent()
            .iter()
            .try_fold(std::mem::size_of::<Self::Sample>(), |acc, &n| acc.checked_mul(n))
            .unwrap_or(usize::MAX)
    }
}

/// Reserves a buffer of `len` samples, reporting failure instead of aborting.
pub fn try_buffer<T>(len: usize) -> Result<Vec<T>, SourceError> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| SourceError::OutOfMemory {
            bytes: len.saturating_mul(std::mem::size_of::<T>()),
        })?;
    Ok(buffer)
}

/// In-memory trace source, mostly for synthetic surveys and tests.
///
/// A bulk limit makes `read_volume` fail with `OutOfMemory` once the cube is
/// larger than the limit, which drives the loader onto its per-trace path.
#[derive(Debug)]
pub struct ArraySource<T> {
    data: Array3<T>,
    sample_interval: f32,
    bulk_limit_bytes: Option<usize>,
    bulk_reads: AtomicUsize,
    trace_reads: AtomicUsize,
}

impl<T: SampleValue> ArraySource<T> {
    pub fn new(data: Array3<T>, sample_interval: f32) -> Self {
        Self {
            data,
            sample_interval,
            bulk_limit_bytes: None,
            bulk_reads: AtomicUsize::new(0),
            trace_reads: AtomicUsize::new(0),
        }
    }

    /// Simulates memory pressure for bulk reads larger than `bytes`.
    pub fn with_bulk_limit(mut self, bytes: usize) -> Self {
        self.bulk_limit_bytes = Some(bytes);
        self
    }

    pub fn data(&self) -> &Array3<T> {
        &self.data
    }

    /// Successful bulk reads served so far.
    pub fn bulk_reads(&self) -> usize {
        self.bulk_reads.load(Ordering::Relaxed)
    }

    /// Traces served so far.
    pub fn trace_reads(&self) -> usize {
        self.trace_reads.load(Ordering::Relaxed)
    }
}

impl<T: SampleValue> TraceSource for ArraySource<T> {
    type Sample = T;

    fn extent(&self) -> [usize; 3] {
        let (ni, nx, nz) = self.data.dim();
        [ni, nx, nz]
    }

    fn sample_interval(&self) -> f32 {
        self.sample_interval
    }

    fn read_volume(&self) -> Result<Array3<T>, SourceError> {
        let bytes = self.volume_bytes();
        if let Some(limit) = self.bulk_limit_bytes {
            if bytes > limit {
                return Err(SourceError::OutOfMemory { bytes });
            }
        }
        let mut buffer = try_buffer(self.data.len())?;
        buffer.extend(self.data.iter().copied());
        let cube = Array3::from_shape_vec(self.data.raw_dim(), buffer)
            .map_err(|err| SourceError::Corrupt(err.to_string()))?;
        self.bulk_reads.fetch_add(1, Ordering::Relaxed);
        Ok(cube)
    }

    fn read_trace(&self, inline: usize, crossline: usize) -> Result<Vec<T>, SourceError> {
        let [ni, nx, _] = self.extent();
        if inline >= ni || crossline >= nx {
            return Err(SourceError::TraceOutOfRange { inline, crossline });
        }
        self.trace_reads.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .data
            .slice(ndarray::s![inline, crossline, ..])
            .iter()
            .copied()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_limit_reports_out_of_memory() {
        let source = ArraySource::new(Array3::<i16>::zeros((4, 4, 8)), 4.0).with_bulk_limit(64);
        assert_eq!(source.volume_bytes(), 256);
        assert!(matches!(
            source.read_volume(),
            Err(SourceError::OutOfMemory { bytes: 256 })
        ));
        assert_eq!(source.format(), SampleFormat::Int16);
    }

    #[test]
    fn trace_reads_are_counted_and_bounded() {
        let data = Array3::from_shape_fn((2, 3, 4), |(i, j, k)| (i * 100 + j * 10 + k) as f32);
        let source = ArraySource::new(data, 2.0);
        assert_eq!(source.read_trace(1, 2).unwrap(), vec![120.0, 121.0, 122.0, 123.0]);
        assert_eq!(source.trace_reads(), 1);
        assert!(matches!(
            source.read_trace(2, 0),
            Err(SourceError::TraceOutOfRange { inline: 2, crossline: 0 })
        ));
    }
}
