// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Volume ingestion: crop, widen to `f32`, optionally permute.
//!
//! The bulk path reads the whole cube and slices it. When the source reports
//! memory pressure (or the cube exceeds the configured budget) the loader
//! switches to reading individual traces straight into the cropped buffer, so
//! peak memory stays proportional to the crop rather than the survey.

use ndarray::{s, Array3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{SeismicError, SeismicResult, SourceError};
use crate::params::{AxisRange, Permutation};
use crate::source::{try_buffer, SampleValue, TraceSource};
use crate::volume::{GeometryMetadata, Volume};

/// Which sub-cube to load and how to orient it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadRequest {
    /// Defaults to the full inline extent.
    #[serde(default)]
    pub inline: Option<AxisRange>,
    #[serde(default)]
    pub crossline: Option<AxisRange>,
    #[serde(default)]
    pub depth: Option<AxisRange>,
    #[serde(default)]
    pub permutation: Option<Permutation>,
}

/// Memory policy for the loader.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoaderOptions {
    /// Largest bulk read attempted, in bytes. `None` always tries the bulk path.
    #[serde(default)]
    pub memory_budget_bytes: Option<usize>,
    /// Traces read concurrently per batch on the incremental path.
    #[serde(default = "default_trace_batch")]
    pub trace_batch: usize,
}

fn default_trace_batch() -> usize {
    4096
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            memory_budget_bytes: None,
            trace_batch: default_trace_batch(),
        }
    }
}

/// How the samples were acquired.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPath {
    Bulk,
    Incremental,
}

/// A cropped volume together with its geometry.
#[derive(Clone, Debug)]
pub struct LoadedVolume {
    pub volume: Volume,
    pub geometry: GeometryMetadata,
    pub path: LoadPath,
}

#[derive(Clone, Copy, Debug)]
struct Crop {
    inline: AxisRange,
    crossline: AxisRange,
    depth: AxisRange,
}

impl Crop {
    fn resolve(request: &LoadRequest, extent: [usize; 3]) -> SeismicResult<Self> {
        let axis = |name: &'static str, range: Option<AxisRange>, extent: usize| {
            let range = match range {
                Some(range) => range,
                None => AxisRange::full(extent).map_err(|_| SeismicError::Bounds {
                    axis: name,
                    requested: format!("0:{extent}"),
                    extent,
                })?,
            };
            range.check_within(name, extent)?;
            Ok::<_, SeismicError>(range)
        };
        Ok(Self {
            inline: axis("inline", request.inline, extent[0])?,
            crossline: axis("crossline", request.crossline, extent[1])?,
            depth: axis("depth", request.depth, extent[2])?,
        })
    }

    fn shape(&self) -> [usize; 3] {
        [self.inline.len(), self.crossline.len(), self.depth.len()]
    }

    fn samples(&self) -> Option<usize> {
        self.shape()
            .iter()
            .try_fold(1usize, |acc, &n| acc.checked_mul(n))
    }
}

/// Loads the requested sub-cube from `source`.
///
/// Ranges are validated against the source extent before any samples are
/// read. The permutation, if any, is applied last.
pub fn load<S: TraceSource>(
    source: &S,
    request: &LoadRequest,
    options: &LoaderOptions,
) -> SeismicResult<LoadedVolume> {
    let extent = source.extent();
    let crop = Crop::resolve(request, extent)?;
    info!(
        ?extent,
        inline = %crop.inline,
        crossline = %crop.crossline,
        depth = %crop.depth,
        "loading seismic volume"
    );

    let (data, path) = match read_bulk(source, &crop, options)? {
        Some(data) => (data, LoadPath::Bulk),
        None => (read_incremental(source, &crop, options)?, LoadPath::Incremental),
    };

    let mut volume = Volume::from_array(data);
    let permutation = request.permutation.filter(|perm| !perm.is_identity());
    if let Some(perm) = permutation {
        volume = volume.permuted(perm);
        info!(permutation = %perm, "applied axis permutation");
    }

    let geometry = GeometryMetadata {
        original_shape: extent,
        cropped_shape: volume.shape(),
        inline_range: crop.inline,
        crossline_range: crop.crossline,
        depth_range: crop.depth,
        sample_interval: source.sample_interval(),
        format: source.format().code(),
        permutation,
    };
    debug!(shape = ?geometry.cropped_shape, ?path, "volume loaded");

    Ok(LoadedVolume {
        volume,
        geometry,
        path,
    })
}

/// Returns `None` when the bulk read is not possible under the memory policy.
fn read_bulk<S: TraceSource>(
    source: &S,
    crop: &Crop,
    options: &LoaderOptions,
) -> SeismicResult<Option<Array3<f32>>> {
    let bytes = source.volume_bytes();
    if let Some(budget) = options.memory_budget_bytes {
        if bytes > budget {
            warn!(
                bytes,
                budget, "source exceeds the memory budget; reading trace by trace"
            );
            return Ok(None);
        }
    }

    let cube = match source.read_volume() {
        Ok(cube) => cube,
        Err(SourceError::OutOfMemory { bytes }) => {
            warn!(bytes, "bulk read ran out of memory; reading trace by trace");
            return Ok(None);
        }
        Err(err) => return Err(err.into()),
    };
    let [ni, nx, nz] = source.extent();
    if cube.dim() != (ni, nx, nz) {
        return Err(SourceError::Corrupt(format!(
            "bulk read returned shape {:?}, expected {:?}",
            cube.dim(),
            (ni, nx, nz)
        ))
        .into());
    }

    let cropped = cube
        .slice(s![
            crop.inline.as_std(),
            crop.crossline.as_std(),
            crop.depth.as_std()
        ])
        .mapv(SampleValue::to_f32);
    Ok(Some(cropped))
}

fn read_incremental<S: TraceSource>(
    source: &S,
    crop: &Crop,
    options: &LoaderOptions,
) -> SeismicResult<Array3<f32>> {
    let shape = crop.shape();
    let exhausted = |samples: usize| SeismicError::ResourceExhausted {
        requested_bytes: samples.saturating_mul(std::mem::size_of::<f32>()),
        reason: "cropped output buffer could not be allocated".into(),
    };
    let samples = crop.samples().ok_or_else(|| exhausted(usize::MAX))?;
    let mut buffer = try_buffer::<f32>(samples).map_err(|_| exhausted(samples))?;
    buffer.resize(samples, 0.0);

    let depth = crop.depth;
    let nz = shape[2];
    let nx = shape[1];
    let batch = options.trace_batch.max(1);
    let traces = shape[0] * nx;

    for (batch_index, block) in buffer.chunks_mut(nz * batch).enumerate() {
        let first = batch_index * batch;
        block
            .par_chunks_mut(nz)
            .enumerate()
            .try_for_each(|(offset, dst)| -> SeismicResult<()> {
                let trace_index = first + offset;
                let inline = crop.inline.start() + trace_index / nx;
                let crossline = crop.crossline.start() + trace_index % nx;
                let trace = source.read_trace(inline, crossline)?;
                let window = trace.get(depth.as_std()).ok_or_else(|| {
                    SourceError::Corrupt(format!(
                        "trace ({inline}, {crossline}) has {} samples, expected at least {}",
                        trace.len(),
                        depth.end()
                    ))
                })?;
                for (out, &sample) in dst.iter_mut().zip(window) {
                    *out = sample.to_f32();
                }
                Ok(())
            })?;
        debug!(
            done = (first + block.len() / nz).min(traces),
            total = traces,
            "trace batch loaded"
        );
    }

    Array3::from_shape_vec(shape, buffer)
        .map_err(|err| SeismicError::from(SourceError::Corrupt(err.to_string())))
}
