// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Seismic attribute extraction over 3D amplitude cubes.
//!
//! A run loads a cropped `(inline, crossline, depth)` sub-volume from a
//! [`TraceSource`], normalises it, and derives semblance coherence and
//! reflector curvature volumes which an [`AttributeWriter`] persists together
//! with the crop geometry.

pub mod coherence;
pub mod curvature;
pub mod error;
pub mod loader;
pub mod normalize;
pub mod params;
pub mod pipeline;
pub mod raw;
pub mod source;
pub mod synthetic;
pub mod volume;
pub mod window;

pub use coherence::coherence;
pub use curvature::{curvature, CurvatureOutputs, CurvatureParams};
pub use error::{SeismicError, SeismicResult, SourceError};
pub use loader::{load, LoadPath, LoadRequest, LoadedVolume, LoaderOptions};
pub use normalize::{normalize, NormalizeParams};
pub use params::{
    parse_patch, parse_permutation, parse_range, parse_variants, AxisRange, CurvatureVariant,
    NormalizationMode, PatchSize, Permutation, ZWindow,
};
pub use pipeline::{
    AttributeKind, AttributeWriter, MemoryWriter, Pipeline, PipelineConfig, RunReport,
};
pub use raw::{write_raw_volume, RawHeader, RawVolumeSource, RawVolumeWriter};
pub use source::{ArraySource, SampleValue, TraceSource};
pub use volume::{GeometryMetadata, SampleFormat, Volume, VolumeStats};
