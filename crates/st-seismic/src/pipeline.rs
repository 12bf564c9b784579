// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Load → normalise → attributes → writer.
//!
//! The volume is loaded and normalised once; every selected attribute reads
//! the same normalised cube and is handed to the writer together with the
//! geometry of the crop.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::coherence::coherence;
use crate::curvature::{curvature, CurvatureParams};
use crate::error::{SeismicError, SeismicResult};
use crate::loader::{load, LoadPath, LoadRequest, LoaderOptions};
use crate::normalize::{normalize, NormalizeParams};
use crate::params::{CurvatureVariant, NormalizationMode, PatchSize};
use crate::source::TraceSource;
use crate::volume::{GeometryMetadata, Volume, VolumeStats};

/// Identifies one output volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum AttributeKind {
    Coherence,
    Curvature(CurvatureVariant),
}

impl AttributeKind {
    /// Stable file stem, e.g. `coherence` or `curvature_most_positive`.
    pub fn stem(&self) -> String {
        match self {
            AttributeKind::Coherence => "coherence".to_string(),
            AttributeKind::Curvature(variant) => format!("curvature_{}", variant.stem()),
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stem())
    }
}

impl From<AttributeKind> for String {
    fn from(kind: AttributeKind) -> Self {
        kind.stem()
    }
}

impl TryFrom<String> for AttributeKind {
    type Error = SeismicError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == "coherence" {
            return Ok(AttributeKind::Coherence);
        }
        value
            .strip_prefix("curvature_")
            .and_then(|stem| {
                CurvatureVariant::ALL
                    .into_iter()
                    .find(|variant| variant.stem() == stem)
            })
            .map(AttributeKind::Curvature)
            .ok_or_else(|| {
                SeismicError::config(
                    "attribute",
                    value,
                    "expected `coherence` or `curvature_<variant>`",
                )
            })
    }
}

/// Persists attribute volumes. Receives every output together with the
/// geometry of the crop it was computed on.
pub trait AttributeWriter {
    fn write(
        &mut self,
        kind: AttributeKind,
        volume: &Volume,
        geometry: &GeometryMetadata,
    ) -> SeismicResult<()>;
}

/// An output captured by [`MemoryWriter`].
#[derive(Clone, Debug)]
pub struct WrittenAttribute {
    pub kind: AttributeKind,
    pub volume: Volume,
    pub geometry: GeometryMetadata,
}

/// Keeps every output in memory, in the order it was written.
#[derive(Clone, Debug, Default)]
pub struct MemoryWriter {
    outputs: Vec<WrittenAttribute>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn kinds(&self) -> Vec<AttributeKind> {
        self.outputs.iter().map(|output| output.kind).collect()
    }

    pub fn get(&self, kind: AttributeKind) -> Option<&WrittenAttribute> {
        self.outputs.iter().find(|output| output.kind == kind)
    }

    pub fn outputs(&self) -> &[WrittenAttribute] {
        &self.outputs
    }

    pub fn into_outputs(self) -> Vec<WrittenAttribute> {
        self.outputs
    }
}

impl AttributeWriter for MemoryWriter {
    fn write(
        &mut self,
        kind: AttributeKind,
        volume: &Volume,
        geometry: &GeometryMetadata,
    ) -> SeismicResult<()> {
        self.outputs.push(WrittenAttribute {
            kind,
            volume: volume.clone(),
            geometry: geometry.clone(),
        });
        Ok(())
    }
}

/// Everything a run needs besides the source and the writer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub request: LoadRequest,
    #[serde(default)]
    pub loader: LoaderOptions,
    #[serde(default)]
    pub normalize: NormalizeParams,
    /// Semblance window; `None` skips coherence.
    #[serde(default)]
    pub coherence: Option<PatchSize>,
    /// `None` skips curvature.
    #[serde(default)]
    pub curvature: Option<CurvatureParams>,
}

impl PipelineConfig {
    pub fn with_request(mut self, request: LoadRequest) -> Self {
        self.request = request;
        self
    }

    pub fn with_loader(mut self, loader: LoaderOptions) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_normalize(mut self, normalize: NormalizeParams) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn with_coherence(mut self, patch: PatchSize) -> Self {
        self.coherence = Some(patch);
        self
    }

    pub fn with_curvature(mut self, params: CurvatureParams) -> Self {
        self.curvature = Some(params);
        self
    }

    /// Checks everything that can be checked without reading samples.
    pub fn validate(&self) -> SeismicResult<()> {
        if self.coherence.is_none() && self.curvature.is_none() {
            return Err(SeismicError::config(
                "attributes",
                "",
                "select coherence, curvature or both",
            ));
        }
        if self.loader.trace_batch == 0 {
            return Err(SeismicError::config(
                "trace_batch",
                "0",
                "must be at least 1",
            ));
        }
        let epsilon = self.normalize.epsilon;
        if !(epsilon.is_finite() && epsilon >= 0.0) {
            return Err(SeismicError::config(
                "normalisation epsilon",
                epsilon.to_string(),
                "must be finite and non-negative",
            ));
        }
        if let Some(params) = &self.curvature {
            params.validate()?;
        }
        Ok(())
    }
}

/// Wall-clock duration of one stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: String,
    pub seconds: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizationSummary {
    pub mode: NormalizationMode,
    pub z_window: usize,
    pub z_window_adjusted: bool,
    pub epsilon: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatchSummary {
    pub size: PatchSize,
    /// Axes `(py, px, pz)` that were rounded up to an odd length.
    pub adjusted: [bool; 3],
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputSummary {
    pub attribute: AttributeKind,
    pub stats: VolumeStats,
}

/// Summary of one pipeline run, serialised next to the outputs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub geometry: GeometryMetadata,
    pub load_path: LoadPath,
    pub normalization: NormalizationSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coherence: Option<PatchSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curvature: Option<CurvatureParams>,
    pub timings: Vec<StageTiming>,
    pub outputs: Vec<OutputSummary>,
}

impl RunReport {
    /// True when the loader had to read trace by trace.
    pub fn used_fallback(&self) -> bool {
        self.load_path == LoadPath::Incremental
    }

    pub fn to_json_pretty(&self) -> SeismicResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Default)]
struct Stopwatch {
    timings: Vec<StageTiming>,
}

impl Stopwatch {
    fn time<T>(&mut self, stage: &str, f: impl FnOnce() -> T) -> T {
        let span = info_span!("stage", name = stage);
        let _guard = span.enter();
        let started = Instant::now();
        let value = f();
        let seconds = started.elapsed().as_secs_f64();
        info!(stage, seconds, "stage finished");
        self.timings.push(StageTiming {
            stage: stage.to_string(),
            seconds,
        });
        value
    }
}

/// A validated run configuration.
#[derive(Clone, Debug)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> SeismicResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every stage against `source`, handing each attribute to `writer`.
    ///
    /// Any failure aborts the run; outputs already written stay with the writer.
    pub fn run<S, W>(&self, source: &S, writer: &mut W) -> SeismicResult<RunReport>
    where
        S: TraceSource,
        W: AttributeWriter + ?Sized,
    {
        let config = &self.config;
        let mut clock = Stopwatch::default();

        let loaded = clock.time("load", || load(source, &config.request, &config.loader))?;
        if loaded.path == LoadPath::Incremental {
            warn!("volume was assembled trace by trace");
        }
        let geometry = loaded.geometry;

        debug!(
            mode = %config.normalize.mode,
            window = config.normalize.z_window.size(),
            "normalisation parameters"
        );
        let normalized = clock.time("normalize", || normalize(loaded.volume, &config.normalize));

        let mut outputs = Vec::new();
        if let Some(patch) = &config.coherence {
            if patch.was_adjusted() {
                warn!(patch = %patch, "coherence patch adjusted to odd sizes");
            }
            let volume = clock.time("coherence", || coherence(&normalized, patch));
            outputs.push(emit(writer, AttributeKind::Coherence, &volume, &geometry)?);
        }
        if let Some(params) = &config.curvature {
            let volumes = clock.time("curvature", || curvature(&normalized, params))?;
            for (variant, volume) in volumes {
                outputs.push(emit(
                    writer,
                    AttributeKind::Curvature(variant),
                    &volume,
                    &geometry,
                )?);
            }
        }
        drop(normalized);

        info!(outputs = outputs.len(), "pipeline finished");
        Ok(RunReport {
            geometry,
            load_path: loaded.path,
            normalization: NormalizationSummary {
                mode: config.normalize.mode,
                z_window: config.normalize.z_window.size(),
                z_window_adjusted: config.normalize.z_window.adjusted(),
                epsilon: config.normalize.epsilon,
            },
            coherence: config.coherence.map(|size| PatchSummary {
                size,
                adjusted: size.adjusted,
            }),
            curvature: config.curvature.clone(),
            timings: clock.timings,
            outputs,
        })
    }
}

fn emit<W: AttributeWriter + ?Sized>(
    writer: &mut W,
    kind: AttributeKind,
    volume: &Volume,
    geometry: &GeometryMetadata,
) -> SeismicResult<OutputSummary> {
    let stats = volume.stats();
    debug!(attribute = %kind, ?stats, "writing attribute");
    writer.write(kind, volume, geometry)?;
    Ok(OutputSummary {
        attribute: kind,
        stats,
    })
}
