// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Textual run parameters: crop ranges, analysis windows, axis permutations
//! and the closed mode enumerations.
//!
//! Every parser here runs before the pipeline touches a source, so a typo on
//! the command line never costs a volume read.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{SeismicError, SeismicResult};

/// Half-open `[start, end)` index range along one axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AxisRange {
    start: usize,
    end: usize,
}

impl AxisRange {
    pub fn new(start: usize, end: usize) -> SeismicResult<Self> {
        if start >= end {
            return Err(SeismicError::config(
                "range",
                format!("{start}:{end}"),
                format!("start ({start}) must be < end ({end})"),
            ));
        }
        Ok(Self { start, end })
    }

    /// Range covering an entire axis of `extent` samples.
    pub fn full(extent: usize) -> SeismicResult<Self> {
        Self::new(0, extent)
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Fails with [`SeismicError::Bounds`] when the range reaches past `extent`.
    pub fn check_within(&self, axis: &'static str, extent: usize) -> SeismicResult<()> {
        if self.end > extent {
            return Err(SeismicError::Bounds {
                axis,
                requested: self.to_string(),
                extent,
            });
        }
        Ok(())
    }

    pub fn as_std(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

impl fmt::Display for AxisRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

impl FromStr for AxisRange {
    type Err = SeismicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_range(s)
    }
}

impl TryFrom<String> for AxisRange {
    type Error = SeismicError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_range(&value)
    }
}

impl From<AxisRange> for String {
    fn from(range: AxisRange) -> Self {
        range.to_string()
    }
}

/// Parses `start:end` into an [`AxisRange`].
pub fn parse_range(text: &str) -> SeismicResult<AxisRange> {
    let (start, end) = text.split_once(':').ok_or_else(|| {
        SeismicError::config("range", text, "expected the form 'start:end'")
    })?;
    let start = parse_index("range", text, start)?;
    let end = parse_index("range", text, end)?;
    AxisRange::new(start, end)
}

fn parse_index(field: &'static str, whole: &str, part: &str) -> SeismicResult<usize> {
    part.trim().parse::<usize>().map_err(|_| {
        SeismicError::config(
            field,
            whole,
            format!("'{}' is not a non-negative integer", part.trim()),
        )
    })
}

fn round_up_to_odd(value: usize) -> (usize, bool) {
    if value % 2 == 0 {
        (value + 1, true)
    } else {
        (value, false)
    }
}

/// Smallest admissible patch extent along any axis.
pub const MIN_PATCH: usize = 3;

/// Local analysis window `(py, px, pz)` for coherence and dip smoothing.
///
/// Even sizes are rounded up to the next odd value; `adjusted` records which
/// axes were touched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PatchSize {
    pub py: usize,
    pub px: usize,
    pub pz: usize,
    pub adjusted: [bool; 3],
}

impl PatchSize {
    pub fn new(py: usize, px: usize, pz: usize) -> SeismicResult<Self> {
        let requested = [py, px, pz];
        let mut sizes = [0usize; 3];
        let mut adjusted = [false; 3];
        for axis in 0..3 {
            let (size, touched) = round_up_to_odd(requested[axis]);
            sizes[axis] = size;
            adjusted[axis] = touched;
        }
        if sizes.iter().any(|&size| size < MIN_PATCH) {
            return Err(SeismicError::config(
                "patch",
                format!("{py},{px},{pz}"),
                format!("patch sizes must be >= {MIN_PATCH}"),
            ));
        }
        Ok(Self {
            py: sizes[0],
            px: sizes[1],
            pz: sizes[2],
            adjusted,
        })
    }

    pub fn dims(&self) -> [usize; 3] {
        [self.py, self.px, self.pz]
    }

    /// Number of samples in the window.
    pub fn len(&self) -> usize {
        self.py * self.px * self.pz
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn was_adjusted(&self) -> bool {
        self.adjusted.iter().any(|&flag| flag)
    }
}

impl Default for PatchSize {
    fn default() -> Self {
        Self {
            py: 5,
            px: 5,
            pz: 9,
            adjusted: [false; 3],
        }
    }
}

impl fmt::Display for PatchSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.py, self.px, self.pz)
    }
}

impl FromStr for PatchSize {
    type Err = SeismicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_patch(s)
    }
}

impl TryFrom<String> for PatchSize {
    type Error = SeismicError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_patch(&value)
    }
}

impl From<PatchSize> for String {
    fn from(patch: PatchSize) -> Self {
        patch.to_string()
    }
}

/// Parses `py,px,pz` into a [`PatchSize`].
pub fn parse_patch(text: &str) -> SeismicResult<PatchSize> {
    let parts: Vec<&str> = text.split(',').collect();
    if parts.len() != 3 {
        return Err(SeismicError::config(
            "patch",
            text,
            "expected three comma-separated sizes 'py,px,pz'",
        ));
    }
    let py = parse_index("patch", text, parts[0])?;
    let px = parse_index("patch", text, parts[1])?;
    let pz = parse_index("patch", text, parts[2])?;
    PatchSize::new(py, px, pz)
}

/// Depth window used by z-window normalisation. Always odd.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct ZWindow {
    size: usize,
    adjusted: bool,
}

impl ZWindow {
    pub fn new(size: usize) -> SeismicResult<Self> {
        if size == 0 {
            return Err(SeismicError::config(
                "z-window",
                "0",
                "window must contain at least one sample",
            ));
        }
        let (size, adjusted) = round_up_to_odd(size);
        Ok(Self { size, adjusted })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn half(&self) -> usize {
        self.size / 2
    }

    /// True when an even request was bumped to the next odd size.
    pub fn adjusted(&self) -> bool {
        self.adjusted
    }
}

impl Default for ZWindow {
    fn default() -> Self {
        Self {
            size: 9,
            adjusted: false,
        }
    }
}

impl TryFrom<usize> for ZWindow {
    type Error = SeismicError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        ZWindow::new(value)
    }
}

impl From<ZWindow> for usize {
    fn from(window: ZWindow) -> Self {
        window.size
    }
}

/// Axis order applied to a loaded volume, numpy `transpose` semantics:
/// output axis `i` is input axis `order[i]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permutation([usize; 3]);

impl Permutation {
    pub fn new(order: [usize; 3]) -> SeismicResult<Self> {
        let mut seen = [false; 3];
        for &axis in &order {
            if axis > 2 || seen[axis] {
                return Err(SeismicError::config(
                    "axis permutation",
                    format!("{},{},{}", order[0], order[1], order[2]),
                    "must be a permutation of 0,1,2",
                ));
            }
            seen[axis] = true;
        }
        Ok(Self(order))
    }

    pub fn identity() -> Self {
        Self([0, 1, 2])
    }

    pub fn order(&self) -> [usize; 3] {
        self.0
    }

    pub fn is_identity(&self) -> bool {
        self.0 == [0, 1, 2]
    }

    pub fn apply_to_shape(&self, shape: [usize; 3]) -> [usize; 3] {
        [shape[self.0[0]], shape[self.0[1]], shape[self.0[2]]]
    }
}

impl fmt::Display for Permutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.0[0], self.0[1], self.0[2])
    }
}

impl FromStr for Permutation {
    type Err = SeismicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_permutation(s)
    }
}

impl TryFrom<String> for Permutation {
    type Error = SeismicError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_permutation(&value)
    }
}

impl From<Permutation> for String {
    fn from(permutation: Permutation) -> Self {
        permutation.to_string()
    }
}

/// Parses `a,b,c` into a [`Permutation`] of `{0, 1, 2}`.
pub fn parse_permutation(text: &str) -> SeismicResult<Permutation> {
    let invalid = || {
        SeismicError::config(
            "axis permutation",
            text,
            "expected a comma-separated permutation of 0,1,2",
        )
    };
    let parts: Vec<&str> = text.split(',').collect();
    if parts.len() != 3 {
        return Err(invalid());
    }
    let mut order = [0usize; 3];
    for (slot, part) in order.iter_mut().zip(&parts) {
        *slot = part.trim().parse::<usize>().map_err(|_| invalid())?;
    }
    Permutation::new(order).map_err(|_| invalid())
}

/// Amplitude normalisation applied before attribute extraction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NormalizationMode {
    None,
    /// Per-trace z-score.
    Trace,
    /// Sliding depth-window z-score.
    ZWindow,
    /// `Trace` followed by `ZWindow`.
    #[default]
    Both,
}

impl NormalizationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NormalizationMode::None => "none",
            NormalizationMode::Trace => "trace",
            NormalizationMode::ZWindow => "z",
            NormalizationMode::Both => "both",
        }
    }

    pub fn uses_trace(&self) -> bool {
        matches!(self, NormalizationMode::Trace | NormalizationMode::Both)
    }

    pub fn uses_z_window(&self) -> bool {
        matches!(self, NormalizationMode::ZWindow | NormalizationMode::Both)
    }
}

impl fmt::Display for NormalizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NormalizationMode {
    type Err = SeismicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(NormalizationMode::None),
            "trace" => Ok(NormalizationMode::Trace),
            "z" | "z-window" | "z_window" => Ok(NormalizationMode::ZWindow),
            "both" => Ok(NormalizationMode::Both),
            _ => Err(SeismicError::config(
                "normalization mode",
                s,
                "expected one of none, trace, z, both",
            )),
        }
    }
}

impl TryFrom<String> for NormalizationMode {
    type Error = SeismicError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NormalizationMode> for String {
    fn from(mode: NormalizationMode) -> Self {
        mode.as_str().to_string()
    }
}

/// Member of the curvature attribute family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CurvatureVariant {
    /// Larger eigenvalue of the reflector Hessian.
    MostPositive,
    /// Smaller eigenvalue of the reflector Hessian.
    MostNegative,
    Mean,
    Gaussian,
    /// Maximum principal curvature.
    Maximum,
    /// Minimum principal curvature.
    Minimum,
}

impl CurvatureVariant {
    pub const ALL: [CurvatureVariant; 6] = [
        CurvatureVariant::MostPositive,
        CurvatureVariant::MostNegative,
        CurvatureVariant::Mean,
        CurvatureVariant::Gaussian,
        CurvatureVariant::Maximum,
        CurvatureVariant::Minimum,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CurvatureVariant::MostPositive => "most-positive",
            CurvatureVariant::MostNegative => "most-negative",
            CurvatureVariant::Mean => "mean",
            CurvatureVariant::Gaussian => "gaussian",
            CurvatureVariant::Maximum => "maximum",
            CurvatureVariant::Minimum => "minimum",
        }
    }

    /// Identifier safe for file names.
    pub fn stem(&self) -> &'static str {
        match self {
            CurvatureVariant::MostPositive => "most_positive",
            CurvatureVariant::MostNegative => "most_negative",
            CurvatureVariant::Mean => "mean",
            CurvatureVariant::Gaussian => "gaussian",
            CurvatureVariant::Maximum => "maximum",
            CurvatureVariant::Minimum => "minimum",
        }
    }
}

impl fmt::Display for CurvatureVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CurvatureVariant {
    type Err = SeismicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "most-positive" | "kpos" => Ok(CurvatureVariant::MostPositive),
            "most-negative" | "kneg" => Ok(CurvatureVariant::MostNegative),
            "mean" | "kmean" => Ok(CurvatureVariant::Mean),
            "gaussian" | "kgauss" => Ok(CurvatureVariant::Gaussian),
            "maximum" | "kmax" => Ok(CurvatureVariant::Maximum),
            "minimum" | "kmin" => Ok(CurvatureVariant::Minimum),
            _ => Err(SeismicError::config(
                "curvature variant",
                s,
                "expected one of most-positive, most-negative, mean, gaussian, maximum, minimum",
            )),
        }
    }
}

impl TryFrom<String> for CurvatureVariant {
    type Error = SeismicError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CurvatureVariant> for String {
    fn from(variant: CurvatureVariant) -> Self {
        variant.as_str().to_string()
    }
}

/// Parses a comma-separated list of curvature variants, dropping duplicates
/// while keeping the first-seen order.
pub fn parse_variants(text: &str) -> SeismicResult<Vec<CurvatureVariant>> {
    let mut variants = Vec::new();
    for part in text.split(',').filter(|part| !part.trim().is_empty()) {
        let variant: CurvatureVariant = part.parse()?;
        if !variants.contains(&variant) {
            variants.push(variant);
        }
    }
    if variants.is_empty() {
        return Err(SeismicError::config(
            "curvature variant",
            text,
            "at least one variant is required",
        ));
    }
    Ok(variants)
}
