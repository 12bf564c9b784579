// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type SeismicResult<T> = Result<T, SeismicError>;

/// Failures reported by a [`TraceSource`](crate::source::TraceSource).
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source could not allocate a buffer of the requested size.
    #[error("out of memory while allocating {bytes} bytes")]
    OutOfMemory { bytes: usize },
    /// A trace outside the survey grid was requested.
    #[error("trace ({inline}, {crossline}) lies outside the survey grid")]
    TraceOutOfRange { inline: usize, crossline: usize },
    /// The backing store delivered malformed data.
    #[error("corrupt trace data: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors emitted by the attribute pipeline.
#[derive(Debug, Error)]
pub enum SeismicError {
    /// Malformed or out-of-domain configuration value. Raised before any data is touched.
    #[error("invalid {field} `{value}`: {constraint}")]
    Configuration {
        field: &'static str,
        value: String,
        constraint: String,
    },
    /// A crop range reaches beyond the source volume.
    #[error("{axis} range {requested} exceeds the source extent of {extent} samples")]
    Bounds {
        axis: &'static str,
        requested: String,
        extent: usize,
    },
    /// Both the bulk read and the incremental fallback ran out of memory.
    #[error("unable to allocate {requested_bytes} bytes: {reason}")]
    ResourceExhausted {
        requested_bytes: usize,
        reason: String,
    },
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("serialisation failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SeismicError {
    pub(crate) fn config(
        field: &'static str,
        value: impl Into<String>,
        constraint: impl Into<String>,
    ) -> Self {
        SeismicError::Configuration {
            field,
            value: value.into(),
            constraint: constraint.into(),
        }
    }

    /// True for errors that are reported before any I/O happens.
    pub fn is_configuration(&self) -> bool {
        matches!(self, SeismicError::Configuration { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_message_names_value_and_constraint() {
        let err = SeismicError::config("range", "5:5", "start must be < end");
        assert_eq!(err.to_string(), "invalid range `5:5`: start must be < end");
        assert!(err.is_configuration());
    }

    #[test]
    fn bounds_message_names_axis_and_extent() {
        let err = SeismicError::Bounds {
            axis: "inline",
            requested: "0:12".into(),
            extent: 10,
        };
        assert_eq!(
            err.to_string(),
            "inline range 0:12 exceeds the source extent of 10 samples"
        );
    }
}
