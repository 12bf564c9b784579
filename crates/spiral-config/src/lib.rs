// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Process-level configuration shared by the seismic attribute tooling.
//!
//! Library crates only emit `tracing` events; binaries call
//! [`tracing::init_tracing`] once at start-up, optionally load a
//! [`layered::LayeredConfig`], and derive reproducible random streams from
//! [`determinism`].

pub mod determinism;
pub mod layered;
pub mod tracing;

pub use layered::{ConfigLayer, ConfigLayering, LayeredConfig, LayeredConfigError};
