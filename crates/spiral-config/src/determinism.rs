// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Seeds for synthetic surveys and sizing of the rayon pool.

use rand::{rngs::StdRng, SeedableRng};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

/// Turns seeded runs on (`1`, `true`, `on`, ...); `0`, `false` or `off` keep them off.
pub const DETERMINISTIC_ENV: &str = "SPIRAL_DETERMINISTIC";
/// Base seed that labelled seeds are derived from.
pub const SEED_ENV: &str = "SPIRAL_DETERMINISTIC_SEED";
/// Worker count for the global rayon pool.
pub const THREADS_ENV: &str = "SPIRAL_THREADS";

const DEFAULT_SEED: u64 = 42;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeterminismConfig {
    pub enabled: bool,
    pub base_seed: u64,
    /// `None` keeps rayon's own choice.
    pub threads: Option<usize>,
}

impl Default for DeterminismConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_seed: DEFAULT_SEED,
            threads: None,
        }
    }
}

impl DeterminismConfig {
    /// Reads the settings through `lookup`. Unparsable values fall back to the
    /// defaults instead of failing.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let enabled = lookup(DETERMINISTIC_ENV).is_some_and(|raw| {
            !matches!(
                raw.trim().to_ascii_lowercase().as_str(),
                "" | "0" | "false" | "off" | "no"
            )
        });
        let base_seed = lookup(SEED_ENV)
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(DEFAULT_SEED);
        let threads = lookup(THREADS_ENV)
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .filter(|&count| count > 0);
        Self {
            enabled,
            base_seed,
            threads,
        }
    }

    fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Stable seed for one consumer, e.g. `"st-seismic.synthetic.noise"`.
    pub fn seed_for<L: Hash>(&self, label: L) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.base_seed.hash(&mut hasher);
        label.hash(&mut hasher);
        hasher.finish()
    }
}

static CONFIG: OnceLock<DeterminismConfig> = OnceLock::new();

/// Process-wide settings, read from the environment on first use.
pub fn config() -> &'static DeterminismConfig {
    CONFIG.get_or_init(DeterminismConfig::from_env)
}

/// Installs `cfg` unless the settings were already read.
pub fn configure(cfg: DeterminismConfig) -> &'static DeterminismConfig {
    CONFIG.get_or_init(|| cfg)
}

/// Builds the global rayon pool with `cfg.threads` workers. Returns `false`
/// when no count is set or a global pool already exists.
pub fn install_thread_pool(cfg: &DeterminismConfig) -> bool {
    let Some(threads) = cfg.threads else {
        return false;
    };
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|index| format!("st-seismic-{index}"))
        .build_global()
        .is_ok()
}

/// Seeded from `label` when seeded runs are on, otherwise from OS entropy.
pub fn rng_from_label(label: &str) -> StdRng {
    let cfg = config();
    if cfg.enabled {
        StdRng::seed_from_u64(cfg.seed_for(label))
    } else {
        StdRng::from_entropy()
    }
}

/// An explicit seed wins over the label.
pub fn rng_from_optional(seed: Option<u64>, label: &str) -> StdRng {
    seed.map_or_else(|| rng_from_label(label), StdRng::seed_from_u64)
}
