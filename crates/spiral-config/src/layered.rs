// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Run configuration stacked from a survey TOML file, a per-run JSON file and
//! command-line overrides, in that order of precedence.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming the survey TOML file.
pub const BASE_CONFIG_ENV: &str = "SPIRAL_SEISMIC_CONFIG";
/// Environment variable naming the per-run JSON file.
pub const RUN_CONFIG_ENV: &str = "SPIRAL_SEISMIC_RUN";

/// Where a configuration value came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigLayer {
    Base,
    Run,
    Cli,
}

/// One leaf that a layer set or replaced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfigDiffEvent {
    pub layer: ConfigLayer,
    /// Dotted key path, e.g. `pipeline.normalize.mode`.
    pub path: String,
    pub previous: Option<Value>,
    pub current: Option<Value>,
}

/// Files feeding a [`LayeredConfig`].
#[derive(Clone, Debug, Default)]
pub struct ConfigLayering {
    pub base: Option<PathBuf>,
    pub run: Option<PathBuf>,
}

impl ConfigLayering {
    /// Picks up [`BASE_CONFIG_ENV`] and [`RUN_CONFIG_ENV`]; paths that do not
    /// exist are skipped.
    pub fn discover() -> Self {
        let from_env = |name: &str| {
            std::env::var_os(name)
                .map(PathBuf::from)
                .filter(|path| path.exists())
        };
        ConfigLayering {
            base: from_env(BASE_CONFIG_ENV),
            run: from_env(RUN_CONFIG_ENV),
        }
    }

    pub fn with_base<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.base = Some(path.into());
        self
    }

    pub fn with_run<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.run = Some(path.into());
        self
    }
}

/// Merged configuration tree plus a log of what each layer changed.
#[derive(Clone, Debug)]
pub struct LayeredConfig {
    layering: ConfigLayering,
    value: Value,
    events: Vec<ConfigDiffEvent>,
}

impl LayeredConfig {
    /// Reads the base and run layers. A path that was set explicitly but
    /// cannot be read is an error.
    pub fn load(layering: ConfigLayering) -> Result<Self, LayeredConfigError> {
        let mut config = LayeredConfig {
            layering,
            value: Value::Object(Map::new()),
            events: Vec::new(),
        };
        if let Some(path) = config.layering.base.clone() {
            let layer = read_toml(&path)?;
            config.overlay(&layer, ConfigLayer::Base);
        }
        if let Some(path) = config.layering.run.clone() {
            let layer = read_json(&path)?;
            config.overlay(&layer, ConfigLayer::Run);
        }
        Ok(config)
    }

    /// Applies command-line values on top. `null` leaves the lower value.
    pub fn apply_overrides(&mut self, overrides: &Value) {
        self.overlay(overrides, ConfigLayer::Cli);
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn layering(&self) -> &ConfigLayering {
        &self.layering
    }

    pub fn events(&self) -> &[ConfigDiffEvent] {
        &self.events
    }

    /// Deserialises the subtree at `path`, or `None` when any key is missing.
    pub fn section<T>(&self, path: &[&str]) -> Result<Option<T>, serde_json::Error>
    where
        T: DeserializeOwned,
    {
        let node = path
            .iter()
            .try_fold(&self.value, |node, key| node.as_object()?.get(*key));
        node.map(|node| serde_json::from_value(node.clone()))
            .transpose()
    }

    fn overlay(&mut self, layer: &Value, kind: ConfigLayer) {
        let mut path = Vec::new();
        overlay(&mut self.value, layer, &mut path, kind, &mut self.events);
    }
}

/// Merges `src` into `dest`, recording every leaf that changes. Objects merge
/// key by key; any other value replaces what was there.
fn overlay(
    dest: &mut Value,
    src: &Value,
    path: &mut Vec<String>,
    layer: ConfigLayer,
    events: &mut Vec<ConfigDiffEvent>,
) {
    match (dest, src) {
        (_, Value::Null) => {}
        (Value::Object(dest_map), Value::Object(src_map)) => {
            for (key, value) in src_map.iter().filter(|(_, value)| !value.is_null()) {
                path.push(key.clone());
                let slot = dest_map.entry(key.clone()).or_insert(Value::Null);
                if value.is_object() && !slot.is_object() {
                    if !slot.is_null() {
                        events.push(ConfigDiffEvent {
                            layer,
                            path: path.join("."),
                            previous: Some(slot.clone()),
                            current: Some(value.clone()),
                        });
                    }
                    *slot = Value::Object(Map::new());
                }
                overlay(slot, value, path, layer, events);
                path.pop();
            }
        }
        (slot, value) => {
            if slot != value {
                events.push(ConfigDiffEvent {
                    layer,
                    path: path.join("."),
                    previous: (!slot.is_null()).then(|| slot.clone()),
                    current: Some(value.clone()),
                });
                *slot = value.clone();
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LayeredConfigError {
    #[error("cannot read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML in {path:?}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid JSON in {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn read_text(path: &Path) -> Result<String, LayeredConfigError> {
    fs::read_to_string(path).map_err(|source| LayeredConfigError::Io {
        path: path.into(),
        source,
    })
}

fn read_toml(path: &Path) -> Result<Value, LayeredConfigError> {
    let parsed: toml::Value =
        toml::from_str(&read_text(path)?).map_err(|source| LayeredConfigError::Toml {
            path: path.into(),
            source,
        })?;
    serde_json::to_value(parsed).map_err(|source| LayeredConfigError::Json {
        path: path.into(),
        source,
    })
}

fn read_json(path: &Path) -> Result<Value, LayeredConfigError> {
    serde_json::from_str(&read_text(path)?).map_err(|source| LayeredConfigError::Json {
        path: path.into(),
        source,
    })
}
