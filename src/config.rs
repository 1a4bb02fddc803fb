//! Engine configuration loaded from `~/.midibind/config.yaml`.
//!
//! ```yaml
//! tick_hz: 60
//! fps: 24
//! midi:
//!   device_name: nanoKONTROL
//! properties:
//!   cube.location: { value: !Array [0.0, 0.0, 0.0] }
//!   cube.visible: { value: !Bool true }
//! mappings:
//!   - source: { control: !Cc 7 }
//!     target: cube.location[2]
//!     range: { min: 0.0, max: 4.0 }
//!     expression: round(x * 4) / 4
//!   - source: { channel: 0, control: !Cc 8 }
//!     target: cube.location[0]
//!     mode: Motor
//!     range: { min: -1.0, max: 1.0 }
//! ```

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::expr::CompileError;
use crate::mapping::{Curve, MappingId, MappingPatch, Mode, Range, Registry, SourceSelector};
use crate::midi::MidiConfig;
use crate::property::{Property, PropertyStore, ResolutionError};
use crate::runtime::RuntimeSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid setting: {0}")]
    Invalid(String),
    #[error("mapping {index} ({target}): {source}")]
    Mapping {
        index: usize,
        target: String,
        source: CompileError,
    },
    #[error("property '{path}': {source}")]
    Property {
        path: String,
        source: ResolutionError,
    },
}

/// One mapping as written in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub source: SourceSelector,
    pub target: String,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub range: Range,
    #[serde(default)]
    pub curve: Curve,
    #[serde(default)]
    pub expression: String,
    /// Input glide speed in `0.01..1.0`; omitted or `1.0` applies samples
    /// immediately.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smoothing: Option<f64>,
    /// Write `y * 127` instead of mapping onto the range.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub absolute: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Tick rate for Motor and time-varying mappings.
    #[serde(default = "default_tick_hz")]
    pub tick_hz: f64,
    /// Longest Motor integration step, in seconds.
    #[serde(default = "default_max_step")]
    pub max_step_seconds: f64,
    /// Consecutive evaluation failures before a mapping is flagged.
    #[serde(default = "default_degrade_after")]
    pub degrade_after: u32,
    /// Scene frame rate; `time = frame / fps`.
    #[serde(default = "default_fps")]
    pub fps: f64,
    #[serde(default)]
    pub midi: MidiConfig,
    /// Seed values for the in-memory property host, keyed by path.
    #[serde(default)]
    pub properties: BTreeMap<String, Property>,
    #[serde(default)]
    pub mappings: Vec<MappingSpec>,
}

fn default_tick_hz() -> f64 {
    60.0
}

fn default_max_step() -> f64 {
    0.25
}

fn default_degrade_after() -> u32 {
    8
}

fn default_fps() -> f64 {
    24.0
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_hz: default_tick_hz(),
            max_step_seconds: default_max_step(),
            degrade_after: default_degrade_after(),
            fps: default_fps(),
            midi: MidiConfig::default(),
            properties: BTreeMap::new(),
            mappings: Vec::new(),
        }
    }
}

/// `~/.midibind/config.yaml`, or `./.midibind/config.yaml` without a home.
pub fn default_config_path() -> PathBuf {
    let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(".midibind");
    path.push("config.yaml");
    path
}

impl EngineConfig {
    /// Parse and validate YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// Write to `path`, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml).map_err(io_err)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tick_hz.is_finite() && self.tick_hz > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "tick_hz must be positive, got {}",
                self.tick_hz
            )));
        }
        if !(self.max_step_seconds.is_finite() && self.max_step_seconds >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "max_step_seconds must be non-negative, got {}",
                self.max_step_seconds
            )));
        }
        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "fps must be positive, got {}",
                self.fps
            )));
        }
        if let Some(ch) = self.midi.channel_filter.filter(|ch| *ch > 15) {
            return Err(ConfigError::Invalid(format!(
                "midi.channel_filter must be 0-15, got {ch}"
            )));
        }
        for (index, spec) in self.mappings.iter().enumerate() {
            if let Some(ch) = spec.source.channel.filter(|ch| *ch > 15) {
                return Err(ConfigError::Invalid(format!(
                    "mapping {index}: channel must be 0-15, got {ch}"
                )));
            }
            if !(spec.range.min.is_finite() && spec.range.max.is_finite()) {
                return Err(ConfigError::Invalid(format!(
                    "mapping {index}: range must be finite"
                )));
            }
            if let Some(speed) = spec.smoothing.filter(|s| !(*s > 0.0 && *s <= 1.0)) {
                return Err(ConfigError::Invalid(format!(
                    "mapping {index}: smoothing must be in (0, 1], got {speed}"
                )));
            }
        }
        Ok(())
    }

    pub fn runtime_settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            max_step: self.max_step_seconds,
            degrade_after: self.degrade_after,
        }
    }

    /// Build the in-memory host from the seeded properties.
    pub fn property_store(&self) -> Result<PropertyStore, ConfigError> {
        let store = PropertyStore::new();
        for (path, property) in &self.properties {
            store
                .insert(path, property.clone())
                .map_err(|source| ConfigError::Property {
                    path: path.clone(),
                    source,
                })?;
        }
        Ok(store)
    }

    /// Register every configured mapping, in file order.
    ///
    /// Stops at the first mapping whose expression does not compile; the
    /// ones before it stay registered.
    pub fn register_mappings(&self, registry: &Registry) -> Result<Vec<MappingId>, ConfigError> {
        self.mappings
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                let mapping_err = |source| ConfigError::Mapping {
                    index,
                    target: spec.target.clone(),
                    source,
                };
                let id = registry
                    .create(spec.source, &spec.target, spec.mode, spec.range, &spec.expression)
                    .map_err(mapping_err)?;

                let mut patch = MappingPatch::default()
                    .curve(spec.curve)
                    .absolute(spec.absolute);
                if let Some(name) = &spec.name {
                    patch = patch.name(name.clone());
                }
                if let Some(speed) = spec.smoothing {
                    patch = patch.smoothing(speed);
                }
                // The expression is already compiled; nothing here can fail to.
                if registry.update(id, patch).is_err() {
                    return Err(ConfigError::Invalid(format!(
                        "mapping {index} vanished while loading"
                    )));
                }
                Ok(id)
            })
            .collect()
    }
}
