//! Device configuration document.
//!
//! The document is YAML keyed `devices -> device_type -> device_number ->
//! properties`, plus a few optional simulator settings at the top level.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::registry::DeviceRegistry;
use crate::types::{DeviceIdentity, DeviceType, PropertyMap};

/// Built-in catalogue used when no configuration file is supplied.
pub const DEFAULT_DOCUMENT: &str = include_str!("../config/default.yaml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config document: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Optional simulator settings stored alongside the device catalogue.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimulatorSettings {
    /// Synthesis timeout in seconds.
    pub gaia_query_timeout: Option<f64>,
    /// Maximum number of cached synthesized images.
    pub image_cache_capacity: Option<usize>,
}

/// Parsed configuration: the device registry plus simulator settings.
#[derive(Debug, Clone, Default)]
pub struct SimulatorConfig {
    pub registry: DeviceRegistry,
    pub settings: SimulatorSettings,
}

#[derive(Debug, Default, Deserialize)]
struct RawDocument {
    #[serde(default)]
    devices: Option<BTreeMap<String, Option<BTreeMap<u32, Option<PropertyMap>>>>>,
    #[serde(default)]
    gaia_query_timeout: Option<f64>,
    #[serde(default)]
    image_cache_capacity: Option<usize>,
}

impl SimulatorConfig {
    /// Parses a YAML document.
    ///
    /// Unknown device-type keys are logged and skipped. A device entry with an
    /// empty body is configured with no overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the document is not valid YAML or
    /// does not have the expected shape.
    pub fn from_yaml_str(document: &str) -> Result<Self, ConfigError> {
        // An empty document parses as null; treat it as an empty catalogue.
        let raw: Option<RawDocument> = serde_yaml::from_str(document)?;
        let raw = raw.unwrap_or_default();

        let mut devices = BTreeMap::new();
        for (tag, numbers) in raw.devices.unwrap_or_default() {
            let device_type = match tag.parse::<DeviceType>() {
                Ok(t) => t,
                Err(err) => {
                    warn!(%err, "skipping unknown device type in config");
                    continue;
                }
            };
            for (number, props) in numbers.unwrap_or_default() {
                devices.insert(
                    DeviceIdentity::new(device_type, number),
                    props.unwrap_or_default(),
                );
            }
        }

        Ok(Self {
            registry: DeviceRegistry::new(devices),
            settings: SimulatorSettings {
                gaia_query_timeout: raw.gaia_query_timeout,
                image_cache_capacity: raw.image_cache_capacity,
            },
        })
    }

    /// Reads and parses a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Parse`] if its contents are invalid.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let document = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&document)
    }

    /// The built-in catalogue.
    ///
    /// # Errors
    ///
    /// Only fails if the embedded document itself is malformed.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_yaml_str(DEFAULT_DOCUMENT)
    }
}
