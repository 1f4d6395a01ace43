use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::image::PixelGrid;

/// Property bag of one device: property name -> value.
///
/// `BTreeMap` keeps `devicestate` output and snapshots in a stable order.
pub type PropertyMap = BTreeMap<String, Value>;

/// Runtime value of a single device property.
///
/// Supports every JSON-compatible shape a device property can take, plus a
/// shared pixel grid for the camera's pending image. Serializes untagged, so
/// the JSON form of `Value::Float(1.5)` is simply `1.5`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// JSON null.
    #[default]
    Null,
    /// JSON boolean.
    Bool(bool),
    /// JSON integer (signed 64-bit).
    Int(i64),
    /// JSON floating-point (64-bit IEEE 754).
    Float(f64),
    /// JSON string (UTF-8).
    String(String),
    /// JSON array.
    Array(Vec<Value>),
    /// JSON object. Uses `BTreeMap` for deterministic serialization order.
    Map(BTreeMap<String, Value>),
    /// Camera image. Shared immutably so snapshots never copy pixel data.
    /// Rendered as `null` in JSON.
    Image(Arc<PixelGrid>),
}

impl Value {
    /// Returns the boolean payload, if this is a `Bool`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer payload. Floats with no fractional part also convert.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    /// Returns the numeric payload as `f64`; integers widen.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the string payload, if this is a `String`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the shared pixel grid, if this is an `Image`.
    #[must_use]
    pub fn as_image(&self) -> Option<&Arc<PixelGrid>> {
        match self {
            Self::Image(grid) => Some(grid),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Arc<PixelGrid>> for Value {
    fn from(grid: Arc<PixelGrid>) -> Self {
        Self::Image(grid)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(raw: serde_json::Value) -> Self {
        match raw {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(entries) => Self::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Self::from(v)))
                    .collect(),
            ),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null | Self::Image(_) => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::String(s) => serializer.serialize_str(s),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

// Deserializes through `serde_json::Value` so YAML and JSON documents share
// one conversion path.
impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::from)
    }
}

/// Builds a [`PropertyMap`] from literal `(name, value)` pairs.
#[must_use]
pub fn property_map<const N: usize>(entries: [(&str, Value); N]) -> PropertyMap {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Typed lookups with fallbacks over a [`PropertyMap`].
pub trait PropertyMapExt {
    fn bool_or(&self, key: &str, default: bool) -> bool;
    fn i64_or(&self, key: &str, default: i64) -> i64;
    fn f64_or(&self, key: &str, default: f64) -> f64;
    fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str;
}

impl PropertyMapExt for PropertyMap {
    fn bool_or(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    fn i64_or(&self, key: &str, default: i64) -> i64 {
        self.get(key).and_then(Value::as_i64).unwrap_or(default)
    }

    fn f64_or(&self, key: &str, default: f64) -> f64 {
        self.get(key).and_then(Value::as_f64).unwrap_or(default)
    }

    fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).and_then(Value::as_str).unwrap_or(default)
    }
}

// ---------------------------------------------------------------------------
// Device identity
// ---------------------------------------------------------------------------

/// The ten device kinds the simulator can host.
///
/// Parsed from the lowercase URL tag; the tag round-trips through
/// [`DeviceType::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceType {
    Camera,
    CoverCalibrator,
    Dome,
    FilterWheel,
    Focuser,
    ObservingConditions,
    Rotator,
    SafetyMonitor,
    Switch,
    Telescope,
}

impl DeviceType {
    pub const ALL: [DeviceType; 10] = [
        Self::Camera,
        Self::CoverCalibrator,
        Self::Dome,
        Self::FilterWheel,
        Self::Focuser,
        Self::ObservingConditions,
        Self::Rotator,
        Self::SafetyMonitor,
        Self::Switch,
        Self::Telescope,
    ];

    /// Lowercase tag used in URLs and configuration keys.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Camera => "camera",
            Self::CoverCalibrator => "covercalibrator",
            Self::Dome => "dome",
            Self::FilterWheel => "filterwheel",
            Self::Focuser => "focuser",
            Self::ObservingConditions => "observingconditions",
            Self::Rotator => "rotator",
            Self::SafetyMonitor => "safetymonitor",
            Self::Switch => "switch",
            Self::Telescope => "telescope",
        }
    }

    /// PascalCase name reported by the management API.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Camera => "Camera",
            Self::CoverCalibrator => "CoverCalibrator",
            Self::Dome => "Dome",
            Self::FilterWheel => "FilterWheel",
            Self::Focuser => "Focuser",
            Self::ObservingConditions => "ObservingConditions",
            Self::Rotator => "Rotator",
            Self::SafetyMonitor => "SafetyMonitor",
            Self::Switch => "Switch",
            Self::Telescope => "Telescope",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a URL or config tag names no known device type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown device type: {0}")]
pub struct UnknownDeviceType(pub String);

impl FromStr for DeviceType {
    type Err = UnknownDeviceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownDeviceType(s.to_string()))
    }
}

/// `(device_type, device_number)` pair addressing one simulated instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceIdentity {
    pub device_type: DeviceType,
    pub device_number: u32,
}

impl DeviceIdentity {
    #[must_use]
    pub fn new(device_type: DeviceType, device_number: u32) -> Self {
        Self {
            device_type,
            device_number,
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device_type, self.device_number)
    }
}
