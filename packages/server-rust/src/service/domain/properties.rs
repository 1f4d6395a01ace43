//! Table-driven property access for every device type.
//!
//! Reads fall through device state, then configuration, then built-in
//! configuration defaults. Writes are only accepted for members listed in
//! [`WRITABLE`], which fixes each member's argument name, kind, bounds and
//! optional capability flag.

use std::fmt::Write as _;

use alpaca_sim_core::{AlpacaError, DeviceType, PropertyMap, PropertyMapExt, Value};

use super::DeviceContext;
use crate::service::operation::OperationResponse;

/// Argument kind of a writable member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Bool,
    Int,
    Float,
    Text,
}

/// A constant property value usable in static tables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fixed {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl From<Fixed> for Value {
    fn from(f: Fixed) -> Self {
        match f {
            Fixed::Bool(b) => Value::Bool(b),
            Fixed::Int(i) => Value::Int(i),
            Fixed::Float(x) => Value::Float(x),
        }
    }
}

/// Builds a patch from a static `(key, value)` table.
#[must_use]
pub fn fixed_patch(entries: &[(&str, Fixed)]) -> PropertyMap {
    entries
        .iter()
        .map(|(k, v)| ((*k).to_string(), Value::from(*v)))
        .collect()
}

/// One end of an accepted range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    Fixed(f64),
    /// A configuration value, such as `maxbinx`.
    Config(&'static str),
    /// A configuration value minus a state value, such as `cameraxsize - startx`.
    ConfigMinusState(&'static str, &'static str),
    /// Last valid index into a configured list, such as `readoutmodes`.
    LastIndex(&'static str),
}

impl Bound {
    #[allow(clippy::cast_precision_loss)]
    fn resolve(self, state: &PropertyMap, config: &PropertyMap) -> Option<f64> {
        match self {
            Self::Fixed(v) => Some(v),
            Self::Config(key) => config.get(key).and_then(Value::as_f64),
            Self::ConfigMinusState(key, state_key) => {
                let total = config.get(key).and_then(Value::as_f64)?;
                Some(total - state.f64_or(state_key, 0.0))
            }
            Self::LastIndex(key) => match config.get(key) {
                Some(Value::Array(items)) => Some(items.len() as f64 - 1.0),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limit {
    pub bound: Bound,
    pub inclusive: bool,
}

/// Static description of a writable member.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WritableProperty {
    pub device_type: DeviceType,
    /// URL member name.
    pub member: &'static str,
    /// Request argument carrying the new value.
    pub argument: &'static str,
    pub kind: ArgKind,
    /// State key written; usually the member name.
    pub key: &'static str,
    pub min: Option<Limit>,
    pub max: Option<Limit>,
    /// Configuration flag that must not be false.
    pub capability: Option<&'static str>,
    /// Second state key written with the same value.
    pub mirror: Option<&'static str>,
    /// Constant keys merged alongside the value.
    pub also: &'static [(&'static str, Fixed)],
}

impl WritableProperty {
    const fn new(
        device_type: DeviceType,
        member: &'static str,
        argument: &'static str,
        kind: ArgKind,
    ) -> Self {
        Self {
            device_type,
            member,
            argument,
            kind,
            key: member,
            min: None,
            max: None,
            capability: None,
            mirror: None,
            also: &[],
        }
    }

    const fn min(mut self, bound: Bound) -> Self {
        self.min = Some(Limit {
            bound,
            inclusive: true,
        });
        self
    }

    const fn above(mut self, bound: Bound) -> Self {
        self.min = Some(Limit {
            bound,
            inclusive: false,
        });
        self
    }

    const fn max(mut self, bound: Bound) -> Self {
        self.max = Some(Limit {
            bound,
            inclusive: true,
        });
        self
    }

    const fn below(mut self, bound: Bound) -> Self {
        self.max = Some(Limit {
            bound,
            inclusive: false,
        });
        self
    }

    const fn range(self, lo: f64, hi: f64) -> Self {
        self.min(Bound::Fixed(lo)).max(Bound::Fixed(hi))
    }

    const fn requires(mut self, capability: &'static str) -> Self {
        self.capability = Some(capability);
        self
    }

    const fn mirror(mut self, key: &'static str) -> Self {
        self.mirror = Some(key);
        self
    }

    const fn key(mut self, key: &'static str) -> Self {
        self.key = key;
        self
    }

    const fn also(mut self, also: &'static [(&'static str, Fixed)]) -> Self {
        self.also = also;
        self
    }

    /// Checks `value` against the capability flag and bounds and returns the patch to merge.
    ///
    /// # Errors
    ///
    /// `NotImplemented` when the capability flag is false, `InvalidValue` when
    /// the value is out of bounds.
    pub fn validate(
        &self,
        value: &Value,
        state: &PropertyMap,
        config: &PropertyMap,
    ) -> Result<PropertyMap, AlpacaError> {
        if let Some(flag) = self.capability {
            if !config.bool_or(flag, true) {
                return Err(AlpacaError::not_implemented(format!(
                    "{} does not support setting {}",
                    self.device_type.display_name(),
                    self.member
                )));
            }
        }

        if let Some(v) = value.as_f64() {
            let lo = self
                .min
                .and_then(|l| l.bound.resolve(state, config).map(|b| (b, l.inclusive)));
            let hi = self
                .max
                .and_then(|l| l.bound.resolve(state, config).map(|b| (b, l.inclusive)));

            let below_min = lo.is_some_and(|(b, incl)| if incl { v < b } else { v <= b });
            let above_max = hi.is_some_and(|(b, incl)| if incl { v > b } else { v >= b });
            if below_min || above_max {
                return Err(AlpacaError::invalid_value(range_message(
                    self.argument,
                    value,
                    lo,
                    hi,
                )));
            }
        }

        let mut patch = fixed_patch(self.also);
        patch.insert(self.key.to_string(), value.clone());
        if let Some(mirror) = self.mirror {
            patch.insert(mirror.to_string(), value.clone());
        }
        Ok(patch)
    }
}

fn range_message(
    argument: &str,
    value: &Value,
    lo: Option<(f64, bool)>,
    hi: Option<(f64, bool)>,
) -> String {
    let shown = serde_json::to_string(value).unwrap_or_default();
    let mut msg = format!("{argument} {shown} is out of range");
    match (lo, hi) {
        (Some((lo, _)), Some((hi, _))) => {
            let _ = write!(msg, " ({lo} to {hi})");
        }
        (Some((lo, true)), None) => {
            let _ = write!(msg, " (must be at least {lo})");
        }
        (Some((lo, false)), None) => {
            let _ = write!(msg, " (must be greater than {lo})");
        }
        (None, Some((hi, _))) => {
            let _ = write!(msg, " (must be at most {hi})");
        }
        (None, None) => {}
    }
    msg
}

use ArgKind::{Bool, Float, Int, Text};
use Bound::{Config, ConfigMinusState, LastIndex};
use DeviceType::{
    Camera, CoverCalibrator, Dome, FilterWheel, Focuser, ObservingConditions, Rotator,
    SafetyMonitor, Telescope,
};

/// Every member accepting a `PUT` through the generic property layer.
pub static WRITABLE: &[WritableProperty] = &[
    // Camera
    WritableProperty::new(Camera, "binx", "BinX", Int)
        .min(Bound::Fixed(1.0))
        .max(Config("maxbinx")),
    WritableProperty::new(Camera, "biny", "BinY", Int)
        .min(Bound::Fixed(1.0))
        .max(Config("maxbiny")),
    WritableProperty::new(Camera, "readoutmode", "ReadoutMode", Int)
        .min(Bound::Fixed(0.0))
        .max(LastIndex("readoutmodes")),
    WritableProperty::new(Camera, "setccdtemperature", "SetCCDTemperature", Float)
        .requires("cansetccdtemperature")
        .mirror("ccdtemperature"),
    WritableProperty::new(Camera, "cooleron", "CoolerOn", Bool).requires("cansetccdtemperature"),
    WritableProperty::new(Camera, "gain", "Gain", Int)
        .min(Config("gainmin"))
        .max(Config("gainmax")),
    WritableProperty::new(Camera, "offset", "Offset", Int)
        .min(Config("offsetmin"))
        .max(Config("offsetmax")),
    WritableProperty::new(Camera, "numx", "NumX", Int)
        .min(Bound::Fixed(1.0))
        .max(ConfigMinusState("cameraxsize", "startx")),
    WritableProperty::new(Camera, "numy", "NumY", Int)
        .min(Bound::Fixed(1.0))
        .max(ConfigMinusState("cameraysize", "starty")),
    WritableProperty::new(Camera, "startx", "StartX", Int)
        .min(Bound::Fixed(0.0))
        .max(ConfigMinusState("cameraxsize", "numx")),
    WritableProperty::new(Camera, "starty", "StartY", Int)
        .min(Bound::Fixed(0.0))
        .max(ConfigMinusState("cameraysize", "numy")),
    WritableProperty::new(Camera, "fastreadout", "FastReadout", Bool).requires("canfastreadout"),
    WritableProperty::new(Camera, "subexposureduration", "SubExposureDuration", Float)
        .above(Bound::Fixed(0.0)),
    // Telescope
    WritableProperty::new(Telescope, "declinationrate", "DeclinationRate", Float)
        .requires("cansetdeclinationrate"),
    WritableProperty::new(Telescope, "doesrefraction", "DoesRefraction", Bool),
    WritableProperty::new(Telescope, "guideratedeclination", "GuideRateDeclination", Float)
        .min(Bound::Fixed(0.0))
        .requires("cansetguiderates"),
    WritableProperty::new(Telescope, "guideraterightascension", "GuideRateRightAscension", Float)
        .min(Bound::Fixed(0.0))
        .requires("cansetguiderates"),
    WritableProperty::new(Telescope, "rightascensionrate", "RightAscensionRate", Float)
        .requires("cansetrightascensionrate"),
    WritableProperty::new(Telescope, "sideofpier", "SideOfPier", Int)
        .range(-1.0, 1.0)
        .requires("cansetpierside"),
    WritableProperty::new(Telescope, "siteelevation", "SiteElevation", Float)
        .range(-300.0, 10_000.0),
    WritableProperty::new(Telescope, "sitelatitude", "SiteLatitude", Float).range(-90.0, 90.0),
    WritableProperty::new(Telescope, "sitelongitude", "SiteLongitude", Float).range(-180.0, 180.0),
    WritableProperty::new(Telescope, "slewsettletime", "SlewSettleTime", Float)
        .min(Bound::Fixed(0.0)),
    WritableProperty::new(Telescope, "targetdeclination", "TargetDeclination", Float)
        .range(-90.0, 90.0),
    WritableProperty::new(Telescope, "targetrightascension", "TargetRightAscension", Float)
        .min(Bound::Fixed(0.0))
        .below(Bound::Fixed(24.0)),
    WritableProperty::new(Telescope, "tracking", "Tracking", Bool).requires("cansettracking"),
    WritableProperty::new(Telescope, "trackingrate", "TrackingRate", Int).range(0.0, 3.0),
    WritableProperty::new(Telescope, "utcdate", "UTCDate", Text),
    // Dome
    WritableProperty::new(Dome, "slaved", "Slaved", Bool).requires("canslave"),
    // Filter wheel
    WritableProperty::new(FilterWheel, "position", "Position", Int)
        .min(Bound::Fixed(0.0))
        .max(LastIndex("names")),
    // Focuser
    WritableProperty::new(Focuser, "tempcomp", "TempComp", Bool).requires("tempcompavailable"),
    // Rotator
    WritableProperty::new(Rotator, "reverse", "Reverse", Bool).requires("canreverse"),
    // Safety monitor
    WritableProperty::new(SafetyMonitor, "issafe", "IsSafe", Bool),
    // Cover calibrator
    WritableProperty::new(CoverCalibrator, "calibratoron", "Brightness", Int)
        .key("brightness")
        .min(Bound::Fixed(0.0))
        .max(Config("maxbrightness"))
        .also(&[("calibratorstate", Fixed::Int(3))]),
    // Observing conditions
    WritableProperty::new(ObservingConditions, "averageperiod", "AveragePeriod", Float)
        .min(Bound::Fixed(0.0)),
    WritableProperty::new(ObservingConditions, "cloudcover", "CloudCover", Float).range(0.0, 100.0),
    WritableProperty::new(ObservingConditions, "dewpoint", "DewPoint", Float).range(-50.0, 50.0),
    WritableProperty::new(ObservingConditions, "humidity", "Humidity", Float).range(0.0, 100.0),
    WritableProperty::new(ObservingConditions, "pressure", "Pressure", Float).range(800.0, 1200.0),
    WritableProperty::new(ObservingConditions, "rainrate", "RainRate", Float).range(0.0, 100.0),
    WritableProperty::new(ObservingConditions, "skybrightness", "SkyBrightness", Float)
        .min(Bound::Fixed(0.0)),
    WritableProperty::new(ObservingConditions, "skyquality", "SkyQuality", Float).range(15.0, 25.0),
    WritableProperty::new(ObservingConditions, "skytemperature", "SkyTemperature", Float),
    WritableProperty::new(ObservingConditions, "starfwhm", "StarFWHM", Float).range(0.5, 10.0),
    WritableProperty::new(ObservingConditions, "temperature", "Temperature", Float)
        .range(-50.0, 50.0),
    WritableProperty::new(ObservingConditions, "winddirection", "WindDirection", Float)
        .min(Bound::Fixed(0.0))
        .below(Bound::Fixed(360.0)),
    WritableProperty::new(ObservingConditions, "windgust", "WindGust", Float).range(0.0, 150.0),
    WritableProperty::new(ObservingConditions, "windspeed", "WindSpeed", Float).range(0.0, 150.0),
];

/// Looks up the writable-member entry for `member` on `device_type`.
#[must_use]
pub fn writable(device_type: DeviceType, member: &str) -> Option<&'static WritableProperty> {
    WRITABLE
        .iter()
        .find(|p| p.device_type == device_type && p.member == member)
}

/// Generic `GET`: state, then configuration, else `NotImplemented`.
///
/// # Errors
///
/// `NotImplemented` when neither state nor configuration defines `member`.
pub fn read(ctx: &DeviceContext<'_>, member: &str) -> Result<OperationResponse, AlpacaError> {
    let state = ctx.store.get(ctx.id);
    state
        .get(member)
        .or_else(|| ctx.config.get(member))
        .cloned()
        .map(OperationResponse::Value)
        .ok_or_else(|| {
            AlpacaError::not_implemented(format!(
                "Property {member} is not implemented for {}",
                ctx.id.device_type
            ))
        })
}

/// Generic `PUT` of a table member. Validation and merge happen atomically.
///
/// # Errors
///
/// See [`WritableProperty::validate`].
pub fn write(
    ctx: &DeviceContext<'_>,
    property: &WritableProperty,
    value: &Value,
) -> Result<OperationResponse, AlpacaError> {
    ctx.store.update_with(ctx.id, |state| {
        match property.validate(value, state, &ctx.config) {
            Ok(patch) => (patch, Ok(OperationResponse::Empty)),
            Err(err) => (PropertyMap::new(), Err(err)),
        }
    })
}
