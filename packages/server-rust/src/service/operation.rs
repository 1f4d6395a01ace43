//! Typed device operations and the errors they produce.

use std::any::Any;
use std::sync::Arc;

use alpaca_sim_core::{AlpacaError, PixelGrid, Value};

use super::domain::actions::InstantAction;
use super::domain::properties::WritableProperty;
use super::domain::rotator::RotatorMove;
use super::domain::switch::{SwitchChange, SwitchQuery};

/// A fully decoded request against one device member.
///
/// Produced by [`classify`](super::classify::classify) before the device
/// guard runs, so a malformed request never reaches a handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    // ----- Members shared by every device type -----
    GetConnected,
    SetConnected(bool),
    Connect,
    Disconnect,
    GetConnecting,
    GetDescription,
    GetDriverInfo,
    GetDriverVersion,
    GetInterfaceVersion,
    GetName,
    GetSupportedActions,
    Action { action: String, parameters: String },
    CommandBlind { command: String },
    CommandBool { command: String },
    CommandString { command: String },
    GetDeviceState,

    // ----- Camera exposure -----
    StartExposure { duration: f64, light: bool },
    AbortExposure,
    StopExposure,
    GetImageArray,

    // ----- Motion -----
    MoveFocuser { position: i64 },
    MoveRotator { mode: RotatorMove, position: f64 },
    SyncRotator { position: f64 },
    SlewToCoordinates {
        right_ascension: f64,
        declination: f64,
        asynchronous: bool,
    },
    SyncToCoordinates { right_ascension: f64, declination: f64 },
    SlewToTarget { asynchronous: bool },
    SyncToTarget,
    SlewToAltAz {
        azimuth: f64,
        altitude: f64,
        asynchronous: bool,
    },
    SyncToAltAz { azimuth: f64, altitude: f64 },
    MoveAxis { axis: i64, rate: f64 },
    SlewToAzimuth { azimuth: f64 },
    SlewToAltitude { altitude: f64 },
    SyncToAzimuth { azimuth: f64 },
    PulseGuide { direction: i64, duration_ms: i64 },
    SetPark,
    Park,
    Instant(&'static InstantAction),

    // ----- Switch bank -----
    GetMaxSwitch,
    GetSwitch { id: i64, query: SwitchQuery },
    SetSwitch { id: i64, change: SwitchChange },

    // ----- Table-driven property access -----
    GetProperty { member: String },
    SetProperty {
        property: &'static WritableProperty,
        value: Value,
    },
    Unsupported { member: String },
}

impl Operation {
    /// Short name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::GetConnected | Self::SetConnected(_) => "connected",
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::GetConnecting => "connecting",
            Self::GetDescription => "description",
            Self::GetDriverInfo => "driverinfo",
            Self::GetDriverVersion => "driverversion",
            Self::GetInterfaceVersion => "interfaceversion",
            Self::GetName => "name",
            Self::GetSupportedActions => "supportedactions",
            Self::Action { .. } => "action",
            Self::CommandBlind { .. } => "commandblind",
            Self::CommandBool { .. } => "commandbool",
            Self::CommandString { .. } => "commandstring",
            Self::GetDeviceState => "devicestate",
            Self::StartExposure { .. } => "startexposure",
            Self::AbortExposure => "abortexposure",
            Self::StopExposure => "stopexposure",
            Self::GetImageArray => "imagearray",
            Self::MoveFocuser { .. } => "move",
            Self::MoveRotator { mode, .. } => mode.member(),
            Self::SyncRotator { .. } => "sync",
            Self::SlewToCoordinates {
                asynchronous: false,
                ..
            } => "slewtocoordinates",
            Self::SlewToCoordinates { .. } => "slewtocoordinatesasync",
            Self::SyncToCoordinates { .. } => "synctocoordinates",
            Self::SlewToTarget {
                asynchronous: false,
            } => "slewtotarget",
            Self::SlewToTarget { .. } => "slewtotargetasync",
            Self::SyncToTarget => "synctotarget",
            Self::SlewToAltAz {
                asynchronous: false,
                ..
            } => "slewtoaltaz",
            Self::SlewToAltAz { .. } => "slewtoaltazasync",
            Self::SyncToAltAz { .. } => "synctoaltaz",
            Self::MoveAxis { .. } => "moveaxis",
            Self::SlewToAzimuth { .. } => "slewtoazimuth",
            Self::SlewToAltitude { .. } => "slewtoaltitude",
            Self::SyncToAzimuth { .. } => "synctoazimuth",
            Self::PulseGuide { .. } => "pulseguide",
            Self::SetPark => "setpark",
            Self::Park => "park",
            Self::Instant(action) => action.member,
            Self::GetMaxSwitch => "maxswitch",
            Self::GetSwitch { query, .. } => query.member(),
            Self::SetSwitch { change, .. } => change.member(),
            Self::SetProperty { property, .. } => property.member,
            Self::GetProperty { member } | Self::Unsupported { member } => member,
        }
    }
}

/// Successful result of a device operation.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResponse {
    /// A property value or method return value.
    Value(Value),
    /// A method with no return value.
    Empty,
    /// A camera image, sent as an `ImageBytes` frame.
    Image(Arc<PixelGrid>),
}

/// Errors returned by operation handlers.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    /// A taxonomy error, reported in-band with HTTP 200.
    #[error(transparent)]
    Device(#[from] AlpacaError),
    /// An unexpected failure, reported with HTTP 500.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Best-effort text of a caught panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
}

/// Malformed request shape, rejected with HTTP 400 before any handler runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),
    #[error("Invalid value for parameter {name}: {value}")]
    InvalidParameter { name: String, value: String },
    #[error("Invalid device number: {0}")]
    InvalidDeviceNumber(String),
    #[error("Malformed request body: {0}")]
    MalformedBody(String),
}

impl RequestError {
    #[must_use]
    pub fn invalid(name: &str, value: &str) -> Self {
        Self::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}
