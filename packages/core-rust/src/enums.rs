//! Closed ASCOM enumerations with their fixed wire codes.
//!
//! Each enum serializes as its integer code (`serde_repr`) and converts to and
//! from `i32` (`num_enum`), so values read back from a property bag are
//! validated instead of being passed around as loose integers.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::types::Value;

/// Generates the `Value` conversions shared by every wire enum.
macro_rules! wire_enum {
    ($($name:ident),+ $(,)?) => {
        $(
            impl From<$name> for Value {
                fn from(v: $name) -> Self {
                    Value::Int(i64::from(i32::from(v)))
                }
            }

            impl $name {
                /// Decodes the enum from a stored property value.
                #[must_use]
                pub fn from_value(value: &Value) -> Option<Self> {
                    value
                        .as_i64()
                        .and_then(|raw| i32::try_from(raw).ok())
                        .and_then(|raw| Self::try_from(raw).ok())
                }
            }
        )+
    };
}

/// Camera state machine position, as reported by `camerastate`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize_repr,
    Deserialize_repr,
    TryFromPrimitive,
    IntoPrimitive,
)]
#[repr(i32)]
pub enum CameraState {
    Idle = 0,
    Waiting = 1,
    Exposing = 2,
    Reading = 3,
    Download = 4,
    Error = 5,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize_repr,
    Deserialize_repr,
    TryFromPrimitive,
    IntoPrimitive,
)]
#[repr(i32)]
pub enum SensorType {
    Monochrome = 0,
    Color = 1,
    Rggb = 2,
    Cmyg = 3,
    Cmyg2 = 4,
    Lrgb = 5,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize_repr,
    Deserialize_repr,
    TryFromPrimitive,
    IntoPrimitive,
)]
#[repr(i32)]
pub enum PierSide {
    Unknown = -1,
    East = 0,
    West = 1,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize_repr,
    Deserialize_repr,
    TryFromPrimitive,
    IntoPrimitive,
)]
#[repr(i32)]
pub enum ShutterState {
    Open = 0,
    Closed = 1,
    Opening = 2,
    Closing = 3,
    Error = 4,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize_repr,
    Deserialize_repr,
    TryFromPrimitive,
    IntoPrimitive,
)]
#[repr(i32)]
pub enum CoverStatus {
    NotPresent = 0,
    Closed = 1,
    Moving = 2,
    Open = 3,
    Unknown = 4,
    Error = 5,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize_repr,
    Deserialize_repr,
    TryFromPrimitive,
    IntoPrimitive,
)]
#[repr(i32)]
pub enum CalibratorStatus {
    NotPresent = 0,
    Off = 1,
    NotReady = 2,
    Ready = 3,
    Unknown = 4,
    Error = 5,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize_repr,
    Deserialize_repr,
    TryFromPrimitive,
    IntoPrimitive,
)]
#[repr(i32)]
pub enum AlignmentMode {
    AltAz = 0,
    Polar = 1,
    GermanPolar = 2,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize_repr,
    Deserialize_repr,
    TryFromPrimitive,
    IntoPrimitive,
)]
#[repr(i32)]
pub enum EquatorialCoordinateType {
    Other = 0,
    Topocentric = 1,
    J2000 = 2,
    J2050 = 3,
    B1950 = 4,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize_repr,
    Deserialize_repr,
    TryFromPrimitive,
    IntoPrimitive,
)]
#[repr(i32)]
pub enum DriveRate {
    Sidereal = 0,
    Lunar = 1,
    Solar = 2,
    King = 3,
}

/// Direction argument of `pulseguide`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize_repr,
    Deserialize_repr,
    TryFromPrimitive,
    IntoPrimitive,
)]
#[repr(i32)]
pub enum GuideDirection {
    North = 0,
    South = 1,
    East = 2,
    West = 3,
}

/// Axis argument of the telescope `moveaxis` member.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize_repr,
    Deserialize_repr,
    TryFromPrimitive,
    IntoPrimitive,
)]
#[repr(i32)]
pub enum TelescopeAxis {
    Primary = 0,
    Secondary = 1,
    Tertiary = 2,
}

wire_enum!(
    CameraState,
    SensorType,
    PierSide,
    ShutterState,
    CoverStatus,
    CalibratorStatus,
    AlignmentMode,
    EquatorialCoordinateType,
    DriveRate,
    GuideDirection,
    TelescopeAxis,
);
