//! Request classification: converts `(type, member, verb, params)` into a typed
//! [`Operation`].
//!
//! Classification only checks request *shape*: required arguments present and
//! of the right type. It runs before the device guard, so a malformed request
//! is rejected with HTTP 400 whether or not the device exists. Domain
//! validation (ranges, capabilities, state) happens later in the handlers.

use alpaca_sim_core::{DeviceType, Value};
use http::Method;

use super::domain::actions::instant;
use super::domain::properties::{writable, ArgKind, WritableProperty};
use super::domain::rotator::RotatorMove;
use super::domain::switch::{SwitchChange, SwitchQuery};
use super::operation::{Operation, RequestError};
use super::params::Params;

/// Classifies one device request.
///
/// `member` must already be lowercased. `device_type` is `None` when the URL
/// names an unknown type; such requests still classify so that the guard can
/// answer `NotFound`.
///
/// # Errors
///
/// Returns [`RequestError`] when a required argument is missing or cannot be
/// parsed.
pub fn classify(
    device_type: Option<DeviceType>,
    member: &str,
    method: &Method,
    params: &Params,
) -> Result<Operation, RequestError> {
    let is_put = *method == Method::PUT;

    if let Some(op) = classify_common(member, is_put, params)? {
        return Ok(op);
    }

    if let Some(device_type) = device_type {
        if let Some(op) = classify_device(device_type, member, is_put, params)? {
            return Ok(op);
        }
    }

    Ok(if is_put {
        Operation::Unsupported {
            member: member.to_string(),
        }
    } else {
        Operation::GetProperty {
            member: member.to_string(),
        }
    })
}

fn classify_common(
    member: &str,
    is_put: bool,
    params: &Params,
) -> Result<Option<Operation>, RequestError> {
    let op = match (is_put, member) {
        (false, "connected") => Operation::GetConnected,
        (true, "connected") => Operation::SetConnected(params.required_bool("Connected")?),
        (true, "connect") => Operation::Connect,
        (true, "disconnect") => Operation::Disconnect,
        (false, "connecting") => Operation::GetConnecting,
        (false, "description") => Operation::GetDescription,
        (false, "driverinfo") => Operation::GetDriverInfo,
        (false, "driverversion") => Operation::GetDriverVersion,
        (false, "interfaceversion") => Operation::GetInterfaceVersion,
        (false, "name") => Operation::GetName,
        (false, "supportedactions") => Operation::GetSupportedActions,
        (false, "devicestate") => Operation::GetDeviceState,
        (true, "action") => Operation::Action {
            action: params.string_or_empty("Action"),
            parameters: params.string_or_empty("Parameters"),
        },
        (true, "commandblind") => Operation::CommandBlind {
            command: params.string_or_empty("Command"),
        },
        (true, "commandbool") => Operation::CommandBool {
            command: params.string_or_empty("Command"),
        },
        (true, "commandstring") => Operation::CommandString {
            command: params.string_or_empty("Command"),
        },
        _ => return Ok(None),
    };
    Ok(Some(op))
}

fn classify_device(
    device_type: DeviceType,
    member: &str,
    is_put: bool,
    params: &Params,
) -> Result<Option<Operation>, RequestError> {
    let op = match (device_type, is_put, member) {
        (DeviceType::Camera, true, "startexposure") => Operation::StartExposure {
            duration: params.required_f64("Duration")?,
            light: params.required_bool("Light")?,
        },
        (DeviceType::Camera, true, "abortexposure") => Operation::AbortExposure,
        (DeviceType::Camera, true, "stopexposure") => Operation::StopExposure,
        (DeviceType::Camera, false, "imagearray") => Operation::GetImageArray,
        (DeviceType::Focuser, true, "move") => Operation::MoveFocuser {
            position: params.required_i64("Position")?,
        },
        (DeviceType::Telescope, true, "slewtocoordinates" | "slewtocoordinatesasync") => {
            Operation::SlewToCoordinates {
                right_ascension: params.required_f64("RightAscension")?,
                declination: params.required_f64("Declination")?,
                asynchronous: member.ends_with("async"),
            }
        }
        (DeviceType::Telescope, true, "synctocoordinates") => Operation::SyncToCoordinates {
            right_ascension: params.required_f64("RightAscension")?,
            declination: params.required_f64("Declination")?,
        },
        (DeviceType::Telescope, true, "slewtotarget" | "slewtotargetasync") => {
            Operation::SlewToTarget {
                asynchronous: member.ends_with("async"),
            }
        }
        (DeviceType::Telescope, true, "synctotarget") => Operation::SyncToTarget,
        (DeviceType::Telescope, true, "slewtoaltaz" | "slewtoaltazasync") => {
            Operation::SlewToAltAz {
                azimuth: params.required_f64("Azimuth")?,
                altitude: params.required_f64("Altitude")?,
                asynchronous: member.ends_with("async"),
            }
        }
        (DeviceType::Telescope, true, "synctoaltaz") => Operation::SyncToAltAz {
            azimuth: params.required_f64("Azimuth")?,
            altitude: params.required_f64("Altitude")?,
        },
        (DeviceType::Telescope, true, "moveaxis") => Operation::MoveAxis {
            axis: params.required_i64("Axis")?,
            rate: params.required_f64("Rate")?,
        },
        (DeviceType::Telescope | DeviceType::Camera, true, "pulseguide") => {
            Operation::PulseGuide {
                direction: params.required_i64("Direction")?,
                duration_ms: params.required_i64("Duration")?,
            }
        }
        (DeviceType::Telescope | DeviceType::Dome, true, "setpark") => Operation::SetPark,
        (DeviceType::Telescope | DeviceType::Dome, true, "park") => Operation::Park,
        (DeviceType::Dome, true, "slewtoazimuth") => Operation::SlewToAzimuth {
            azimuth: params.required_f64("Azimuth")?,
        },
        (DeviceType::Dome, true, "slewtoaltitude") => Operation::SlewToAltitude {
            altitude: params.required_f64("Altitude")?,
        },
        (DeviceType::Dome, true, "synctoazimuth") => Operation::SyncToAzimuth {
            azimuth: params.required_f64("Azimuth")?,
        },
        (DeviceType::Rotator, true, "move" | "moveabsolute" | "movemechanical") => {
            Operation::MoveRotator {
                mode: match member {
                    "move" => RotatorMove::Relative,
                    "moveabsolute" => RotatorMove::Absolute,
                    _ => RotatorMove::Mechanical,
                },
                position: params.required_f64("Position")?,
            }
        }
        (DeviceType::Rotator, true, "sync") => Operation::SyncRotator {
            position: params.required_f64("Position")?,
        },
        (DeviceType::Switch, false, "maxswitch") => Operation::GetMaxSwitch,
        (DeviceType::Switch, false, _) => match SwitchQuery::from_member(member) {
            Some(query) => Operation::GetSwitch {
                id: params.required_i64("Id")?,
                query,
            },
            None => return Ok(None),
        },
        (DeviceType::Switch, true, "setswitch" | "setasync") => Operation::SetSwitch {
            id: params.required_i64("Id")?,
            change: SwitchChange::State {
                state: params.required_bool("State")?,
                asynchronous: member == "setasync",
            },
        },
        (DeviceType::Switch, true, "setswitchvalue" | "setasyncvalue") => Operation::SetSwitch {
            id: params.required_i64("Id")?,
            change: SwitchChange::Value {
                value: params.required_f64("Value")?,
                asynchronous: member == "setasyncvalue",
            },
        },
        (DeviceType::Switch, true, "setswitchname") => Operation::SetSwitch {
            id: params.required_i64("Id")?,
            change: SwitchChange::Name(params.required_string("Name")?),
        },
        (_, true, _) => {
            if let Some(action) = instant(device_type, member) {
                Operation::Instant(action)
            } else if let Some(property) = writable(device_type, member) {
                Operation::SetProperty {
                    property,
                    value: parse_argument(property, params)?,
                }
            } else {
                return Ok(None);
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(op))
}

fn parse_argument(property: &WritableProperty, params: &Params) -> Result<Value, RequestError> {
    let name = property.argument;
    Ok(match property.kind {
        ArgKind::Bool => params.required_bool(name)?.into(),
        ArgKind::Int => params.required_i64(name)?.into(),
        ArgKind::Float => params.required_f64(name)?.into(),
        ArgKind::Text => params.required_string(name)?.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(q: &str) -> Params {
        Params::from_query(Some(q)).unwrap()
    }

    fn get(device_type: DeviceType, member: &str) -> Result<Operation, RequestError> {
        classify(Some(device_type), member, &Method::GET, &Params::default())
    }

    fn put(device_type: DeviceType, member: &str, body: &str) -> Result<Operation, RequestError> {
        classify(Some(device_type), member, &Method::PUT, &query(body))
    }

    #[test]
    fn common_members_classify_for_every_type() {
        for t in DeviceType::ALL {
            assert_eq!(get(t, "connected").unwrap(), Operation::GetConnected);
            assert_eq!(get(t, "name").unwrap(), Operation::GetName);
            assert_eq!(
                put(t, "connected", "Connected=True").unwrap(),
                Operation::SetConnected(true)
            );
        }
    }

    #[test]
    fn connected_requires_boolean() {
        assert_eq!(
            put(DeviceType::Dome, "connected", "").unwrap_err(),
            RequestError::MissingParameter("Connected".into())
        );
        assert!(matches!(
            put(DeviceType::Dome, "connected", "Connected=perhaps"),
            Err(RequestError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn start_exposure_parses_arguments() {
        assert_eq!(
            put(DeviceType::Camera, "startexposure", "Duration=2.5&Light=false").unwrap(),
            Operation::StartExposure {
                duration: 2.5,
                light: false
            }
        );
        assert_eq!(
            put(DeviceType::Camera, "startexposure", "Light=true").unwrap_err(),
            RequestError::MissingParameter("Duration".into())
        );
    }

    #[test]
    fn camera_members_only_apply_to_cameras() {
        assert_eq!(get(DeviceType::Camera, "imagearray").unwrap(), Operation::GetImageArray);
        assert_eq!(
            get(DeviceType::Focuser, "imagearray").unwrap(),
            Operation::GetProperty {
                member: "imagearray".into()
            }
        );
        assert_eq!(
            put(DeviceType::Dome, "abortexposure", "").unwrap(),
            Operation::Unsupported {
                member: "abortexposure".into()
            }
        );
    }

    #[test]
    fn slew_variants() {
        let op = put(
            DeviceType::Telescope,
            "slewtocoordinatesasync",
            "RightAscension=10&Declination=-20",
        )
        .unwrap();
        assert_eq!(
            op,
            Operation::SlewToCoordinates {
                right_ascension: 10.0,
                declination: -20.0,
                asynchronous: true
            }
        );
        assert!(put(DeviceType::Telescope, "synctocoordinates", "RightAscension=1").is_err());
    }

    #[test]
    fn focuser_move_requires_integer() {
        assert_eq!(
            put(DeviceType::Focuser, "move", "Position=100").unwrap(),
            Operation::MoveFocuser { position: 100 }
        );
        assert!(put(DeviceType::Focuser, "move", "Position=1.5").is_err());
    }

    #[test]
    fn writable_members_parse_by_kind() {
        let Operation::SetProperty { property, value } =
            put(DeviceType::Camera, "binx", "BinX=2").unwrap()
        else {
            panic!("expected SetProperty");
        };
        assert_eq!(property.member, "binx");
        assert_eq!(value, Value::Int(2));

        let Operation::SetProperty { value, .. } =
            put(DeviceType::Telescope, "utcdate", "UTCDate=2024-01-01T00:00:00Z").unwrap()
        else {
            panic!("expected SetProperty");
        };
        assert_eq!(value, Value::from("2024-01-01T00:00:00Z"));

        assert!(put(DeviceType::Camera, "binx", "BinX=two").is_err());
    }

    #[test]
    fn instant_actions_classify() {
        let op = put(DeviceType::Dome, "openshutter", "").unwrap();
        assert!(matches!(op, Operation::Instant(a) if a.member == "openshutter"));
    }

    #[test]
    fn unknown_members_fall_through() {
        assert_eq!(
            get(DeviceType::Switch, "switchcount").unwrap(),
            Operation::GetProperty {
                member: "switchcount".into()
            }
        );
        assert_eq!(
            put(DeviceType::Switch, "maxswitch", "").unwrap(),
            Operation::Unsupported {
                member: "maxswitch".into()
            }
        );
    }

    #[test]
    fn switch_members_require_id() {
        assert_eq!(get(DeviceType::Switch, "maxswitch").unwrap(), Operation::GetMaxSwitch);
        assert_eq!(
            get(DeviceType::Switch, "getswitchvalue").unwrap_err(),
            RequestError::MissingParameter("Id".into())
        );
        assert_eq!(
            classify(
                Some(DeviceType::Switch),
                "getswitchvalue",
                &Method::GET,
                &query("Id=2")
            )
            .unwrap(),
            Operation::GetSwitch {
                id: 2,
                query: SwitchQuery::Value
            }
        );
        assert_eq!(
            put(DeviceType::Switch, "setasync", "Id=1&State=on").unwrap(),
            Operation::SetSwitch {
                id: 1,
                change: SwitchChange::State {
                    state: true,
                    asynchronous: true
                }
            }
        );
        assert_eq!(
            put(DeviceType::Switch, "setswitchname", "Id=0&Name=Heater").unwrap(),
            Operation::SetSwitch {
                id: 0,
                change: SwitchChange::Name("Heater".into())
            }
        );
        assert!(put(DeviceType::Switch, "setswitchvalue", "Id=1&Value=high").is_err());
    }

    #[test]
    fn rotator_and_dome_positions() {
        assert_eq!(
            put(DeviceType::Rotator, "move", "Position=-15").unwrap(),
            Operation::MoveRotator {
                mode: RotatorMove::Relative,
                position: -15.0
            }
        );
        assert_eq!(
            put(DeviceType::Rotator, "movemechanical", "Position=90").unwrap(),
            Operation::MoveRotator {
                mode: RotatorMove::Mechanical,
                position: 90.0
            }
        );
        assert_eq!(
            put(DeviceType::Focuser, "move", "Position=90").unwrap(),
            Operation::MoveFocuser { position: 90 }
        );
        assert_eq!(
            put(DeviceType::Dome, "slewtoaltitude", "Altitude=45").unwrap(),
            Operation::SlewToAltitude { altitude: 45.0 }
        );
        assert_eq!(
            put(DeviceType::Dome, "synctoazimuth", "").unwrap_err(),
            RequestError::MissingParameter("Azimuth".into())
        );
        assert_eq!(put(DeviceType::Dome, "park", "").unwrap(), Operation::Park);
    }

    #[test]
    fn guiding_and_axis_motion() {
        for t in [DeviceType::Telescope, DeviceType::Camera] {
            assert_eq!(
                put(t, "pulseguide", "Direction=2&Duration=750").unwrap(),
                Operation::PulseGuide {
                    direction: 2,
                    duration_ms: 750
                }
            );
        }
        assert!(matches!(
            put(DeviceType::Focuser, "pulseguide", "Direction=2&Duration=750").unwrap(),
            Operation::Unsupported { .. }
        ));
        assert_eq!(
            put(DeviceType::Telescope, "moveaxis", "Axis=1&Rate=-0.5").unwrap(),
            Operation::MoveAxis {
                axis: 1,
                rate: -0.5
            }
        );
        assert_eq!(
            put(DeviceType::Telescope, "slewtoaltazasync", "Azimuth=10&Altitude=20").unwrap(),
            Operation::SlewToAltAz {
                azimuth: 10.0,
                altitude: 20.0,
                asynchronous: true
            }
        );
        assert_eq!(
            put(DeviceType::Telescope, "slewtotarget", "").unwrap(),
            Operation::SlewToTarget {
                asynchronous: false
            }
        );
    }

    #[test]
    fn unknown_type_still_classifies() {
        let op = classify(None, "connected", &Method::GET, &Params::default()).unwrap();
        assert_eq!(op, Operation::GetConnected);
        let op = classify(None, "startexposure", &Method::PUT, &Params::default()).unwrap();
        assert!(matches!(op, Operation::Unsupported { .. }));
    }
}
