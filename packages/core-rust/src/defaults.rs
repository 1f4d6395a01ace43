//! Built-in property defaults per device type.
//!
//! Two tables exist for every type:
//!
//! - [`typed_defaults`]: the mutable state a device starts with before its
//!   configuration is merged on top.
//! - [`config_defaults`]: read-only members (capabilities, limits, names) that
//!   are reported when the configuration does not set them.

use crate::enums::{
    AlignmentMode, CalibratorStatus, CameraState, CoverStatus, DriveRate,
    EquatorialCoordinateType, PierSide, SensorType, ShutterState,
};
use crate::types::{property_map as props, DeviceType, PropertyMap, Value};

fn names(items: &[&str]) -> Value {
    Value::Array(items.iter().map(|s| Value::from(*s)).collect())
}

/// Initial mutable state of a device type, before configuration overrides.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn typed_defaults(device_type: DeviceType) -> PropertyMap {
    let mut state = match device_type {
        DeviceType::Camera => props([
            ("camerastate", CameraState::Idle.into()),
            ("imageready", false.into()),
            ("imagedata", Value::Null),
            ("lastexposurestarttime", Value::Null),
            ("lastexposureduration", 0.0.into()),
            ("light", true.into()),
            ("percentcompleted", 0.into()),
            ("binx", 1.into()),
            ("biny", 1.into()),
            ("numx", 1024.into()),
            ("numy", 1024.into()),
            ("startx", 0.into()),
            ("starty", 0.into()),
            ("ccdtemperature", 20.0.into()),
            ("setccdtemperature", 20.0.into()),
            ("cooleron", false.into()),
            ("coolerpower", 0.0.into()),
            ("gain", 1.into()),
            ("offset", 100.into()),
            ("readoutmode", 0.into()),
            ("fastreadout", false.into()),
            ("ispulseguiding", false.into()),
            ("subexposureduration", 0.0.into()),
        ]),
        DeviceType::Telescope => props([
            ("rightascension", 0.0.into()),
            ("declination", 0.0.into()),
            ("altitude", 0.0.into()),
            ("azimuth", 0.0.into()),
            ("targetrightascension", 0.0.into()),
            ("targetdeclination", 0.0.into()),
            ("tracking", false.into()),
            ("slewing", false.into()),
            ("athome", false.into()),
            ("atpark", false.into()),
            ("sideofpier", PierSide::Unknown.into()),
            ("ispulseguiding", false.into()),
            ("sitelatitude", 0.0.into()),
            ("sitelongitude", 0.0.into()),
            ("siteelevation", 0.0.into()),
            ("rightascensionrate", 0.0.into()),
            ("declinationrate", 0.0.into()),
            ("trackingrate", DriveRate::Sidereal.into()),
            ("guideraterightascension", 0.0.into()),
            ("guideratedeclination", 0.0.into()),
            ("doesrefraction", true.into()),
            ("slewsettletime", 0.0.into()),
            ("utcdate", Value::Null),
        ]),
        DeviceType::Dome => props([
            ("altitude", 0.0.into()),
            ("azimuth", 0.0.into()),
            ("athome", false.into()),
            ("atpark", false.into()),
            ("slewing", false.into()),
            ("shutterstatus", ShutterState::Closed.into()),
            ("slaved", false.into()),
        ]),
        DeviceType::Focuser => props([
            ("position", 0.into()),
            ("ismoving", false.into()),
            ("tempcomp", false.into()),
            ("temperature", 20.0.into()),
        ]),
        DeviceType::FilterWheel => props([("position", 0.into())]),
        DeviceType::Rotator => props([
            ("position", 0.0.into()),
            ("mechanicalposition", 0.0.into()),
            ("targetposition", 0.0.into()),
            ("ismoving", false.into()),
            ("reverse", false.into()),
        ]),
        DeviceType::SafetyMonitor => props([("issafe", true.into())]),
        DeviceType::Switch => props([("switches", Value::Map(PropertyMap::new()))]),
        DeviceType::ObservingConditions => props([
            ("averageperiod", 0.0.into()),
            ("cloudcover", 0.0.into()),
            ("dewpoint", 0.0.into()),
            ("humidity", 0.0.into()),
            ("pressure", 0.0.into()),
            ("rainrate", 0.0.into()),
            ("skybrightness", 0.0.into()),
            ("skyquality", 0.0.into()),
            ("skytemperature", 0.0.into()),
            ("starfwhm", 0.0.into()),
            ("temperature", 0.0.into()),
            ("winddirection", 0.0.into()),
            ("windgust", 0.0.into()),
            ("windspeed", 0.0.into()),
        ]),
        DeviceType::CoverCalibrator => props([
            ("brightness", 0.into()),
            ("calibratorchanging", false.into()),
            ("calibratorstate", CalibratorStatus::NotPresent.into()),
            ("covermoving", false.into()),
            ("coverstate", CoverStatus::Closed.into()),
        ]),
    };
    state.insert("connected".into(), false.into());
    state
}

/// Read-only members reported when the device configuration omits them.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn config_defaults(device_type: DeviceType) -> PropertyMap {
    let mut defaults = match device_type {
        DeviceType::Camera => props([
            ("bayeroffsetx", 0.into()),
            ("bayeroffsety", 0.into()),
            ("cameraxsize", 1024.into()),
            ("cameraysize", 1024.into()),
            ("canabortexposure", true.into()),
            ("canasymmetricbin", true.into()),
            ("canfastreadout", true.into()),
            ("cangetcoolerpower", true.into()),
            ("canpulseguide", true.into()),
            ("cansetccdtemperature", true.into()),
            ("canstopexposure", true.into()),
            ("electronsperadu", 1.0.into()),
            ("exposuremax", 3600.0.into()),
            ("exposuremin", 0.001.into()),
            ("exposureresolution", 0.001.into()),
            ("fullwellcapacity", 100_000.0.into()),
            ("gainmax", 10.0.into()),
            ("gainmin", 0.1.into()),
            ("gains", names(&["Low", "Medium", "High"])),
            ("hasshutter", true.into()),
            ("maxadu", 65535.into()),
            ("maxbinx", 8.into()),
            ("maxbiny", 8.into()),
            ("offsetmax", 1000.0.into()),
            ("offsetmin", (-1000.0).into()),
            ("offsets", names(&["Low", "Medium", "High"])),
            ("pixelsizex", 5.4.into()),
            ("pixelsizey", 5.4.into()),
            ("readoutmodes", names(&["Fast", "Normal"])),
            ("sensorname", "Simulated CCD".into()),
            ("sensortype", SensorType::Monochrome.into()),
        ]),
        DeviceType::Telescope => props([
            ("alignmentmode", AlignmentMode::GermanPolar.into()),
            ("aperturediameter", 8.0.into()),
            ("canfindhome", true.into()),
            ("canpark", true.into()),
            ("canpulseguide", true.into()),
            ("cansetdeclinationrate", true.into()),
            ("cansetguiderates", true.into()),
            ("cansetpark", true.into()),
            ("cansetpierside", true.into()),
            ("cansetrightascensionrate", true.into()),
            ("cansettracking", true.into()),
            ("canslew", true.into()),
            ("canslewaltaz", true.into()),
            ("canslewaltazasync", true.into()),
            ("canslewasync", true.into()),
            ("cansync", true.into()),
            ("cansyncaltaz", true.into()),
            ("canunpark", true.into()),
            ("equatorialsystem", EquatorialCoordinateType::Topocentric.into()),
            ("focallength", 1000.0.into()),
            ("parkdeclination", 45.0.into()),
            ("parkrightascension", 12.0.into()),
            ("trackingrates", Value::from(vec![0, 1, 2, 3])),
        ]),
        DeviceType::Dome => props([
            ("canfindhome", true.into()),
            ("canpark", true.into()),
            ("cansetaltitude", true.into()),
            ("cansetazimuth", true.into()),
            ("cansetpark", true.into()),
            ("cansetshutter", true.into()),
            ("canslave", true.into()),
            ("cansyncazimuth", true.into()),
            ("parkazimuth", 0.0.into()),
        ]),
        DeviceType::Focuser => props([
            ("absolute", true.into()),
            ("maxincrement", 1000.into()),
            ("maxstep", 100_000.into()),
            ("stepsize", 1.0.into()),
            ("tempcompavailable", true.into()),
        ]),
        DeviceType::FilterWheel => props([
            ("focusoffsets", Value::Array(Vec::new())),
            ("names", Value::Array(Vec::new())),
        ]),
        DeviceType::Rotator => props([("canreverse", true.into()), ("stepsize", 0.1.into())]),
        DeviceType::CoverCalibrator => props([("maxbrightness", 255.into())]),
        DeviceType::Switch | DeviceType::SafetyMonitor | DeviceType::ObservingConditions => {
            PropertyMap::new()
        }
    };

    defaults.insert("driverinfo".into(), "ASCOM Alpaca Observatory Simulator Driver v1.0".into());
    defaults.insert("driverversion".into(), "1.0.0".into());
    defaults.insert("interfaceversion".into(), 3.into());
    defaults
}

/// State a device starts with: typed defaults with its configuration merged on top.
///
/// Configuration wins on every shared key. For cameras the sensor size keys
/// `cameraxsize`/`cameraysize` also seed the subframe size `numx`/`numy`.
#[must_use]
pub fn initial_state(device_type: DeviceType, config: &PropertyMap) -> PropertyMap {
    let mut state = typed_defaults(device_type);
    if device_type == DeviceType::Camera {
        if let Some(x) = config.get("cameraxsize") {
            state.insert("numx".into(), x.clone());
        }
        if let Some(y) = config.get("cameraysize") {
            state.insert("numy".into(), y.clone());
        }
    }
    state.extend(config.iter().map(|(k, v)| (k.clone(), v.clone())));
    state
}
