//! Telescope slews, syncs, axis motion and parking. Slews land on target
//! immediately.

use alpaca_sim_core::enums::TelescopeAxis;
use alpaca_sim_core::{property_map, AlpacaError, PropertyMap, PropertyMapExt, Value};
use tracing::{debug, info};

use super::DeviceContext;
use crate::service::operation::OperationResponse;

fn validate_coordinates(right_ascension: f64, declination: f64) -> Result<(), AlpacaError> {
    if !(0.0..24.0).contains(&right_ascension) {
        return Err(AlpacaError::invalid_value(
            "Right ascension must be between 0 and 24 hours",
        ));
    }
    if !(-90.0..=90.0).contains(&declination) {
        return Err(AlpacaError::invalid_value(
            "Declination must be between -90 and +90 degrees",
        ));
    }
    Ok(())
}

fn validate_horizontal(azimuth: f64, altitude: f64) -> Result<(), AlpacaError> {
    if !(0.0..=90.0).contains(&altitude) {
        return Err(AlpacaError::invalid_value(
            "Altitude must be between 0 and 90 degrees",
        ));
    }
    if !(0.0..360.0).contains(&azimuth) {
        return Err(AlpacaError::invalid_value(
            "Azimuth must be between 0 and 360 degrees",
        ));
    }
    Ok(())
}

/// The stored target, validated.
fn target(state: &PropertyMap) -> Result<(f64, f64), AlpacaError> {
    let coordinate = |key: &str| state.get(key).and_then(Value::as_f64);
    let (Some(right_ascension), Some(declination)) = (
        coordinate("targetrightascension"),
        coordinate("targetdeclination"),
    ) else {
        return Err(AlpacaError::invalid_value("Target coordinates not set"));
    };
    validate_coordinates(right_ascension, declination)?;
    Ok((right_ascension, declination))
}

fn slew_patch(right_ascension: f64, declination: f64) -> PropertyMap {
    property_map([
        ("rightascension", right_ascension.into()),
        ("declination", declination.into()),
        ("targetrightascension", right_ascension.into()),
        ("targetdeclination", declination.into()),
        ("slewing", false.into()),
        ("atpark", false.into()),
    ])
}

/// # Errors
///
/// `InvalidValue` for coordinates outside RA `[0, 24)` or Dec `[-90, 90]`.
pub fn slew(
    ctx: &DeviceContext<'_>,
    right_ascension: f64,
    declination: f64,
) -> Result<OperationResponse, AlpacaError> {
    validate_coordinates(right_ascension, declination)?;

    ctx.store.update(ctx.id, slew_patch(right_ascension, declination));
    info!(device = %ctx.id, right_ascension, declination, "telescope slewed");
    Ok(OperationResponse::Empty)
}

/// # Errors
///
/// `InvalidValue` for coordinates outside RA `[0, 24)` or Dec `[-90, 90]`.
pub fn sync(
    ctx: &DeviceContext<'_>,
    right_ascension: f64,
    declination: f64,
) -> Result<OperationResponse, AlpacaError> {
    validate_coordinates(right_ascension, declination)?;

    ctx.store.update(
        ctx.id,
        property_map([
            ("rightascension", right_ascension.into()),
            ("declination", declination.into()),
        ]),
    );
    Ok(OperationResponse::Empty)
}

/// Slews to the stored target coordinates.
///
/// # Errors
///
/// `NotImplemented` without `canslew` (`canslewasync` for the async form);
/// `InvalidValue` when no valid target is stored.
pub fn slew_to_target(
    ctx: &DeviceContext<'_>,
    asynchronous: bool,
) -> Result<OperationResponse, AlpacaError> {
    if asynchronous {
        ctx.require("canslewasync", "slewtotargetasync")?;
    } else {
        ctx.require("canslew", "slewtotarget")?;
    }
    let (right_ascension, declination) =
        ctx.store.update_with(ctx.id, |state| match target(state) {
            Ok((ra, dec)) => (slew_patch(ra, dec), Ok((ra, dec))),
            Err(err) => (PropertyMap::new(), Err(err)),
        })?;
    info!(device = %ctx.id, right_ascension, declination, "telescope slewed to target");
    Ok(OperationResponse::Empty)
}

/// # Errors
///
/// `NotImplemented` without `cansync`; `InvalidValue` when no valid target
/// is stored.
pub fn sync_to_target(ctx: &DeviceContext<'_>) -> Result<OperationResponse, AlpacaError> {
    ctx.require("cansync", "synctotarget")?;
    ctx.store.update_with(ctx.id, |state| match target(state) {
        Ok((ra, dec)) => {
            let patch =
                property_map([("rightascension", ra.into()), ("declination", dec.into())]);
            (patch, Ok(()))
        }
        Err(err) => (PropertyMap::new(), Err(err)),
    })?;
    Ok(OperationResponse::Empty)
}

/// # Errors
///
/// `NotImplemented` without `canslewaltaz` (`canslewaltazasync` for the
/// async form); `InvalidValue` for altitude outside `[0, 90]` or azimuth
/// outside `[0, 360)`.
pub fn slew_to_alt_az(
    ctx: &DeviceContext<'_>,
    azimuth: f64,
    altitude: f64,
    asynchronous: bool,
) -> Result<OperationResponse, AlpacaError> {
    if asynchronous {
        ctx.require("canslewaltazasync", "slewtoaltazasync")?;
    } else {
        ctx.require("canslewaltaz", "slewtoaltaz")?;
    }
    validate_horizontal(azimuth, altitude)?;
    ctx.store.update(
        ctx.id,
        property_map([
            ("azimuth", azimuth.into()),
            ("altitude", altitude.into()),
            ("slewing", false.into()),
            ("atpark", false.into()),
        ]),
    );
    info!(device = %ctx.id, azimuth, altitude, "telescope slewed to alt/az");
    Ok(OperationResponse::Empty)
}

/// # Errors
///
/// `NotImplemented` without `cansyncaltaz`; `InvalidValue` as for
/// [`slew_to_alt_az`].
pub fn sync_to_alt_az(
    ctx: &DeviceContext<'_>,
    azimuth: f64,
    altitude: f64,
) -> Result<OperationResponse, AlpacaError> {
    ctx.require("cansyncaltaz", "synctoaltaz")?;
    validate_horizontal(azimuth, altitude)?;
    ctx.store.update(
        ctx.id,
        property_map([("azimuth", azimuth.into()), ("altitude", altitude.into())]),
    );
    Ok(OperationResponse::Empty)
}

/// Sets the rate of one axis. The mount reports slewing while any axis moves.
///
/// # Errors
///
/// `InvalidValue` for an unknown axis or a non-finite rate.
pub fn move_axis(
    ctx: &DeviceContext<'_>,
    axis: i64,
    rate: f64,
) -> Result<OperationResponse, AlpacaError> {
    let axis = TelescopeAxis::from_value(&Value::Int(axis))
        .ok_or_else(|| AlpacaError::invalid_value(format!("Invalid axis: {axis}")))?;
    if !rate.is_finite() {
        return Err(AlpacaError::invalid_value(format!("Invalid axis rate: {rate}")));
    }

    let key = axis_rate_key(axis);
    ctx.store.update_with(ctx.id, |state| {
        let moving = rate != 0.0
            || [TelescopeAxis::Primary, TelescopeAxis::Secondary, TelescopeAxis::Tertiary]
                .into_iter()
                .filter(|other| *other != axis)
                .any(|other| state.f64_or(&axis_rate_key(other), 0.0) != 0.0);
        let patch = property_map([(key.as_str(), rate.into()), ("slewing", moving.into())]);
        (patch, ())
    });
    debug!(device = %ctx.id, ?axis, rate, "axis rate set");
    Ok(OperationResponse::Empty)
}

fn axis_rate_key(axis: TelescopeAxis) -> String {
    format!("axis{}rate", i32::from(axis))
}

/// Records the current coordinates as the park position.
///
/// # Errors
///
/// `NotImplemented` without `cansetpark`.
pub fn set_park(ctx: &DeviceContext<'_>) -> Result<OperationResponse, AlpacaError> {
    ctx.require("cansetpark", "setpark")?;
    ctx.store.update_with(ctx.id, |state| {
        let patch = property_map([
            ("parkrightascension", state.f64_or("rightascension", 0.0).into()),
            ("parkdeclination", state.f64_or("declination", 0.0).into()),
        ]);
        (patch, ())
    });
    info!(device = %ctx.id, "telescope park position set");
    Ok(OperationResponse::Empty)
}

/// Moves to the park position and stops tracking.
///
/// # Errors
///
/// `NotImplemented` without `canpark`.
pub fn park(ctx: &DeviceContext<'_>) -> Result<OperationResponse, AlpacaError> {
    ctx.require("canpark", "park")?;
    ctx.store.update_with(ctx.id, |state| {
        let right_ascension = ctx.setting(state, "parkrightascension", 0.0).rem_euclid(24.0);
        let declination = ctx.setting(state, "parkdeclination", 0.0).clamp(-90.0, 90.0);
        let patch = property_map([
            ("rightascension", right_ascension.into()),
            ("declination", declination.into()),
            ("atpark", true.into()),
            ("athome", false.into()),
            ("slewing", false.into()),
            ("tracking", false.into()),
        ]);
        (patch, ())
    });
    info!(device = %ctx.id, "telescope parked");
    Ok(OperationResponse::Empty)
}
