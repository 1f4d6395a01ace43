//! Dome positioning. Slews land immediately.

use alpaca_sim_core::{property_map, AlpacaError, PropertyMapExt};
use tracing::{debug, info};

use super::DeviceContext;
use crate::service::operation::OperationResponse;

fn validate_azimuth(azimuth: f64) -> Result<(), AlpacaError> {
    if (0.0..360.0).contains(&azimuth) {
        Ok(())
    } else {
        Err(AlpacaError::invalid_value(
            "Azimuth must be between 0 and 360 degrees",
        ))
    }
}

/// # Errors
///
/// `NotImplemented` without `cansetazimuth`; `InvalidValue` outside `[0, 360)`.
pub fn slew_to_azimuth(
    ctx: &DeviceContext<'_>,
    azimuth: f64,
) -> Result<OperationResponse, AlpacaError> {
    ctx.require("cansetazimuth", "slewtoazimuth")?;
    validate_azimuth(azimuth)?;
    ctx.store.update(
        ctx.id,
        property_map([
            ("azimuth", azimuth.into()),
            ("slewing", false.into()),
            ("atpark", false.into()),
        ]),
    );
    debug!(device = %ctx.id, azimuth, "dome slewed");
    Ok(OperationResponse::Empty)
}

/// # Errors
///
/// `NotImplemented` without `cansetaltitude`; `InvalidValue` outside `[0, 90]`.
pub fn slew_to_altitude(
    ctx: &DeviceContext<'_>,
    altitude: f64,
) -> Result<OperationResponse, AlpacaError> {
    ctx.require("cansetaltitude", "slewtoaltitude")?;
    if !(0.0..=90.0).contains(&altitude) {
        return Err(AlpacaError::invalid_value(
            "Altitude must be between 0 and 90 degrees",
        ));
    }
    ctx.store.update(
        ctx.id,
        property_map([
            ("altitude", altitude.into()),
            ("slewing", false.into()),
            ("atpark", false.into()),
        ]),
    );
    Ok(OperationResponse::Empty)
}

/// # Errors
///
/// `NotImplemented` without `cansyncazimuth`; `InvalidValue` outside `[0, 360)`.
pub fn sync_to_azimuth(
    ctx: &DeviceContext<'_>,
    azimuth: f64,
) -> Result<OperationResponse, AlpacaError> {
    ctx.require("cansyncazimuth", "synctoazimuth")?;
    validate_azimuth(azimuth)?;
    ctx.store
        .update(ctx.id, property_map([("azimuth", azimuth.into())]));
    Ok(OperationResponse::Empty)
}

/// Records the current azimuth as the park position.
///
/// # Errors
///
/// `NotImplemented` without `cansetpark`.
pub fn set_park(ctx: &DeviceContext<'_>) -> Result<OperationResponse, AlpacaError> {
    ctx.require("cansetpark", "setpark")?;
    let azimuth = ctx.store.update_with(ctx.id, |state| {
        let azimuth = state.f64_or("azimuth", 0.0);
        (property_map([("parkazimuth", azimuth.into())]), azimuth)
    });
    info!(device = %ctx.id, azimuth, "dome park position set");
    Ok(OperationResponse::Empty)
}

/// Turns to the park azimuth.
///
/// # Errors
///
/// `NotImplemented` without `canpark`.
pub fn park(ctx: &DeviceContext<'_>) -> Result<OperationResponse, AlpacaError> {
    ctx.require("canpark", "park")?;
    ctx.store.update_with(ctx.id, |state| {
        let azimuth = ctx.setting(state, "parkazimuth", 0.0).rem_euclid(360.0);
        let patch = property_map([
            ("azimuth", azimuth.into()),
            ("atpark", true.into()),
            ("athome", false.into()),
            ("slewing", false.into()),
        ]);
        (patch, ())
    });
    Ok(OperationResponse::Empty)
}

#[cfg(test)]
mod tests {
    use alpaca_sim_core::{DeviceIdentity, DeviceType};

    use super::*;
    use crate::service::domain::tests::context_for;

    fn dome() -> DeviceIdentity {
        DeviceIdentity::new(DeviceType::Dome, 0)
    }

    #[test]
    fn slews_set_position_and_clear_park() {
        let (store, config) =
            context_for("devices:\n  dome:\n    0:\n      atpark: true\n", dome());
        let ctx = DeviceContext { id: dome(), config, store: &store };

        slew_to_azimuth(&ctx, 270.5).unwrap();
        slew_to_altitude(&ctx, 30.0).unwrap();
        let state = store.get(dome());
        assert!((state.f64_or("azimuth", 0.0) - 270.5).abs() < f64::EPSILON);
        assert!((state.f64_or("altitude", 0.0) - 30.0).abs() < f64::EPSILON);
        assert!(!state.bool_or("atpark", true));
    }

    #[test]
    fn bounds_are_checked() {
        let (store, config) = context_for("devices:\n  dome:\n    0: {}\n", dome());
        let ctx = DeviceContext { id: dome(), config, store: &store };

        let err = slew_to_azimuth(&ctx, 360.0).unwrap_err();
        assert_eq!(err.error_number(), 0x402);
        assert_eq!(err.to_string(), "Azimuth must be between 0 and 360 degrees");
        assert!(sync_to_azimuth(&ctx, -1.0).is_err());
        let err = slew_to_altitude(&ctx, 90.5).unwrap_err();
        assert_eq!(err.to_string(), "Altitude must be between 0 and 90 degrees");
        assert!(slew_to_altitude(&ctx, f64::NAN).is_err());
        assert!(slew_to_altitude(&ctx, 90.0).is_ok());
    }

    #[test]
    fn capabilities_gate_motion() {
        let (store, config) = context_for(
            "devices:\n  dome:\n    0:\n      cansetaltitude: false\n      cansyncazimuth: false\n",
            dome(),
        );
        let ctx = DeviceContext { id: dome(), config, store: &store };

        assert_eq!(slew_to_altitude(&ctx, 10.0).unwrap_err().error_number(), 0x401);
        assert_eq!(sync_to_azimuth(&ctx, 10.0).unwrap_err().error_number(), 0x401);
        assert!(slew_to_azimuth(&ctx, 10.0).is_ok());
    }

    #[test]
    fn park_returns_to_recorded_azimuth() {
        let (store, config) = context_for("devices:\n  dome:\n    0: {}\n", dome());
        let ctx = DeviceContext { id: dome(), config, store: &store };

        slew_to_azimuth(&ctx, 123.0).unwrap();
        set_park(&ctx).unwrap();
        slew_to_azimuth(&ctx, 10.0).unwrap();
        park(&ctx).unwrap();

        let state = store.get(dome());
        assert!((state.f64_or("azimuth", 0.0) - 123.0).abs() < f64::EPSILON);
        assert!(state.bool_or("atpark", false));
    }

    #[test]
    fn park_uses_configured_azimuth_first_time() {
        let (store, config) =
            context_for("devices:\n  dome:\n    0:\n      parkazimuth: 180.0\n", dome());
        let ctx = DeviceContext { id: dome(), config, store: &store };

        park(&ctx).unwrap();
        assert!((store.get(dome()).f64_or("azimuth", 0.0) - 180.0).abs() < f64::EPSILON);
    }

    #[test]
    fn park_without_capability_is_not_implemented() {
        let (store, config) =
            context_for("devices:\n  dome:\n    0:\n      canpark: false\n", dome());
        let ctx = DeviceContext { id: dome(), config, store: &store };

        let err = park(&ctx).unwrap_err();
        assert_eq!(err.to_string(), "Dome cannot park");
        assert!(!store.get(dome()).bool_or("atpark", true));
    }
}
