//! `pulseguide` for cameras and telescopes.
//!
//! Pulses complete instantly. A telescope pulse nudges its coordinates by the
//! configured guide rates (degrees per second) for the pulse length; a camera
//! pulse only acknowledges.

use alpaca_sim_core::enums::GuideDirection;
use alpaca_sim_core::{property_map, AlpacaError, DeviceType, PropertyMap, PropertyMapExt, Value};
use tracing::debug;

use super::DeviceContext;
use crate::service::operation::OperationResponse;

/// # Errors
///
/// `NotImplemented` without `canpulseguide`; `InvalidValue` for an unknown
/// direction or a negative duration.
pub fn pulse_guide(
    ctx: &DeviceContext<'_>,
    direction: i64,
    duration_ms: i64,
) -> Result<OperationResponse, AlpacaError> {
    ctx.require("canpulseguide", "pulseguide")?;
    let direction = GuideDirection::from_value(&Value::Int(direction)).ok_or_else(|| {
        AlpacaError::invalid_value(format!("Invalid guide direction: {direction}"))
    })?;
    if duration_ms < 0 {
        return Err(AlpacaError::invalid_value("Duration must not be negative"));
    }

    ctx.store.update_with(ctx.id, |state| {
        let mut patch = match ctx.id.device_type {
            DeviceType::Telescope => nudge(state, direction, duration_ms),
            _ => PropertyMap::new(),
        };
        patch.insert("ispulseguiding".into(), false.into());
        (patch, ())
    });
    debug!(device = %ctx.id, ?direction, duration_ms, "pulse guide");
    Ok(OperationResponse::Empty)
}

#[allow(clippy::cast_precision_loss)]
fn nudge(state: &PropertyMap, direction: GuideDirection, duration_ms: i64) -> PropertyMap {
    let seconds = duration_ms as f64 / 1000.0;
    let right_ascension = state.f64_or("rightascension", 0.0);
    let declination = state.f64_or("declination", 0.0);
    let ra_step = seconds * state.f64_or("guideraterightascension", 0.0) / 15.0;
    let dec_step = seconds * state.f64_or("guideratedeclination", 0.0);

    let (right_ascension, declination) = match direction {
        GuideDirection::North => (right_ascension, declination + dec_step),
        GuideDirection::South => (right_ascension, declination - dec_step),
        GuideDirection::East => (right_ascension + ra_step, declination),
        GuideDirection::West => (right_ascension - ra_step, declination),
    };
    property_map([
        ("rightascension", right_ascension.rem_euclid(24.0).into()),
        ("declination", declination.clamp(-90.0, 90.0).into()),
    ])
}
