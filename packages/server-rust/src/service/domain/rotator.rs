//! Rotator moves and syncs. Angles wrap into `[0, 360)` and moves complete
//! instantly.

use alpaca_sim_core::{property_map, AlpacaError, PropertyMapExt};
use tracing::debug;

use super::DeviceContext;
use crate::service::operation::OperationResponse;

/// How a `Position` argument is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotatorMove {
    /// Offset from the current position.
    Relative,
    /// Sky position angle.
    Absolute,
    /// Mechanical angle.
    Mechanical,
}

impl RotatorMove {
    #[must_use]
    pub fn member(self) -> &'static str {
        match self {
            Self::Relative => "move",
            Self::Absolute => "moveabsolute",
            Self::Mechanical => "movemechanical",
        }
    }
}

fn finite(position: f64) -> Result<f64, AlpacaError> {
    if position.is_finite() {
        Ok(position)
    } else {
        Err(AlpacaError::invalid_value(format!(
            "Invalid rotator position: {position}"
        )))
    }
}

/// # Errors
///
/// `InvalidValue` for a non-finite `position`.
pub fn move_to(
    ctx: &DeviceContext<'_>,
    mode: RotatorMove,
    position: f64,
) -> Result<OperationResponse, AlpacaError> {
    let position = finite(position)?;

    let landed = ctx.store.update_with(ctx.id, |state| {
        let target = match mode {
            RotatorMove::Relative => state.f64_or("position", 0.0) + position,
            RotatorMove::Absolute | RotatorMove::Mechanical => position,
        }
        .rem_euclid(360.0);
        let patch = property_map([
            ("position", target.into()),
            ("mechanicalposition", target.into()),
            ("targetposition", target.into()),
            ("ismoving", false.into()),
        ]);
        (patch, target)
    });
    debug!(device = %ctx.id, member = mode.member(), position = landed, "rotator moved");
    Ok(OperationResponse::Empty)
}

/// Redefines the current sky position angle without moving.
///
/// # Errors
///
/// `InvalidValue` for a non-finite `position`.
pub fn sync(ctx: &DeviceContext<'_>, position: f64) -> Result<OperationResponse, AlpacaError> {
    let position = finite(position)?.rem_euclid(360.0);
    ctx.store.update(
        ctx.id,
        property_map([
            ("position", position.into()),
            ("targetposition", position.into()),
        ]),
    );
    Ok(OperationResponse::Empty)
}
