//! Focuser motion. Moves are absolute and complete instantly.

use alpaca_sim_core::{property_map, AlpacaError, PropertyMapExt};
use tracing::debug;

use super::DeviceContext;
use crate::service::operation::OperationResponse;

const DEFAULT_MAX_STEP: i64 = 100_000;

/// # Errors
///
/// `InvalidValue` when `position` lies outside `0..=maxstep`.
pub fn move_to(ctx: &DeviceContext<'_>, position: i64) -> Result<OperationResponse, AlpacaError> {
    let max_step = ctx.config.i64_or("maxstep", DEFAULT_MAX_STEP);
    if !(0..=max_step).contains(&position) {
        return Err(AlpacaError::invalid_value(format!(
            "Position out of range (0-{max_step})"
        )));
    }

    ctx.store.update(
        ctx.id,
        property_map([("position", position.into()), ("ismoving", false.into())]),
    );
    debug!(device = %ctx.id, position, "focuser moved");
    Ok(OperationResponse::Empty)
}
