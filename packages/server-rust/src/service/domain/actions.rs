//! Motion commands that complete instantly by setting their end state.

use alpaca_sim_core::{AlpacaError, DeviceType};

use super::properties::{fixed_patch, Fixed};
use super::DeviceContext;
use crate::service::operation::OperationResponse;

/// A parameterless `PUT` whose whole effect is a fixed state patch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstantAction {
    pub device_type: DeviceType,
    pub member: &'static str,
    /// Configuration flag that must not be false.
    pub capability: Option<&'static str>,
    pub patch: &'static [(&'static str, Fixed)],
}

impl InstantAction {
    /// # Errors
    ///
    /// `NotImplemented` when the capability flag is false.
    pub fn apply(&self, ctx: &DeviceContext<'_>) -> Result<OperationResponse, AlpacaError> {
        if let Some(flag) = self.capability {
            ctx.require(flag, self.member)?;
        }
        ctx.store.update(ctx.id, fixed_patch(self.patch));
        Ok(OperationResponse::Empty)
    }
}

const fn action(
    device_type: DeviceType,
    member: &'static str,
    capability: Option<&'static str>,
    patch: &'static [(&'static str, Fixed)],
) -> InstantAction {
    InstantAction {
        device_type,
        member,
        capability,
        patch,
    }
}

const OFF: Fixed = Fixed::Bool(false);
const ON: Fixed = Fixed::Bool(true);

pub static INSTANT_ACTIONS: &[InstantAction] = &[
    action(DeviceType::Focuser, "halt", None, &[("ismoving", OFF)]),
    action(DeviceType::Rotator, "halt", None, &[("ismoving", OFF)]),
    action(DeviceType::Telescope, "abortslew", None, &[("slewing", OFF)]),
    action(DeviceType::Telescope, "unpark", Some("canunpark"), &[("atpark", OFF)]),
    action(
        DeviceType::Telescope,
        "findhome",
        Some("canfindhome"),
        &[("athome", ON), ("atpark", OFF), ("slewing", OFF)],
    ),
    action(DeviceType::Dome, "abortslew", None, &[("slewing", OFF)]),
    action(
        DeviceType::Dome,
        "openshutter",
        Some("cansetshutter"),
        &[("shutterstatus", Fixed::Int(0))],
    ),
    action(
        DeviceType::Dome,
        "closeshutter",
        Some("cansetshutter"),
        &[("shutterstatus", Fixed::Int(1))],
    ),
    action(
        DeviceType::Dome,
        "findhome",
        Some("canfindhome"),
        &[("athome", ON), ("atpark", OFF), ("slewing", OFF)],
    ),
    action(
        DeviceType::CoverCalibrator,
        "opencover",
        None,
        &[("coverstate", Fixed::Int(3)), ("covermoving", OFF)],
    ),
    action(
        DeviceType::CoverCalibrator,
        "closecover",
        None,
        &[("coverstate", Fixed::Int(1)), ("covermoving", OFF)],
    ),
    action(DeviceType::CoverCalibrator, "haltcover", None, &[("covermoving", OFF)]),
    action(
        DeviceType::CoverCalibrator,
        "calibratoroff",
        None,
        &[("brightness", Fixed::Int(0)), ("calibratorstate", Fixed::Int(1))],
    ),
];

#[must_use]
pub fn instant(device_type: DeviceType, member: &str) -> Option<&'static InstantAction> {
    INSTANT_ACTIONS
        .iter()
        .find(|a| a.device_type == device_type && a.member == member)
}

#[cfg(test)]
mod tests {
    use alpaca_sim_core::enums::{CoverStatus, ShutterState};
    use alpaca_sim_core::{DeviceIdentity, PropertyMapExt, Value};

    use super::*;
    use crate::service::domain::tests::context_for;

    #[test]
    fn shutter_codes_match_wire_enum() {
        let open = instant(DeviceType::Dome, "openshutter").unwrap();
        assert_eq!(Value::from(open.patch[0].1), Value::from(ShutterState::Open));
        let close = instant(DeviceType::Dome, "closeshutter").unwrap();
        assert_eq!(Value::from(close.patch[0].1), Value::from(ShutterState::Closed));
        let cover = instant(DeviceType::CoverCalibrator, "opencover").unwrap();
        assert_eq!(Value::from(cover.patch[0].1), Value::from(CoverStatus::Open));
    }

    #[test]
    fn find_home_sets_end_state() {
        let id = DeviceIdentity::new(DeviceType::Telescope, 0);
        let (store, config) =
            context_for("devices:\n  telescope:\n    0:\n      atpark: true\n", id);
        let ctx = DeviceContext {
            id,
            config,
            store: &store,
        };

        instant(DeviceType::Telescope, "findhome").unwrap().apply(&ctx).unwrap();
        let state = store.get(id);
        assert!(state.bool_or("athome", false));
        assert!(!state.bool_or("atpark", true));
    }

    #[test]
    fn missing_capability_is_not_implemented() {
        let id = DeviceIdentity::new(DeviceType::Dome, 0);
        let (store, config) =
            context_for("devices:\n  dome:\n    0:\n      cansetshutter: false\n", id);
        let ctx = DeviceContext {
            id,
            config,
            store: &store,
        };

        let err = instant(DeviceType::Dome, "openshutter").unwrap().apply(&ctx).unwrap_err();
        assert_eq!(err.error_number(), 0x401);
        assert_eq!(err.to_string(), "Dome cannot openshutter");
        assert_eq!(store.get(id).i64_or("shutterstatus", -1), 1);
    }

    #[test]
    fn unknown_member_is_not_an_action() {
        assert!(instant(DeviceType::Switch, "park").is_none());
        assert!(instant(DeviceType::Telescope, "halt").is_none());
        assert!(instant(DeviceType::Telescope, "park").is_none());
    }
}
