//! Device behaviour behind the existence guard.
//!
//! Each submodule handles one family of members. Handlers receive a
//! [`DeviceContext`] holding the addressed identity, its effective
//! configuration and the state store; they never see a device that is not in
//! the registry.

pub mod actions;
pub mod common;
pub mod dome;
pub mod focuser;
pub mod guide;
pub mod properties;
pub mod rotator;
pub mod switch;
pub mod telescope;

use alpaca_sim_core::defaults::config_defaults;
use alpaca_sim_core::{
    AlpacaError, DeviceIdentity, DeviceRegistry, PropertyMap, PropertyMapExt, Value,
};

use crate::storage::StateStore;

/// Everything a handler needs to serve one request for one device.
pub struct DeviceContext<'a> {
    pub id: DeviceIdentity,
    /// Built-in configuration defaults with the registry entry merged on top.
    pub config: PropertyMap,
    pub store: &'a StateStore,
}

/// Configuration defaults for the device type, overridden by its registry entry.
#[must_use]
pub fn effective_config(registry: &DeviceRegistry, id: DeviceIdentity) -> PropertyMap {
    let mut config = config_defaults(id.device_type);
    if let Some(entry) = registry.config(id) {
        config.extend(entry.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    config
}

impl DeviceContext<'_> {
    /// Fails with `NotImplemented` when the configuration sets `flag` to false.
    ///
    /// # Errors
    ///
    /// `NotImplemented` naming the device type and `member`.
    pub fn require(&self, flag: &str, member: &str) -> Result<(), AlpacaError> {
        if self.config.bool_or(flag, true) {
            return Ok(());
        }
        Err(AlpacaError::not_implemented(format!(
            "{} cannot {member}",
            self.id.device_type.display_name()
        )))
    }

    /// A numeric setting from state, falling back to the configuration.
    #[must_use]
    pub fn setting(&self, state: &PropertyMap, key: &str, default: f64) -> f64 {
        state
            .get(key)
            .and_then(Value::as_f64)
            .unwrap_or_else(|| self.config.f64_or(key, default))
    }
}
