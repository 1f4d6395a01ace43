//! Immutable catalogue of configured devices.

use std::collections::BTreeMap;

use crate::types::{DeviceIdentity, PropertyMap};

/// Every configured `(type, number)` identity with its static properties.
///
/// Built once from a [`SimulatorConfig`](crate::config::SimulatorConfig) and
/// never mutated; a reload swaps in a whole new registry.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<DeviceIdentity, PropertyMap>,
}

impl DeviceRegistry {
    #[must_use]
    pub fn new(devices: BTreeMap<DeviceIdentity, PropertyMap>) -> Self {
        Self { devices }
    }

    /// Whether the identity is configured. Drives the guard.
    #[must_use]
    pub fn exists(&self, id: DeviceIdentity) -> bool {
        self.devices.contains_key(&id)
    }

    /// Static configuration of one device.
    #[must_use]
    pub fn config(&self, id: DeviceIdentity) -> Option<&PropertyMap> {
        self.devices.get(&id)
    }

    /// Configured devices ordered by device type, then number.
    pub fn configured_devices(&self) -> impl Iterator<Item = (DeviceIdentity, &PropertyMap)> {
        self.devices.iter().map(|(id, props)| (*id, props))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
