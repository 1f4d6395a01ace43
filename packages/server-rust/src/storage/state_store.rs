//! Per-device mutable property store backed by [`DashMap`].
//!
//! Each device identity owns one independently locked entry. A device's
//! state is created lazily on first access from the current catalogue:
//! typed defaults with the device configuration merged on top.

use std::sync::Arc;

use alpaca_sim_core::defaults::initial_state;
use alpaca_sim_core::{DeviceIdentity, PropertyMap};
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;

use crate::service::config::SharedCatalogue;

/// Concurrent `identity -> property bag` store.
///
/// All reads return independent copies. Writes are key-by-key merges; no
/// operation ever removes a single key. Reads and writes of one identity
/// are totally ordered by its entry lock, so no reader observes a
/// partially applied patch.
pub struct StateStore {
    entries: DashMap<DeviceIdentity, PropertyMap>,
    catalogue: SharedCatalogue,
}

impl StateStore {
    /// Creates an empty store that initializes devices from `catalogue`.
    #[must_use]
    pub fn new(catalogue: SharedCatalogue) -> Self {
        Self {
            entries: DashMap::new(),
            catalogue,
        }
    }

    fn initial(&self, id: DeviceIdentity) -> PropertyMap {
        let catalogue = self.catalogue.load();
        match catalogue.registry.config(id) {
            Some(config) => initial_state(id.device_type, config),
            None => initial_state(id.device_type, &PropertyMap::new()),
        }
    }

    fn entry(&self, id: DeviceIdentity) -> RefMut<'_, DeviceIdentity, PropertyMap> {
        self.entries.entry(id).or_insert_with(|| self.initial(id))
    }

    /// Returns a snapshot of the device state, initializing it on first access.
    #[must_use]
    pub fn get(&self, id: DeviceIdentity) -> PropertyMap {
        if let Some(state) = self.entries.get(&id) {
            return state.clone();
        }
        self.entry(id).clone()
    }

    /// Merges `patch` into the device state. Keys absent from the patch are untouched.
    pub fn update(&self, id: DeviceIdentity, patch: PropertyMap) {
        self.entry(id).extend(patch);
    }

    /// Atomic read-compute-merge.
    ///
    /// `f` sees the current state and returns a patch plus a result. The patch
    /// is merged before the entry lock is released, so check-then-set
    /// transitions cannot interleave with other writers of the same device.
    /// `f` must not touch this store.
    pub fn update_with<R>(
        &self,
        id: DeviceIdentity,
        f: impl FnOnce(&PropertyMap) -> (PropertyMap, R),
    ) -> R {
        let mut state = self.entry(id);
        let (patch, result) = f(&state);
        state.extend(patch);
        result
    }

    /// Drops every device's state. The next access re-initializes from the catalogue.
    pub fn reset_all(&self) {
        self.entries.clear();
    }

    /// Number of devices whose state has been initialized.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared handle used by the service, the exposure controller, and the network layer.
pub type SharedStore = Arc<StateStore>;
