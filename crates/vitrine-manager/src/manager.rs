//! Manager shell wiring

use crate::api::ManagerApi;
use crate::registry::AddonRegistry;
use crate::store::ManagerStore;
use std::sync::Arc;
use vitrine_channel::Channel;

/// Registry, store and api over one manager-side channel
///
/// Addons register before [`Manager::load`]; their setups run there, in
/// registration order.
#[derive(Debug, Clone)]
pub struct Manager {
    api: ManagerApi,
}

impl Manager {
    /// Create a manager listening on `channel`
    #[must_use]
    pub fn new(channel: Channel) -> Self {
        let registry = Arc::new(AddonRegistry::new());
        let store = Arc::new(ManagerStore::new(channel.clone(), registry));
        Self {
            api: ManagerApi::new(channel, store),
        }
    }

    /// Run addon setups and evaluate their items for the current selection
    pub fn load(&self) {
        self.api.addons().load(&self.api);
        self.api.store().refresh_addons();
        tracing::info!(items = self.api.addons().len(), "manager loaded");
    }

    /// Addon registry
    #[inline]
    #[must_use]
    pub fn addons(&self) -> &AddonRegistry {
        self.api.addons()
    }

    /// Mirrored preview state
    #[inline]
    #[must_use]
    pub fn store(&self) -> &ManagerStore {
        self.api.store()
    }

    /// Command api
    #[inline]
    #[must_use]
    pub fn api(&self) -> &ManagerApi {
        &self.api
    }
}
