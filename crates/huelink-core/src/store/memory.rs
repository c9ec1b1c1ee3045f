use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::BridgeStore;
use crate::error::CoreError;
use crate::model::Bridge;

/// In-process [`BridgeStore`].
///
/// Saves are recorded as snapshots rather than written anywhere, which is
/// enough for hosts that persist on their own schedule and for tests.
#[derive(Default)]
pub struct MemoryBridgeStore {
    bridges: DashMap<String, Arc<Bridge>>,
    current: ArcSwapOption<Bridge>,
    saved_included: DashMap<String, HashSet<String>>,
    saved_devices: DashMap<String, usize>,
}

impl MemoryBridgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bridge. The first bridge added becomes current.
    pub fn insert(&self, bridge: Arc<Bridge>) {
        if self.current.load().is_none() {
            self.current.store(Some(Arc::clone(&bridge)));
        }
        self.bridges.insert(bridge.id().to_owned(), bridge);
    }

    /// Make a stored bridge current.
    pub fn set_current(&self, bridge_id: &str) -> Result<(), CoreError> {
        let bridge = self
            .bridges
            .get(bridge_id)
            .map(|b| Arc::clone(b.value()))
            .ok_or_else(|| CoreError::BridgeNotFound {
                bridge_id: bridge_id.to_owned(),
            })?;
        self.current.store(Some(bridge));
        Ok(())
    }

    /// Unpair a bridge, clearing it as current if it was.
    pub fn remove(&self, bridge_id: &str) -> Option<Arc<Bridge>> {
        let removed = self.bridges.remove(bridge_id).map(|(_, b)| b);
        if self
            .current
            .load()
            .as_ref()
            .is_some_and(|b| b.id() == bridge_id)
        {
            self.current.store(None);
        }
        removed
    }

    /// The included set as of the last save.
    pub fn saved_included_devices(&self, bridge_id: &str) -> Option<HashSet<String>> {
        self.saved_included.get(bridge_id).map(|s| s.clone())
    }

    /// Number of native devices as of the last save.
    pub fn saved_device_count(&self, bridge_id: &str) -> Option<usize> {
        self.saved_devices.get(bridge_id).map(|n| *n)
    }
}

#[async_trait]
impl BridgeStore for MemoryBridgeStore {
    async fn current_bridge(&self) -> Option<Arc<Bridge>> {
        self.current.load_full()
    }

    async fn bridge(&self, bridge_id: &str) -> Option<Arc<Bridge>> {
        self.bridges.get(bridge_id).map(|b| Arc::clone(b.value()))
    }

    async fn save_included_devices(&self, bridge: &Bridge) -> Result<(), CoreError> {
        let included = bridge.state().await.included_devices.clone();
        debug!(bridge_id = bridge.id(), count = included.len(), "saving included devices");
        self.saved_included.insert(bridge.id().to_owned(), included);
        Ok(())
    }

    async fn save_device_data(&self, bridge: &Bridge) -> Result<(), CoreError> {
        let count = bridge.state().await.native_devices.len();
        debug!(bridge_id = bridge.id(), count, "saving device data");
        self.saved_devices.insert(bridge.id().to_owned(), count);
        Ok(())
    }
}
