// ── Bridge store ──
//
// Pairing and on-disk persistence are owned by the host. Core only needs
// read access to the paired bridges and two write hooks for the state it
// mutates.

mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::model::Bridge;

pub use memory::MemoryBridgeStore;

/// Source of paired bridges.
///
/// Implementations must hand out the same `Arc<Bridge>` for a bridge id for
/// as long as it stays paired; its state mutex is what serializes the
/// control and event paths.
#[async_trait]
pub trait BridgeStore: Send + Sync {
    /// The bridge new commands and streams target, if one is paired.
    async fn current_bridge(&self) -> Option<Arc<Bridge>>;

    async fn bridge(&self, bridge_id: &str) -> Option<Arc<Bridge>>;

    /// Persist the bridge's included-device set.
    async fn save_included_devices(&self, bridge: &Bridge) -> Result<(), CoreError>;

    /// Persist the bridge's native device listing.
    async fn save_device_data(&self, bridge: &Bridge) -> Result<(), CoreError>;
}
