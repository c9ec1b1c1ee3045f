// ── Bridge and its mutable state ──
//
// Identity and credentials are immutable; everything the control and event
// paths touch lives in `BridgeState` behind one per-bridge mutex. No lock
// spans more than one bridge.

use std::collections::{HashMap, HashSet};
use std::fmt;

use secrecy::SecretString;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use huelink_api::models::Device as BridgeDevice;

use super::device::Device;
use super::feature::FeatureSet;
use crate::error::CoreError;

/// Immutable identity of a paired bridge.
#[derive(Clone)]
pub struct BridgeInfo {
    pub id: String,
    /// Host hint from pairing: an IP address or a `.local` name.
    pub local_address: String,
    pub application_key: SecretString,
}

impl fmt::Debug for BridgeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeInfo")
            .field("id", &self.id)
            .field("local_address", &self.local_address)
            .finish_non_exhaustive()
    }
}

/// A pending auto-off.
#[derive(Debug)]
pub struct AutoOffTimer {
    pub generation: u64,
    pub cancel: CancellationToken,
    pub created_at: Instant,
}

/// Mutable per-bridge state.
#[derive(Debug, Default)]
pub struct BridgeState {
    /// Address of the last successful connection; cleared on failure.
    pub last_good_address: Option<String>,
    pub included_devices: HashSet<String>,
    /// Bridge-native devices from the last resource listing, by device id.
    pub native_devices: HashMap<String, BridgeDevice>,
    /// Normalized device cache, by device id.
    pub devices: HashMap<String, Device>,
    auto_off: HashMap<String, AutoOffTimer>,
    next_generation: u64,
}

impl BridgeState {
    pub fn is_included(&self, device_id: &str) -> bool {
        self.included_devices.contains(device_id)
    }

    /// Light service id of a known native device.
    pub fn light_service(&self, device_id: &str) -> Result<String, CoreError> {
        let device = self
            .native_devices
            .get(device_id)
            .ok_or_else(|| CoreError::DeviceNotFound {
                device_id: device_id.to_owned(),
            })?;
        device
            .light_service()
            .map(str::to_owned)
            .ok_or_else(|| CoreError::LightServiceNotFound {
                device_id: device_id.to_owned(),
            })
    }

    /// Fold features into a cached device. Returns whether it changed;
    /// unknown devices are left alone.
    pub fn merge_features(&mut self, device_id: &str, features: &FeatureSet) -> bool {
        self.devices
            .get_mut(device_id)
            .is_some_and(|device| device.features.merge_existing(features))
    }

    // ── Auto-off timers ──────────────────────────────────────────────

    /// Cancel and forget the device's timer. Returns whether one existed.
    pub fn cancel_auto_off(&mut self, device_id: &str) -> bool {
        match self.auto_off.remove(device_id) {
            Some(timer) => {
                timer.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Register a fresh timer for the device, cancelling any previous one.
    /// Returns the generation and token the timer task must carry.
    pub fn arm_auto_off(&mut self, device_id: &str) -> (u64, CancellationToken) {
        self.cancel_auto_off(device_id);
        self.next_generation += 1;
        let generation = self.next_generation;
        let cancel = CancellationToken::new();
        self.auto_off.insert(
            device_id.to_owned(),
            AutoOffTimer {
                generation,
                cancel: cancel.clone(),
                created_at: Instant::now(),
            },
        );
        (generation, cancel)
    }

    /// Remove the device's timer if it is still the given generation.
    /// A `false` return means the timer was replaced or cancelled.
    pub fn take_auto_off(&mut self, device_id: &str, generation: u64) -> bool {
        let current = self
            .auto_off
            .get(device_id)
            .is_some_and(|t| t.generation == generation);
        if current {
            self.auto_off.remove(device_id);
        }
        current
    }

    pub fn auto_off(&self, device_id: &str) -> Option<&AutoOffTimer> {
        self.auto_off.get(device_id)
    }

    pub fn pending_auto_off(&self) -> usize {
        self.auto_off.len()
    }

    /// Cancel every pending timer (shutdown).
    pub fn cancel_all_auto_off(&mut self) {
        for (_, timer) in self.auto_off.drain() {
            timer.cancel.cancel();
        }
    }
}

// ── Bridge ───────────────────────────────────────────────────────────

/// A paired bridge: identity plus its lock-guarded state.
#[derive(Debug)]
pub struct Bridge {
    info: BridgeInfo,
    state: Mutex<BridgeState>,
}

impl Bridge {
    pub fn new(info: BridgeInfo) -> Self {
        Self::with_state(info, BridgeState::default())
    }

    pub fn with_state(info: BridgeInfo, state: BridgeState) -> Self {
        Self {
            info,
            state: Mutex::new(state),
        }
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn info(&self) -> &BridgeInfo {
        &self.info
    }

    pub async fn state(&self) -> MutexGuard<'_, BridgeState> {
        self.state.lock().await
    }

    pub async fn last_good_address(&self) -> Option<String> {
        self.state.lock().await.last_good_address.clone()
    }

    pub async fn set_last_good_address(&self, address: Option<String>) {
        self.state.lock().await.last_good_address = address;
    }
}
