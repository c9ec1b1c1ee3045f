use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace};

use huelink_api::models::{Light, ZigbeeConnectivity};
use huelink_api::{Event, EventResource};

use crate::convert;
use crate::light_state::LightStateFetcher;
use crate::model::{Bridge, FeatureSet};
use crate::publish::Publisher;

/// Turns decoded stream events into cache updates and status messages.
#[derive(Clone)]
pub struct EventDispatcher {
    publisher: Publisher,
    fetcher: LightStateFetcher,
    suppression: Duration,
}

impl EventDispatcher {
    /// `suppression` is the age after which an update for a device cancels
    /// its pending auto-off.
    pub fn new(publisher: Publisher, fetcher: LightStateFetcher, suppression: Duration) -> Self {
        Self {
            publisher,
            fetcher,
            suppression,
        }
    }

    pub async fn dispatch(&self, bridge: &Arc<Bridge>, event: &Event) {
        if !event.is_update() {
            trace!(bridge_id = bridge.id(), kind = %event.kind, "ignoring non-update event");
            return;
        }
        for resource in event.resources() {
            match resource {
                EventResource::Light(light) => self.on_light(bridge, &light).await,
                EventResource::Connectivity(connectivity) => {
                    self.on_connectivity(bridge, &connectivity).await;
                }
                EventResource::Other { kind } => {
                    trace!(bridge_id = bridge.id(), kind, "ignoring resource type");
                }
            }
        }
    }

    async fn on_light(&self, bridge: &Arc<Bridge>, light: &Light) {
        let Some(owner) = light.owner_id() else {
            trace!(light_id = ?light.id, "light update without owner");
            return;
        };

        let (delta, changed) = {
            let mut state = bridge.state().await;
            if !state.is_included(owner) {
                trace!(bridge_id = bridge.id(), device_id = owner, "device not included");
                return;
            }
            let delta = convert::compute_delta(state.devices.get(owner), light);

            let stale_timer = state
                .auto_off(owner)
                .is_some_and(|timer| timer.created_at.elapsed() > self.suppression);
            if stale_timer {
                info!(
                    bridge_id = bridge.id(),
                    device_id = owner,
                    "device changed elsewhere, dropping pending auto-off"
                );
                state.cancel_auto_off(owner);
            }

            let changed = state.merge_features(owner, &delta.features);
            (delta, changed)
        };

        debug!(
            bridge_id = bridge.id(),
            device_id = owner,
            features = delta.features.len(),
            changed,
            "light update"
        );
        self.publisher
            .status(bridge.id(), owner, delta.features, changed);

        if let Some(light_id) = delta.fetch_light {
            self.fetcher.request(Arc::clone(bridge), light_id);
        }
    }

    async fn on_connectivity(&self, bridge: &Bridge, connectivity: &ZigbeeConnectivity) {
        let Some(owner) = connectivity.owner_id() else {
            return;
        };
        let features: FeatureSet = [convert::maintenance(connectivity)].into_iter().collect();

        let changed = {
            let mut state = bridge.state().await;
            if !state.is_included(owner) {
                trace!(bridge_id = bridge.id(), device_id = owner, "device not included");
                return;
            }
            state.merge_features(owner, &features)
        };

        debug!(
            bridge_id = bridge.id(),
            device_id = owner,
            status = ?connectivity.status,
            "connectivity update"
        );
        self.publisher.status(bridge.id(), owner, features, changed);
    }
}
