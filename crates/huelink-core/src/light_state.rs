// ── Light-state fetch ──
//
// A light reported as switched on carries no brightness. When the cache
// has none either, the dispatcher asks for the light's full state here.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use huelink_api::BridgeClient;

use crate::convert;
use crate::error::CoreError;
use crate::model::Bridge;
use crate::publish::Publisher;
use crate::resolve::AddressResolver;

#[derive(Clone)]
pub struct LightStateFetcher {
    client: BridgeClient,
    resolver: Arc<dyn AddressResolver>,
    publisher: Publisher,
}

impl LightStateFetcher {
    pub fn new(client: BridgeClient, resolver: Arc<dyn AddressResolver>, publisher: Publisher) -> Self {
        Self {
            client,
            resolver,
            publisher,
        }
    }

    /// Fetch in the background. Failures are logged and dropped.
    pub fn request(&self, bridge: Arc<Bridge>, light_id: String) -> JoinHandle<()> {
        let fetcher = self.clone();
        tokio::spawn(async move {
            if let Err(e) = fetcher.fetch(&bridge, &light_id).await {
                warn!(bridge_id = bridge.id(), light_id, error = %e, "light state fetch failed");
            }
        })
    }

    /// Fetch one light, fold its state into the cache, and publish it.
    /// Returns the number of light resources the bridge answered with.
    pub async fn fetch(&self, bridge: &Bridge, light_id: &str) -> Result<usize, CoreError> {
        let info = bridge.info();
        let address = self.resolver.resolve(bridge, &info.local_address).await?;
        debug!(bridge_id = bridge.id(), light_id, "fetching light state");

        let lights = self
            .client
            .get_light(&address, &info.application_key, light_id)
            .await?;

        for light in &lights {
            let Some(owner) = light.owner_id() else {
                debug!(light_id, "fetched light has no owner, skipping");
                continue;
            };
            let features = convert::light_features(light);

            let changed = bridge.state().await.merge_features(owner, &features);
            self.publisher.status(bridge.id(), owner, features, changed);
        }
        Ok(lights.len())
    }
}
