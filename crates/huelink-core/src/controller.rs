// ── Controller facade ──
//
// Wires the control queues, stream supervisor and light-state fetcher to
// one transport, store and resolver, and exposes the operations a host
// plugin drives: control, stream lifecycle, discovery, status and device
// inclusion.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use huelink_api::{BridgeClient, HttpTransport, ReqwestTransport};

use crate::command::{ControlCommand, ControlQueue, QueueState};
use crate::config::CoreConfig;
use crate::convert;
use crate::error::CoreError;
use crate::light_state::LightStateFetcher;
use crate::model::Device;
use crate::publish::{HostMessage, Publisher};
use crate::resolve::AddressResolver;
use crate::store::BridgeStore;
use crate::stream::{EventDispatcher, EventStreamSupervisor, StreamState};

/// Entry point for hosts.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. Everything reported
/// upward arrives on the receiver returned by [`Controller::new`].
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: CoreConfig,
    store: Arc<dyn BridgeStore>,
    client: BridgeClient,
    resolver: Arc<dyn AddressResolver>,
    publisher: Publisher,
    /// One control queue per bridge id, spawned on first use.
    queues: DashMap<String, ControlQueue>,
    streams: EventStreamSupervisor,
    cancel: CancellationToken,
}

impl Controller {
    pub fn new(
        config: CoreConfig,
        store: Arc<dyn BridgeStore>,
        transport: Arc<dyn HttpTransport>,
        resolver: Arc<dyn AddressResolver>,
    ) -> (Self, mpsc::UnboundedReceiver<HostMessage>) {
        let (publisher, rx) = Publisher::channel();
        let client = BridgeClient::new(transport);
        let cancel = CancellationToken::new();

        let fetcher = LightStateFetcher::new(client.clone(), Arc::clone(&resolver), publisher.clone());
        let dispatcher = EventDispatcher::new(publisher.clone(), fetcher, config.on_time_suppression);
        let streams = EventStreamSupervisor::new(
            client.clone(),
            Arc::clone(&resolver),
            publisher.clone(),
            dispatcher,
            config.keep_alive_interval,
            cancel.child_token(),
        );

        let controller = Self {
            inner: Arc::new(ControllerInner {
                config,
                store,
                client,
                resolver,
                publisher,
                queues: DashMap::new(),
                streams,
                cancel,
            }),
        };
        (controller, rx)
    }

    /// Build with the `reqwest` transport described by `config`.
    pub fn with_reqwest(
        config: CoreConfig,
        store: Arc<dyn BridgeStore>,
        resolver: Arc<dyn AddressResolver>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<HostMessage>), CoreError> {
        let transport = ReqwestTransport::new(&config.transport())?;
        Ok(Self::new(config, store, Arc::new(transport), resolver))
    }

    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }

    // ── Control ──────────────────────────────────────────────────────

    /// Queue a control command for the current bridge.
    ///
    /// The outcome is reported as a control response on the host channel,
    /// including when no bridge is paired.
    pub async fn execute(&self, command: ControlCommand) {
        if self.inner.cancel.is_cancelled() {
            self.inner.publisher.control_failure(
                &command.correlation_id,
                &command.device_id,
                CoreError::Internal("controller is shut down".into()).to_string(),
            );
            return;
        }
        let Some(bridge) = self.inner.store.current_bridge().await else {
            self.inner.publisher.control_failure(
                &command.correlation_id,
                &command.device_id,
                CoreError::NoBridge.to_string(),
            );
            return;
        };

        let correlation_id = command.correlation_id.clone();
        let device_id = command.device_id.clone();
        let result = self.queue_for(bridge.id()).enqueue(command);
        if let Err(e) = result {
            self.inner
                .publisher
                .control_failure(&correlation_id, &device_id, e.to_string());
        }
    }

    pub fn queue_state(&self, bridge_id: &str) -> QueueState {
        self.inner
            .queues
            .get(bridge_id)
            .map_or(QueueState::Idle, |q| q.state())
    }

    /// Wait for the bridge's control queue to drain.
    pub async fn wait_queue_idle(&self, bridge_id: &str) {
        let pending = self
            .inner
            .queues
            .get(bridge_id)
            .map(|q| q.subscribe_pending());
        if let Some(mut pending) = pending {
            let _ = pending.wait_for(|n| *n == 0).await;
        }
    }

    fn queue_for(&self, bridge_id: &str) -> dashmap::mapref::one::Ref<'_, String, ControlQueue> {
        self.inner
            .queues
            .entry(bridge_id.to_owned())
            .or_insert_with(|| {
                debug!(bridge_id, "spawning control queue");
                ControlQueue::spawn(
                    bridge_id.to_owned(),
                    Arc::clone(&self.inner.store),
                    self.inner.client.clone(),
                    Arc::clone(&self.inner.resolver),
                    self.inner.publisher.clone(),
                    self.inner.config.command_delay,
                    self.inner.cancel.child_token(),
                )
            })
            .downgrade()
    }

    // ── Event stream ─────────────────────────────────────────────────

    /// Start supervising a bridge's event stream. Returns `false` when a
    /// connection is already live.
    pub async fn start_stream(&self, bridge_id: &str) -> Result<bool, CoreError> {
        let bridge = self.inner.store.bridge(bridge_id).await.ok_or_else(|| {
            CoreError::BridgeNotFound {
                bridge_id: bridge_id.to_owned(),
            }
        })?;
        Ok(self.inner.streams.start(bridge))
    }

    /// Start the current bridge's stream, as hosts do at startup.
    pub async fn start_current_stream(&self) -> Result<bool, CoreError> {
        let bridge = self
            .inner
            .store
            .current_bridge()
            .await
            .ok_or(CoreError::NoBridge)?;
        Ok(self.inner.streams.start(bridge))
    }

    pub fn stop_stream(&self, bridge_id: &str) -> Result<(), CoreError> {
        self.inner.streams.stop(bridge_id)
    }

    pub fn stream_state(&self, bridge_id: &str) -> StreamState {
        self.inner.streams.state(bridge_id)
    }

    pub fn subscribe_stream(&self, bridge_id: &str) -> Option<watch::Receiver<StreamState>> {
        self.inner.streams.subscribe(bridge_id)
    }

    /// Whether any bridge has a live event stream.
    pub fn is_stream_connected(&self) -> bool {
        self.inner.streams.is_connected()
    }

    // ── Discovery and status ─────────────────────────────────────────

    /// List the current bridge's devices, refreshing the device cache.
    pub async fn discover(&self) -> Result<Vec<Device>, CoreError> {
        let bridge = self
            .inner
            .store
            .current_bridge()
            .await
            .ok_or(CoreError::NoBridge)?;
        let info = bridge.info();
        let address = self
            .inner
            .resolver
            .resolve(&bridge, &info.local_address)
            .await?;

        let snapshot = match self
            .inner
            .client
            .list_resources(&address, &info.application_key)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                if e.is_transport() {
                    bridge.set_last_good_address(None).await;
                }
                return Err(e.into());
            }
        };

        let devices = convert::devices_from_snapshot(&snapshot);
        {
            let mut state = bridge.state().await;
            state.native_devices = snapshot
                .devices
                .into_iter()
                .map(|d| (d.id.clone(), d))
                .collect();
            state.devices = devices.iter().map(|d| (d.id.clone(), d.clone())).collect();
        }
        self.inner.store.save_device_data(&bridge).await?;

        info!(
            bridge_id = bridge.id(),
            count = devices.len(),
            "discovered and converted devices"
        );
        Ok(devices)
    }

    /// Fresh state of the included devices, limited to `device_ids` when
    /// that is non-empty.
    pub async fn status(&self, device_ids: &[String]) -> Result<Vec<Device>, CoreError> {
        let devices = self.discover().await?;
        let bridge = self
            .inner
            .store
            .current_bridge()
            .await
            .ok_or(CoreError::NoBridge)?;
        let state = bridge.state().await;

        Ok(devices
            .into_iter()
            .filter(|d| device_ids.is_empty() || device_ids.contains(&d.id))
            .filter(|d| state.is_included(&d.id))
            .collect())
    }

    // ── Inclusion ────────────────────────────────────────────────────

    pub async fn include_devices(&self, device_ids: &[String]) -> Result<(), CoreError> {
        let bridge = self
            .inner
            .store
            .current_bridge()
            .await
            .ok_or(CoreError::NoBridge)?;
        {
            let mut state = bridge.state().await;
            state.included_devices.extend(device_ids.iter().cloned());
        }
        info!(bridge_id = bridge.id(), count = device_ids.len(), "devices included");
        self.inner.store.save_included_devices(&bridge).await
    }

    /// Remove devices from the included set, dropping their pending
    /// auto-offs.
    pub async fn exclude_devices(&self, device_ids: &[String]) -> Result<(), CoreError> {
        let bridge = self
            .inner
            .store
            .current_bridge()
            .await
            .ok_or(CoreError::NoBridge)?;
        {
            let mut state = bridge.state().await;
            for id in device_ids {
                state.included_devices.remove(id);
                state.cancel_auto_off(id);
            }
        }
        info!(bridge_id = bridge.id(), count = device_ids.len(), "devices excluded");
        self.inner.store.save_included_devices(&bridge).await
    }

    // ── Shutdown ─────────────────────────────────────────────────────

    /// Stop every queue, stream and auto-off timer.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.streams.shutdown();

        let bridge_ids: Vec<String> = self
            .inner
            .queues
            .iter()
            .map(|q| {
                q.shutdown();
                q.key().clone()
            })
            .collect();
        self.inner.queues.clear();
        for id in bridge_ids {
            if let Some(bridge) = self.inner.store.bridge(&id).await {
                bridge.state().await.cancel_all_auto_off();
            }
        }
        info!("controller shut down");
    }
}
