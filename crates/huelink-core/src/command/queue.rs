use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use huelink_api::BridgeClient;

use super::ControlCommand;
use crate::convert;
use crate::error::CoreError;
use crate::model::Bridge;
use crate::publish::Publisher;
use crate::resolve::AddressResolver;
use crate::store::BridgeStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Nothing queued or in flight.
    Idle,
    /// A command is in flight or the queue is waiting out the delay.
    Draining,
}

// ── Enqueuer ─────────────────────────────────────────────────────────

/// Sending half shared by the queue handle and auto-off timers. The
/// pending count covers queued, in-flight and cooling-down commands.
#[derive(Clone)]
struct Enqueuer {
    tx: mpsc::UnboundedSender<ControlCommand>,
    pending: Arc<watch::Sender<usize>>,
}

impl Enqueuer {
    fn push(&self, command: ControlCommand) -> Result<(), CoreError> {
        self.pending.send_modify(|n| *n += 1);
        if self.tx.send(command).is_err() {
            self.pending.send_modify(|n| *n = n.saturating_sub(1));
            return Err(CoreError::Internal("control queue has stopped".into()));
        }
        Ok(())
    }

    fn finish_one(&self) {
        self.pending.send_modify(|n| *n = n.saturating_sub(1));
    }
}

// ── ControlQueue ─────────────────────────────────────────────────────

/// Serial control queue for one bridge.
///
/// Commands run one at a time in arrival order; after each, whatever its
/// outcome, the worker pauses for the configured delay before the next.
/// The bridge is looked up in the store per command, so a re-paired bridge
/// is picked up without respawning the queue.
pub struct ControlQueue {
    bridge_id: String,
    enqueuer: Enqueuer,
    pending: watch::Receiver<usize>,
    cancel: CancellationToken,
}

impl ControlQueue {
    /// Spawn the worker task. It stops when `cancel` fires.
    pub fn spawn(
        bridge_id: String,
        store: Arc<dyn BridgeStore>,
        client: BridgeClient,
        resolver: Arc<dyn AddressResolver>,
        publisher: Publisher,
        delay: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (pending_tx, pending) = watch::channel(0);
        let enqueuer = Enqueuer {
            tx,
            pending: Arc::new(pending_tx),
        };

        let worker = Worker {
            bridge_id: bridge_id.clone(),
            store,
            client,
            resolver,
            publisher,
            delay,
            enqueuer: enqueuer.clone(),
            cancel: cancel.clone(),
        };
        tokio::spawn(worker.run(rx));

        Self {
            bridge_id,
            enqueuer,
            pending,
            cancel,
        }
    }

    /// Append a command to the tail of the queue.
    pub fn enqueue(&self, command: ControlCommand) -> Result<(), CoreError> {
        debug!(
            bridge_id = %self.bridge_id,
            correlation_id = %command.correlation_id,
            device_id = %command.device_id,
            "queueing control command"
        );
        self.enqueuer.push(command)
    }

    pub fn state(&self) -> QueueState {
        if *self.pending.borrow() == 0 {
            QueueState::Idle
        } else {
            QueueState::Draining
        }
    }

    /// Watch the pending count.
    pub fn subscribe_pending(&self) -> watch::Receiver<usize> {
        self.pending.clone()
    }

    /// Stop the worker and every auto-off timer it armed.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

// ── Worker ───────────────────────────────────────────────────────────

struct Worker {
    bridge_id: String,
    store: Arc<dyn BridgeStore>,
    client: BridgeClient,
    resolver: Arc<dyn AddressResolver>,
    publisher: Publisher,
    delay: Duration,
    enqueuer: Enqueuer,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<ControlCommand>) {
        loop {
            let command = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                command = rx.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };

            self.process(command).await;

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(self.delay) => {}
            }
            self.enqueuer.finish_one();
        }
        debug!(bridge_id = %self.bridge_id, "control queue stopped");
    }

    async fn process(&self, command: ControlCommand) {
        match self.execute(&command).await {
            Ok(()) => {
                debug!(
                    bridge_id = %self.bridge_id,
                    correlation_id = %command.correlation_id,
                    "light updated"
                );
                self.publisher
                    .control_success(&command.correlation_id, &command.device_id);
            }
            Err(e) => {
                warn!(
                    bridge_id = %self.bridge_id,
                    correlation_id = %command.correlation_id,
                    device_id = %command.device_id,
                    error = %e,
                    "control command failed"
                );
                self.publisher.control_failure(
                    &command.correlation_id,
                    &command.device_id,
                    e.to_string(),
                );
            }
        }
    }

    async fn execute(&self, command: &ControlCommand) -> Result<(), CoreError> {
        let bridge = self.store.bridge(&self.bridge_id).await.ok_or_else(|| {
            CoreError::BridgeNotFound {
                bridge_id: self.bridge_id.clone(),
            }
        })?;

        let light_id = {
            let mut state = bridge.state().await;
            let light_id = state.light_service(&command.device_id)?;

            // Replacement happens under the bridge lock, so an old timer
            // can never fire once a newer command for the device is seen.
            if state.cancel_auto_off(&command.device_id) {
                info!(
                    bridge_id = %self.bridge_id,
                    device_id = %command.device_id,
                    "replacing pending auto-off"
                );
            }
            if let Some(after) = command.auto_off_after() {
                let (generation, token) = state.arm_auto_off(&command.device_id);
                self.spawn_auto_off(
                    Arc::clone(&bridge),
                    command.auto_off(),
                    after,
                    generation,
                    token,
                );
            }
            light_id
        };

        let update = convert::render(&command.features);
        let info = bridge.info();
        let address = self.resolver.resolve(&bridge, &info.local_address).await?;

        match self
            .client
            .put_light(&address, &info.application_key, &light_id, &update)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => {
                if e.is_transport() {
                    bridge.set_last_good_address(None).await;
                }
                Err(e.into())
            }
        }
    }

    /// Arm a timer that queues `off` unless it is replaced, cancelled or
    /// `bridge` is unpaired first.
    fn spawn_auto_off(
        &self,
        bridge: Arc<Bridge>,
        off: ControlCommand,
        after: Duration,
        generation: u64,
        token: CancellationToken,
    ) {
        let store = Arc::clone(&self.store);
        let enqueuer = self.enqueuer.clone();
        let shutdown = self.cancel.clone();
        info!(
            bridge_id = bridge.id(),
            device_id = %off.device_id,
            after_secs = after.as_secs(),
            "scheduling auto-off"
        );

        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => return,
                () = shutdown.cancelled() => return,
                () = tokio::time::sleep(after) => {}
            }

            if !bridge.state().await.take_auto_off(&off.device_id, generation) {
                return;
            }
            let still_paired = store
                .bridge(bridge.id())
                .await
                .is_some_and(|current| Arc::ptr_eq(&current, &bridge));
            if !still_paired {
                debug!(
                    bridge_id = bridge.id(),
                    device_id = %off.device_id,
                    "bridge was re-paired, dropping auto-off"
                );
                return;
            }
            info!(
                bridge_id = bridge.id(),
                device_id = %off.device_id,
                correlation_id = %off.correlation_id,
                "auto-off fired"
            );
            if let Err(e) = enqueuer.push(off) {
                warn!(bridge_id = bridge.id(), error = %e, "could not queue auto-off");
            }
        });
    }
}
