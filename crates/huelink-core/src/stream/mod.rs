// ── Event stream supervision ──
//
// One supervised server-sent-event connection per bridge. Each session
// loops connect → read → close/fail → fixed backoff → connect until it is
// stopped. Sessions share nothing but the dispatcher, which only locks
// the bridge it is handed.

mod dispatch;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use huelink_api::{BridgeClient, FrameAssembler};

use crate::error::CoreError;
use crate::model::Bridge;
use crate::publish::Publisher;
use crate::resolve::AddressResolver;

pub use dispatch::EventDispatcher;

/// Connection state of one bridge's stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum StreamState {
    /// Not supervised, or waiting out the reconnect backoff.
    Disconnected,
    Connecting,
    Streaming,
}

struct Session {
    cancel: CancellationToken,
    state: watch::Receiver<StreamState>,
}

struct StreamContext {
    client: BridgeClient,
    resolver: Arc<dyn AddressResolver>,
    publisher: Publisher,
    dispatcher: EventDispatcher,
    backoff: Duration,
}

/// Owns every bridge's stream session.
pub struct EventStreamSupervisor {
    ctx: Arc<StreamContext>,
    sessions: DashMap<String, Session>,
    shutdown: CancellationToken,
}

impl EventStreamSupervisor {
    /// `backoff` is the fixed delay between a close or failure and the next
    /// connection attempt.
    pub fn new(
        client: BridgeClient,
        resolver: Arc<dyn AddressResolver>,
        publisher: Publisher,
        dispatcher: EventDispatcher,
        backoff: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            ctx: Arc::new(StreamContext {
                client,
                resolver,
                publisher,
                dispatcher,
                backoff,
            }),
            sessions: DashMap::new(),
            shutdown,
        }
    }

    /// Start supervising the bridge's stream.
    ///
    /// Does nothing while a connection is live or being opened. A session
    /// waiting out its backoff is replaced, reconnecting right away.
    /// Returns whether a new session was started.
    pub fn start(&self, bridge: Arc<Bridge>) -> bool {
        match self.sessions.entry(bridge.id().to_owned()) {
            Entry::Occupied(mut entry) => {
                let state = *entry.get().state.borrow();
                if state != StreamState::Disconnected {
                    info!(bridge_id = bridge.id(), %state, "stream already active, ignoring start");
                    return false;
                }
                entry.get().cancel.cancel();
                entry.insert(self.launch(bridge));
            }
            Entry::Vacant(entry) => {
                entry.insert(self.launch(bridge));
            }
        }
        true
    }

    /// Stop supervising the bridge's stream and close its connection.
    pub fn stop(&self, bridge_id: &str) -> Result<(), CoreError> {
        let (_, session) =
            self.sessions
                .remove(bridge_id)
                .ok_or_else(|| CoreError::StreamNotRunning {
                    bridge_id: bridge_id.to_owned(),
                })?;
        session.cancel.cancel();
        info!(bridge_id, "stream stopped");
        Ok(())
    }

    pub fn state(&self, bridge_id: &str) -> StreamState {
        self.sessions
            .get(bridge_id)
            .map_or(StreamState::Disconnected, |s| *s.state.borrow())
    }

    /// Watch a supervised bridge's connection state.
    pub fn subscribe(&self, bridge_id: &str) -> Option<watch::Receiver<StreamState>> {
        self.sessions.get(bridge_id).map(|s| s.state.clone())
    }

    /// Whether any bridge currently has a live stream.
    pub fn is_connected(&self) -> bool {
        self.sessions
            .iter()
            .any(|s| *s.state.borrow() == StreamState::Streaming)
    }

    /// Stop every session.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.sessions.clear();
    }

    fn launch(&self, bridge: Arc<Bridge>) -> Session {
        let cancel = self.shutdown.child_token();
        let (state_tx, state) = watch::channel(StreamState::Connecting);
        tokio::spawn(supervise(
            Arc::clone(&self.ctx),
            bridge,
            state_tx,
            cancel.clone(),
        ));
        Session { cancel, state }
    }
}

// ── Session loop ─────────────────────────────────────────────────────

async fn supervise(
    ctx: Arc<StreamContext>,
    bridge: Arc<Bridge>,
    state: watch::Sender<StreamState>,
    cancel: CancellationToken,
) {
    loop {
        state.send_replace(StreamState::Connecting);

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            outcome = connect_and_read(&ctx, &bridge, &state) => outcome,
        };

        state.send_replace(StreamState::Disconnected);
        bridge.set_last_good_address(None).await;
        match outcome {
            Ok(()) => info!(
                bridge_id = bridge.id(),
                retry_secs = ctx.backoff.as_secs(),
                "stream closed, reconnecting"
            ),
            Err(e) => warn!(
                bridge_id = bridge.id(),
                error = %e,
                retry_secs = ctx.backoff.as_secs(),
                "stream failed, reconnecting"
            ),
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(ctx.backoff) => {}
        }
    }

    state.send_replace(StreamState::Disconnected);
    debug!(bridge_id = bridge.id(), "stream supervisor exiting");
}

/// One connection: open it, then feed frames to the dispatcher until the
/// bridge closes the body or the read fails.
async fn connect_and_read(
    ctx: &StreamContext,
    bridge: &Arc<Bridge>,
    state: &watch::Sender<StreamState>,
) -> Result<(), CoreError> {
    let info = bridge.info();
    let address = ctx.resolver.resolve(bridge, &info.local_address).await?;
    debug!(bridge_id = bridge.id(), %address, "opening event stream");

    let mut body = ctx
        .client
        .open_event_stream(&address, &info.application_key)
        .await?;

    bridge.set_last_good_address(Some(address.clone())).await;
    state.send_replace(StreamState::Streaming);
    info!(bridge_id = bridge.id(), %address, "event stream connected");
    ctx.publisher.stream_ready(bridge.id());

    let mut assembler = FrameAssembler::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        let Some(events) = assembler.push(&chunk) else {
            continue;
        };
        for event in &events {
            ctx.dispatcher.dispatch(bridge, event).await;
        }
    }
    Ok(())
}
