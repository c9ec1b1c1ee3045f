// Shared harness for controller integration tests: an in-memory transport
// that records every request with its (paused-clock) timestamp.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::Instant;
use url::Url;

use huelink_api::models::{Device as NativeDevice, ResourceIdentifier};
use huelink_api::{ByteStream, Error, HeaderMap, HttpResponse, HttpTransport};
use huelink_core::{
    Bridge, BridgeInfo, BridgeState, Controller, CoreConfig, Device, DeviceType, DirectResolver,
    FeatureSet, HostMessage, MemoryBridgeStore,
};

pub const BRIDGE_ID: &str = "001788fffe123456";
pub const BRIDGE_HOST: &str = "bridge.test";
pub const DEVICE_ID: &str = "dev-1";
pub const LIGHT_ID: &str = "light-1";

// ── Recording transport ─────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Call {
    pub at: Instant,
    pub method: &'static str,
    pub path: String,
    pub body: Option<Value>,
}

type StreamSender = mpsc::UnboundedSender<Result<Bytes, Error>>;

#[derive(Default)]
pub struct FakeTransport {
    calls: Mutex<Vec<Call>>,
    gets: Mutex<HashMap<String, Value>>,
    failing_puts: Mutex<usize>,
    streams: Mutex<VecDeque<mpsc::UnboundedReceiver<Result<Bytes, Error>>>>,
    streams_opened: Mutex<usize>,
}

impl FakeTransport {
    /// Answer GETs on `path` with a CLIP envelope around `data`.
    pub fn respond_get(&self, path: &str, data: Value) {
        self.gets
            .lock()
            .unwrap()
            .insert(path.to_owned(), json!({ "errors": [], "data": data }));
    }

    /// Fail the next `n` PUTs as if the bridge were unreachable.
    pub fn fail_puts(&self, n: usize) {
        *self.failing_puts.lock().unwrap() = n;
    }

    /// Queue an event stream for the next connection attempt. Dropping the
    /// returned sender closes the stream.
    pub fn queue_stream(&self) -> StreamSender {
        let (tx, rx) = mpsc::unbounded_channel();
        self.streams.lock().unwrap().push_back(rx);
        tx
    }

    pub fn streams_opened(&self) -> usize {
        *self.streams_opened.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn puts(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == "PUT")
            .collect()
    }

    pub fn gets_of(&self, path: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.method == "GET" && c.path == path)
            .count()
    }

    fn record(&self, method: &'static str, url: &Url, body: Option<Value>) {
        self.calls.lock().unwrap().push(Call {
            at: Instant::now(),
            method,
            path: url.path().to_owned(),
            body,
        });
    }
}

fn ok(body: &Value) -> HttpResponse {
    HttpResponse {
        status: 200,
        body: Bytes::from(body.to_string()),
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn get(&self, url: &Url, _headers: &HeaderMap) -> Result<HttpResponse, Error> {
        self.record("GET", url, None);
        let body = self
            .gets
            .lock()
            .unwrap()
            .get(url.path())
            .cloned()
            .unwrap_or_else(|| json!({ "errors": [], "data": [] }));
        Ok(ok(&body))
    }

    async fn put(
        &self,
        url: &Url,
        _headers: &HeaderMap,
        body: &Value,
    ) -> Result<HttpResponse, Error> {
        self.record("PUT", url, Some(body.clone()));
        {
            let mut failing = self.failing_puts.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(Error::Timeout { timeout_secs: 10 });
            }
        }
        Ok(ok(&json!({ "errors": [], "data": [{ "rid": LIGHT_ID, "rtype": "light" }] })))
    }

    async fn stream(&self, url: &Url, _headers: &HeaderMap) -> Result<ByteStream, Error> {
        self.record("STREAM", url, None);
        let Some(rx) = self.streams.lock().unwrap().pop_front() else {
            return Err(Error::Timeout { timeout_secs: 10 });
        };
        *self.streams_opened.lock().unwrap() += 1;
        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(Box::pin(stream))
    }
}

// ── Controller harness ──────────────────────────────────────────────

pub struct Harness {
    pub controller: Controller,
    pub rx: mpsc::UnboundedReceiver<HostMessage>,
    pub transport: Arc<FakeTransport>,
    pub store: Arc<MemoryBridgeStore>,
    pub bridge: Arc<Bridge>,
}

impl Harness {
    /// Drain every message published so far.
    pub fn drain(&mut self) -> Vec<HostMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    /// Wait (in virtual time) for the next message.
    pub async fn next_message(&mut self) -> HostMessage {
        tokio::time::timeout(Duration::from_secs(60), self.rx.recv())
            .await
            .expect("no message within 60s")
            .expect("host channel closed")
    }
}

pub fn native_device(id: &str, light_id: &str) -> NativeDevice {
    NativeDevice {
        id: id.to_owned(),
        product_data: None,
        metadata: None,
        services: vec![
            ResourceIdentifier {
                rid: light_id.to_owned(),
                rtype: "light".into(),
            },
            ResourceIdentifier {
                rid: format!("zc-{id}"),
                rtype: "zigbee_connectivity".into(),
            },
        ],
    }
}

pub fn cached_device(id: &str, features: FeatureSet) -> Device {
    Device {
        id: id.to_owned(),
        name: Some("Desk".into()),
        model: None,
        firmware_version: None,
        archetype: None,
        device_type: DeviceType::Light,
        features,
    }
}

/// Controller over one bridge that knows `dev-1` (light `light-1`),
/// includes it, and caches it with `features`.
pub fn setup_with(features: FeatureSet) -> Harness {
    let mut state = BridgeState::default();
    state
        .native_devices
        .insert(DEVICE_ID.into(), native_device(DEVICE_ID, LIGHT_ID));
    state
        .devices
        .insert(DEVICE_ID.into(), cached_device(DEVICE_ID, features));
    state.included_devices = HashSet::from([DEVICE_ID.to_owned()]);

    let bridge = Arc::new(Bridge::with_state(
        BridgeInfo {
            id: BRIDGE_ID.into(),
            local_address: BRIDGE_HOST.into(),
            application_key: SecretString::from("test-app-key"),
        },
        state,
    ));

    let store = Arc::new(MemoryBridgeStore::new());
    store.insert(Arc::clone(&bridge));
    let transport = Arc::new(FakeTransport::default());

    let (controller, rx) = Controller::new(
        CoreConfig::default(),
        store.clone(),
        transport.clone(),
        Arc::new(DirectResolver),
    );

    Harness {
        controller,
        rx,
        transport,
        store,
        bridge,
    }
}

/// A freshly paired bridge under [`BRIDGE_ID`] that knows only
/// `device_id` (light `light_id`), with a new application key.
pub fn repaired_bridge(device_id: &str, light_id: &str) -> Arc<Bridge> {
    let mut state = BridgeState::default();
    state
        .native_devices
        .insert(device_id.into(), native_device(device_id, light_id));
    state
        .devices
        .insert(device_id.into(), cached_device(device_id, FeatureSet::new()));
    state.included_devices = HashSet::from([device_id.to_owned()]);

    Arc::new(Bridge::with_state(
        BridgeInfo {
            id: BRIDGE_ID.into(),
            local_address: BRIDGE_HOST.into(),
            application_key: SecretString::from("re-paired-key"),
        },
        state,
    ))
}

pub fn setup() -> Harness {
    setup_with(FeatureSet::new())
}

pub fn light_path(light_id: &str) -> String {
    format!("/clip/v2/resource/light/{light_id}")
}

/// One SSE frame carrying a single update event.
pub fn frame(resources: &Value) -> Bytes {
    let events = json!([{
        "type": "update",
        "id": "evt-1",
        "creationtime": "2026-10-16T09:00:00Z",
        "data": resources,
    }]);
    Bytes::from(format!("id: 1:0\ndata: {events}\n\n"))
}
