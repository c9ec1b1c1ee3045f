#![allow(clippy::unwrap_used)]
// Event stream supervision through the controller: dispatch into status
// messages, brightness fetches, reconnects and auto-off suppression.

mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::time::Instant;

use common::{
    BRIDGE_HOST, BRIDGE_ID, DEVICE_ID, Harness, LIGHT_ID, frame, light_path, setup, setup_with,
};
use huelink_core::{
    ControlCommand, CoreError, Feature, FeatureKind, FeatureSet, HostMessage, StatusEvent,
    StreamState,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn owner() -> Value {
    json!({ "rid": DEVICE_ID, "rtype": "device" })
}

fn light_update(fields: &Value) -> Value {
    let mut light = json!({ "type": "light", "id": LIGHT_ID, "owner": owner() });
    for (key, value) in fields.as_object().unwrap() {
        light[key] = value.clone();
    }
    json!([light])
}

async fn start_streaming(h: &mut Harness) {
    assert!(h.controller.start_stream(BRIDGE_ID).await.unwrap());
    assert_eq!(
        h.next_message().await,
        HostMessage::StreamReady {
            bridge_id: BRIDGE_ID.into()
        }
    );
    assert_eq!(h.controller.stream_state(BRIDGE_ID), StreamState::Streaming);
}

async fn next_status(h: &mut Harness) -> StatusEvent {
    match h.next_message().await {
        HostMessage::StatusChanged(status) => status,
        other => panic!("expected a status change, got {other:?}"),
    }
}

/// Let spawned tasks run without moving the clock meaningfully.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

// ── Dispatch ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_light_update_publishes_status() {
    let mut h = setup_with(
        [Feature::switch(true), Feature::dimming(0.1)]
            .into_iter()
            .collect(),
    );
    let tx = h.transport.queue_stream();
    start_streaming(&mut h).await;
    assert!(h.controller.is_stream_connected());
    assert_eq!(h.bridge.last_good_address().await.as_deref(), Some(BRIDGE_HOST));

    tx.send(Ok(frame(&light_update(&json!({ "dimming": { "brightness": 40.0 } })))))
        .unwrap();

    let status = next_status(&mut h).await;
    assert_eq!(status.bridge_id, BRIDGE_ID);
    assert_eq!(status.device_id, DEVICE_ID);
    assert_eq!(
        status.features.get(FeatureKind::Dimming),
        Some(&Feature::dimming(0.4))
    );
    assert!(status.changed);

    let state = h.bridge.state().await;
    assert_eq!(
        state.devices[DEVICE_ID].features.get(FeatureKind::Dimming),
        Some(&Feature::dimming(0.4))
    );
}

#[tokio::test(start_paused = true)]
async fn test_frame_split_across_chunks_is_reassembled() {
    let mut h = setup_with([Feature::switch(true)].into_iter().collect());
    let tx = h.transport.queue_stream();
    start_streaming(&mut h).await;

    let bytes = frame(&light_update(&json!({ "on": { "on": false } })));
    let (head, tail) = bytes.split_at(bytes.len() / 2);
    tx.send(Ok(bytes::Bytes::copy_from_slice(head))).unwrap();
    settle().await;
    assert!(h.drain().is_empty());

    tx.send(Ok(bytes::Bytes::copy_from_slice(tail))).unwrap();
    let status = next_status(&mut h).await;
    assert_eq!(
        status.features.get(FeatureKind::SwitchState),
        Some(&Feature::switch(false))
    );
    assert_eq!(
        status.features.get(FeatureKind::Dimming),
        Some(&Feature::dimming(0.0))
    );
}

#[tokio::test(start_paused = true)]
async fn test_excluded_device_updates_are_dropped() {
    let mut h = setup();
    h.controller
        .exclude_devices(&[DEVICE_ID.to_owned()])
        .await
        .unwrap();
    let tx = h.transport.queue_stream();
    start_streaming(&mut h).await;

    tx.send(Ok(frame(&light_update(&json!({ "on": { "on": false } })))))
        .unwrap();
    settle().await;

    assert!(h.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_connectivity_loss_then_on_fetches_brightness() {
    let mut h = setup_with(
        [Feature::switch(false), Feature::maintenance(false)]
            .into_iter()
            .collect(),
    );
    h.transport.respond_get(
        &light_path(LIGHT_ID),
        json!([{
            "id": LIGHT_ID,
            "owner": owner(),
            "on": { "on": true },
            "dimming": { "brightness": 80.0 },
            "color_temperature": {
                "mirek": 250,
                "mirek_valid": true,
                "mirek_schema": { "mirek_minimum": 153, "mirek_maximum": 500 }
            }
        }]),
    );
    let tx = h.transport.queue_stream();
    start_streaming(&mut h).await;

    tx.send(Ok(frame(&json!([{
        "type": "zigbee_connectivity",
        "id": "zc-dev-1",
        "owner": owner(),
        "status": "connectivity_issue"
    }]))))
    .unwrap();
    let status = next_status(&mut h).await;
    assert_eq!(
        status.features.get(FeatureKind::Maintenance),
        Some(&Feature::maintenance(true))
    );
    assert!(status.changed);

    tx.send(Ok(frame(&light_update(&json!({ "on": { "on": true } })))))
        .unwrap();
    let status = next_status(&mut h).await;
    assert_eq!(
        status.features.get(FeatureKind::SwitchState),
        Some(&Feature::switch(true))
    );
    assert!(!status.features.contains(FeatureKind::Dimming));

    let fetched = next_status(&mut h).await;
    assert_eq!(h.transport.gets_of(&light_path(LIGHT_ID)), 1);
    assert_eq!(
        fetched.features.get(FeatureKind::Dimming),
        Some(&Feature::dimming(0.8))
    );
    assert!(fetched.features.contains(FeatureKind::ColorTemperature));
}

#[tokio::test(start_paused = true)]
async fn test_on_with_cached_brightness_skips_fetch() {
    let mut h = setup_with(
        [Feature::switch(false), Feature::dimming(0.6)]
            .into_iter()
            .collect(),
    );
    let tx = h.transport.queue_stream();
    start_streaming(&mut h).await;

    tx.send(Ok(frame(&light_update(&json!({ "on": { "on": true } })))))
        .unwrap();
    let status = next_status(&mut h).await;
    settle().await;

    assert_eq!(
        status.features.get(FeatureKind::Dimming),
        Some(&Feature::dimming(0.6))
    );
    assert_eq!(h.transport.gets_of(&light_path(LIGHT_ID)), 0);
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_reconnects_after_close() {
    let mut h = setup();
    let first = h.transport.queue_stream();
    let _second = h.transport.queue_stream();
    start_streaming(&mut h).await;

    let closed_at = Instant::now();
    drop(first);
    let mut state = h.controller.subscribe_stream(BRIDGE_ID).unwrap();
    state
        .wait_for(|s| *s == StreamState::Disconnected)
        .await
        .unwrap();
    assert_eq!(h.bridge.last_good_address().await, None);
    assert!(!h.controller.is_stream_connected());

    assert_eq!(
        h.next_message().await,
        HostMessage::StreamReady {
            bridge_id: BRIDGE_ID.into()
        }
    );
    assert!(closed_at.elapsed() >= Duration::from_secs(20));
    assert_eq!(h.transport.streams_opened(), 2);
    assert_eq!(h.controller.stream_state(BRIDGE_ID), StreamState::Streaming);
}

#[tokio::test(start_paused = true)]
async fn test_retries_after_failed_connect() {
    let mut h = setup();

    assert!(h.controller.start_stream(BRIDGE_ID).await.unwrap());
    settle().await;
    assert_eq!(h.controller.stream_state(BRIDGE_ID), StreamState::Disconnected);

    let _tx = h.transport.queue_stream();
    assert_eq!(
        h.next_message().await,
        HostMessage::StreamReady {
            bridge_id: BRIDGE_ID.into()
        }
    );
    assert_eq!(h.transport.streams_opened(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_start_while_streaming_is_ignored() {
    let mut h = setup();
    let _tx = h.transport.queue_stream();
    start_streaming(&mut h).await;

    assert!(!h.controller.start_stream(BRIDGE_ID).await.unwrap());
    assert_eq!(h.transport.streams_opened(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_closes_connection() {
    let mut h = setup();
    let tx = h.transport.queue_stream();
    start_streaming(&mut h).await;

    h.controller.stop_stream(BRIDGE_ID).unwrap();
    settle().await;

    assert!(tx.is_closed());
    assert_eq!(h.controller.stream_state(BRIDGE_ID), StreamState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_stop_unknown_bridge_fails() {
    let h = setup();

    let err = h.controller.stop_stream("nope").unwrap_err();
    assert!(matches!(err, CoreError::StreamNotRunning { ref bridge_id } if bridge_id == "nope"));

    let err = h.controller.start_stream("nope").await.unwrap_err();
    assert!(matches!(err, CoreError::BridgeNotFound { .. }));
}

// ── Auto-off suppression ────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_late_update_cancels_auto_off() {
    let mut h = setup_with([Feature::switch(false)].into_iter().collect());
    let tx = h.transport.queue_stream();
    start_streaming(&mut h).await;

    let features: FeatureSet = [Feature::switch(true)].into_iter().collect();
    h.controller
        .execute(ControlCommand::new("req-1", DEVICE_ID, features).with_on_time(30.0))
        .await;

    // The bridge echoes our own command within the suppression window.
    tokio::time::sleep(Duration::from_secs(1)).await;
    tx.send(Ok(frame(&light_update(&json!({ "on": { "on": true } })))))
        .unwrap();
    settle().await;
    assert!(h.bridge.state().await.auto_off(DEVICE_ID).is_some());

    // Someone else changes the light later on.
    tokio::time::sleep(Duration::from_secs(4)).await;
    tx.send(Ok(frame(&light_update(&json!({ "on": { "on": false } })))))
        .unwrap();
    settle().await;
    assert!(h.bridge.state().await.auto_off(DEVICE_ID).is_none());

    tokio::time::sleep(Duration::from_secs(40)).await;
    assert_eq!(h.transport.puts().len(), 1);
}
