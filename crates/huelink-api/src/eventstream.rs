//! Server-sent event framing for the bridge event stream.
//!
//! The bridge pushes frames terminated by a blank line (`\n\n`). Within a
//! frame only `data: ` lines carry payload, each a JSON array of [`Event`]s.
//! [`FrameAssembler`] accumulates body chunks until a frame is complete and
//! decodes it; malformed lines and events are logged and skipped without
//! touching their siblings.

use bytes::BytesMut;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{trace, warn};

use crate::models::{Light, ZigbeeConnectivity};

/// Prefix of payload-carrying lines.
pub const DATA_PREFIX: &str = "data: ";

const FRAME_TERMINATOR: &[u8] = b"\n\n";

// ── Event ────────────────────────────────────────────────────────────

/// One entry of a `data:` line array.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Event {
    /// `"update"`, `"add"`, `"delete"`, `"error"`.
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub id: Option<String>,

    #[serde(default, rename = "creationtime")]
    pub creation_time: Option<String>,

    /// Raw resource payloads, decoded lazily by [`Event::resources`] so one
    /// bad entry cannot take down the rest.
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
}

/// A decoded entry of [`Event::data`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventResource {
    Light(Light),
    Connectivity(ZigbeeConnectivity),
    /// A resource type this crate does not model.
    Other { kind: String },
}

impl Event {
    pub fn is_update(&self) -> bool {
        self.kind == "update"
    }

    /// Parse `creationtime`, dropping unparseable values.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.creation_time
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Decode each payload by its `type` discriminator. Entries that fail
    /// to decode are logged and skipped.
    pub fn resources(&self) -> impl Iterator<Item = EventResource> + '_ {
        self.data.iter().filter_map(decode_resource)
    }
}

fn decode_resource(value: &serde_json::Value) -> Option<EventResource> {
    let kind = value.get("type").and_then(serde_json::Value::as_str)?;
    let decoded = match kind {
        "light" => serde_json::from_value(value.clone()).map(EventResource::Light),
        "zigbee_connectivity" => {
            serde_json::from_value(value.clone()).map(EventResource::Connectivity)
        }
        other => {
            return Some(EventResource::Other {
                kind: other.to_owned(),
            });
        }
    };
    match decoded {
        Ok(resource) => Some(resource),
        Err(e) => {
            warn!(error = %e, kind, "skipping undecodable event resource");
            None
        }
    }
}

// ── Frame reassembly ─────────────────────────────────────────────────

/// Accumulates stream chunks into complete frames.
///
/// One assembler per connection; never share it across bridges.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buffer: BytesMut,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Returns the decoded events once the accumulated data
    /// ends with the frame terminator, resetting the buffer either way.
    pub fn push(&mut self, chunk: &[u8]) -> Option<Vec<Event>> {
        self.buffer.extend_from_slice(chunk);
        // Checked on the whole buffer: a terminator split across two
        // chunks, or a one-byte chunk, still completes the frame.
        if !self.buffer.ends_with(FRAME_TERMINATOR) {
            return None;
        }
        let frame = self.buffer.split().freeze();
        Some(parse_frame(&frame))
    }

    /// Bytes waiting for a terminator.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Decode every `data:` line of a complete frame.
pub fn parse_frame(frame: &[u8]) -> Vec<Event> {
    let text = String::from_utf8_lossy(frame);
    let mut events = Vec::new();

    for line in text.lines() {
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            if !line.is_empty() {
                trace!(line, "ignoring non-data line");
            }
            continue;
        };
        let Some(start) = payload.find('[') else {
            warn!(line, "data line carries no event array");
            continue;
        };
        match serde_json::from_str::<Vec<serde_json::Value>>(&payload[start..]) {
            Ok(batch) => events.extend(batch.into_iter().filter_map(decode_event)),
            Err(e) => warn!(error = %e, line, "failed to parse event line"),
        }
    }

    events
}

fn decode_event(value: serde_json::Value) -> Option<Event> {
    match serde_json::from_value(value) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, "skipping undecodable event");
            None
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FRAME: &str = concat!(
        "id: 1700000000:0\n",
        "data: [{\"creationtime\":\"2024-01-01T10:00:00Z\",\"id\":\"e1\",\"type\":\"update\",",
        "\"data\":[{\"id\":\"l1\",\"type\":\"light\",\"owner\":{\"rid\":\"d1\",\"rtype\":\"device\"},",
        "\"on\":{\"on\":true}}]}]\n\n",
    );

    #[test]
    fn single_chunk_frame_decodes() {
        let mut asm = FrameAssembler::new();
        let events = asm.push(FRAME.as_bytes()).unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_update());
        assert_eq!(asm.pending(), 0);
        assert!(events[0].created_at().is_some());
    }

    #[test]
    fn frame_is_identical_for_every_split() {
        let bytes = FRAME.as_bytes();
        let expected = parse_frame(bytes);

        for first in 1..bytes.len() {
            for second in first..bytes.len() {
                let mut asm = FrameAssembler::new();
                let mut decoded = Vec::new();
                for chunk in [&bytes[..first], &bytes[first..second], &bytes[second..]] {
                    if let Some(events) = asm.push(chunk) {
                        decoded.push(events);
                    }
                }
                assert_eq!(decoded, vec![expected.clone()], "split at {first}/{second}");
            }
        }
    }

    #[test]
    fn byte_at_a_time_yields_one_frame() {
        let mut asm = FrameAssembler::new();
        let frames: Vec<_> = FRAME.bytes().filter_map(|b| asm.push(&[b])).collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 1);
    }

    #[test]
    fn malformed_line_does_not_drop_sibling() {
        let frame = format!("data: not-json\n{}", FRAME.trim_start_matches("id: 1700000000:0\n"));
        let events = parse_frame(frame.as_bytes());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id.as_deref(), Some("e1"));
    }

    #[test]
    fn event_without_type_does_not_drop_siblings() {
        let frame = concat!(
            "data: [{\"id\":\"bad\",\"data\":[]},",
            "{\"type\":\"update\",\"id\":\"e2\",\"data\":[]}]\n\n",
        );
        let events = parse_frame(frame.as_bytes());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id.as_deref(), Some("e2"));
    }

    #[test]
    fn terminator_split_across_chunks_completes_frame() {
        let mut asm = FrameAssembler::new();
        let (head, tail) = FRAME.split_at(FRAME.len() - 1);
        assert_eq!(asm.push(head.as_bytes()), None);
        assert_eq!(asm.push(tail.as_bytes()).map(|e| e.len()), Some(1));
    }

    #[test]
    fn buffer_resets_after_unparseable_frame() {
        let mut asm = FrameAssembler::new();
        assert_eq!(asm.push(b"data: [garbage\n\n"), Some(Vec::new()));
        assert_eq!(asm.pending(), 0);
        assert_eq!(asm.push(FRAME.as_bytes()).map(|e| e.len()), Some(1));
    }

    #[test]
    fn keep_alive_comment_yields_nothing() {
        let mut asm = FrameAssembler::new();
        assert_eq!(asm.push(b": hi\n\n"), Some(Vec::new()));
    }

    #[test]
    fn resources_are_decoded_individually() {
        let event: Event = serde_json::from_value(serde_json::json!({
            "type": "update",
            "data": [
                { "type": "light", "id": "l1", "on": { "on": "yes" } },
                { "type": "zigbee_connectivity", "id": "z1",
                  "owner": { "rid": "d1", "rtype": "device" }, "status": "connectivity_issue" },
                { "type": "grouped_light", "id": "g1" },
                { "id": "untyped" }
            ]
        }))
        .unwrap();

        let resources: Vec<_> = event.resources().collect();
        assert_eq!(resources.len(), 2);
        let EventResource::Connectivity(conn) = &resources[0] else {
            panic!("expected connectivity, got {:?}", resources[0]);
        };
        assert!(!conn.is_connected());
        assert_eq!(
            resources[1],
            EventResource::Other {
                kind: "grouped_light".into()
            }
        );
    }
}
