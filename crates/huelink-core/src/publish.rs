// ── Host-facing messages ──
//
// Everything core reports upward flows through one unbounded channel the
// host drains and forwards over its own transport.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::model::FeatureSet;

/// Error code attached to every failed control response.
pub const CONTROL_REQUEST_FAILED: &str = "CONTROL_REQUEST_FAILED";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostMessage {
    StatusChanged(StatusEvent),
    ControlResponse(ControlResponse),
    StreamReady { bridge_id: String },
}

/// Features observed for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub id: Uuid,
    pub bridge_id: String,
    pub device_id: String,
    pub features: FeatureSet,
    /// Whether the cached device actually changed. Informational.
    pub changed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub correlation_id: String,
    pub device_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ControlError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlError {
    pub code: String,
    pub message: String,
}

impl ControlError {
    pub fn request_failed(message: impl Into<String>) -> Self {
        Self {
            code: CONTROL_REQUEST_FAILED.to_owned(),
            message: message.into(),
        }
    }
}

// ── Publisher ────────────────────────────────────────────────────────

/// Cloneable sending half of the host channel.
#[derive(Debug, Clone)]
pub struct Publisher {
    tx: mpsc::UnboundedSender<HostMessage>,
}

impl Publisher {
    pub fn new(tx: mpsc::UnboundedSender<HostMessage>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<HostMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn send(&self, message: HostMessage) {
        if self.tx.send(message).is_err() {
            debug!("host receiver dropped, discarding message");
        }
    }

    pub fn status(&self, bridge_id: &str, device_id: &str, features: FeatureSet, changed: bool) {
        self.send(HostMessage::StatusChanged(StatusEvent {
            id: Uuid::new_v4(),
            bridge_id: bridge_id.to_owned(),
            device_id: device_id.to_owned(),
            features,
            changed,
        }));
    }

    pub fn control_success(&self, correlation_id: &str, device_id: &str) {
        self.send(HostMessage::ControlResponse(ControlResponse {
            correlation_id: correlation_id.to_owned(),
            device_id: device_id.to_owned(),
            success: true,
            error: None,
        }));
    }

    pub fn control_failure(&self, correlation_id: &str, device_id: &str, message: impl Into<String>) {
        self.send(HostMessage::ControlResponse(ControlResponse {
            correlation_id: correlation_id.to_owned(),
            device_id: device_id.to_owned(),
            success: false,
            error: Some(ControlError::request_failed(message)),
        }));
    }

    pub fn stream_ready(&self, bridge_id: &str) {
        self.send(HostMessage::StreamReady {
            bridge_id: bridge_id.to_owned(),
        });
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn failure_carries_code_and_message() {
        let (publisher, mut rx) = Publisher::channel();
        publisher.control_failure("req-1", "dev-1", "Device not found: dev-1");

        let Ok(HostMessage::ControlResponse(response)) = rx.try_recv() else {
            panic!("expected a control response");
        };
        assert!(!response.success);
        assert_eq!(
            response.error,
            Some(ControlError {
                code: "CONTROL_REQUEST_FAILED".into(),
                message: "Device not found: dev-1".into(),
            })
        );
    }

    #[test]
    fn sending_after_receiver_drop_is_silent() {
        let (publisher, rx) = Publisher::channel();
        drop(rx);
        publisher.stream_ready("bridge-1");
    }

    #[test]
    fn wire_shape() {
        let message = HostMessage::ControlResponse(ControlResponse {
            correlation_id: "req-1".into(),
            device_id: "dev-1".into(),
            success: true,
            error: None,
        });
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "type": "CONTROL_RESPONSE",
                "correlation_id": "req-1",
                "device_id": "dev-1",
                "success": true
            })
        );
    }
}
