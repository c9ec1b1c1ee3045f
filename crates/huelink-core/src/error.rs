// ── Core error types ──
//
// Domain-facing errors from huelink-core. Hosts see configuration faults
// (no bridge, unknown device) and translated transport faults; raw HTTP
// details arrive only as message text. The `From<huelink_api::Error>` impl
// performs that translation.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Configuration errors ─────────────────────────────────────────
    #[error("No configured bridge available")]
    NoBridge,

    #[error("Bridge not found: {bridge_id}")]
    BridgeNotFound { bridge_id: String },

    #[error("Device not found: {device_id}")]
    DeviceNotFound { device_id: String },

    #[error("Light service not found for device {device_id}")]
    LightServiceNotFound { device_id: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── Connection errors ────────────────────────────────────────────
    #[error("No address found for bridge host {host}")]
    AddressNotFound { host: String },

    #[error("Cannot connect to bridge at {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Bridge request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Event stream is not running for bridge {bridge_id}")]
    StreamNotRunning { bridge_id: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if the bridge produced one).
        status: Option<u16>,
    },

    // ── Persistence errors ───────────────────────────────────────────
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<huelink_api::Error> for CoreError {
    fn from(err: huelink_api::Error) -> Self {
        match err {
            huelink_api::Error::Transport(ref e) => CoreError::ConnectionFailed {
                address: e
                    .url()
                    .and_then(|u| u.host_str().map(String::from))
                    .unwrap_or_else(|| "<unknown>".into()),
                reason: e.to_string(),
            },
            huelink_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            huelink_api::Error::Tls(reason) => CoreError::ConnectionFailed {
                address: String::new(),
                reason: format!("TLS error: {reason}"),
            },
            huelink_api::Error::InvalidUrl(e) => CoreError::ValidationFailed {
                message: format!("Invalid bridge URL: {e}"),
            },
            huelink_api::Error::InvalidApplicationKey(e) => CoreError::ValidationFailed {
                message: format!("Invalid application key: {e}"),
            },
            huelink_api::Error::Status { status, body } => CoreError::Api {
                message: format!("Unexpected response: Status={status} - Body={body}"),
                status: Some(status),
            },
            huelink_api::Error::Bridge { messages } => CoreError::Api {
                message: messages.join("; "),
                status: Some(200),
            },
            huelink_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_maps_to_api_with_code() {
        let err = CoreError::from(huelink_api::Error::Status {
            status: 503,
            body: "busy".into(),
        });
        assert!(matches!(err, CoreError::Api { status: Some(503), .. }));
    }

    #[test]
    fn timeout_keeps_its_duration() {
        let err = CoreError::from(huelink_api::Error::Timeout { timeout_secs: 5 });
        assert!(matches!(err, CoreError::Timeout { timeout_secs: 5 }));
        assert_eq!(err.to_string(), "Bridge request timed out after 5s");
    }
}
