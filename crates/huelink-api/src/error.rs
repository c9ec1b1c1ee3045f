use thiserror::Error;

/// Top-level error type for the `huelink-api` crate.
///
/// Covers every failure mode of the bridge wire layer: transport,
/// unexpected HTTP statuses, CLIP error envelopes, and payload decoding.
/// `huelink-core` maps these into domain diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, reset, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The application key cannot be carried in an HTTP header.
    #[error("Invalid application key: {0}")]
    InvalidApplicationKey(#[from] reqwest::header::InvalidHeaderValue),

    // ── Bridge responses ────────────────────────────────────────────
    /// The bridge answered with something other than 200 OK.
    #[error("Unexpected response: Status={status} - Body={body}")]
    Status { status: u16, body: String },

    /// The bridge answered 200 but reported errors in the CLIP envelope.
    #[error("Bridge reported errors: {}", messages.join("; "))]
    Bridge { messages: Vec<String> },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON (de)serialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` when the request never produced an HTTP response.
    ///
    /// Callers use this to invalidate cached bridge addresses.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout { .. } | Self::Tls(_))
    }

    pub(crate) fn deserialization(err: &serde_json::Error, body: &[u8]) -> Self {
        let body = String::from_utf8_lossy(body).into_owned();
        let preview: String = body.chars().take(200).collect();
        Self::Deserialization {
            message: format!("{err} (body preview: {preview:?})"),
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_formats_like_the_bridge_contract() {
        let err = Error::Status {
            status: 403,
            body: "forbidden".into(),
        };
        assert_eq!(
            err.to_string(),
            "Unexpected response: Status=403 - Body=forbidden"
        );
        assert!(!err.is_transport());
    }

    #[test]
    fn timeouts_and_tls_failures_are_transport_faults() {
        assert!(Error::Timeout { timeout_secs: 5 }.is_transport());
        assert!(Error::Tls("bad certificate".into()).is_transport());
        assert!(!Error::Bridge { messages: vec![] }.is_transport());
    }

    #[test]
    fn deserialization_preview_is_truncated() {
        let body = "x".repeat(500);
        let json_err = serde_json::from_str::<serde_json::Value>(&body).unwrap_err();
        let Error::Deserialization { message, body: raw } =
            Error::deserialization(&json_err, body.as_bytes())
        else {
            panic!("expected deserialization error");
        };
        assert_eq!(raw.len(), 500);
        assert!(message.len() < 300, "preview not truncated: {message}");
    }
}
