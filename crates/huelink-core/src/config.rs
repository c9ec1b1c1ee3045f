// ── Runtime configuration ──
//
// Timing and transport tuning for the control queue and event stream.
// Hosts (or huelink-config) build a `CoreConfig` and hand it in; core
// never reads files.

use std::path::PathBuf;
use std::time::Duration;

use huelink_api::{TlsMode, TransportConfig};

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    SystemDefaults,
    /// Custom CA certificate file (the bridge vendor's root).
    CustomCa(PathBuf),
    /// Skip verification. Default, since bridges use self-signed certs.
    #[default]
    DangerAcceptInvalid,
}

/// Tuning shared by every bridge a controller manages.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Pause after every control command, whatever its outcome.
    pub command_delay: Duration,
    /// Keep-alive ping cadence, also used as the fixed reconnect backoff.
    pub keep_alive_interval: Duration,
    /// Age after which a stream update for a device cancels its pending
    /// auto-off timer.
    pub on_time_suppression: Duration,
    /// Upper bound on establishing a connection to the bridge.
    pub connect_timeout: Duration,
    /// Whole-request timeout for control and light-state calls.
    pub request_timeout: Duration,
    pub tls: TlsVerification,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            command_delay: Duration::from_millis(150),
            keep_alive_interval: Duration::from_secs(20),
            on_time_suppression: Duration::from_millis(2000),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            tls: TlsVerification::default(),
        }
    }
}

impl CoreConfig {
    /// Transport settings for the api layer.
    pub fn transport(&self) -> TransportConfig {
        let tls = match &self.tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        };
        TransportConfig {
            tls,
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
            keep_alive: self.keep_alive_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_bridge_timing() {
        let config = CoreConfig::default();
        assert_eq!(config.command_delay, Duration::from_millis(150));
        assert_eq!(config.keep_alive_interval, Duration::from_secs(20));
        assert_eq!(config.on_time_suppression, Duration::from_secs(2));
        assert_eq!(config.tls, TlsVerification::DangerAcceptInvalid);
    }

    #[test]
    fn transport_carries_keep_alive_and_tls() {
        let config = CoreConfig {
            keep_alive_interval: Duration::from_secs(7),
            tls: TlsVerification::CustomCa("/etc/hue/ca.pem".into()),
            ..CoreConfig::default()
        };
        let transport = config.transport();
        assert_eq!(transport.keep_alive, Duration::from_secs(7));
        assert!(matches!(transport.tls, TlsMode::CustomCa(ref p) if p.ends_with("ca.pem")));
    }
}
