//! Configuration for huelink hosts.
//!
//! A TOML file of paired bridges and timing defaults, layered with
//! `HUELINK_` environment variables, translated into
//! `huelink_core::CoreConfig` and ready-to-use `Bridge` values.
//! Application keys resolve from a named environment variable first, then
//! plaintext in the file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use huelink_core::{
    Bridge, BridgeInfo, BridgeState, CoreConfig, MemoryBridgeStore, TlsVerification,
};

const ENV_PREFIX: &str = "HUELINK_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no application key configured for bridge '{bridge_id}'")]
    NoCredentials { bridge_id: String },

    #[error("bridge '{bridge_id}' is not configured")]
    UnknownBridge { bridge_id: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Bridge id to make current. Falls back to the first configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_bridge: Option<String>,

    /// Timing and TLS defaults shared by every bridge.
    #[serde(default)]
    pub defaults: Defaults,

    /// Paired bridges, keyed by bridge id.
    #[serde(default)]
    pub bridges: BTreeMap<String, BridgeProfile>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_command_delay_ms")]
    pub command_delay_ms: u64,

    /// Keep-alive ping cadence and reconnect backoff.
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    #[serde(default = "default_on_time_suppression_ms")]
    pub on_time_suppression_ms: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Accept the bridge's self-signed certificate.
    #[serde(default = "default_insecure")]
    pub insecure: bool,

    /// CA certificate to verify bridges against. Wins over `insecure`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            command_delay_ms: default_command_delay_ms(),
            keep_alive_secs: default_keep_alive_secs(),
            on_time_suppression_ms: default_on_time_suppression_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            insecure: default_insecure(),
            ca_cert: None,
        }
    }
}

fn default_command_delay_ms() -> u64 {
    150
}
fn default_keep_alive_secs() -> u64 {
    20
}
fn default_on_time_suppression_ms() -> u64 {
    2000
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_insecure() -> bool {
    true
}

/// A paired bridge.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BridgeProfile {
    /// IP address or mDNS `.local` name.
    pub address: String,

    /// Application key (plaintext, prefer `application_key_env`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_key: Option<String>,

    /// Environment variable holding the application key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_key_env: Option<String>,

    /// Devices whose state is reported to the host.
    #[serde(default)]
    pub included_devices: Vec<String>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "huelink", "huelink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("huelink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the config from the canonical path plus environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the config from `path` plus environment. A missing file yields
/// the defaults. Nested keys use `__`, e.g.
/// `HUELINK_DEFAULTS__COMMAND_DELAY_MS=200`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

impl Config {
    /// Core tuning from `[defaults]`.
    pub fn core_config(&self) -> Result<CoreConfig, ConfigError> {
        let d = &self.defaults;
        if d.keep_alive_secs == 0 {
            return Err(ConfigError::Validation {
                field: "defaults.keep_alive_secs".into(),
                reason: "must be at least 1".into(),
            });
        }
        if d.request_timeout_secs == 0 || d.connect_timeout_secs == 0 {
            return Err(ConfigError::Validation {
                field: "defaults.*_timeout_secs".into(),
                reason: "timeouts must be at least 1".into(),
            });
        }

        let tls = if let Some(ref ca_path) = d.ca_cert {
            TlsVerification::CustomCa(ca_path.clone())
        } else if d.insecure {
            TlsVerification::DangerAcceptInvalid
        } else {
            TlsVerification::SystemDefaults
        };

        Ok(CoreConfig {
            command_delay: Duration::from_millis(d.command_delay_ms),
            keep_alive_interval: Duration::from_secs(d.keep_alive_secs),
            on_time_suppression: Duration::from_millis(d.on_time_suppression_ms),
            connect_timeout: Duration::from_secs(d.connect_timeout_secs),
            request_timeout: Duration::from_secs(d.request_timeout_secs),
            tls,
        })
    }

    /// The bridge to make current: `default_bridge`, else the first one.
    pub fn default_bridge_id(&self) -> Option<&str> {
        self.default_bridge
            .as_deref()
            .or_else(|| self.bridges.keys().next().map(String::as_str))
    }

    /// Build a configured bridge with its credentials and included devices.
    pub fn bridge(&self, bridge_id: &str) -> Result<Bridge, ConfigError> {
        let profile = self
            .bridges
            .get(bridge_id)
            .ok_or_else(|| ConfigError::UnknownBridge {
                bridge_id: bridge_id.into(),
            })?;

        if profile.address.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: format!("bridges.{bridge_id}.address"),
                reason: "must not be empty".into(),
            });
        }

        let application_key = resolve_application_key(profile, bridge_id)?;

        let mut state = BridgeState::default();
        state
            .included_devices
            .extend(profile.included_devices.iter().cloned());

        Ok(Bridge::with_state(
            BridgeInfo {
                id: bridge_id.into(),
                local_address: profile.address.trim().to_owned(),
                application_key,
            },
            state,
        ))
    }

    /// Every configured bridge, in id order.
    pub fn bridges(&self) -> Result<Vec<Bridge>, ConfigError> {
        self.bridges.keys().map(|id| self.bridge(id)).collect()
    }

    /// Fill a store with every configured bridge and make the default one
    /// current.
    pub fn populate(&self, store: &MemoryBridgeStore) -> Result<(), ConfigError> {
        for bridge in self.bridges()? {
            store.insert(Arc::new(bridge));
        }
        if let Some(id) = self.default_bridge_id() {
            store
                .set_current(id)
                .map_err(|_| ConfigError::UnknownBridge {
                    bridge_id: id.into(),
                })?;
        }
        Ok(())
    }
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve a bridge's application key: named env var, then plaintext.
pub fn resolve_application_key(
    profile: &BridgeProfile,
    bridge_id: &str,
) -> Result<SecretString, ConfigError> {
    // 1. Profile's application_key_env → env var lookup
    if let Some(ref env_name) = profile.application_key_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. Plaintext in config
    if let Some(ref key) = profile.application_key {
        return Ok(SecretString::from(key.clone()));
    }

    Err(ConfigError::NoCredentials {
        bridge_id: bridge_id.into(),
    })
}
